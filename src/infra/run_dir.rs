// ============================================================
// Layer 6 — Run Directory
// ============================================================
// Every configuration trains inside its own directory:
//
//   <log_root>/<config name>/
//     network_config.json   ← the resolved config, written at start
//     tokenizer.json
//     checkpoints/
//     train/metrics.csv
//     valid/metrics.csv
//
// Re-running a config reuses the directory, which is how an
// interrupted run resumes from its checkpoint.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::config::NetworkConfig;
use crate::ml::evaluation::Stream;

pub const CONFIG_FILE: &str = "network_config.json";

#[derive(Debug, Clone)]
pub struct RunDirectory {
    root: PathBuf,
}

impl RunDirectory {
    /// Create the run directory for `config` and record the config in it.
    pub fn create(log_root: impl AsRef<Path>, config: &NetworkConfig) -> Result<Self> {
        let root = log_root.as_ref().join(&config.name);
        for sub in [
            root.join("checkpoints"),
            root.join(Stream::Train.to_string()),
            root.join(Stream::Valid.to_string()),
        ] {
            fs::create_dir_all(&sub)
                .with_context(|| format!("Cannot create run directory '{}'", sub.display()))?;
        }

        let run = Self { root };
        run.save_config(config)?;
        Ok(run)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn save_config(&self, config: &NetworkConfig) -> Result<()> {
        let path = self.root.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(config)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::info!("Config saved to '{}'", path.display());
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_and_saved_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = NetworkConfig { name: "gru-small".to_string(), ..NetworkConfig::default() };

        let run = RunDirectory::create(dir.path(), &config).unwrap();

        assert_eq!(run.root(), dir.path().join("gru-small"));
        for sub in ["checkpoints", "train", "valid"] {
            assert!(run.root().join(sub).is_dir(), "{sub} missing");
        }
        let saved = fs::read_to_string(run.root().join(CONFIG_FILE)).unwrap();
        let saved: NetworkConfig = serde_json::from_str(&saved).unwrap();
        assert_eq!(saved, config);
    }
}
