// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// One checkpoint per run, overwritten on every save:
//
//   <log_dir>/checkpoints/
//     models.ckpt.mpk.gz       ← every parameter, full precision
//     models.ckpt.epoch.json   ← the epoch counter
//
// A checkpoint only counts when BOTH files are present. A set
// with a file missing is treated as absent and the caller keeps
// its fresh initialisation; there is no partial restore.
//
// Weights go through Burn's NamedMpkGzFileRecorder with
// FullPrecisionSettings, so a save/load round trip reproduces
// the exact f32 parameters.

use anyhow::{Context, Result};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};

pub const CHECKPOINT_NAME: &str = "models.ckpt";

const WEIGHTS_SUFFIX: &str = ".mpk.gz";
const EPOCH_SUFFIX:   &str = ".epoch.json";

type WeightsRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    /// `<dir>/models.ckpt`; the files on disk extend this path
    path: PathBuf,
}

impl CheckpointManager {
    /// Manage the default checkpoint inside `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { path: dir.join(CHECKPOINT_NAME) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every file a complete checkpoint at `path` consists of.
    pub fn files(path: &Path) -> [PathBuf; 2] {
        [with_suffix(path, WEIGHTS_SUFFIX), with_suffix(path, EPOCH_SUFFIX)]
    }

    /// True when every checkpoint file exists at `path`.
    pub fn is_complete(path: &Path) -> bool {
        Self::files(path).iter().all(|f| f.is_file())
    }

    /// Write `module` and `epoch` to `path` (default: the run's checkpoint),
    /// replacing whatever was there.
    pub fn save<B: Backend, M: Module<B>>(
        &self,
        module: &M,
        epoch:  usize,
        path:   Option<&Path>,
    ) -> Result<()> {
        let path = path.unwrap_or(&self.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create checkpoint dir '{}'", parent.display()))?;
        }

        // The recorder swaps the last extension for "mpk.gz".
        let recorder_path = with_suffix(path, ".mpk");
        WeightsRecorder::new()
            .record(module.clone().into_record(), recorder_path)
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let epoch_path = with_suffix(path, EPOCH_SUFFIX);
        fs::write(&epoch_path, serde_json::to_string(&epoch)?)
            .with_context(|| format!("Failed to write '{}'", epoch_path.display()))?;

        tracing::debug!("Saved checkpoint '{}' at epoch {}", path.display(), epoch);
        Ok(())
    }

    /// Restore `module` from the run's checkpoint.
    ///
    /// Returns `Ok(None)` when the checkpoint set is incomplete; the
    /// caller keeps `module` as freshly initialised.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        module: M,
        device: &B::Device,
    ) -> Result<Option<(M, usize)>> {
        if !Self::is_complete(&self.path) {
            tracing::info!("No complete checkpoint at '{}'", self.path.display());
            return Ok(None);
        }

        let epoch_path = with_suffix(&self.path, EPOCH_SUFFIX);
        let epoch: usize = serde_json::from_str(
            &fs::read_to_string(&epoch_path)
                .with_context(|| format!("Cannot read '{}'", epoch_path.display()))?,
        )
        .with_context(|| format!("Malformed epoch file '{}'", epoch_path.display()))?;

        let record = WeightsRecorder::new()
            .load(with_suffix(&self.path, ".mpk"), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", self.path.display()))?;

        tracing::info!("Restored checkpoint '{}' (epoch {})", self.path.display(), epoch);
        Ok(Some((module.load_record(record), epoch)))
    }
}

/// `path` with `suffix` appended to the file name.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
