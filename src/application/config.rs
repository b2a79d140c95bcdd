// ============================================================
// Layer 2 — Network Configuration
// ============================================================
// Every hyperparameter for one training run lives in a
// `NetworkConfig`. A `ConfigStore` is the parsed configuration
// file: a data path shared by all runs plus a list of network
// configs addressed by run number.
//
// Example file:
//   {
//     "data": { "path": "resources/datasets" },
//     "network": [
//       { "name": "baseline", "vocabulary_size": 20000, ... }
//     ]
//   }
//
// serde does all the type conversion, so by the time a config
// reaches the model builder every numeric field already has its
// final type.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

// ─── Recurrent Unit ───────────────────────────────────────────────────────────
/// Which recurrent cell the encoder uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RnnUnit {
    Lstm,
    Gru,
}

impl RnnUnit {
    /// Resolve the configured unit name. Unknown names fall back to LSTM.
    pub fn from_config(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "lstm" => RnnUnit::Lstm,
            "gru"  => RnnUnit::Gru,
            other  => {
                tracing::warn!("Unknown rnn_unit '{}', falling back to 'lstm'", other);
                RnnUnit::Lstm
            }
        }
    }
}

// ─── Threshold Policy ─────────────────────────────────────────────────────────
/// How sigmoid outputs become discrete 0/1 predictions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdPolicy {
    /// Predict 1 wherever the output is at least the limit
    Constant(f32),
    /// Predict 1 wherever the output is at least the mean output
    Adaptive,
}

// ─── NetworkConfig ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Run name, also the log directory name
    pub name: String,

    // Data related
    pub vocabulary_size:  usize,
    pub user_count:       usize,
    pub subreddit_count:  usize,
    pub max_title_length: usize,
    pub training_data:    String,
    #[serde(default)]
    pub validation_data:  Option<String>,

    // Embedding matrix
    pub embedding_size:     usize,
    #[serde(default = "default_true")]
    pub trainable_matrix:   bool,
    #[serde(default)]
    pub use_pretrained:     bool,
    #[serde(default)]
    pub pre_trained_matrix: Option<String>,

    // Learning
    pub learning_rate:   f64,
    pub training_epochs: usize,
    pub batch_size:      usize,
    pub rnn_neurons:     usize,
    #[serde(default = "default_rnn_unit")]
    pub rnn_unit:        String,
    #[serde(default)]
    pub hidden_layers:   usize,
    #[serde(default)]
    pub hidden_neurons:  usize,
    #[serde(default)]
    pub subreddit_input_neurons: usize,
    #[serde(default)]
    pub use_concat_input:        bool,
    #[serde(default)]
    pub pre_train_subreddit:     bool,

    // Regularisation
    #[serde(default)]
    pub use_l2_loss:  bool,
    #[serde(default)]
    pub l2_factor:    f64,
    #[serde(default)]
    pub use_dropout:  bool,
    /// Keep probability used while training (evaluation always keeps 1.0)
    #[serde(default = "default_keep_prob")]
    pub dropout_prob: f64,

    // Validation
    #[serde(default = "default_true")]
    pub use_constant_limit:        bool,
    #[serde(default = "default_limit")]
    pub constant_prediction_limit: f32,

    /// Shuffle seed for the dataset cursor and the train/validation split
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_true() -> bool { true }
fn default_rnn_unit() -> String { "lstm".to_string() }
fn default_keep_prob() -> f64 { 1.0 }
fn default_limit() -> f32 { 0.5 }
fn default_seed() -> u64 { 42 }

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name:                      "default".to_string(),
            vocabulary_size:           20_000,
            user_count:                1_000,
            subreddit_count:           50,
            max_title_length:          30,
            training_data:             "training_data.jsonl".to_string(),
            validation_data:           None,
            embedding_size:            128,
            trainable_matrix:          true,
            use_pretrained:            false,
            pre_trained_matrix:        None,
            learning_rate:             1e-3,
            training_epochs:           10,
            batch_size:                64,
            rnn_neurons:               128,
            rnn_unit:                  default_rnn_unit(),
            hidden_layers:             0,
            hidden_neurons:            0,
            subreddit_input_neurons:   0,
            use_concat_input:          false,
            pre_train_subreddit:       false,
            use_l2_loss:               false,
            l2_factor:                 0.0,
            use_dropout:               false,
            dropout_prob:              1.0,
            use_constant_limit:        true,
            constant_prediction_limit: 0.5,
            seed:                      default_seed(),
        }
    }
}

impl NetworkConfig {
    pub fn rnn_unit(&self) -> RnnUnit {
        RnnUnit::from_config(&self.rnn_unit)
    }

    pub fn threshold_policy(&self) -> ThresholdPolicy {
        if self.use_constant_limit {
            ThresholdPolicy::Constant(self.constant_prediction_limit)
        } else {
            ThresholdPolicy::Adaptive
        }
    }

    /// Width of the auxiliary (subreddit) input vector
    pub fn aux_dim(&self) -> usize {
        self.subreddit_count
    }

    /// Reject configurations no model can be built from.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("vocabulary_size",  self.vocabulary_size),
            ("user_count",       self.user_count),
            ("subreddit_count",  self.subreddit_count),
            ("max_title_length", self.max_title_length),
            ("embedding_size",   self.embedding_size),
            ("batch_size",       self.batch_size),
            ("rnn_neurons",      self.rnn_neurons),
        ];
        for (field, value) in positive {
            if value == 0 {
                bail!("config '{}': {} must be greater than zero", self.name, field);
            }
        }
        if self.hidden_layers > 0 && self.hidden_neurons == 0 {
            bail!("config '{}': hidden_layers > 0 requires hidden_neurons > 0", self.name);
        }
        if self.use_concat_input && self.subreddit_input_neurons == 0 {
            bail!("config '{}': use_concat_input requires subreddit_input_neurons > 0", self.name);
        }
        if self.use_dropout && !(self.dropout_prob > 0.0 && self.dropout_prob <= 1.0) {
            bail!("config '{}': dropout_prob (keep probability) must be in (0, 1]", self.name);
        }
        if self.use_pretrained && self.pre_trained_matrix.is_none() {
            bail!("config '{}': use_pretrained requires pre_trained_matrix", self.name);
        }
        Ok(())
    }
}

// ─── ConfigStore ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSection {
    /// Directory dataset and matrix paths are resolved against
    pub path: PathBuf,
}

/// The whole configuration file, passed explicitly into training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigStore {
    pub data:    DataSection,
    pub network: Vec<NetworkConfig>,
}

impl ConfigStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config store '{}'", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("Invalid config store '{}'", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Look up the config for a run number.
    pub fn get(&self, index: usize) -> Result<&NetworkConfig> {
        self.network.get(index).with_context(|| {
            format!(
                "No network config #{} (store holds {} configs)",
                index,
                self.network.len()
            )
        })
    }

    /// Resolve a dataset or matrix path against the data directory.
    pub fn data_file(&self, relative: &str) -> PathBuf {
        self.data.path.join(relative)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = r#"{
        "data": { "path": "resources/datasets" },
        "network": [
            {
                "name": "small",
                "vocabulary_size": 100,
                "user_count": 10,
                "subreddit_count": 4,
                "max_title_length": 8,
                "training_data": "train.jsonl",
                "embedding_size": 16,
                "learning_rate": 0.01,
                "training_epochs": 2,
                "batch_size": 4,
                "rnn_neurons": 8,
                "rnn_unit": "gru",
                "use_constant_limit": false
            }
        ]
    }"#;

    #[test]
    fn test_store_parses_with_defaults() {
        let store = ConfigStore::from_json(STORE).unwrap();
        let cfg   = store.get(0).unwrap();
        assert_eq!(cfg.rnn_unit(), RnnUnit::Gru);
        assert_eq!(cfg.threshold_policy(), ThresholdPolicy::Adaptive);
        assert!(cfg.trainable_matrix);
        assert_eq!(cfg.hidden_layers, 0);
        assert_eq!(cfg.seed, 42);
        assert!(cfg.validate().is_ok());
        assert_eq!(
            store.data_file(&cfg.training_data),
            PathBuf::from("resources/datasets/train.jsonl")
        );
    }

    #[test]
    fn test_missing_run_number_is_an_error() {
        let store = ConfigStore::from_json(STORE).unwrap();
        assert!(store.get(3).is_err());
    }

    #[test]
    fn test_unknown_rnn_unit_defaults_to_lstm() {
        assert_eq!(RnnUnit::from_config("transformer"), RnnUnit::Lstm);
        assert_eq!(RnnUnit::from_config("GRU"), RnnUnit::Gru);
    }

    #[test]
    fn test_constant_limit_policy() {
        let cfg = NetworkConfig { constant_prediction_limit: 0.3, ..Default::default() };
        assert_eq!(cfg.threshold_policy(), ThresholdPolicy::Constant(0.3));
    }

    #[test]
    fn test_validate_rejects_concat_without_projection_width() {
        let cfg = NetworkConfig { use_concat_input: true, ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
