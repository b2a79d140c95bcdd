// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// One subcommand:
//
//   train [RUN]... --config-file config.json --log-root logs
//
// Every RUN is an index into the config store's "network" list.
// Without any, every config in the store is trained in order.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainRequest;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train one or more network configurations
    Train(TrainArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Config numbers to train, in order (default: all)
    pub runs: Vec<usize>,

    /// JSON config store holding the data path and network configs
    #[arg(long, default_value = "config.json")]
    pub config_file: PathBuf,

    /// Directory every run's log directory is created under
    #[arg(long, default_value = "logs")]
    pub log_root: PathBuf,
}

/// Convert CLI TrainArgs into the application-layer TrainRequest.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainRequest {
    fn from(a: TrainArgs) -> Self {
        TrainRequest {
            config_file: a.config_file,
            runs:        a.runs,
            log_root:    a.log_root,
        }
    }
}
