// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// clap and hands everything else to Layer 2 (application).
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "audience-rnn",
    version = "0.1.0",
    about = "Train recurrent audience predictors for post titles."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the use case. The CLI layer only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => Self::run_train(args),
        }
    }

    fn run_train(args: TrainArgs) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        tracing::info!("Loading configs from '{}'", args.config_file.display());

        let summaries = TrainUseCase::new(args.into()).execute()?;

        for run in &summaries {
            if let Some(pre) = &run.pretrain {
                println!(
                    "{}: {:?} {} steps, final loss {:.4}",
                    run.name,
                    pre.phase,
                    pre.steps,
                    pre.last_train_loss.unwrap_or(f64::NAN),
                );
            }
            println!(
                "{}: {} epochs, {} steps, {} validations, {} saves, final train/valid loss {:.4}/{:.4} → '{}'",
                run.name,
                run.main.epochs_completed,
                run.main.steps,
                run.main.validations,
                run.main.checkpoint_saves,
                run.main.last_train_loss.unwrap_or(f64::NAN),
                run.main.last_valid_loss.unwrap_or(f64::NAN),
                run.log_dir.display(),
            );
        }
        Ok(())
    }
}
