// ============================================================
// Layer 5 — Model State
// ============================================================
// Everything one training run owns besides the data:
//
//   network     → every trainable parameter (burn Module)
//   config      → the NetworkConfig it was built from, never
//                 mutated afterwards
//   shapes      → the batch shapes the input stage declared
//   epoch       → completed main-phase epochs, restored from
//                 the checkpoint
//   metrics     → threshold policy + train/valid accumulators
//   checkpoints → the run's single overwrite-only checkpoint
//
// A ModelState is produced by the graph builder and owned by
// exactly one Trainer.

use anyhow::{bail, Result};
use burn::{module::Param, prelude::*};
use std::path::{Path, PathBuf};

use crate::application::config::NetworkConfig;
use crate::data::batcher::{TitleBatch, TitleBatcher};
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::embeddings::EmbeddingMatrix;
use crate::ml::evaluation::MetricsBook;
use crate::ml::model::AudienceNetwork;

// ─── InputShapes ──────────────────────────────────────────────────────────────
/// Batch shapes declared by the input stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputShapes {
    /// Token ids: `[batch, max_title_length]`
    pub max_title_length:  usize,
    /// Auxiliary input: `[batch, aux_dim]`
    pub aux_dim:           usize,
    /// Primary target: `[batch, user_count]`
    pub user_count:        usize,
    /// Secondary target `[batch, subreddit_count]`, only when pre-training
    pub secondary_classes: Option<usize>,
    /// Dropout keep probability during training; evaluation always uses 1.0
    pub keep_prob:         f64,
}

impl InputShapes {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            max_title_length:  config.max_title_length,
            aux_dim:           config.aux_dim(),
            user_count:        config.user_count,
            secondary_classes: config.pre_train_subreddit.then_some(config.subreddit_count),
            keep_prob:         if config.use_dropout { config.dropout_prob } else { 1.0 },
        }
    }

    /// A batcher that produces batches of exactly these shapes.
    pub fn batcher<B: Backend>(&self, device: &B::Device) -> TitleBatcher<B> {
        TitleBatcher::new(device.clone(), self.max_title_length, self.user_count, self.aux_dim)
    }

    /// Reject a batch that does not match the declared shapes.
    pub fn check<B: Backend>(&self, batch: &TitleBatch<B>) -> Result<()> {
        if batch.is_empty() {
            bail!("input stage: empty batch");
        }
        let n = batch.len();
        let [_, title_len] = batch.titles.dims();
        let [aux_rows, aux]  = batch.subreddits.dims();
        let [user_rows, users] = batch.users.dims();

        if title_len != self.max_title_length {
            bail!("input stage: titles are {} wide, expected {}", title_len, self.max_title_length);
        }
        if aux_rows != n || aux != self.aux_dim {
            bail!("input stage: auxiliary input is [{}, {}], expected [{}, {}]", aux_rows, aux, n, self.aux_dim);
        }
        if user_rows != n || users != self.user_count {
            bail!("input stage: targets are [{}, {}], expected [{}, {}]", user_rows, users, n, self.user_count);
        }
        Ok(())
    }
}

// ─── ModelState ───────────────────────────────────────────────────────────────
pub struct ModelState<B: Backend> {
    pub network: AudienceNetwork<B>,
    pub config:  NetworkConfig,
    pub shapes:  InputShapes,
    pub epoch:   usize,
    pub metrics: MetricsBook,
    pub device:  B::Device,
    log_dir:     PathBuf,
    checkpoints: CheckpointManager,
}

impl<B: Backend> ModelState<B> {
    pub(crate) fn new(
        network: AudienceNetwork<B>,
        config:  NetworkConfig,
        shapes:  InputShapes,
        metrics: MetricsBook,
        device:  B::Device,
        log_dir: PathBuf,
    ) -> Result<Self> {
        let checkpoints = CheckpointManager::new(log_dir.join("checkpoints"))?;
        Ok(Self { network, config, shapes, epoch: 0, metrics, device, log_dir, checkpoints })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn checkpoint_path(&self) -> &Path {
        self.checkpoints.path()
    }

    pub fn batcher(&self) -> TitleBatcher<B> {
        self.shapes.batcher(&self.device)
    }

    /// `Some(l2_factor)` when the L2 penalty is part of the primary loss.
    pub fn l2_factor(&self) -> Option<f64> {
        self.config.use_l2_loss.then_some(self.config.l2_factor)
    }

    /// Overwrite the checkpoint (or write one at `path`) with the
    /// current parameters and epoch.
    pub fn save_checkpoint(&self, path: Option<&Path>) -> Result<()> {
        self.checkpoints.save(&self.network, self.epoch, path)
    }

    /// Restore parameters and epoch from the run's checkpoint.
    ///
    /// Returns false, leaving the fresh initialisation in place, when
    /// the checkpoint is missing, incomplete or cannot be decoded.
    /// A successful restore clears both metric streams.
    pub fn load_checkpoint(&mut self) -> bool {
        match self.checkpoints.load(self.network.clone(), &self.device) {
            Ok(Some((network, epoch))) => {
                self.network = network;
                self.epoch   = epoch;
                self.metrics.reset();
                self.freeze_embedding();
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Ignoring unreadable checkpoint, starting fresh: {e:#}");
                false
            }
        }
    }

    /// Replace the embedding table with pretrained vectors.
    pub fn seed_embeddings(&mut self, matrix: &EmbeddingMatrix) -> Result<()> {
        let expected = [self.config.vocabulary_size, self.config.embedding_size];
        if [matrix.rows(), matrix.cols()] != expected {
            bail!(
                "input stage: pretrained matrix is [{}, {}], embedding table is [{}, {}]",
                matrix.rows(),
                matrix.cols(),
                expected[0],
                expected[1]
            );
        }

        let weights = Tensor::<B, 1>::from_floats(matrix.values(), &self.device)
            .reshape([matrix.rows(), matrix.cols()]);
        self.network.embedding.weight = Param::from_tensor(weights);
        self.freeze_embedding();

        tracing::info!("Seeded embedding table from pretrained matrix");
        Ok(())
    }

    fn freeze_embedding(&mut self) {
        if !self.config.trainable_matrix {
            self.network.embedding = self.network.embedding.clone().no_grad();
        }
    }
}
