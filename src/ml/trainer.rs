// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Two phases over one ModelState:
//
//   Pretrain → secondary (subreddit) objective for training_epochs
//              epochs. No epoch counter, no full validation, one
//              checkpoint at the end.
//   Main     → primary (audience) objective until the epoch counter
//              reaches training_epochs:
//
//     baseline validate()          (fresh models only)
//     loop:
//       train batch  → Adam step
//       train batch  → loss with the updated parameters
//       valid batch  → loss, no update
//       every tenth of an epoch → progress line
//       epoch done   → epoch += 1, checkpoint, validate()
//     final checkpoint
//
// Backends:
//   - Steps run on the autodiff backend B
//   - Every loss report and full-set evaluation runs on
//     B::InnerBackend via network.valid(), where dropout is off

use anyhow::{bail, Result};
use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::{TitleBatch, TitleBatcher};
use crate::domain::post::TitleSample;
use crate::domain::traits::DatasetCursor;
use crate::infra::embeddings::EmbeddingMatrix;
use crate::infra::metrics::{EpochMetrics, MetricStreams};
use crate::ml::evaluation::{evaluate, MetricTag, Stream, StreamMetrics};
use crate::ml::model::{AudienceNetwork, Objective};
use crate::ml::state::ModelState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    Pretrain,
    Main,
}

// ─── Single step ──────────────────────────────────────────────────────────────
pub struct StepOutput<B: AutodiffBackend> {
    pub network: AudienceNetwork<B>,
    /// Loss before the update
    pub loss:    f64,
}

/// One optimiser step on `batch`. The network moves in and comes back
/// updated.
pub fn train_step<B, O>(
    network:       AudienceNetwork<B>,
    optim:         &mut O,
    batch:         &TitleBatch<B>,
    objective:     Objective,
    learning_rate: f64,
    l2_factor:     Option<f64>,
) -> Result<StepOutput<B>>
where
    B: AutodiffBackend,
    O: Optimizer<AudienceNetwork<B>, B>,
{
    let loss     = network.loss(batch, objective, l2_factor)?;
    let loss_val = loss.clone().into_scalar().elem::<f64>();

    let grads   = loss.backward();
    let grads   = GradientsParams::from_grads(grads, &network);
    let network = optim.step(learning_rate, network, grads);

    Ok(StepOutput { network, loss: loss_val })
}

// ─── Report ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub phase:            TrainingPhase,
    pub epochs_completed: usize,
    pub steps:            usize,
    pub checkpoint_saves: usize,
    /// Full validation passes, the baseline included
    pub validations:      usize,
    pub last_train_loss:  Option<f64>,
    pub last_valid_loss:  Option<f64>,
}

impl TrainingReport {
    fn new(phase: TrainingPhase) -> Self {
        Self {
            phase,
            epochs_completed: 0,
            steps:            0,
            checkpoint_saves: 0,
            validations:      0,
            last_train_loss:  None,
            last_valid_loss:  None,
        }
    }
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
pub struct Trainer<B, C, O>
where
    B: AutodiffBackend,
    C: DatasetCursor,
    O: Optimizer<AudienceNetwork<B>, B>,
{
    state:           ModelState<B>,
    cursor:          C,
    primary_optim:   O,
    secondary_optim: O,
    pretrained:      Option<EmbeddingMatrix>,
    train_batcher:   TitleBatcher<B>,
    eval_batcher:    TitleBatcher<B::InnerBackend>,
    streams:         Option<MetricStreams>,
}

impl<B, C, O> Trainer<B, C, O>
where
    B: AutodiffBackend,
    C: DatasetCursor,
    O: Optimizer<AudienceNetwork<B>, B>,
{
    /// `secondary_optim` is only stepped while pre-training.
    /// `pretrained` seeds the embedding table before the first step of a
    /// fresh model.
    pub fn new(
        state:           ModelState<B>,
        cursor:          C,
        primary_optim:   O,
        secondary_optim: O,
        pretrained:      Option<EmbeddingMatrix>,
    ) -> Self {
        let train_batcher = state.batcher();
        let eval_batcher  = state.shapes.batcher::<B::InnerBackend>(&state.device);
        Self {
            state,
            cursor,
            primary_optim,
            secondary_optim,
            pretrained,
            train_batcher,
            eval_batcher,
            streams: None,
        }
    }

    pub fn state(&self) -> &ModelState<B> {
        &self.state
    }

    pub fn cursor(&self) -> &C {
        &self.cursor
    }

    pub fn train(&mut self, phase: TrainingPhase) -> Result<TrainingReport> {
        match phase {
            TrainingPhase::Pretrain => self.pretrain(),
            TrainingPhase::Main     => self.train_main(),
        }
    }

    // ── Phases ────────────────────────────────────────────────────────────────

    fn pretrain(&mut self) -> Result<TrainingReport> {
        let mut report = TrainingReport::new(TrainingPhase::Pretrain);

        if self.state.network.secondary_head.is_none() {
            bail!("output stage: pre-training needs a model built with a secondary output");
        }
        if self.state.epoch > 0 {
            tracing::info!("Skipping pre-training, model resumed at epoch {}", self.state.epoch);
            return Ok(report);
        }
        self.seed_pretrained()?;

        let epochs = self.state.config.training_epochs;
        let lr     = self.state.config.learning_rate;
        let every  = self.progress_interval();
        tracing::info!("Pre-training subreddit head for {} epochs", epochs);

        self.cursor.restart();
        while self.cursor.completed_training_epochs() < epochs {
            let before  = self.cursor.completed_training_epochs();
            let samples = self.next_train_samples()?;
            let batch   = self.train_batcher.batch(&samples)?;

            let step = train_step(
                self.state.network.clone(),
                &mut self.secondary_optim,
                &batch,
                Objective::Secondary,
                lr,
                None,
            )?;
            self.state.network = step.network;
            report.steps += 1;
            report.last_train_loss = Some(step.loss);

            if report.steps % every == 0 {
                println!(
                    "Pretrain {:>6.2} | step {:>6} | subreddit_loss={:.4}",
                    before as f64 + self.cursor.percent_of_epoch(),
                    report.steps,
                    step.loss,
                );
            }
            if self.cursor.completed_training_epochs() > before {
                report.epochs_completed += 1;
            }
        }

        self.state.save_checkpoint(None)?;
        report.checkpoint_saves += 1;
        self.cursor.restart();

        tracing::info!("Pre-training complete after {} steps", report.steps);
        Ok(report)
    }

    fn train_main(&mut self) -> Result<TrainingReport> {
        let mut report = TrainingReport::new(TrainingPhase::Main);

        self.seed_pretrained()?;
        self.streams = Some(MetricStreams::open(self.state.log_dir())?);

        if self.state.epoch == 0 {
            self.validate()?;
            report.validations += 1;
        }

        let target    = self.state.config.training_epochs;
        let remaining = target.saturating_sub(self.state.epoch);
        let lr        = self.state.config.learning_rate;
        let l2        = self.state.l2_factor();
        let every     = self.progress_interval();
        tracing::info!(
            "Training '{}' from epoch {} to {}",
            self.state.config.name,
            self.state.epoch,
            target
        );

        self.cursor.restart();
        while self.cursor.completed_training_epochs() < remaining {
            let before  = self.cursor.completed_training_epochs();
            let samples = self.next_train_samples()?;
            let batch   = self.train_batcher.batch(&samples)?;
            self.state.shapes.check(&batch)?;

            let step = train_step(
                self.state.network.clone(),
                &mut self.primary_optim,
                &batch,
                Objective::Primary,
                lr,
                l2,
            )?;
            self.state.network = step.network;
            report.steps += 1;

            let train_loss = self.batch_loss(&samples)?;
            let valid_loss = self.validate_batch()?;
            report.last_train_loss = Some(train_loss);
            report.last_valid_loss = valid_loss.or(report.last_valid_loss);

            if report.steps % every == 0 {
                println!(
                    "Epoch {:>6.2} | step {:>6} | train_loss={:.4} | valid_loss={:.4}",
                    self.state.epoch as f64 + self.cursor.percent_of_epoch(),
                    report.steps,
                    train_loss,
                    valid_loss.unwrap_or(f64::NAN),
                );
            }

            if self.cursor.completed_training_epochs() > before {
                self.state.epoch += 1;
                report.epochs_completed += 1;

                self.state.save_checkpoint(None)?;
                report.checkpoint_saves += 1;
                tracing::info!("Checkpoint saved for epoch {}", self.state.epoch);

                self.validate()?;
                report.validations += 1;
            }
        }

        self.state.save_checkpoint(None)?;
        report.checkpoint_saves += 1;

        tracing::info!("Training complete at epoch {}", self.state.epoch);
        Ok(report)
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// Full pass over the training and validation sets. Both streams'
    /// metrics are recorded and, once the main phase has opened them,
    /// logged under the current epoch.
    pub fn validate(&mut self) -> Result<(StreamMetrics, StreamMetrics)> {
        let network = self.state.network.valid();
        let chunk   = self.state.config.batch_size;
        let l2      = self.state.l2_factor();

        let train = evaluate(&network, &self.eval_batcher, self.cursor.get_training(), chunk, l2)?;
        let valid = evaluate(&network, &self.eval_batcher, self.cursor.get_validation(), chunk, l2)?;

        let metrics   = &mut self.state.metrics;
        let train_row = metrics.record(Stream::Train, train.loss, &train.outputs, &train.targets);
        let valid_row = metrics.record(Stream::Valid, valid.loss, &valid.outputs, &valid.targets);

        let epoch = self.state.epoch;
        if let Some(streams) = &self.streams {
            streams.log(Stream::Train, &EpochMetrics::new(epoch, train_row))?;
            streams.log(Stream::Valid, &EpochMetrics::new(epoch, valid_row))?;
        }

        println!(
            "Epoch {:>3}/{} | train: loss={:.4} P={:.3} R={:.3} F1={:.3} | valid: loss={:.4} P={:.3} R={:.3} F1={:.3}",
            epoch,
            self.state.config.training_epochs,
            train_row.loss, train_row.precision, train_row.recall, train_row.f1,
            valid_row.loss, valid_row.precision, valid_row.recall, valid_row.f1,
        );
        self.trace_scalars();

        Ok((train_row, valid_row))
    }

    /// Primary loss on the next validation batch, without an update.
    /// `None` when there is no validation data.
    pub fn validate_batch(&mut self) -> Result<Option<f64>> {
        let samples = self.cursor.next_valid_batch();
        if samples.is_empty() {
            return Ok(None);
        }
        self.batch_loss(&samples).map(Some)
    }

    fn batch_loss(&self, samples: &[TitleSample]) -> Result<f64> {
        let network = self.state.network.valid();
        let batch   = self.eval_batcher.batch(samples)?;
        let loss    = network.loss(&batch, Objective::Primary, self.state.l2_factor())?;
        Ok(loss.into_scalar().elem::<f64>())
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn trace_scalars(&self) {
        let metrics = &self.state.metrics;
        for stream in [Stream::Train, Stream::Valid] {
            for tag in MetricTag::ALL {
                if let Some(value) = metrics.scalar(stream, tag) {
                    tracing::debug!("{}/{} = {:.4}", stream, tag.name(), value);
                }
            }
            tracing::debug!("{} counts: {:?}", stream, metrics.accumulator(stream));
        }
    }

    fn next_train_samples(&mut self) -> Result<Vec<TitleSample>> {
        let samples = self.cursor.next_train_batch();
        if samples.is_empty() {
            bail!("input stage: the training set is empty");
        }
        Ok(samples)
    }

    /// Steps between progress lines: a tenth of an epoch, at least one.
    fn progress_interval(&self) -> usize {
        (self.cursor.train_size() / self.cursor.batch_size().max(1) / 10).max(1)
    }

    /// Seed the embedding table once, and only for a fresh model.
    fn seed_pretrained(&mut self) -> Result<()> {
        if let Some(matrix) = self.pretrained.take() {
            if self.state.epoch == 0 {
                self.state.seed_embeddings(&matrix)?;
            }
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::NetworkConfig;
    use crate::data::dataset::TitleCursor;
    use crate::ml::builder::GraphBuilder;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamConfig;
    use std::path::Path;

    type TestBackend = Autodiff<NdArray>;

    fn adam() -> impl Optimizer<AudienceNetwork<TestBackend>, TestBackend> {
        AdamConfig::new().init::<TestBackend, AudienceNetwork<TestBackend>>()
    }

    fn config(epochs: usize) -> NetworkConfig {
        NetworkConfig {
            name:             "trainer-test".to_string(),
            vocabulary_size:  10,
            user_count:       4,
            subreddit_count:  3,
            max_title_length: 3,
            embedding_size:   4,
            rnn_neurons:      5,
            hidden_layers:    1,
            hidden_neurons:   6,
            batch_size:       2,
            training_epochs:  epochs,
            learning_rate:    1e-2,
            ..NetworkConfig::default()
        }
    }

    fn sample(i: usize) -> TitleSample {
        TitleSample {
            title_ids: vec![0, (i % 9 + 1) as u32, ((i + 3) % 9 + 1) as u32],
            subreddit: i % 3,
            users:     vec![i % 4],
        }
    }

    fn trainer(
        cfg: NetworkConfig,
        dir: &Path,
    ) -> Trainer<TestBackend, TitleCursor, impl Optimizer<AudienceNetwork<TestBackend>, TestBackend>> {
        let state  = GraphBuilder::<TestBackend>::new(cfg, Default::default())
            .add_as_conf(dir)
            .unwrap();
        let cursor = TitleCursor::new((0..5).map(sample).collect(), (5..8).map(sample).collect(), 2, 7);
        Trainer::new(state, cursor, adam(), adam(), None)
    }

    #[test]
    fn test_one_epoch_with_a_short_final_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer(config(1), dir.path());

        let report = t.train(TrainingPhase::Main).unwrap();

        assert_eq!(t.state().epoch, 1);
        assert_eq!(report.epochs_completed, 1);
        assert_eq!(report.steps, 3);
        // baseline + end of epoch 1
        assert_eq!(report.validations, 2);
        // end of epoch 1 + final
        assert_eq!(report.checkpoint_saves, 2);
        assert!(report.last_train_loss.unwrap().is_finite());

        let rows = std::fs::read_to_string(dir.path().join("valid/metrics.csv")).unwrap();
        assert_eq!(rows.lines().count(), 3);
        assert!(rows.lines().nth(2).unwrap().starts_with("1,"));
    }

    #[test]
    fn test_resumed_run_skips_the_baseline() {
        let dir = tempfile::tempdir().unwrap();
        trainer(config(1), dir.path()).train(TrainingPhase::Main).unwrap();

        let mut resumed = trainer(config(2), dir.path());
        assert_eq!(resumed.state().epoch, 1);

        let report = resumed.train(TrainingPhase::Main).unwrap();
        assert_eq!(resumed.state().epoch, 2);
        assert_eq!(report.validations, 1);
        assert_eq!(report.checkpoint_saves, 2);
    }

    #[test]
    fn test_pretraining_leaves_the_epoch_counter_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(1);
        cfg.pre_train_subreddit = true;
        let mut t = trainer(cfg, dir.path());

        let report = t.train(TrainingPhase::Pretrain).unwrap();
        assert_eq!(t.state().epoch, 0);
        assert_eq!(report.steps, 3);
        assert_eq!(report.epochs_completed, 1);
        assert_eq!(report.validations, 0);
        assert_eq!(report.checkpoint_saves, 1);
        assert_eq!(t.cursor().completed_training_epochs(), 0);
        assert!(!dir.path().join("valid/metrics.csv").exists());

        let main = t.train(TrainingPhase::Main).unwrap();
        assert_eq!(main.validations, 2);
        assert_eq!(t.state().epoch, 1);
    }

    #[test]
    fn test_pretraining_needs_a_secondary_head() {
        let dir = tempfile::tempdir().unwrap();
        let err = trainer(config(1), dir.path()).train(TrainingPhase::Pretrain).unwrap_err();
        assert!(err.to_string().starts_with("output stage"));
    }

    #[test]
    fn test_train_step_updates_the_parameters() {
        let dir   = tempfile::tempdir().unwrap();
        let state = GraphBuilder::<TestBackend>::new(config(1), Default::default())
            .add_as_conf(dir.path())
            .unwrap();
        let batch = state.batcher().batch(&[sample(0), sample(1)]).unwrap();
        let before: Vec<f32> = state.network.primary_head.weight.val().into_data().to_vec().unwrap();

        let mut optim = adam();
        let out = train_step(state.network.clone(), &mut optim, &batch, Objective::Primary, 1e-2, None).unwrap();

        let after: Vec<f32> = out.network.primary_head.weight.val().into_data().to_vec().unwrap();
        assert!(out.loss.is_finite());
        assert_ne!(before, after);
    }

    fn embedding_weights(t: &Trainer<TestBackend, TitleCursor, impl Optimizer<AudienceNetwork<TestBackend>, TestBackend>>) -> Vec<f32> {
        t.state().network.embedding.weight.val().into_data().to_vec().unwrap()
    }

    #[test]
    fn test_evaluation_runs_without_dropout() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(1);
        cfg.use_dropout  = true;
        cfg.dropout_prob = 0.5;
        let mut t = trainer(cfg, dir.path());

        let (train_a, valid_a) = t.validate().unwrap();
        let (train_b, valid_b) = t.validate().unwrap();
        assert_eq!(train_a.loss, train_b.loss);
        assert_eq!(valid_a.loss, valid_b.loss);

        let first  = t.validate_batch().unwrap().unwrap();
        t.cursor.restart();
        let second = t.validate_batch().unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_frozen_embedding_keeps_pretrained_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(1);
        cfg.trainable_matrix = false;

        let words: Vec<String> = (0..10)
            .map(|i| if i == 0 { "UNK".to_string() } else { format!("w{i}") })
            .collect();
        let vectors: Vec<Vec<f32>> = (0..10)
            .map(|r| (0..4).map(|c| (r * 4 + c) as f32 / 40.0).collect())
            .collect();
        let matrix   = EmbeddingMatrix::from_rows(words, vectors).unwrap();
        let expected = matrix.values().to_vec();

        let state  = GraphBuilder::<TestBackend>::new(cfg.clone(), Default::default())
            .add_as_conf(dir.path())
            .unwrap();
        let cursor = TitleCursor::new((0..5).map(sample).collect(), (5..8).map(sample).collect(), 2, 7);
        let mut t  = Trainer::new(state, cursor, adam(), adam(), Some(matrix));
        t.train(TrainingPhase::Main).unwrap();
        assert_eq!(embedding_weights(&t), expected);

        // restored from the checkpoint, still frozen
        cfg.training_epochs = 2;
        let mut resumed = trainer(cfg, dir.path());
        assert_eq!(resumed.state().epoch, 1);
        assert_eq!(embedding_weights(&resumed), expected);
        resumed.train(TrainingPhase::Main).unwrap();
        assert_eq!(embedding_weights(&resumed), expected);
    }

    #[test]
    fn test_validate_records_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer(config(1), dir.path());

        let (train, valid) = t.validate().unwrap();
        assert!(train.loss.is_finite() && valid.loss.is_finite());
        assert!((0.0..=1.0).contains(&valid.f1));
        assert!(t.state().metrics.scalar(Stream::Train, crate::ml::evaluation::MetricTag::Loss).is_some());
    }
}
