// ============================================================
// Layer 5 — Graph Builder
// ============================================================
// Assembles an AudienceNetwork one stage at a time. Each stage is
// its own type and consumes the previous one by value, so the
// only orderings that compile are the legal ones:
//
//   GraphBuilder::new(config, device)
//       .add_input_layer()?          → HiddenStage
//       .add_layer(n)?  (× 0..)      → HiddenStage
//       .add_secondary_output()?     → SecondaryStage  (pre-training only)
//       .add_output_layer()          → OutputStage
//       .add_metrics()               → MetricsStage
//       .build(log_dir)?             → ModelState
//
// `add_as_conf` walks the whole chain from the config alone.
//
// Widths:
//   input stage output = rnn_neurons
//                        (+ subreddit_input_neurons with use_concat_input)
//   hidden layer k     = hidden_neurons, reading the previous width
//   heads              = read whatever width the last stage produced

use anyhow::{bail, Context, Result};
use burn::{nn::{Embedding, Linear}, prelude::*};
use std::path::PathBuf;

use crate::application::config::NetworkConfig;
use crate::ml::evaluation::MetricsBook;
use crate::ml::model::{dense, AudienceNetwork, RecurrentEncoder};
use crate::ml::state::{InputShapes, ModelState};

// ─── Entry point ──────────────────────────────────────────────────────────────
pub struct GraphBuilder<B: Backend> {
    config: NetworkConfig,
    device: B::Device,
}

impl<B: Backend> GraphBuilder<B> {
    pub fn new(config: NetworkConfig, device: B::Device) -> Self {
        Self { config, device }
    }

    /// Input stage: shapes, embedding table, recurrent encoder and the
    /// optional auxiliary projection.
    pub fn add_input_layer(self) -> Result<HiddenStage<B>> {
        let Self { config, device } = self;
        config.validate().context("input stage: invalid network config")?;

        let shapes = InputShapes::from_config(&config);

        let mut embedding = AudienceNetwork::embedding_table(
            config.vocabulary_size,
            config.embedding_size,
            &device,
        );
        if !config.trainable_matrix {
            embedding = embedding.no_grad();
        }

        let encoder = RecurrentEncoder::new(
            config.rnn_unit(),
            config.embedding_size,
            config.rnn_neurons,
            &device,
        );

        let mut width = config.rnn_neurons;
        let aux_projection = if config.use_concat_input {
            width += config.subreddit_input_neurons;
            Some(dense(shapes.aux_dim, config.subreddit_input_neurons, &device))
        } else {
            None
        };

        tracing::debug!(
            "Input stage: {}×{} embeddings, {:?} encoder, output width {}",
            config.vocabulary_size,
            config.embedding_size,
            encoder.unit(),
            width
        );

        Ok(HiddenStage {
            trunk: Trunk {
                config,
                device,
                shapes,
                embedding,
                encoder,
                aux_projection,
                hidden: Vec::new(),
                width,
            },
        })
    }

    /// Run every stage as the config describes and finalize under `log_dir`.
    pub fn add_as_conf(self, log_dir: impl Into<PathBuf>) -> Result<ModelState<B>> {
        let layers  = self.config.hidden_layers;
        let neurons = self.config.hidden_neurons;
        let pretrain = self.config.pre_train_subreddit;

        let mut stage = self.add_input_layer()?;
        for _ in 0..layers {
            stage = stage.add_layer(neurons)?;
        }

        let output = if pretrain {
            stage.add_secondary_output()?.add_output_layer()
        } else {
            stage.add_output_layer()
        };

        output.add_metrics().build(log_dir)
    }
}

/// The shared part of the network built so far.
struct Trunk<B: Backend> {
    config:         NetworkConfig,
    device:         B::Device,
    shapes:         InputShapes,
    embedding:      Embedding<B>,
    encoder:        RecurrentEncoder<B>,
    aux_projection: Option<Linear<B>>,
    hidden:         Vec<Linear<B>>,
    width:          usize,
}

impl<B: Backend> Trunk<B> {
    fn finish(self, secondary_head: Option<Linear<B>>) -> OutputStage<B> {
        let primary_head = dense(self.width, self.config.user_count, &self.device);
        let dropout = AudienceNetwork::<B>::dropout_layer(self.config.use_dropout, self.shapes.keep_prob);

        let network = AudienceNetwork {
            embedding:      self.embedding,
            encoder:        self.encoder,
            aux_projection: self.aux_projection,
            hidden:         self.hidden,
            secondary_head,
            primary_head,
            dropout,
        };

        OutputStage {
            config: self.config,
            device: self.device,
            shapes: self.shapes,
            network,
        }
    }
}

// ─── Hidden stage ─────────────────────────────────────────────────────────────
pub struct HiddenStage<B: Backend> {
    trunk: Trunk<B>,
}

impl<B: Backend> HiddenStage<B> {
    /// Width the next layer (or head) reads.
    pub fn width(&self) -> usize {
        self.trunk.width
    }

    /// Dense layers added so far.
    pub fn depth(&self) -> usize {
        self.trunk.hidden.len()
    }

    /// Append a ReLU dense layer of `neurons` outputs.
    pub fn add_layer(mut self, neurons: usize) -> Result<Self> {
        if neurons == 0 {
            bail!("hidden stage: layer {} must have at least one neuron", self.depth() + 1);
        }
        let layer = dense(self.width(), neurons, &self.trunk.device);
        self.trunk.hidden.push(layer);
        self.trunk.width = neurons;
        Ok(self)
    }

    /// Subreddit head for pre-training. Only legal when the config enables it.
    pub fn add_secondary_output(self) -> Result<SecondaryStage<B>> {
        let Some(classes) = self.trunk.shapes.secondary_classes else {
            bail!(
                "output stage: config '{}' has pre_train_subreddit disabled, no secondary output allowed",
                self.trunk.config.name
            );
        };
        let head = dense(self.width(), classes, &self.trunk.device);
        Ok(SecondaryStage { trunk: self.trunk, head })
    }

    pub fn add_output_layer(self) -> OutputStage<B> {
        self.trunk.finish(None)
    }
}

// ─── Secondary stage ──────────────────────────────────────────────────────────
pub struct SecondaryStage<B: Backend> {
    trunk: Trunk<B>,
    head:  Linear<B>,
}

impl<B: Backend> SecondaryStage<B> {
    pub fn add_output_layer(self) -> OutputStage<B> {
        self.trunk.finish(Some(self.head))
    }
}

// ─── Output stage ─────────────────────────────────────────────────────────────
pub struct OutputStage<B: Backend> {
    config:  NetworkConfig,
    device:  B::Device,
    shapes:  InputShapes,
    network: AudienceNetwork<B>,
}

impl<B: Backend> OutputStage<B> {
    pub fn network(&self) -> &AudienceNetwork<B> {
        &self.network
    }

    pub fn add_metrics(self) -> MetricsStage<B> {
        tracing::debug!("'{}' has {} parameters", self.config.name, self.network().num_params());
        let metrics = MetricsBook::new(self.config.threshold_policy());
        MetricsStage { output: self, metrics }
    }
}

// ─── Metrics stage ────────────────────────────────────────────────────────────
pub struct MetricsStage<B: Backend> {
    output:  OutputStage<B>,
    metrics: MetricsBook,
}

impl<B: Backend> MetricsStage<B> {
    /// Create the checkpoint handle under `log_dir` and restore the latest
    /// checkpoint when a complete one exists.
    pub fn build(self, log_dir: impl Into<PathBuf>) -> Result<ModelState<B>> {
        let OutputStage { config, device, shapes, network } = self.output;
        let mut state = ModelState::new(network, config, shapes, self.metrics, device, log_dir.into())?;

        if state.load_checkpoint() {
            tracing::info!("Resuming '{}' at epoch {}", state.config.name, state.epoch);
        } else {
            tracing::info!(
                "Fresh model for '{}', checkpoints go to '{}'",
                state.config.name,
                state.checkpoint_path().display()
            );
        }
        Ok(state)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::ThresholdPolicy;
    use crate::data::batcher::TitleBatch;
    use crate::ml::model::{softmax_cross_entropy, Objective};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn config() -> NetworkConfig {
        NetworkConfig {
            name:                    "builder-test".to_string(),
            vocabulary_size:         10,
            user_count:              6,
            subreddit_count:         4,
            max_title_length:        5,
            embedding_size:          3,
            rnn_neurons:             8,
            subreddit_input_neurons: 2,
            ..NetworkConfig::default()
        }
    }

    fn input(cfg: NetworkConfig) -> HiddenStage<TestBackend> {
        GraphBuilder::<TestBackend>::new(cfg, Default::default())
            .add_input_layer()
            .unwrap()
    }

    #[test]
    fn test_without_hidden_layers_heads_read_the_encoder() {
        let stage = input(config());
        assert_eq!(stage.width(), 8);
        assert_eq!(stage.depth(), 0);

        let output = stage.add_output_layer();
        assert!(output.network().hidden.is_empty());
        assert_eq!(output.network().primary_head.weight.val().dims(), [8, 6]);
    }

    #[test]
    fn test_concatenated_input_widens_the_first_layer() {
        let mut cfg = config();
        cfg.use_concat_input = true;

        let stage = input(cfg);
        assert_eq!(stage.width(), 8 + 2);

        let stage = stage.add_layer(5).unwrap();
        let output = stage.add_output_layer();
        assert_eq!(output.network().hidden[0].weight.val().dims(), [10, 5]);
        assert_eq!(output.network().primary_head.weight.val().dims(), [5, 6]);
    }

    #[test]
    fn test_hidden_layers_chain_their_widths() {
        let stage = input(config()).add_layer(7).unwrap().add_layer(3).unwrap();
        assert_eq!(stage.depth(), 2);
        assert_eq!(stage.width(), 3);

        let output = stage.add_output_layer();
        assert_eq!(output.network().hidden[1].weight.val().dims(), [7, 3]);
    }

    #[test]
    fn test_zero_width_layer_is_a_hidden_stage_error() {
        let err = input(config()).add_layer(0).err().unwrap();
        assert!(err.to_string().starts_with("hidden stage"));
    }

    #[test]
    fn test_secondary_output_requires_pretraining() {
        let err = input(config()).add_secondary_output().err().unwrap();
        assert!(err.to_string().starts_with("output stage"));

        let mut cfg = config();
        cfg.pre_train_subreddit = true;
        let output = input(cfg).add_layer(4).unwrap().add_secondary_output().unwrap().add_output_layer();

        let secondary = output.network().secondary_head.as_ref().unwrap();
        assert_eq!(secondary.weight.val().dims(), [4, 4]);
        assert_eq!(output.network().primary_head.weight.val().dims(), [4, 6]);
    }

    #[test]
    fn test_invalid_config_fails_the_input_stage() {
        let mut cfg = config();
        cfg.rnn_neurons = 0;
        let err = GraphBuilder::<TestBackend>::new(cfg, Default::default())
            .add_input_layer()
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("input stage"));
    }

    #[test]
    fn test_add_as_conf_follows_the_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.hidden_layers       = 2;
        cfg.hidden_neurons      = 9;
        cfg.pre_train_subreddit = true;
        cfg.use_constant_limit  = false;

        let state = GraphBuilder::<TestBackend>::new(cfg, Default::default())
            .add_as_conf(dir.path())
            .unwrap();

        assert_eq!(state.network.hidden.len(), 2);
        assert!(state.network.secondary_head.is_some());
        assert_eq!(state.epoch, 0);
        assert_eq!(state.metrics.policy, ThresholdPolicy::Adaptive);
        assert!(dir.path().join("checkpoints").is_dir());
    }

    #[test]
    fn test_subreddit_loss_ignores_the_auxiliary_input() {
        let mut cfg = config();
        cfg.use_concat_input    = true;
        cfg.pre_train_subreddit = true;
        let network = input(cfg)
            .add_secondary_output()
            .unwrap()
            .add_output_layer()
            .network;

        let device     = Default::default();
        let titles     = Tensor::<TestBackend, 1, Int>::from_ints([1, 2, 3, 4, 5, 0, 0, 6, 7, 8].as_slice(), &device)
            .reshape([2, 5]);
        let subreddits = Tensor::<TestBackend, 1>::from_floats([0.0f32, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0].as_slice(), &device)
            .reshape([2, 4]);
        let batch = TitleBatch {
            titles:     titles.clone(),
            subreddits: subreddits.clone(),
            users:      Tensor::zeros([2, 6], &device),
        };

        let loss: f32 = network.loss(&batch, Objective::Secondary, None).unwrap().into_scalar().elem();
        let blind      = network.forward_secondary(titles, Tensor::zeros([2, 4], &device)).unwrap();
        let expected: f32 = softmax_cross_entropy(blind, subreddits).into_scalar().elem();
        assert!((loss - expected).abs() < 1e-6, "{loss} vs {expected}");
    }

    #[test]
    fn test_forward_produces_one_probability_per_user() {
        let mut cfg = config();
        cfg.rnn_unit = "gru".to_string();
        cfg.use_concat_input = true;
        let network = input(cfg).add_layer(4).unwrap().add_output_layer().network;

        let device = Default::default();
        let titles = Tensor::<TestBackend, 2, Int>::zeros([3, 5], &device);
        let aux    = Tensor::<TestBackend, 2>::zeros([3, 4], &device);
        let out    = network.forward(titles, aux);

        assert_eq!(out.probabilities.dims(), [3, 6]);
        let probs: Vec<f32> = out.probabilities.into_data().to_vec().unwrap();
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}
