use anyhow::{bail, Result};
use burn::{
    nn::{
        gru::{Gru, GruConfig},
        lstm::{Lstm, LstmConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Initializer,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{log_softmax, relu, sigmoid},
};

use crate::application::config::RnnUnit;
use crate::data::batcher::TitleBatch;

/// Standard deviation of the normal draw for dense weights and biases.
pub const DENSE_INIT_STD: f64 = 0.35;

/// Fully connected layer with weights and biases drawn from N(0, 0.35²).
pub fn dense<B: Backend>(d_input: usize, d_output: usize, device: &B::Device) -> Linear<B> {
    LinearConfig::new(d_input, d_output)
        .with_initializer(Initializer::Normal { mean: 0.0, std: DENSE_INIT_STD })
        .init(device)
}

/// `Σx² / 2` over every weight and bias of a dense layer.
pub fn l2_loss<B: Backend>(layer: &Linear<B>) -> Tensor<B, 1> {
    let weights = layer.weight.val().powf_scalar(2.0).sum();
    match &layer.bias {
        Some(bias) => (weights + bias.val().powf_scalar(2.0).sum()) / 2.0,
        None       => weights / 2.0,
    }
}

/// Elementwise `max(x, 0) - x·z + ln(1 + e^-|x|)`, stable for large logits.
pub fn sigmoid_cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 2> {
    logits.clone().clamp_min(0.0)
        - logits.clone() * targets
        + logits.abs().neg().exp().log1p()
}

/// Mean over the batch of `-Σ z·log_softmax(x)`.
pub fn softmax_cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    (targets * log_softmax(logits, 1)).sum_dim(1).neg().mean()
}

// ─── Recurrent Encoder ────────────────────────────────────────────────────────
/// Exactly one of the two cells is present.
#[derive(Module, Debug)]
pub struct RecurrentEncoder<B: Backend> {
    lstm: Option<Lstm<B>>,
    gru:  Option<Gru<B>>,
}

impl<B: Backend> RecurrentEncoder<B> {
    pub fn new(unit: RnnUnit, d_input: usize, d_hidden: usize, device: &B::Device) -> Self {
        match unit {
            RnnUnit::Lstm => Self {
                lstm: Some(LstmConfig::new(d_input, d_hidden, true).init(device)),
                gru:  None,
            },
            RnnUnit::Gru => Self {
                lstm: None,
                gru:  Some(GruConfig::new(d_input, d_hidden, true).init(device)),
            },
        }
    }

    pub fn unit(&self) -> RnnUnit {
        if self.gru.is_some() { RnnUnit::Gru } else { RnnUnit::Lstm }
    }

    /// [batch, seq_len, d_input] → hidden output of the last time step [batch, d_hidden]
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, seq_len, _] = input.dims();

        let outputs = if let Some(gru) = &self.gru {
            gru.forward(input, None)
        } else if let Some(lstm) = &self.lstm {
            let (outputs, _state) = lstm.forward(input, None);
            outputs
        } else {
            // Not produced by `new`; treat the embeddings as the outputs.
            input
        };

        let width = outputs.dims()[2];
        outputs
            .slice([0..batch_size, seq_len - 1..seq_len, 0..width])
            .reshape([batch_size, width])
    }
}

// ─── Objective ────────────────────────────────────────────────────────────────
/// Which output head a loss or optimiser step targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Sigmoid audience head, trained in the main phase
    Primary,
    /// Softmax subreddit head, trained only while pre-training
    Secondary,
}

// ─── AudienceNetwork ──────────────────────────────────────────────────────────
/// All trainable parameters of one model. Assembled by the graph builder.
#[derive(Module, Debug)]
pub struct AudienceNetwork<B: Backend> {
    pub embedding:      Embedding<B>,
    pub encoder:        RecurrentEncoder<B>,
    pub aux_projection: Option<Linear<B>>,
    pub hidden:         Vec<Linear<B>>,
    pub secondary_head: Option<Linear<B>>,
    pub primary_head:   Linear<B>,
    pub dropout:        Dropout,
}

pub struct AudienceOutput<B: Backend> {
    /// Pre-activation audience scores [batch, user_count]
    pub logits:        Tensor<B, 2>,
    /// Sigmoid of the logits, in [0, 1]
    pub probabilities: Tensor<B, 2>,
}

impl<B: Backend> AudienceNetwork<B> {
    /// Embedding table initialised uniformly in [-1, 1].
    pub fn embedding_table(vocabulary_size: usize, embedding_size: usize, device: &B::Device) -> Embedding<B> {
        EmbeddingConfig::new(vocabulary_size, embedding_size)
            .with_initializer(Initializer::Uniform { min: -1.0, max: 1.0 })
            .init(device)
    }

    /// Dropout that zeroes with probability `1 - keep_prob`; identity when disabled.
    pub fn dropout_layer(use_dropout: bool, keep_prob: f64) -> Dropout {
        let prob = if use_dropout { (1.0 - keep_prob).clamp(0.0, 1.0) } else { 0.0 };
        DropoutConfig::new(prob).init()
    }

    /// Shared representation fed to both heads: embedding → recurrent
    /// encoder → optional auxiliary fusion → dense stack.
    pub fn represent(&self, titles: Tensor<B, 2, Int>, aux: Tensor<B, 2>) -> Tensor<B, 2> {
        let embedded = self.embedding.forward(titles);
        let mut x    = self.encoder.forward(embedded);

        if let Some(projection) = &self.aux_projection {
            let aux = relu(projection.forward(aux));
            x = Tensor::cat(vec![x, aux], 1);
        }

        for layer in &self.hidden {
            x = self.dropout.forward(relu(layer.forward(x)));
        }
        x
    }

    pub fn forward(&self, titles: Tensor<B, 2, Int>, aux: Tensor<B, 2>) -> AudienceOutput<B> {
        let logits = self.primary_head.forward(self.represent(titles, aux));
        AudienceOutput { probabilities: sigmoid(logits.clone()), logits }
    }

    /// Subreddit logits, when the model was built with a secondary head.
    pub fn forward_secondary(&self, titles: Tensor<B, 2, Int>, aux: Tensor<B, 2>) -> Option<Tensor<B, 2>> {
        self.secondary_head
            .as_ref()
            .map(|head| head.forward(self.represent(titles, aux)))
    }

    /// Summed `l2_loss` of every hidden layer and the primary head.
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        self.hidden
            .iter()
            .fold(l2_loss(&self.primary_head), |acc, layer| acc + l2_loss(layer))
    }

    /// Mean loss of one batch for the given objective.
    ///
    /// Primary: mean sigmoid cross-entropy, plus `l2_factor` times the
    /// L2 penalty when a factor is given. Secondary: softmax
    /// cross-entropy against the subreddit one-hot rows. The subreddit
    /// is the target there, so the auxiliary input is zeroed.
    pub fn loss(
        &self,
        batch:     &TitleBatch<B>,
        objective: Objective,
        l2_factor: Option<f64>,
    ) -> Result<Tensor<B, 1>> {
        match objective {
            Objective::Primary => {
                let output = self.forward(batch.titles.clone(), batch.subreddits.clone());
                let loss   = sigmoid_cross_entropy(output.logits, batch.users.clone()).mean();
                Ok(match l2_factor {
                    Some(factor) => loss + self.l2_penalty() * factor,
                    None         => loss,
                })
            }
            Objective::Secondary => {
                let aux = batch.subreddits.zeros_like();
                let Some(logits) = self.forward_secondary(batch.titles.clone(), aux) else {
                    bail!("output stage: the model has no secondary head to compute a loss for");
                };
                Ok(softmax_cross_entropy(logits, batch.subreddits.clone()))
            }
        }
    }
}
