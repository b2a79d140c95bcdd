// ============================================================
// Layer 5 — Evaluation Metrics
// ============================================================
// Turning sigmoid outputs into audience predictions and scoring
// them against the targets.
//
//   predict          → 0/1 per output under a ThresholdPolicy
//   PrecisionRecall  → running TP / FP / FN counts; values are
//                      cumulative across every update since the
//                      last reset
//   f1_score         → 2PR / (P + R), 0 when P + R = 0
//   evaluate         → loss + raw outputs over a whole sample set,
//                      on the non-autodiff backend
//
// Precision and recall run in two independent books (training
// stream, validation stream), so one never bleeds into the other.

use anyhow::Result;
use burn::prelude::*;
use std::fmt;

use crate::application::config::ThresholdPolicy;
use crate::data::batcher::TitleBatcher;
use crate::domain::post::TitleSample;
use crate::ml::model::{sigmoid_cross_entropy, AudienceNetwork};

/// Discrete predictions; both policies use an inclusive `>=`.
pub fn predict(outputs: &[f32], policy: ThresholdPolicy) -> Vec<bool> {
    let limit = match policy {
        ThresholdPolicy::Constant(limit) => limit as f64,
        ThresholdPolicy::Adaptive => {
            if outputs.is_empty() {
                return Vec::new();
            }
            outputs.iter().map(|&o| o as f64).sum::<f64>() / outputs.len() as f64
        }
    };
    outputs.iter().map(|&o| o as f64 >= limit).collect()
}

pub fn f1_score(precision: f64, recall: f64) -> f64 {
    let denominator = precision + recall;
    if denominator == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / denominator
    }
}

// ─── PrecisionRecall ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecisionRecall {
    true_positives:  u64,
    false_positives: u64,
    false_negatives: u64,
}

impl PrecisionRecall {
    /// Fold one set of predictions into the running counts.
    /// A target counts as positive when it is above 0.5.
    pub fn update(&mut self, predictions: &[bool], targets: &[f32]) {
        for (&predicted, &target) in predictions.iter().zip(targets) {
            match (predicted, target > 0.5) {
                (true,  true)  => self.true_positives  += 1,
                (true,  false) => self.false_positives += 1,
                (false, true)  => self.false_negatives += 1,
                (false, false) => {}
            }
        }
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        f1_score(self.precision(), self.recall())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 { 0.0 } else { numerator as f64 / denominator as f64 }
}

// ─── Named Scalars ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Train,
    Valid,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stream::Train => "train",
            Stream::Valid => "valid",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricTag {
    Loss,
    Precision,
    Recall,
    F1,
}

impl MetricTag {
    pub const ALL: [MetricTag; 4] = [MetricTag::Loss, MetricTag::Precision, MetricTag::Recall, MetricTag::F1];

    pub fn name(&self) -> &'static str {
        match self {
            MetricTag::Loss      => "cross_entropy",
            MetricTag::Precision => "precision",
            MetricTag::Recall    => "recall",
            MetricTag::F1        => "f1_score",
        }
    }
}

/// One stream's scalars after a full evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamMetrics {
    pub loss:      f64,
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
}

impl StreamMetrics {
    pub fn get(&self, tag: MetricTag) -> f64 {
        match tag {
            MetricTag::Loss      => self.loss,
            MetricTag::Precision => self.precision,
            MetricTag::Recall    => self.recall,
            MetricTag::F1        => self.f1,
        }
    }
}

// ─── MetricsBook ──────────────────────────────────────────────────────────────
/// Threshold policy plus one precision/recall accumulator per stream.
#[derive(Debug, Clone)]
pub struct MetricsBook {
    pub policy: ThresholdPolicy,
    train:      PrecisionRecall,
    valid:      PrecisionRecall,
    latest:     [Option<StreamMetrics>; 2],
}

impl MetricsBook {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Self {
            policy,
            train:  PrecisionRecall::default(),
            valid:  PrecisionRecall::default(),
            latest: [None, None],
        }
    }

    pub fn accumulator(&self, stream: Stream) -> &PrecisionRecall {
        match stream {
            Stream::Train => &self.train,
            Stream::Valid => &self.valid,
        }
    }

    /// Threshold `outputs`, fold them into the stream's counts and
    /// record the resulting scalars.
    pub fn record(&mut self, stream: Stream, loss: f64, outputs: &[f32], targets: &[f32]) -> StreamMetrics {
        let predictions = predict(outputs, self.policy);
        let acc = match stream {
            Stream::Train => &mut self.train,
            Stream::Valid => &mut self.valid,
        };
        acc.update(&predictions, targets);

        let metrics = StreamMetrics {
            loss,
            precision: acc.precision(),
            recall:    acc.recall(),
            f1:        acc.f1(),
        };
        self.latest[stream as usize] = Some(metrics);
        metrics
    }

    /// Last recorded value of a named scalar.
    pub fn scalar(&self, stream: Stream, tag: MetricTag) -> Option<f64> {
        self.latest[stream as usize].map(|m| m.get(tag))
    }

    /// Clear both accumulators, as after restoring a checkpoint.
    pub fn reset(&mut self) {
        self.train.reset();
        self.valid.reset();
        self.latest = [None, None];
    }
}

// ─── Full-set evaluation ──────────────────────────────────────────────────────
/// Loss and flattened outputs/targets over a whole sample set.
pub struct Evaluation {
    pub loss:    f64,
    pub outputs: Vec<f32>,
    pub targets: Vec<f32>,
}

/// Run `network` over `samples` in chunks of `chunk_size` and collect
/// the mean primary loss plus every sigmoid output and target.
///
/// The loss equals a single pass over the whole set: the elementwise
/// cross-entropy is summed across chunks and divided once.
pub fn evaluate<B: Backend>(
    network:    &AudienceNetwork<B>,
    batcher:    &TitleBatcher<B>,
    samples:    &[TitleSample],
    chunk_size: usize,
    l2_factor:  Option<f64>,
) -> Result<Evaluation> {
    let mut loss_sum = 0.0f64;
    let mut elements = 0usize;
    let mut outputs  = Vec::new();
    let mut targets  = Vec::new();

    for chunk in samples.chunks(chunk_size.max(1)) {
        let batch  = batcher.batch(chunk)?;
        let output = network.forward(batch.titles, batch.subreddits);

        let [rows, cols] = output.logits.dims();
        elements += rows * cols;
        loss_sum += sigmoid_cross_entropy(output.logits, batch.users.clone())
            .sum()
            .into_scalar()
            .elem::<f64>();

        outputs.extend(to_vec(output.probabilities)?);
        targets.extend(to_vec(batch.users)?);
    }

    let mut loss = if elements > 0 { loss_sum / elements as f64 } else { f64::NAN };
    if let Some(factor) = l2_factor {
        loss += factor * network.l2_penalty().into_scalar().elem::<f64>();
    }

    Ok(Evaluation { loss, outputs, targets })
}

fn to_vec<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("metrics stage: cannot read tensor data: {e:?}"))
}
