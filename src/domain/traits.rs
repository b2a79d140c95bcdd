// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer only talks to these traits:
//   - PostSource    → anything that can produce raw posts
//   - DatasetCursor → anything that can hand the training loop
//                     shuffled batches and report epoch progress

use anyhow::Result;
use crate::domain::post::{TitlePost, TitleSample};

// ─── PostSource ───────────────────────────────────────────────────────────────
/// Any component that can load posts from a source.
///
/// Implementations:
///   - JsonLinesLoader → one JSON object per line
pub trait PostSource {
    /// Load every post available from this source.
    fn load_all(&self) -> Result<Vec<TitlePost>>;
}

// ─── DatasetCursor ────────────────────────────────────────────────────────────
/// Sequential access to the training and validation sets.
///
/// A cursor is consumed from a single thread of control. Training
/// batches walk a shuffled permutation of the training set; the last
/// batch of an epoch may be short, and drawing it completes the epoch.
pub trait DatasetCursor {
    /// Next training batch. Never empty while the training set is non-empty.
    fn next_train_batch(&mut self) -> Vec<TitleSample>;

    /// Next validation batch, cycling independently of the training stream.
    fn next_valid_batch(&mut self) -> Vec<TitleSample>;

    /// The whole training set, in load order.
    fn get_training(&self) -> &[TitleSample];

    /// The whole validation set, in load order.
    fn get_validation(&self) -> &[TitleSample];

    /// Number of full passes over the training set drawn so far.
    fn completed_training_epochs(&self) -> usize;

    /// Fraction of the current epoch already drawn, in `[0, 1)`.
    fn percent_of_epoch(&self) -> f64;

    /// Number of training samples.
    fn train_size(&self) -> usize;

    /// Samples per training batch.
    fn batch_size(&self) -> usize;

    /// Forget epoch progress so a new training phase starts from zero.
    fn restart(&mut self);
}
