// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Used when a config names no separate validation file: the
// training posts are shuffled with the run's seed and the tail
// fraction becomes the validation set.
//
// The split happens on raw posts, before dictionaries are built,
// so validation users never leak into the user dictionary.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `items` with `seed` and split into (train, validation).
///
/// `train_fraction` is clamped so the split index stays in range.
pub fn split_train_val<T>(mut items: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let total    = items.len();
    let split_at = ((total as f64) * train_fraction.clamp(0.0, 1.0)).round() as usize;
    let split_at = split_at.min(total);

    let val = items.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        items.len(),
        val.len(),
    );

    (items, val)
}
