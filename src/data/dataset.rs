use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::post::TitleSample;
use crate::domain::traits::DatasetCursor;

/// In-memory cursor over encoded training and validation samples.
///
/// Each training epoch walks a fresh permutation of the training
/// set in `batch_size` steps; the final batch holds whatever is left,
/// and drawing it completes the epoch. Validation batches cycle
/// through the validation set in order.
pub struct TitleCursor {
    training:         Vec<TitleSample>,
    validation:       Vec<TitleSample>,
    batch_size:       usize,
    train_order:      Vec<usize>,
    train_pos:        usize,
    valid_pos:        usize,
    completed_epochs: usize,
    rng:              StdRng,
}

impl TitleCursor {
    pub fn new(
        training:   Vec<TitleSample>,
        validation: Vec<TitleSample>,
        batch_size: usize,
        seed:       u64,
    ) -> Self {
        let train_order = (0..training.len()).collect();
        Self {
            training,
            validation,
            batch_size: batch_size.max(1),
            train_order,
            train_pos: 0,
            valid_pos: 0,
            completed_epochs: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DatasetCursor for TitleCursor {
    fn next_train_batch(&mut self) -> Vec<TitleSample> {
        let total = self.training.len();
        if total == 0 {
            return Vec::new();
        }
        if self.train_pos == 0 {
            self.train_order.shuffle(&mut self.rng);
        }

        let end   = (self.train_pos + self.batch_size).min(total);
        let batch = self.train_order[self.train_pos..end]
            .iter()
            .map(|&i| self.training[i].clone())
            .collect();

        self.train_pos = end;
        if self.train_pos == total {
            self.train_pos = 0;
            self.completed_epochs += 1;
        }
        batch
    }

    fn next_valid_batch(&mut self) -> Vec<TitleSample> {
        let total = self.validation.len();
        if total == 0 {
            return Vec::new();
        }
        let end   = (self.valid_pos + self.batch_size).min(total);
        let batch = self.validation[self.valid_pos..end].to_vec();
        self.valid_pos = if end == total { 0 } else { end };
        batch
    }

    fn get_training(&self) -> &[TitleSample] {
        &self.training
    }

    fn get_validation(&self) -> &[TitleSample] {
        &self.validation
    }

    fn completed_training_epochs(&self) -> usize {
        self.completed_epochs
    }

    fn percent_of_epoch(&self) -> f64 {
        if self.training.is_empty() {
            return 0.0;
        }
        self.train_pos as f64 / self.training.len() as f64
    }

    fn train_size(&self) -> usize {
        self.training.len()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn restart(&mut self) {
        self.train_pos        = 0;
        self.valid_pos        = 0;
        self.completed_epochs = 0;
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn samples(n: usize) -> Vec<TitleSample> {
        (0..n)
            .map(|i| TitleSample { title_ids: vec![i as u32 + 1], subreddit: 0, users: vec![i] })
            .collect()
    }

    #[test]
    fn test_partial_final_batch_completes_the_epoch() {
        let mut cursor = TitleCursor::new(samples(5), samples(2), 2, 3);

        assert_eq!(cursor.next_train_batch().len(), 2);
        assert_eq!(cursor.completed_training_epochs(), 0);
        assert!((cursor.percent_of_epoch() - 0.4).abs() < 1e-9);

        assert_eq!(cursor.next_train_batch().len(), 2);
        assert_eq!(cursor.completed_training_epochs(), 0);

        assert_eq!(cursor.next_train_batch().len(), 1);
        assert_eq!(cursor.completed_training_epochs(), 1);
        assert_eq!(cursor.percent_of_epoch(), 0.0);
    }

    #[test]
    fn test_every_sample_drawn_once_per_epoch() {
        let mut cursor = TitleCursor::new(samples(7), Vec::new(), 3, 9);
        let mut seen: Vec<usize> = Vec::new();
        while cursor.completed_training_epochs() == 0 {
            seen.extend(cursor.next_train_batch().iter().map(|s| s.users[0]));
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_validation_batches_cycle() {
        let mut cursor = TitleCursor::new(samples(1), samples(3), 2, 0);
        assert_eq!(cursor.next_valid_batch().len(), 2);
        assert_eq!(cursor.next_valid_batch().len(), 1);
        assert_eq!(cursor.next_valid_batch().len(), 2);
    }

    #[test]
    fn test_restart_clears_progress() {
        let mut cursor = TitleCursor::new(samples(2), samples(1), 2, 0);
        cursor.next_train_batch();
        assert_eq!(cursor.completed_training_epochs(), 1);
        cursor.restart();
        assert_eq!(cursor.completed_training_epochs(), 0);
    }

    #[test]
    fn test_empty_training_set_yields_nothing() {
        let mut cursor = TitleCursor::new(Vec::new(), Vec::new(), 4, 0);
        assert!(cursor.next_train_batch().is_empty());
        assert_eq!(cursor.completed_training_epochs(), 0);
    }
}
