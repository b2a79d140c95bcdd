// ============================================================
// Layer 4 — Title Batcher
// ============================================================
// Stacks encoded samples into the three tensors one training
// step consumes:
//
//   titles     [batch, max_title_length]  Int   token ids
//   subreddits [batch, subreddit_count]   Float one-hot; auxiliary
//                                               input and pre-training
//                                               target
//   users      [batch, user_count]        Float multi-hot audience
//
// Samples keep only dictionary indices; the dense vectors are
// built here, flattened row-major and reshaped, the same way
// for every backend.

use anyhow::{bail, Result};
use burn::prelude::*;

use crate::data::encoding::label_vector;
use crate::domain::post::TitleSample;

#[derive(Debug, Clone)]
pub struct TitleBatch<B: Backend> {
    pub titles:     Tensor<B, 2, Int>,
    pub subreddits: Tensor<B, 2>,
    pub users:      Tensor<B, 2>,
}

impl<B: Backend> TitleBatch<B> {
    pub fn len(&self) -> usize {
        self.titles.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug)]
pub struct TitleBatcher<B: Backend> {
    pub device:           B::Device,
    pub max_title_length: usize,
    pub user_count:       usize,
    pub subreddit_count:  usize,
}

impl<B: Backend> TitleBatcher<B> {
    pub fn new(
        device:           B::Device,
        max_title_length: usize,
        user_count:       usize,
        subreddit_count:  usize,
    ) -> Self {
        Self { device, max_title_length, user_count, subreddit_count }
    }

    /// Build a batch. Shape problems are reported against the input stage.
    pub fn batch(&self, items: &[TitleSample]) -> Result<TitleBatch<B>> {
        let batch_size = items.len();
        if batch_size == 0 {
            bail!("input stage: cannot build a batch from zero samples");
        }
        if let Some(bad) = items.iter().find(|s| s.title_ids.len() != self.max_title_length) {
            bail!(
                "input stage: title has {} token ids, expected max_title_length = {}",
                bad.title_ids.len(),
                self.max_title_length
            );
        }

        let title_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.title_ids.iter().map(|&x| x as i32))
            .collect();

        let subreddit_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| label_vector(&[s.subreddit], self.subreddit_count))
            .collect();

        let user_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| label_vector(&s.users, self.user_count))
            .collect();

        let titles = Tensor::<B, 1, Int>::from_ints(title_flat.as_slice(), &self.device)
            .reshape([batch_size, self.max_title_length]);

        let subreddits = Tensor::<B, 1>::from_floats(subreddit_flat.as_slice(), &self.device)
            .reshape([batch_size, self.subreddit_count]);

        let users = Tensor::<B, 1>::from_floats(user_flat.as_slice(), &self.device)
            .reshape([batch_size, self.user_count]);

        Ok(TitleBatch { titles, subreddits, users })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn sample(ids: Vec<u32>, subreddit: usize, users: Vec<usize>) -> TitleSample {
        TitleSample { title_ids: ids, subreddit, users }
    }

    #[test]
    fn test_batch_shapes_and_multi_hot_rows() {
        let batcher = TitleBatcher::<TestBackend>::new(Default::default(), 3, 4, 2);
        let batch = batcher
            .batch(&[sample(vec![0, 5, 6], 1, vec![0, 2]), sample(vec![1, 2, 3], 0, vec![])])
            .unwrap();

        assert_eq!(batch.titles.dims(),     [2, 3]);
        assert_eq!(batch.subreddits.dims(), [2, 2]);
        assert_eq!(batch.users.dims(),      [2, 4]);

        let users: Vec<f32> = batch.users.into_data().to_vec().unwrap();
        assert_eq!(users, vec![1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let subs: Vec<f32> = batch.subreddits.into_data().to_vec().unwrap();
        assert_eq!(subs, vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_wrong_title_length_names_the_input_stage() {
        let batcher = TitleBatcher::<TestBackend>::new(Default::default(), 4, 2, 2);
        let err = batcher.batch(&[sample(vec![1, 2], 0, vec![])]).unwrap_err();
        assert!(err.to_string().starts_with("input stage"));
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let batcher = TitleBatcher::<TestBackend>::new(Default::default(), 4, 2, 2);
        assert!(batcher.batch(&[]).is_err());
    }
}
