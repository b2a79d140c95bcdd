// ============================================================
// Layer 4 — Post Encoding
// ============================================================
// Turns a raw `TitlePost` into a `TitleSample`:
//
//   title     → token ids via the WordLevel tokenizer, then
//               fitted to exactly `max_title_length` positions
//   subreddit → index into the subreddit dictionary
//   users     → indices into the user dictionary
//
// Fitting a title:
//   Short titles are LEFT-padded with 0 so the real tokens sit in
//   the last positions, right next to the final time step the
//   recurrent encoder reads:
//     [7, 3] with max 5        → [0, 0, 0, 7, 3]
//   Long titles keep their first `max_title_length` tokens:
//     [1, 2, 3, 4, 5, 6] max 5 → [1, 2, 3, 4, 5]
//
// Dictionaries reserve index 0 for "UNK". Anything not in the
// dictionary (an unseen user, a rare subreddit) maps to 0.

use anyhow::Result;
use std::collections::HashMap;
use tokenizers::Tokenizer;

use crate::domain::post::{TitlePost, TitleSample};

pub const UNK: &str = "UNK";

/// Left-pad or truncate token ids to exactly `max_len` positions.
pub fn fit_title(ids: &[u32], max_len: usize) -> Vec<u32> {
    if ids.len() >= max_len {
        return ids[..max_len].to_vec();
    }
    let mut out = vec![0u32; max_len - ids.len()];
    out.extend_from_slice(ids);
    out
}

/// Multi-hot vector over `size` users; unknown indices light slot 0.
pub fn label_vector(users: &[usize], size: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; size];
    for &user in users {
        match vector.get_mut(user) {
            Some(slot) => *slot = 1.0,
            None       => vector[0] = 1.0,
        }
    }
    vector
}

// ─── Dictionary ───────────────────────────────────────────────────────────────
/// Name → index map with `UNK` fixed at index 0.
#[derive(Debug, Clone)]
pub struct Dictionary {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Dictionary {
    /// Keep the `capacity - 1` most frequent names after `UNK`.
    /// Ties are broken alphabetically so the result is deterministic.
    pub fn most_common<'a>(items: impl IntoIterator<Item = &'a str>, capacity: usize) -> Self {
        let mut freq: HashMap<&str, usize> = HashMap::new();
        for item in items {
            if item != UNK {
                *freq.entry(item).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(capacity.saturating_sub(1));

        let mut names = vec![UNK.to_string()];
        names.extend(ranked.into_iter().map(|(name, _)| name.to_string()));
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }

    /// Index of a name, or 0 (`UNK`) when unknown.
    pub fn index_of(&self, name: &str) -> usize {
        self.index.get(name).copied().unwrap_or(0)
    }

    /// Every name in index order, `UNK` first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

// ─── PostEncoder ──────────────────────────────────────────────────────────────
pub struct PostEncoder {
    tokenizer:        Tokenizer,
    users:            Dictionary,
    subreddits:       Dictionary,
    max_title_length: usize,
}

impl PostEncoder {
    pub fn new(
        tokenizer:        Tokenizer,
        users:            Dictionary,
        subreddits:       Dictionary,
        max_title_length: usize,
    ) -> Self {
        Self { tokenizer, users, subreddits, max_title_length }
    }

    /// Build user and subreddit dictionaries from the training posts.
    pub fn dictionaries(
        posts:           &[TitlePost],
        user_count:      usize,
        subreddit_count: usize,
    ) -> (Dictionary, Dictionary) {
        let users = Dictionary::most_common(
            posts.iter().flat_map(|p| p.users.iter().map(String::as_str)),
            user_count,
        );
        let subreddits = Dictionary::most_common(
            posts.iter().map(|p| p.subreddit.as_str()),
            subreddit_count,
        );
        (users, subreddits)
    }

    pub fn encode(&self, post: &TitlePost) -> Result<TitleSample> {
        let enc = self
            .tokenizer
            .encode(post.title.as_str(), false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

        let mut users: Vec<usize> = post.users.iter().map(|u| self.users.index_of(u)).collect();
        users.sort_unstable();
        users.dedup();

        Ok(TitleSample {
            title_ids: fit_title(enc.get_ids(), self.max_title_length),
            subreddit: self.subreddits.index_of(&post.subreddit),
            users,
        })
    }

    pub fn encode_all(&self, posts: &[TitlePost]) -> Result<Vec<TitleSample>> {
        let samples = posts.iter().map(|p| self.encode(p)).collect::<Result<Vec<_>>>()?;
        let known: usize = samples.iter().map(TitleSample::known_tokens).sum();
        tracing::debug!(
            "Encoded {} posts ({} known title tokens)",
            samples.len(),
            known
        );
        Ok(samples)
    }
}
