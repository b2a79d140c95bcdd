// ============================================================
// Layer 3 — Post Domain Types
// ============================================================
// A `TitlePost` is one record as it appears in a dataset file:
//   title:     "Rust 1.80 released"
//   subreddit: "rust"
//   users:     ["alice", "bob"]
//
// A `TitleSample` is the same post after encoding: token ids
// padded to a fixed length plus dictionary indices for the
// subreddit and every engaged user. Dense multi-hot vectors are
// only materialised when a batch is built.

use serde::{Deserialize, Serialize};

/// A raw post loaded from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitlePost {
    /// Whitespace-separated title text
    pub title: String,

    /// Subreddit the title was posted in
    pub subreddit: String,

    /// Users who engaged with the title (the audience)
    #[serde(default)]
    pub users: Vec<String>,
}

impl TitlePost {
    pub fn new(
        title:     impl Into<String>,
        subreddit: impl Into<String>,
        users:     Vec<String>,
    ) -> Self {
        Self {
            title:     title.into(),
            subreddit: subreddit.into(),
            users,
        }
    }
}

/// One encoded post, ready to be stacked into a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleSample {
    /// Token ids, exactly `max_title_length` long (0 = padding / UNK)
    pub title_ids: Vec<u32>,

    /// Index into the subreddit dictionary (0 = UNK)
    pub subreddit: usize,

    /// Indices into the user dictionary; may be empty
    pub users: Vec<usize>,
}

impl TitleSample {
    /// Number of non-padding tokens in the title
    pub fn known_tokens(&self) -> usize {
        self.title_ids.iter().filter(|&&id| id != 0).count()
    }
}
