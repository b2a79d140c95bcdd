// ============================================================
// Layer 4 — Post Loader
// ============================================================
// Loads posts from a JSON-lines file: one object per line,
//
//   {"title": "Rust 1.80 released", "subreddit": "rust", "users": ["alice"]}
//
// Blank lines are ignored. A line that fails to parse is logged
// and skipped so one bad record does not sink a whole dataset;
// a missing file is an error.

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::post::TitlePost;
use crate::domain::traits::PostSource;

pub struct JsonLinesLoader {
    path: PathBuf,
}

impl JsonLinesLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PostSource for JsonLinesLoader {
    fn load_all(&self) -> Result<Vec<TitlePost>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read dataset '{}'", self.path.display()))?;
        let posts = parse_lines(&text, &self.path);
        tracing::info!("Loaded {} posts from '{}'", posts.len(), self.path.display());
        Ok(posts)
    }
}

fn parse_lines(text: &str, origin: &Path) -> Vec<TitlePost> {
    let mut posts = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<TitlePost>(line) {
            Ok(post) => posts.push(post),
            Err(e) => tracing::warn!(
                "Skipping '{}' line {}: {}",
                origin.display(),
                line_no + 1,
                e
            ),
        }
    }
    posts
}
