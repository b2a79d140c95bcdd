// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds, saves and reloads the run's word-level tokenizer at
// <log_dir>/tokenizer.json.
//
// The vocabulary is either
//   - the most frequent training-title words after "UNK", or
//   - the word list of a pretrained embedding matrix, so that
//     token id i looks up matrix row i.
// Either way "UNK" has id 0, the same id title padding uses.
//
// The tokenizer JSON is written by hand and loaded back with
// Tokenizer::from_file, which sidesteps the trainer/ModelWrapper
// type mismatch in tokenizers 0.15.

use anyhow::{bail, Context, Result};
use std::{collections::HashSet, fs, path::PathBuf};
use tokenizers::Tokenizer;

use crate::data::encoding::{Dictionary, UNK};

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Load the saved tokenizer, or build one from `titles` holding at
    /// most `vocab_size` words.
    pub fn load_or_build<'a>(
        &self,
        titles:     impl IntoIterator<Item = &'a str>,
        vocab_size: usize,
    ) -> Result<Tokenizer> {
        if self.path().exists() {
            tracing::info!("Loading existing tokenizer from '{}'", self.path().display());
            let tokenizer = self.load()?;
            let size = tokenizer.get_vocab_size(false);
            if size > vocab_size {
                bail!(
                    "saved tokenizer has {} words but vocabulary_size is {}",
                    size,
                    vocab_size
                );
            }
            return Ok(tokenizer);
        }

        tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
        let words = Dictionary::most_common(
            titles.into_iter().flat_map(str::split_whitespace),
            vocab_size,
        );
        self.build_from_words(words.names())
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }

    /// Write a tokenizer whose ids are the positions in `words`,
    /// replacing any saved one.
    pub fn build_from_words(&self, words: &[String]) -> Result<Tokenizer> {
        let mut seen = HashSet::new();
        if let Some(dup) = words.iter().find(|w| !seen.insert(w.as_str())) {
            bail!("vocabulary lists '{}' twice", dup);
        }
        if !seen.contains(UNK) {
            bail!("vocabulary has no '{}' entry", UNK);
        }

        let vocab: serde_json::Map<String, serde_json::Value> = words
            .iter()
            .enumerate()
            .map(|(id, word)| (word.clone(), serde_json::json!(id)))
            .collect();

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "WhitespaceSplit" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK
            }
        });

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.path();
        fs::write(&path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write tokenizer JSON '{}'", path.display()))?;

        tracing::info!("Tokenizer built with {} words, saved to '{}'", words.len(), path.display());

        self.load()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn ids(tokenizer: &Tokenizer, text: &str) -> Vec<u32> {
        tokenizer.encode(text, false).unwrap().get_ids().to_vec()
    }

    #[test]
    fn test_built_vocabulary_is_frequency_ranked() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        let titles = ["rust is fast", "rust is safe", "rust"];

        let tokenizer = store.load_or_build(titles.iter().copied(), 3).unwrap();

        assert_eq!(tokenizer.get_vocab_size(false), 3);
        assert_eq!(ids(&tokenizer, "rust is"), vec![1, 2]);
        // not in the top words → UNK
        assert_eq!(ids(&tokenizer, "fast"), vec![0]);
    }

    #[test]
    fn test_saved_tokenizer_is_reused() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        store.load_or_build(["alpha beta"].iter().copied(), 10).unwrap();

        let reloaded = store.load_or_build(["gamma"].iter().copied(), 10).unwrap();
        assert_eq!(ids(&reloaded, "gamma"), vec![0]);
        assert!(store.load_or_build(["gamma"].iter().copied(), 2).is_err());
    }

    #[test]
    fn test_word_list_ids_follow_positions() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        let words: Vec<String> = ["UNK", "the", "crab"].iter().map(|w| w.to_string()).collect();

        let tokenizer = store.build_from_words(&words).unwrap();
        assert_eq!(ids(&tokenizer, "crab the ferris"), vec![2, 1, 0]);
    }

    #[test]
    fn test_word_list_needs_unk_and_no_duplicates() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        let no_unk: Vec<String> = vec!["a".into(), "b".into()];
        let dup:    Vec<String> = vec!["UNK".into(), "a".into(), "a".into()];
        assert!(store.build_from_words(&no_unk).is_err());
        assert!(store.build_from_words(&dup).is_err());
    }
}
