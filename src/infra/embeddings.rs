// ============================================================
// Layer 6 — Pretrained Embedding Matrix
// ============================================================
// A word-vector matrix produced offline (e.g. by word2vec),
// stored as JSON:
//
//   {
//     "words":   ["UNK", "rust", "release", ...],
//     "vectors": [[0.1, -0.3, ...], [0.7, 0.2, ...], ...]
//   }
//
// Row i is the vector for words[i]. The word list doubles as the
// vocabulary: the tokenizer is built from it so token id i looks
// up row i, and the model's vocabulary_size becomes the row count.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MatrixFile {
    words:   Vec<String>,
    vectors: Vec<Vec<f32>>,
}

/// Dense `[rows, cols]` matrix with one word per row.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    words:  Vec<String>,
    rows:   usize,
    cols:   usize,
    values: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read embedding matrix '{}'", path.display()))?;
        let file: MatrixFile = serde_json::from_str(&json)
            .with_context(|| format!("Invalid embedding matrix '{}'", path.display()))?;
        let matrix = Self::from_rows(file.words, file.vectors)?;

        tracing::info!(
            "Loaded pretrained embeddings: {} words × {} dims",
            matrix.rows,
            matrix.cols
        );
        Ok(matrix)
    }

    pub fn from_rows(words: Vec<String>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if words.len() != vectors.len() {
            bail!(
                "embedding matrix has {} words but {} vectors",
                words.len(),
                vectors.len()
            );
        }
        let Some(cols) = vectors.first().map(Vec::len) else {
            bail!("embedding matrix is empty");
        };
        if let Some((row, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != cols) {
            bail!("embedding matrix row {} has {} values, expected {}", row, v.len(), cols);
        }

        let rows   = vectors.len();
        let values = vectors.into_iter().flatten().collect();
        Ok(Self { words, rows, cols, values })
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major values, `rows * cols` long.
    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("w{i}")).collect()
    }

    #[test]
    fn test_rows_are_flattened_in_order() {
        let m = EmbeddingMatrix::from_rows(words(2), vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!((m.rows(), m.cols()), (2, 2));
        assert_eq!(m.values(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        assert!(EmbeddingMatrix::from_rows(words(2), vec![vec![1.0, 2.0], vec![3.0]]).is_err());
        assert!(EmbeddingMatrix::from_rows(words(1), vec![vec![1.0], vec![3.0]]).is_err());
        assert!(EmbeddingMatrix::from_rows(vec![], vec![]).is_err());
    }

    #[test]
    fn test_load_from_json_file() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.json");
        fs::write(&path, r#"{"words":["UNK","rust"],"vectors":[[0.0,0.5],[1.0,-1.0]]}"#).unwrap();

        let m = EmbeddingMatrix::load(&path).unwrap();
        assert_eq!(m.words(), &["UNK".to_string(), "rust".to_string()]);
        assert_eq!(m.rows(), 2);
    }
}
