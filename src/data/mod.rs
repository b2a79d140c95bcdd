// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from a JSON-lines file to tensor batches:
//
//   posts.jsonl
//       │
//       ▼
//   JsonLinesLoader   → raw TitlePost records
//       │
//       ▼
//   split_train_val   → only when no validation file is configured
//       │
//       ▼
//   PostEncoder       → token ids, padded titles, dictionary indices
//       │
//       ▼
//   TitleCursor       → shuffled batches, epoch bookkeeping
//       │
//       ▼
//   TitleBatcher      → tensors for one step

/// Reads posts from JSON-lines files
pub mod loader;

/// Title fitting, label vectors and dictionaries
pub mod encoding;

/// The in-memory dataset cursor
pub mod dataset;

/// Stacks samples into tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
