// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the filesystem on behalf of a run:
//
//   run_dir.rs         — <log_root>/<name>/ layout and the saved
//                        network config
//
//   checkpoint.rs      — the single overwrite-only checkpoint:
//                        Burn record of every parameter plus the
//                        epoch counter
//
//   tokenizer_store.rs — word-level tokenizer built from training
//                        titles or a pretrained word list, saved
//                        next to the checkpoints
//
//   embeddings.rs      — pretrained word-vector matrix loading
//
//   metrics.rs         — per-stream (train / valid) CSV metric log

/// Run directory layout
pub mod run_dir;

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Pretrained embedding matrix
pub mod embeddings;

/// Per-stream metrics CSV logger
pub mod metrics;
