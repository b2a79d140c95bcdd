// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The network, how it is assembled, and how it is trained.
//
//   model.rs      — AudienceNetwork: embedding → LSTM/GRU →
//                   optional auxiliary fusion → dense stack →
//                   primary (sigmoid) and secondary (softmax)
//                   heads, plus the loss functions
//
//   builder.rs    — staged graph builder producing a ModelState
//
//   state.rs      — ModelState: parameters, epoch, metric books,
//                   checkpoint handle
//
//   evaluation.rs — thresholds, streaming precision / recall,
//                   F1, full-set evaluation
//
//   trainer.rs    — pre-training and main training loops
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Hochreiter & Schmidhuber (1997) LSTM
//            Cho et al. (2014) GRU

/// Network modules and losses
pub mod model;

/// Staged graph builder
pub mod builder;

/// Per-run model state and checkpointing
pub mod state;

/// Metrics and full-set evaluation
pub mod evaluation;

/// Training loop with online validation
pub mod trainer;
