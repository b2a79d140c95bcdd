// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what the system works
// with: Reddit-style posts (a title, the subreddit it was posted
// in, and the users who engaged with it) and the cursor the
// training loop pulls batches from.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits

// A raw post and its encoded, model-ready form
pub mod post;

// Core abstractions (traits) that other layers implement
pub mod traits;
