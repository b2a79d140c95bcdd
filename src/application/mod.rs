// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to train one or more network
// configurations.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing here (that's Layer 1)
//   - No direct file formats here (that's Layer 4 and 6)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Network configuration and the config store
pub mod config;

// The training workflow
pub mod train_use_case;
