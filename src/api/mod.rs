//! Purpose: Define the stable public Rust API boundary for Filigree.
//! Exports: Engine lifecycle/evaluation types needed by bindings and CLI.
//! Role: Public, additive-only surface; hides the interpreter shim module.
//! Invariants: This module is the only public path to the engine.
//! Invariants: No re-export references the embedded engine's crates.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::engine::Engine;
pub use crate::core::error::{Error, ErrorKind};
