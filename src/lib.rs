//! Purpose: Library crate embedding a jq-dialect engine behind a host-typed API.
//! Exports: `api` (engine, errors), `abi` (C bridge for non-Rust bindings).
//! Role: Keeps the embedded engine's symbols out of the public surface.
//! Invariants: `core::interp` is the only module naming interpreter items.
//! Invariants: Public signatures use host types only (`serde_json::Value`, errors).
pub mod abi;
pub mod api;
mod core;
