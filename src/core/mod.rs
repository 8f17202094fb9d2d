// Core modules: engine lifecycle, error modeling, and the interpreter shim.
pub mod engine;
pub mod error;
mod interp;
