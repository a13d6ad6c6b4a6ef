//! JSON-RPC message detection for relayed lines.

mod envelope;

pub use envelope::*;
