//! Top-level orchestration of a wrapped process session.

mod runner;
mod state;

pub use runner::*;
pub use state::*;
