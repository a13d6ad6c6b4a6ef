//! Child process spawning and lifecycle.

mod child;

pub use child::*;
