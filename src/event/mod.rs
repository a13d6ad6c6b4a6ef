//! Captured protocol interactions and the batches they are shipped in.

mod batch;
mod id;
mod types;

pub use batch::*;
pub use id::*;
pub use types::*;
