//! Event consumer that batches captured events for dispatch.

mod batcher;

pub use batcher::*;
