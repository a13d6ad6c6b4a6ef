//! Telemetry batch submission.

mod client;
mod dto;
mod error;
mod sink;

pub use client::*;
pub use dto::*;
pub use error::*;
pub use sink::*;
