//! Line relays between the client and the wrapped process.
//!
//! Each relay forwards bytes first and only then looks for a protocol
//! envelope, so capture can never hold up the data path.

mod error;
mod line;
mod passthrough;
mod queue;

pub use error::*;
pub use line::*;
pub use passthrough::*;
pub use queue::*;
