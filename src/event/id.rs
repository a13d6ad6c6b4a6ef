//! Event identifier generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Last nanosecond timestamp handed out in this process.
static LAST_NANOS: AtomicU64 = AtomicU64::new(0);

/// Current wall-clock time in nanoseconds, made strictly increasing.
///
/// Two calls never return the same value, even when the OS clock has
/// coarser resolution than the call rate.
fn monotonic_nanos() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));

    let mut prev = LAST_NANOS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev.saturating_add(1));
        match LAST_NANOS.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// Generates `"<nanos>-<pid>"` identifiers.
#[derive(Debug, Clone, Copy)]
pub struct EventIdGenerator {
    pid: u32,
}

impl EventIdGenerator {
    /// Create a generator tagged with the given process id.
    #[must_use]
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    /// The process id embedded in generated identifiers.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Produce the next identifier.
    #[must_use]
    pub fn next_id(&self) -> String {
        format!("{}-{}", monotonic_nanos(), self.pid)
    }
}
