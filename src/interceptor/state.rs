//! Interceptor lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle of an interceptor session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterceptorState {
    /// Constructed, nothing started.
    #[default]
    Created,
    /// Spawning the child.
    Starting,
    /// Child and all workers running.
    Running,
    /// Child exited, workers finishing.
    Draining,
    /// Everything joined.
    Terminated,
}

impl InterceptorState {
    /// Whether `next` directly follows this state.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Running, Self::Draining)
                | (Self::Draining, Self::Terminated)
        )
    }
}

/// Rejected lifecycle transition.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid state transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: InterceptorState,
    pub to: InterceptorState,
}

/// Tracks and validates lifecycle transitions.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: InterceptorState,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> InterceptorState {
        self.state
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if `next` does not follow the current state.
    pub fn transition(&mut self, next: InterceptorState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
        Ok(())
    }
}
