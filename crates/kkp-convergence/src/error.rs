//! Wait errors

use crate::poll::format_duration;
use kkp_client::KkpError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the convergence waits
#[derive(Debug, Error)]
pub enum WaitError {
    /// The deadline elapsed before the resource converged
    #[error("timed out waiting for {operation} after {} (timeout {})", format_duration(.elapsed), format_duration(.timeout))]
    Timeout {
        operation: String,
        elapsed: Duration,
        timeout: Duration,
    },

    /// The bounding context was cancelled
    #[error("{operation} cancelled after {}", format_duration(.elapsed))]
    Cancelled { operation: String, elapsed: Duration },

    /// The resource reached a failed terminal state
    #[error("{operation} failed: {message}")]
    Failed { operation: String, message: String },

    /// The caller asked for something that can never be observed
    #[error("invalid expectation: {0}")]
    InvalidExpectation(String),

    /// A KKP call failed in a way the wait could not absorb
    #[error("KKP API error: {0}")]
    Api(#[from] KkpError),
}

impl WaitError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
