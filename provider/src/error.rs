//! Provider error types.
//!
//! Resource and data source handlers fail with [`ProviderError`]. The
//! summary strings mirror the diagnostics a Terraform user sees, e.g.
//! "Create cluster failed: KKP API error (400): ...".

use crate::config::ConfigError;
use kkp_client::KkpError;
use kkp_convergence::WaitError;
use std::fmt;
use thiserror::Error;

/// Errors returned by resource and data source handlers
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider configuration is unusable
    #[error("Invalid provider configuration: {0}")]
    Config(#[from] ConfigError),

    /// Plan failed defaulting/validation before any API call
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A KKP API call failed
    #[error("{summary}: {source}")]
    Api {
        summary: String,
        #[source]
        source: KkpError,
    },

    /// A convergence wait did not succeed
    #[error("{summary}: {source}")]
    Wait {
        summary: String,
        #[source]
        source: WaitError,
    },

    /// State lacks the identifiers needed to address the object
    #[error("Missing identifiers: {0}")]
    MissingIdentifier(String),

    /// Import ID does not have the expected shape
    #[error("Invalid import ID {id:?}: expected '{expected}'")]
    InvalidImportId { id: String, expected: &'static str },

    /// A JSON attribute (addon variables, application values) is malformed
    #[error("Invalid {field} JSON: {message}")]
    InvalidJson { field: &'static str, message: String },

    /// Cluster template could not be resolved or instantiated
    #[error("Cluster template error: {0}")]
    Template(String),
}

impl ProviderError {
    /// Adapter for `map_err` on client calls
    pub fn api(summary: impl Into<String>) -> impl FnOnce(KkpError) -> Self {
        let summary = summary.into();
        move |source| Self::Api { summary, source }
    }

    /// Adapter for `map_err` on convergence waits
    pub fn wait(summary: impl Into<String>) -> impl FnOnce(WaitError) -> Self {
        let summary = summary.into();
        move |source| Self::Wait { summary, source }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when the failure came from a wait that ran out of time
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Wait { source, .. } if source.is_timeout())
    }
}

/// Non-fatal diagnostic surfaced to the user alongside a successful result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub summary: String,
    pub detail: String,
}

impl Warning {
    pub fn new(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.summary, self.detail)
    }
}
