//! KKP client errors and their classification

use thiserror::Error;

/// Errors that can occur when interacting with the KKP API
#[derive(Debug, Error)]
pub enum KkpError {
    /// HTTP transport error (connect, timeout, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// KKP API answered with a non-success status
    #[error("KKP API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Request body could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response body could not be decoded into the expected model
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Authentication or authorization failed (401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Client could not be configured
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// How a caller waiting on the remote system should treat an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The addressed resource (or its parent) does not exist
    NotFound,
    /// Worth retrying on the next poll
    Transient,
    /// Retrying will not help
    Fatal,
}

impl KkpError {
    /// Classify this error.
    ///
    /// Typed 404s are `NotFound`. The API (and some proxies in front of it)
    /// also report missing objects only in the message text, so any message
    /// mentioning "404" or "not found" is treated the same way. Response
    /// decoding failures, 5xx, 408, 429 and transport errors are `Transient`.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) | Self::Api { status: 404, .. } => ErrorClass::NotFound,
            Self::Api { message, .. } if mentions_not_found(message) => ErrorClass::NotFound,
            Self::Api { status, .. } if is_retryable_status(*status) => ErrorClass::Transient,
            Self::Api { .. } => ErrorClass::Fatal,
            Self::Http(e) => classify_transport(e),
            Self::Decode(_) => ErrorClass::Transient,
            Self::Serialization(_)
            | Self::Authentication(_)
            | Self::InvalidRequest(_)
            | Self::InvalidConfig(_) => ErrorClass::Fatal,
        }
    }

    /// Shorthand for `self.class() == ErrorClass::NotFound`
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

fn mentions_not_found(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("404") || lower.contains("not found")
}

fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

fn classify_transport(e: &reqwest::Error) -> ErrorClass {
    if let Some(status) = e.status() {
        let code = status.as_u16();
        if code == 404 {
            return ErrorClass::NotFound;
        }
        if is_retryable_status(code) {
            return ErrorClass::Transient;
        }
        return ErrorClass::Fatal;
    }
    if e.is_builder() {
        return ErrorClass::Fatal;
    }
    if mentions_not_found(&e.to_string()) {
        return ErrorClass::NotFound;
    }
    ErrorClass::Transient
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, message: &str) -> KkpError {
        KkpError::Api { status, message: message.to_string() }
    }

    #[test]
    fn test_typed_not_found() {
        assert_eq!(KkpError::NotFound("cluster abc".into()).class(), ErrorClass::NotFound);
        assert_eq!(api(404, "").class(), ErrorClass::NotFound);
    }

    #[test]
    fn test_not_found_in_message_text() {
        assert_eq!(api(500, "upstream said 404").class(), ErrorClass::NotFound);
        assert_eq!(api(400, "Cluster Not Found").class(), ErrorClass::NotFound);
        assert!(api(403, "NOT FOUND in cache").is_not_found());
    }

    #[test]
    fn test_server_side_errors_are_transient() {
        assert_eq!(api(500, "internal error").class(), ErrorClass::Transient);
        assert_eq!(api(503, "unavailable").class(), ErrorClass::Transient);
        assert_eq!(api(429, "slow down").class(), ErrorClass::Transient);
        assert_eq!(api(408, "timeout").class(), ErrorClass::Transient);
    }

    #[test]
    fn test_decode_errors_are_transient() {
        let err = KkpError::Decode("cannot unmarshal into TextConsumer".into());
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn test_client_errors_are_fatal() {
        assert_eq!(api(400, "bad spec").class(), ErrorClass::Fatal);
        assert_eq!(api(409, "conflict").class(), ErrorClass::Fatal);
        assert_eq!(KkpError::Authentication("expired".into()).class(), ErrorClass::Fatal);
        assert_eq!(KkpError::InvalidRequest("name".into()).class(), ErrorClass::Fatal);
    }
}
