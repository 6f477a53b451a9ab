//! Unified error type for the govbroker workspace.

use crate::policy::Attempt;
use thiserror::Error;

/// Enumerates the failures the broker raises instead of returning a
/// [`NormalizedResult`](crate::NormalizedResult).
///
/// Upstream outcomes (business errors, protocol errors, transport failures,
/// timeouts) are not represented here; they travel inside the normalized
/// result as an [`ErrorKind`](crate::ErrorKind).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// Missing or invalid configuration. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The OAuth token endpoint rejected the request or returned a body that
    /// is not a valid token response.
    #[error("token fetch failed: status={status}, body={body}")]
    AuthFetchFailed { status: u16, body: String },

    /// The OAuth token endpoint could not be reached.
    #[error("token endpoint unreachable: {0}")]
    AuthTransport(String),

    /// A certificate hint named an identity that is not configured.
    #[error("unknown credential: {0}")]
    UnknownCredential(String),

    /// No endpoint policy is registered under the given id.
    #[error("unknown endpoint policy: {0}")]
    UnknownEndpoint(String),

    /// The policy declares no credential for the requested attempt.
    #[error("no {attempt} credential declared for endpoint {endpoint}")]
    NoCredentialAvailable { endpoint: String, attempt: Attempt },

    /// The inbound call cannot be turned into an outbound request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl BrokerError {
    /// Returns `true` if repeating the call later may succeed.
    ///
    /// The broker itself never retries these; the flag is for callers that
    /// run their own retry policy.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AuthFetchFailed { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            Self::AuthTransport(_) => true,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_configuration() {
        let err = BrokerError::Configuration("oauth.client_id is not set".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: oauth.client_id is not set"
        );
    }

    #[test]
    fn test_error_display_auth_fetch_failed() {
        let err = BrokerError::AuthFetchFailed {
            status: 401,
            body: "invalid_client".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("401"));
        assert!(s.contains("invalid_client"));
    }

    #[test]
    fn test_error_display_no_credential() {
        let err = BrokerError::NoCredentialAvailable {
            endpoint: "courses.search".into(),
            attempt: Attempt::Fallback,
        };
        assert_eq!(
            err.to_string(),
            "no fallback credential declared for endpoint courses.search"
        );
    }

    #[test]
    fn test_is_retryable_token_fetch() {
        let transient = BrokerError::AuthFetchFailed {
            status: 503,
            body: String::new(),
        };
        let rejected = BrokerError::AuthFetchFailed {
            status: 401,
            body: String::new(),
        };
        assert!(transient.is_retryable());
        assert!(!rejected.is_retryable());
        assert!(BrokerError::AuthTransport("connection refused".into()).is_retryable());
    }

    #[test]
    fn test_is_retryable_other_errors() {
        assert!(!BrokerError::Configuration("x".into()).is_retryable());
        assert!(!BrokerError::UnknownCredential("x".into()).is_retryable());
        assert!(!BrokerError::UnknownEndpoint("x".into()).is_retryable());
        assert!(!BrokerError::InvalidRequest("x".into()).is_retryable());
    }
}
