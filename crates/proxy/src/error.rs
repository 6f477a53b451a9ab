//! API error type that maps [`BrokerError`] variants to HTTP status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use govbroker_types::BrokerError;
use serde_json::json;

/// Wrapper around [`BrokerError`] that implements [`IntoResponse`].
#[derive(Debug)]
pub struct ApiError(pub BrokerError);

impl ApiError {
    /// Returns `(status, error_type, error_code)` for the wrapped error.
    fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        match &self.0 {
            BrokerError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "configuration_error",
            ),
            BrokerError::AuthFetchFailed { .. } => (
                StatusCode::BAD_GATEWAY,
                "authentication_error",
                "token_fetch_failed",
            ),
            BrokerError::AuthTransport(_) => (
                StatusCode::BAD_GATEWAY,
                "server_error",
                "token_endpoint_unreachable",
            ),
            BrokerError::UnknownCredential(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "unknown_credential",
            ),
            BrokerError::UnknownEndpoint(_) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "unknown_endpoint",
            ),
            BrokerError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request",
            ),
            BrokerError::NoCredentialAvailable { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "no_credential_available",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, error_code) = self.classify();
        let msg = self.0.to_string();
        if status.is_server_error() {
            tracing::error!(code = error_code, error = %msg, "request failed");
        }
        (
            status,
            Json(json!({
                "error": {
                    "message": msg,
                    "type": error_type,
                    "code": error_code,
                }
            })),
        )
            .into_response()
    }
}

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        Self(e)
    }
}
