//! The uniform result shape every upstream call resolves to.

use crate::policy::{Attempt, AuthKind};
use bytes::Bytes;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Maximum number of bytes of an opaque body surfaced as a diagnostic.
pub const DIAGNOSTIC_LIMIT: usize = 2048;

/// HTTP-like status reported when the exchange never completed.
pub const TRANSPORT_ERROR_STATUS: u16 = 502;
/// HTTP-like status reported when the exchange timed out.
pub const TIMEOUT_STATUS: u16 = 504;

/// Classification of a failed upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Well-formed JSON error from upstream; passed through verbatim.
    UpstreamBusinessError,
    /// Non-JSON body, regardless of status code.
    UpstreamProtocolError,
    /// Network or TLS failure; no response was received.
    TransportError,
    /// The fixed request timeout elapsed.
    UpstreamTimeout,
}

/// Response payload: parsed JSON or the raw bytes upstream sent.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Raw {
        bytes: Bytes,
        content_type: Option<String>,
    },
}

impl ResponseBody {
    /// Lossy, truncated text rendering of a raw body, or compact JSON.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Json(v) => v.to_string(),
            Self::Raw {
                bytes,
                content_type,
            } => {
                let text = String::from_utf8_lossy(bytes);
                let mut end = text.len().min(DIAGNOSTIC_LIMIT);
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                let mut out = String::with_capacity(end + 64);
                if let Some(ct) = content_type {
                    out.push_str(&format!("[{ct}, {} bytes] ", bytes.len()));
                } else {
                    out.push_str(&format!("[{} bytes] ", bytes.len()));
                }
                out.push_str(&text[..end]);
                if end < text.len() {
                    out.push('…');
                }
                out
            }
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Raw { .. } => None,
        }
    }
}

impl Serialize for ResponseBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Json(v) => v.serialize(serializer),
            Self::Raw { .. } => serializer.serialize_str(&self.diagnostic()),
        }
    }
}

/// Which credential path produced the terminal result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialPath {
    pub attempt: Attempt,
    pub auth: AuthKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

impl std::fmt::Display for CredentialPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.attempt, self.auth)?;
        if let Some(cert) = &self.certificate {
            write!(f, "({cert})")?;
        }
        Ok(())
    }
}

/// Outcome of one broker call, after classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub ok: bool,
    pub status: u16,
    pub body: ResponseBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub served_by: Option<CredentialPath>,
}

impl NormalizedResult {
    #[must_use]
    pub fn success(status: u16, body: Value) -> Self {
        Self {
            ok: true,
            status,
            body: ResponseBody::Json(body),
            error_kind: None,
            served_by: None,
        }
    }

    #[must_use]
    pub fn business_error(status: u16, body: Value) -> Self {
        Self {
            ok: false,
            status,
            body: ResponseBody::Json(body),
            error_kind: Some(ErrorKind::UpstreamBusinessError),
            served_by: None,
        }
    }

    #[must_use]
    pub fn protocol_error(status: u16, bytes: Bytes, content_type: Option<String>) -> Self {
        Self {
            ok: false,
            status,
            body: ResponseBody::Raw {
                bytes,
                content_type,
            },
            error_kind: Some(ErrorKind::UpstreamProtocolError),
            served_by: None,
        }
    }

    /// The exchange never completed. `timed_out` selects
    /// [`ErrorKind::UpstreamTimeout`] over [`ErrorKind::TransportError`].
    #[must_use]
    pub fn transport_failure(message: impl Into<String>, timed_out: bool) -> Self {
        let (status, kind) = if timed_out {
            (TIMEOUT_STATUS, ErrorKind::UpstreamTimeout)
        } else {
            (TRANSPORT_ERROR_STATUS, ErrorKind::TransportError)
        };
        Self {
            ok: false,
            status,
            body: ResponseBody::Raw {
                bytes: Bytes::from(message.into()),
                content_type: None,
            },
            error_kind: Some(kind),
            served_by: None,
        }
    }

    #[must_use]
    pub fn with_served_by(mut self, path: CredentialPath) -> Self {
        self.served_by = Some(path);
        self
    }

    /// Whether this outcome looks like a credential or API-version mismatch:
    /// HTTP 403, or a non-JSON body masquerading as a response.
    #[must_use]
    pub fn is_auth_or_version_failure(&self) -> bool {
        self.status == 403 || self.error_kind == Some(ErrorKind::UpstreamProtocolError)
    }
}
