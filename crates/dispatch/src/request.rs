//! The inbound description of one upstream call.

use bytes::Bytes;
use govbroker_types::{BrokerError, Result};
use reqwest::{Method, Url, header::HeaderMap};

/// Header carrying the endpoint's API version on every outbound request.
pub const API_VERSION_HEADER: &str = "x-api-version";

/// Request headers never forwarded from the caller. The broker sets the
/// credential and version headers itself; the rest are connection-scoped.
const STRIPPED_HEADERS: &[&str] = &[
    "authorization",
    API_VERSION_HEADER,
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A caller's request to an upstream route, before credentials are attached.
#[derive(Debug, Clone, bon::Builder)]
pub struct UpstreamCall {
    /// Policy id naming the route's auth requirements.
    #[builder(into)]
    pub endpoint: String,
    #[builder(default = Method::GET)]
    pub method: Method,
    /// Path relative to the upstream base URL.
    #[builder(into)]
    pub path: String,
    #[builder(default)]
    pub query: Vec<(String, String)>,
    #[builder(default)]
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Which certificate identity to present, when several are configured.
    #[builder(into)]
    pub cert_hint: Option<String>,
}

impl UpstreamCall {
    /// Appends [`Self::path`] to `base_url` segment by segment.
    ///
    /// The path is taken as already decoded: each segment is percent-encoded
    /// again, so `?` and `#` stay inside the path.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InvalidRequest`] if the path is absolute or has a
    /// `.` or `..` segment, or if `base_url` cannot carry a path.
    pub fn url(&self, base_url: &str) -> Result<Url> {
        let invalid = |reason: &str| {
            BrokerError::InvalidRequest(format!("{reason}: {}", self.path))
        };
        let path = self.path.trim_start_matches('/');
        if path.contains("://") {
            return Err(invalid("path must be relative to the upstream base URL"));
        }
        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|s| matches!(*s, "." | "..")) {
            return Err(invalid("path must not contain dot segments"));
        }

        let mut url = Url::parse(base_url).map_err(|e| {
            BrokerError::InvalidRequest(format!("invalid upstream base URL {base_url}: {e}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| invalid("upstream base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Caller headers minus credentials, the version header and hop-by-hop
    /// headers.
    #[must_use]
    pub fn forwarded_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        for name in STRIPPED_HEADERS {
            headers.remove(*name);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{self, HeaderValue};

    #[test]
    fn test_builder_defaults() {
        let call = UpstreamCall::builder()
            .endpoint("courses.search")
            .path("/courses/v1/search")
            .build();
        assert_eq!(call.method, Method::GET);
        assert!(call.query.is_empty());
        assert!(call.headers.is_empty());
        assert!(call.body.is_none());
        assert!(call.cert_hint.is_none());
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let call = UpstreamCall::builder()
            .endpoint("e")
            .path("/courses/v1/search")
            .build();
        let url = call.url("https://api.example.gov/").unwrap();
        assert_eq!(url.as_str(), "https://api.example.gov/courses/v1/search");
    }

    #[test]
    fn test_url_keeps_base_prefix() {
        let call = UpstreamCall::builder().endpoint("e").path("grants").build();
        let url = call.url("https://api.example.gov/uat").unwrap();
        assert_eq!(url.as_str(), "https://api.example.gov/uat/grants");
    }

    #[test]
    fn test_url_keeps_base_prefix_with_trailing_slash() {
        let call = UpstreamCall::builder()
            .endpoint("e")
            .path("/grants/v2")
            .build();
        let url = call.url("https://api.example.gov/uat/").unwrap();
        assert_eq!(url.as_str(), "https://api.example.gov/uat/grants/v2");
    }

    #[test]
    fn test_dot_segments_rejected() {
        for p in ["a/../../admin", "../admin", "a/./b", ".."] {
            let call = UpstreamCall::builder().endpoint("e").path(p).build();
            assert!(
                matches!(
                    call.url("https://api.example.gov/uat"),
                    Err(BrokerError::InvalidRequest(_))
                ),
                "{p}"
            );
        }
    }

    #[test]
    fn test_reserved_characters_stay_in_path() {
        let call = UpstreamCall::builder()
            .endpoint("e")
            .path("grants/a?b#c d")
            .build();
        let url = call.url("https://api.example.gov/uat").unwrap();
        assert_eq!(url.path(), "/uat/grants/a%3Fb%23c%20d");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_absolute_path_rejected() {
        let call = UpstreamCall::builder()
            .endpoint("e")
            .path("https://evil.example.com/x")
            .build();
        assert!(matches!(
            call.url("https://api.example.gov"),
            Err(BrokerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_forwarded_headers_strip_credentials_and_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer caller"));
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static("v0"));
        headers.insert(header::HOST, HeaderValue::from_static("localhost"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-request-id", HeaderValue::from_static("req-1"));

        let call = UpstreamCall::builder()
            .endpoint("e")
            .path("p")
            .headers(headers)
            .build();
        let fwd = call.forwarded_headers();
        assert_eq!(fwd.len(), 2);
        assert_eq!(fwd[header::CONTENT_TYPE], "application/json");
        assert_eq!(fwd["x-request-id"], "req-1");
    }
}
