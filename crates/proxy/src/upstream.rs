//! `ANY /upstream/{endpoint}/{*path}` — forwards one call through the dispatcher.

use crate::{AppState, error::ApiError};
use axum::{
    Json,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method},
};
use bytes::Bytes;
use govbroker_dispatch::UpstreamCall;
use govbroker_types::{BrokerError, NormalizedResult};
use std::sync::Arc;

/// Request header naming the certificate identity to present.
pub const CERT_HINT_HEADER: &str = "x-cert-id";

/// Always answers 200 with the normalized envelope when a request was made;
/// upstream failures are reported inside it, broker failures as [`ApiError`].
pub async fn forward(
    State(state): State<Arc<AppState>>,
    Path((endpoint, path)): Path<(String, String)>,
    method: Method,
    RawQuery(raw_query): RawQuery,
    mut headers: HeaderMap,
    body: Bytes,
) -> Result<Json<NormalizedResult>, ApiError> {
    let query = match raw_query.as_deref() {
        Some(q) if !q.is_empty() => serde_urlencoded::from_str::<Vec<(String, String)>>(q)
            .map_err(|e| BrokerError::InvalidRequest(format!("query string: {e}")))?,
        _ => Vec::new(),
    };

    let cert_hint = headers
        .remove(CERT_HINT_HEADER)
        .map(|v| {
            v.to_str().map(str::to_string).map_err(|_| {
                BrokerError::InvalidRequest(format!("{CERT_HINT_HEADER} must be visible ASCII"))
            })
        })
        .transpose()?;

    let call = UpstreamCall::builder()
        .endpoint(endpoint)
        .method(method)
        .path(path)
        .query(query)
        .headers(headers)
        .maybe_body((!body.is_empty()).then_some(body))
        .maybe_cert_hint(cert_hint)
        .build();

    let result = state.dispatcher.dispatch(call).await?;
    Ok(Json(result))
}
