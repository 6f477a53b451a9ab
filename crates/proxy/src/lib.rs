//! HTTP proxy layer — axum router, route handlers, and error mapping.
//!
//! Exposes the dispatcher under `/upstream/{endpoint}/{*path}`, plus a
//! read-only view of the endpoint policies and a liveness check.

mod error;
mod upstream;

pub use error::ApiError;
pub use upstream::CERT_HINT_HEADER;

use axum::{
    Json, Router,
    extract::State,
    routing::{any, get},
};
use govbroker_dispatch::Dispatcher;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Owns the policy table, credential store and token cache.
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Creates a new shared application state wrapped in an `Arc`.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        Arc::new(Self { dispatcher })
    }
}

/// Build the full axum router.
///
/// Routes:
/// - ANY /upstream/{endpoint}/{*path}   dispatch through the named policy
/// - GET /v0/policies                   configured endpoint policies
/// - GET /health                        liveness
pub fn make_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/upstream/{endpoint}/{*path}", any(upstream::forward))
        .route("/v0/policies", get(list_policies))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn list_policies(State(state): State<Arc<AppState>>) -> Json<Value> {
    let policies: serde_json::Map<String, Value> = state
        .dispatcher
        .policies()
        .iter()
        .map(|(id, policy)| {
            (
                id.clone(),
                serde_json::to_value(policy).unwrap_or_default(),
            )
        })
        .collect();
    Json(json!({ "policies": policies }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
