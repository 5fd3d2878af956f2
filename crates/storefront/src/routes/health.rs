//! Health checks.

use axum::{extract::State, http::StatusCode};
use pineapple_checkout_core::OrderCode;

use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies the commerce platform's Admin API answers an order lookup.
/// Returns 503 Service Unavailable if it does not.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state
        .admin()
        .order_by_code(&OrderCode::new("readiness-check"))
        .await
    {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
