//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness check
//! GET  /health/ready                        - Readiness check (commerce platform)
//!
//! # Webhooks
//! POST /webhooks/stripe                     - Signed processor events
//!
//! # Checkout API (rate limited)
//! POST /api/checkout/session                - Create a hosted checkout session
//! GET  /api/checkout/session/{session_id}   - Redacted session summary
//! ```

pub mod checkout;
pub mod health;
pub mod webhooks;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::middleware::{
    request_id_middleware, session_create_rate_limiter, session_lookup_rate_limiter,
};
use crate::state::AppState;

/// Create the checkout API routes router.
///
/// Requests must carry a client IP header for the rate limiters to key on.
pub fn checkout_routes() -> Router<AppState> {
    let create = Router::new()
        .route("/session", post(checkout::create_session))
        .layer(session_create_rate_limiter());

    let lookup = Router::new()
        .route("/session/{session_id}", get(checkout::session_summary))
        .layer(session_lookup_rate_limiter());

    create.merge(lookup)
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/webhooks/stripe", post(webhooks::stripe))
        .nest("/api/checkout", checkout_routes())
}

/// The complete application with middleware, ready to serve.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use pineapple_checkout_core::{OrderCode, OrderState};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::commerce::CommerceError;
    use crate::payment::webhook::{SIGNATURE_HEADER, signature_header};
    use crate::test_utils::{
        FakePlatform, FakeProcessor, ShopOp, WEBHOOK_SECRET, completed_event_json, test_config,
    };

    fn test_app(platform: &FakePlatform) -> Router {
        let state = AppState::from_parts(
            test_config(),
            platform.admin(),
            Arc::new(FakeProcessor::new()),
        );
        app(state)
    }

    fn webhook(payload: &str, signature: Option<String>) -> Request<Body> {
        let mut builder =
            Request::post("/webhooks/stripe").header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(payload.to_string())).unwrap()
    }

    fn signed(payload: &str) -> Option<String> {
        Some(signature_header(
            WEBHOOK_SECRET,
            chrono::Utc::now().timestamp(),
            payload.as_bytes(),
        ))
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app(&FakePlatform::new())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn test_readiness_reports_platform_outage() {
        let platform = FakePlatform::new();
        platform.fail_next(
            ShopOp::OrderByCode,
            CommerceError::Status {
                status: 503,
                body: String::new(),
            },
        );

        let response = test_app(&platform)
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_signed_webhook_records_payment() {
        let platform = FakePlatform::new();
        let code = platform.seed_order(OrderState::ArrangingPayment, &[("V1", 1)]);
        let payload = completed_event_json(&code, "pi_123");

        let response = test_app(&platform)
            .oneshot(webhook(&payload, signed(&payload)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap())
                .unwrap();
        assert_eq!(body, serde_json::json!({ "received": true }));
        assert_eq!(
            platform.order(&code).unwrap().state,
            OrderState::PaymentSettled
        );
    }

    #[tokio::test]
    async fn test_unsigned_webhook_is_rejected() {
        let platform = FakePlatform::new();
        let payload = completed_event_json(&OrderCode::new("NP000001"), "pi_123");

        let response = test_app(&platform)
            .oneshot(webhook(&payload, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(platform.count(ShopOp::OrderByCode), 0);
    }

    #[tokio::test]
    async fn test_webhook_signed_with_another_secret_is_rejected() {
        let platform = FakePlatform::new();
        let payload = completed_event_json(&OrderCode::new("NP000001"), "pi_123");
        let forged = signature_header(
            "whsec_someone_else",
            chrono::Utc::now().timestamp(),
            payload.as_bytes(),
        );

        let response = test_app(&platform)
            .oneshot(webhook(&payload, Some(forged)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(platform.count(ShopOp::OrderByCode), 0);
    }

    #[tokio::test]
    async fn test_signed_garbage_is_a_bad_request() {
        let payload = "not json";
        let response = test_app(&FakePlatform::new())
            .oneshot(webhook(payload, signed(payload)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_lookup_failure_asks_for_redelivery() {
        let platform = FakePlatform::new();
        let code = platform.seed_order(OrderState::ArrangingPayment, &[("V1", 1)]);
        platform.fail_next(
            ShopOp::OrderByCode,
            CommerceError::Status {
                status: 502,
                body: String::new(),
            },
        );
        let payload = completed_event_json(&code, "pi_123");

        let response = test_app(&platform)
            .oneshot(webhook(&payload, signed(&payload)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap())
                .unwrap();
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_signed_event_with_malformed_session_is_a_bad_request() {
        let platform = FakePlatform::new();
        let payload = serde_json::json!({
            "id": "evt_test_2",
            "object": "event",
            "type": crate::payment::webhook::CHECKOUT_SESSION_COMPLETED,
            "created": 1_760_000_000,
            "livemode": false,
            "data": {"object": {"object": "checkout.session", "amount_total": "oops"}}
        })
        .to_string();

        let response = test_app(&platform)
            .oneshot(webhook(&payload, signed(&payload)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap())
                .unwrap();
        assert_eq!(body["error"], "Invalid event payload");
        assert_eq!(platform.count(ShopOp::OrderByCode), 0);
    }
}
