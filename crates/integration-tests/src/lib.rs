//! Integration tests for Naked Pineapple Checkout.
//!
//! Every test runs the real cart engine, checkout flow, webhook reconciler
//! and HTTP router against one in-memory commerce platform, so a payment
//! recorded by a webhook is visible to the customer's session the way it is
//! in production.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p pineapple-checkout-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_persistence` - Carts surviving reloads and expired sessions
//! - `checkout_journey` - Contact to confirmation, with webhooks racing the customer
//! - `checkout_api` - Hosted checkout sessions and confirmation summaries

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use pineapple_checkout_core::OrderCode;
use pineapple_checkout_storefront::cart::CartEngine;
use pineapple_checkout_storefront::checkout::{CheckoutFlow, SettlementPoller};
use pineapple_checkout_storefront::payment::webhook::{SIGNATURE_HEADER, signature_header};
use pineapple_checkout_storefront::routes;
use pineapple_checkout_storefront::state::AppState;
use pineapple_checkout_storefront::storage::{LocalStore, MemoryStore};
use pineapple_checkout_storefront::test_utils::{
    FakeElements, FakePlatform, FakeProcessor, InstantSleeper, WEBHOOK_SECRET,
    completed_event_json, test_config,
};
use serde_json::Value;
use tower::ServiceExt;

/// One customer's browser plus the server, sharing a platform.
pub struct Storefront {
    pub platform: Arc<FakePlatform>,
    pub elements: Arc<FakeElements>,
    pub processor: Arc<FakeProcessor>,
    pub cart: Arc<CartEngine>,
    pub checkout: Arc<CheckoutFlow>,
    app: Router,
}

impl Default for Storefront {
    fn default() -> Self {
        Self::new()
    }
}

impl Storefront {
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// A storefront whose cart persists to `store`.
    #[must_use]
    pub fn with_store(store: Arc<dyn LocalStore>) -> Self {
        let platform = Arc::new(FakePlatform::new());
        let elements = Arc::new(FakeElements::new());
        let processor = Arc::new(FakeProcessor::new());

        let cart = Arc::new(CartEngine::new(platform.shop(), store));
        let checkout = Arc::new(CheckoutFlow::new(
            platform.shop(),
            elements.clone(),
            cart.clone(),
            SettlementPoller::new(Arc::new(InstantSleeper::new())),
        ));
        let app = routes::app(AppState::from_parts(
            test_config(),
            platform.admin(),
            processor.clone(),
        ));

        Self {
            platform,
            elements,
            processor,
            cart,
            checkout,
            app,
        }
    }

    /// Send a request through the full middleware stack.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    /// Deliver a signed `checkout.session.completed` for `order_code`.
    pub async fn deliver_completed(
        &self,
        order_code: &OrderCode,
        payment_intent: &str,
    ) -> (StatusCode, Value) {
        let payload = completed_event_json(order_code, payment_intent);
        let signature = signature_header(
            WEBHOOK_SECRET,
            chrono::Utc::now().timestamp(),
            payload.as_bytes(),
        );
        let request = Request::post("/webhooks/stripe")
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(payload))
            .unwrap();
        self.send(request).await
    }
}

/// A request to the rate-limited checkout API from `client_ip`.
#[must_use]
pub fn api_request(
    method: &str,
    uri: &str,
    body: Option<&Value>,
    client_ip: &str,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", client_ip);

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
