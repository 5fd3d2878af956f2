//! Integration tests for the hosted checkout API.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use pineapple_checkout_core::{OrderCode, OrderState};
use pineapple_checkout_integration_tests::{Storefront, api_request};
use pineapple_checkout_storefront::test_utils::{ShopOp, paid_session};
use serde_json::json;

const CLIENT_IP: &str = "203.0.113.10";

#[tokio::test]
async fn test_hosted_checkout_round_trip() {
    let shop = Storefront::new();
    let code = shop
        .platform
        .seed_order(OrderState::AddingItems, &[("V1", 2)]);

    let (status, body) = shop
        .send(api_request(
            "POST",
            "/api/checkout/session",
            Some(&json!({ "order_code": code })),
            CLIENT_IP,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "cs_test_1");
    assert!(body["url"].as_str().unwrap().contains("cs_test_1"));

    let created = shop.processor.created();
    assert_eq!(created.len(), 1);
    let request = &created[0];
    assert_eq!(request.order_code, code);
    assert_eq!(request.line_items[0].name, "Pineapple Pouch - Large");
    assert_eq!(request.line_items[0].quantity, 2);
    assert_eq!(
        request.success_url,
        "https://shop.test/checkout/success?session_id={CHECKOUT_SESSION_ID}"
    );
    assert_eq!(request.cancel_url, "https://shop.test/checkout");

    // Paid on the hosted page; the webhook walks the order forward
    let (status, _) = shop.deliver_completed(&code, "pi_hosted").await;
    assert_eq!(status, StatusCode::OK);
    let order = shop.platform.order(&code).unwrap();
    assert_eq!(order.state, OrderState::PaymentSettled);
    assert_eq!(order.customer.unwrap().email_address, "jane@example.com");

    // A second attempt to pay is refused
    let (status, body) = shop
        .send(api_request(
            "POST",
            "/api/checkout/session",
            Some(&json!({ "order_code": code })),
            CLIENT_IP,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already paid"));
    assert_eq!(shop.processor.created().len(), 1);
}

#[tokio::test]
async fn test_session_for_unknown_order() {
    let shop = Storefront::new();
    let (status, _) = shop
        .send(api_request(
            "POST",
            "/api/checkout/session",
            Some(&json!({ "order_code": "NOPE" })),
            CLIENT_IP,
        ))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(shop.platform.count(ShopOp::OrderByCode), 1);
    assert!(shop.processor.created().is_empty());
}

#[tokio::test]
async fn test_session_for_empty_order() {
    let shop = Storefront::new();
    let code = shop.platform.seed_order(OrderState::AddingItems, &[]);

    let (status, body) = shop
        .send(api_request(
            "POST",
            "/api/checkout/session",
            Some(&json!({ "order_code": code })),
            CLIENT_IP,
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad request: Order is empty");
}

#[tokio::test]
async fn test_summary_is_redacted_and_cached() {
    let shop = Storefront::new();
    let session = paid_session(&OrderCode::new("NP000042"), "pi_secret_intent");
    let path = format!("/api/checkout/session/{}", session.id);
    shop.processor.insert_session(session);

    let (status, first) = shop.send(api_request("GET", &path, None, CLIENT_IP)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["order_code"], "NP000042");
    assert_eq!(first["email"], "j***@example.com");
    assert_eq!(first["customer_name"], "Jane D.");
    assert_eq!(first["shipping"]["city"], "Springfield");
    assert_eq!(first["amount_total"], 2299);

    let rendered = first.to_string();
    assert!(!rendered.contains("pi_secret_intent"));
    assert!(!rendered.contains("1 Main St"));

    let (status, second) = shop.send(api_request("GET", &path, None, CLIENT_IP)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, first);
    assert_eq!(shop.processor.retrievals(), 1);
}

#[tokio::test]
async fn test_open_session_summary_is_not_cached() {
    let shop = Storefront::new();
    let mut session = paid_session(&OrderCode::new("NP000043"), "pi_pending");
    session.status = Some("open".to_string());
    session.payment_status = Some("unpaid".to_string());
    let path = format!("/api/checkout/session/{}", session.id);
    shop.processor.insert_session(session.clone());

    let (status, first) = shop.send(api_request("GET", &path, None, CLIENT_IP)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["payment_status"], "unpaid");

    // Paid on the hosted page after the first look
    session.status = Some("complete".to_string());
    session.payment_status = Some("paid".to_string());
    shop.processor.insert_session(session);

    let (status, second) = shop.send(api_request("GET", &path, None, CLIENT_IP)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["payment_status"], "paid");
    assert_eq!(shop.processor.retrievals(), 2);

    shop.send(api_request("GET", &path, None, CLIENT_IP)).await;
    assert_eq!(shop.processor.retrievals(), 2);
}

#[tokio::test]
async fn test_summary_lookup_errors() {
    let shop = Storefront::new();

    let (status, _) = shop
        .send(api_request(
            "GET",
            "/api/checkout/session/not-a-session",
            None,
            CLIENT_IP,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = shop
        .send(api_request(
            "GET",
            "/api/checkout/session/cs_test_missing",
            None,
            CLIENT_IP,
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(shop.processor.retrievals(), 1);
}
