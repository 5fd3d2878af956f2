//! Integration tests for a customer checking out while the processor's
//! webhook reports the same payment to the server.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use pineapple_checkout_core::{CheckoutStep, Money, OrderCode, OrderState, VariantId};
use pineapple_checkout_integration_tests::Storefront;
use pineapple_checkout_storefront::checkout::PaymentOutcome;
use pineapple_checkout_storefront::test_utils::{ShopOp, jane, pouch, sample_address};
use serde_json::json;

const RETURN_URL: &str = "https://shop.test/checkout/complete";

/// Fill the cart and walk checkout to the payment step.
async fn reach_payment(shop: &Storefront) -> OrderCode {
    shop.cart
        .add(&VariantId::new("V1"), 1, &pouch(1799))
        .await
        .unwrap();

    shop.checkout.begin();
    shop.checkout.submit_contact(jane()).await.unwrap();
    shop.elements.fill_address(sample_address());
    shop.checkout.submit_shipping().await.unwrap();

    let state = shop.checkout.state().unwrap();
    assert_eq!(state.step, CheckoutStep::Payment);
    state.order_code.unwrap()
}

#[tokio::test]
async fn test_webhook_settles_before_customer_confirms() {
    let shop = Storefront::new();
    let code = reach_payment(&shop).await;
    assert_eq!(
        shop.platform.active_state(),
        Some(OrderState::ArrangingPayment)
    );

    let (status, body) = shop.deliver_completed(&code, "pi_123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
    assert_eq!(
        shop.platform.order(&code).unwrap().state,
        OrderState::PaymentSettled
    );

    let outcome = shop.checkout.submit_payment(RETURN_URL).await.unwrap();
    assert_eq!(
        outcome,
        PaymentOutcome::Confirmed {
            order_code: Some(code.clone()),
            settlement_observed: true,
        }
    );
    assert_eq!(shop.checkout.state().unwrap().step, CheckoutStep::Confirmed);
    assert!(shop.cart.snapshot().is_empty());
    assert_eq!(shop.elements.mounted_count(), 0);

    // The processor retries; nothing is recorded twice
    let (status, _) = shop.deliver_completed(&code, "pi_123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shop.platform.count(ShopOp::AddManualPayment), 1);
    assert_eq!(shop.platform.order(&code).unwrap().payments.len(), 1);
}

#[tokio::test]
async fn test_customer_confirms_before_webhook_arrives() {
    let shop = Storefront::new();
    let code = reach_payment(&shop).await;

    let outcome = shop.checkout.submit_payment(RETURN_URL).await.unwrap();
    assert_eq!(
        outcome,
        PaymentOutcome::Confirmed {
            order_code: Some(code.clone()),
            settlement_observed: false,
        }
    );
    assert_eq!(
        shop.platform.order(&code).unwrap().state,
        OrderState::ArrangingPayment
    );

    let (status, _) = shop.deliver_completed(&code, "pi_123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        shop.platform.order(&code).unwrap().state,
        OrderState::PaymentSettled
    );

    // The next purchase starts a new order
    shop.cart
        .add(&VariantId::new("V2"), 1, &pouch(250))
        .await
        .unwrap();
    assert_eq!(shop.cart.snapshot().total(), Money::from_minor(250));
    assert_eq!(shop.platform.active_state(), Some(OrderState::AddingItems));
    assert_eq!(shop.platform.order(&code).unwrap().lines.len(), 1);
}

#[tokio::test]
async fn test_cart_edit_after_leaving_payment() {
    let shop = Storefront::new();
    let code = reach_payment(&shop).await;

    assert_eq!(shop.checkout.back().await.unwrap(), CheckoutStep::Shipping);
    assert_eq!(shop.platform.active_state(), Some(OrderState::AddingItems));

    let line = shop.cart.snapshot().items().first().unwrap().id().clone();
    shop.cart.update_quantity(&line, 3).await.unwrap();
    assert_eq!(shop.cart.snapshot().total(), Money::from_minor(3 * 1799));

    shop.checkout.submit_shipping().await.unwrap();
    let state = shop.checkout.state().unwrap();
    assert_eq!(state.step, CheckoutStep::Payment);
    assert_eq!(state.order_code, Some(code));
    assert_eq!(shop.platform.count(ShopOp::CreatePaymentIntent), 2);
}

#[tokio::test]
async fn test_cart_edit_during_payment_unlocks_order() {
    let shop = Storefront::new();
    reach_payment(&shop).await;

    // The customer edits the cart in another tab while the order is locked
    shop.cart
        .add(&VariantId::new("V3"), 1, &pouch(999))
        .await
        .unwrap();

    assert_eq!(shop.platform.active_state(), Some(OrderState::AddingItems));
    assert_eq!(shop.platform.count(ShopOp::ResetToAddingItems), 1);
    assert_eq!(shop.cart.snapshot().total(), Money::from_minor(1799 + 999));
}
