//! Server-side payment reconciliation.
//!
//! When the processor reports a completed checkout session, the order it
//! paid for may still be sitting in `AddingItems` (the customer paid on the
//! hosted page without going through the embedded checkout), and in any case
//! the platform does not know about the payment. The reconciler walks the
//! order forward with the Admin API and records the payment against it.
//!
//! Deliveries are at-least-once, so every step tolerates having already
//! happened.

use std::sync::Arc;

use pineapple_checkout_core::{OrderCode, OrderState};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::commerce::{AddressInput, AdminApi, CommerceError, CustomerInput, ManualPaymentInput, RemoteOrder};
use crate::payment::webhook::{CHECKOUT_SESSION_ASYNC_PAYMENT_SUCCEEDED, CHECKOUT_SESSION_COMPLETED};
use crate::payment::{CheckoutSession, StripeEvent};

/// Payment method name recorded on the order.
pub const PAYMENT_METHOD: &str = "stripe";

/// Errors from reconciling a verified event.
///
/// All but [`WebhookError::MalformedSession`] should make the processor retry
/// the delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The event's object is not a checkout session. Redelivering the same
    /// body cannot fix this.
    #[error("malformed checkout session in event {event_id}: {source}")]
    MalformedSession {
        event_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The order could not be looked up.
    #[error("order lookup failed for {order_code}: {source}")]
    Lookup {
        order_code: OrderCode,
        #[source]
        source: CommerceError,
    },

    /// Recording the payment failed in transport.
    #[error("recording payment for {order_code} failed: {source}")]
    RecordPayment {
        order_code: OrderCode,
        #[source]
        source: CommerceError,
    },
}

/// What the reconciler did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Event type the reconciler does not handle.
    Ignored,
    /// Session completed but funds are not captured yet; a later
    /// `async_payment_succeeded` event finishes it.
    AwaitingPayment,
    /// The session carried no order code, or the order does not exist.
    OrderNotFound,
    /// The payment is now recorded on the order.
    Recorded { order_code: OrderCode },
    /// This delivery was a duplicate.
    PaymentAlreadyRecorded { order_code: OrderCode },
    /// The platform refused the payment for another reason.
    PaymentRejected {
        order_code: OrderCode,
        reason: String,
    },
}

/// Reconciles processor events into the commerce platform.
#[derive(Clone)]
pub struct WebhookReconciler {
    admin: Arc<dyn AdminApi>,
}

impl WebhookReconciler {
    #[must_use]
    pub fn new(admin: Arc<dyn AdminApi>) -> Self {
        Self { admin }
    }

    /// Handle a verified event.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures a redelivery could fix.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn handle_event(&self, event: &StripeEvent) -> Result<ReconcileOutcome, WebhookError> {
        let event_type = event.event_type.as_str();
        if event_type != CHECKOUT_SESSION_COMPLETED
            && event_type != CHECKOUT_SESSION_ASYNC_PAYMENT_SUCCEEDED
        {
            info!("Ignoring unhandled event type");
            return Ok(ReconcileOutcome::Ignored);
        }

        let session = event
            .checkout_session()
            .map_err(|source| WebhookError::MalformedSession {
                event_id: event.id.clone(),
                source,
            })?;

        if !session.is_paid() {
            info!(
                session_id = %session.id,
                payment_status = ?session.payment_status,
                "Checkout session completed without captured funds"
            );
            return Ok(ReconcileOutcome::AwaitingPayment);
        }

        self.reconcile_session(&session).await
    }

    /// Bring the session's order up to date and record its payment.
    ///
    /// # Errors
    ///
    /// Returns an error if the order lookup or the payment call fails in
    /// transport.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn reconcile_session(
        &self,
        session: &CheckoutSession,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let Some(order_code) = session.order_code() else {
            error!("Checkout session has no order code");
            sentry::capture_message(
                &format!("Checkout session {} has no order code", session.id),
                sentry::Level::Error,
            );
            return Ok(ReconcileOutcome::OrderNotFound);
        };

        let order = self
            .admin
            .order_by_code(&order_code)
            .await
            .map_err(|source| WebhookError::Lookup {
                order_code: order_code.clone(),
                source,
            })?;

        let Some(order) = order else {
            error!(order_code = %order_code, "Paid checkout session references unknown order");
            sentry::capture_message(
                &format!(
                    "Checkout session {} references unknown order {order_code}",
                    session.id
                ),
                sentry::Level::Error,
            );
            return Ok(ReconcileOutcome::OrderNotFound);
        };

        let transaction_id = session.transaction_id();
        if order.has_payment(&transaction_id) {
            info!(order_code = %order_code, transaction_id, "Payment already recorded");
            return Ok(ReconcileOutcome::PaymentAlreadyRecorded { order_code });
        }

        let order = if order.state == OrderState::AddingItems {
            self.prepare_order(order, session).await
        } else {
            order
        };

        self.record_payment(&order, session, transaction_id).await
    }

    /// Walk an order still in `AddingItems` to `ArrangingPayment`. Every step
    /// is best effort.
    async fn prepare_order(&self, mut order: RemoteOrder, session: &CheckoutSession) -> RemoteOrder {
        info!(order_code = %order.code, "Preparing order left in AddingItems");

        if let Some(input) = customer_input(session) {
            match self.admin.set_customer_for_order(&order.id, &input).await {
                Ok(updated) => order = updated,
                Err(e) => warn!(order_code = %order.code, error = %e, "Failed to set customer"),
            }
        }

        if let Some(input) = address_input(session) {
            match self.admin.set_shipping_address(&order.id, &input).await {
                Ok(updated) => order = updated,
                Err(e) => {
                    warn!(order_code = %order.code, error = %e, "Failed to set shipping address");
                }
            }
        }

        match self.admin.eligible_shipping_methods(&order.id).await {
            Ok(methods) => match methods.first() {
                Some(method) => {
                    match self.admin.set_shipping_method(&order.id, &method.id).await {
                        Ok(updated) => order = updated,
                        Err(e) => {
                            warn!(order_code = %order.code, error = %e, "Failed to set shipping method");
                        }
                    }
                }
                None => warn!(order_code = %order.code, "No eligible shipping methods"),
            },
            Err(e) => warn!(order_code = %order.code, error = %e, "Failed to fetch shipping methods"),
        }

        match self
            .admin
            .transition_state(&order.id, OrderState::ArrangingPayment)
            .await
        {
            Ok(updated) => order = updated,
            Err(e) => {
                warn!(order_code = %order.code, error = %e, "Failed to transition to ArrangingPayment");
            }
        }

        order
    }

    async fn record_payment(
        &self,
        order: &RemoteOrder,
        session: &CheckoutSession,
        transaction_id: String,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let order_code = order.code.clone();
        let input = ManualPaymentInput {
            order_id: order.id.clone(),
            method: PAYMENT_METHOD.to_string(),
            transaction_id: transaction_id.clone(),
            metadata: json!({
                "sessionId": session.id,
                "amount": session.amount_total,
            }),
        };

        match self.admin.add_manual_payment(&input).await {
            Ok(order) => {
                info!(
                    order_code = %order_code,
                    transaction_id,
                    state = %order.state,
                    "Recorded payment"
                );
                Ok(ReconcileOutcome::Recorded { order_code })
            }
            Err(e) if e.is_rejection() && order.state.is_settled() => {
                info!(order_code = %order_code, error = %e, "Order already settled, duplicate delivery");
                Ok(ReconcileOutcome::PaymentAlreadyRecorded { order_code })
            }
            Err(e) if e.is_rejection() => {
                warn!(
                    order_code = %order_code,
                    state = %order.state,
                    error = %e,
                    "Platform refused payment"
                );
                Ok(ReconcileOutcome::PaymentRejected {
                    order_code,
                    reason: e.to_string(),
                })
            }
            Err(source) => Err(WebhookError::RecordPayment { order_code, source }),
        }
    }
}

fn customer_input(session: &CheckoutSession) -> Option<CustomerInput> {
    let details = session.customer_details.as_ref()?;
    let email = details.email.clone().filter(|e| !e.trim().is_empty())?;
    let name = details
        .name
        .clone()
        .or_else(|| session.shipping().and_then(|s| s.name.clone()))
        .unwrap_or_default();
    let (first_name, last_name) = split_name(&name);

    Some(CustomerInput {
        first_name,
        last_name,
        email_address: email,
    })
}

fn address_input(session: &CheckoutSession) -> Option<AddressInput> {
    let shipping = session.shipping()?;
    let address = shipping.address.as_ref()?;
    let street_line1 = address.line1.clone().filter(|l| !l.is_empty())?;

    Some(AddressInput {
        full_name: shipping
            .name
            .clone()
            .or_else(|| session.customer_details.as_ref().and_then(|c| c.name.clone()))
            .unwrap_or_default(),
        street_line1,
        street_line2: address.line2.clone().filter(|l| !l.is_empty()),
        city: address.city.clone().unwrap_or_default(),
        province: address.state.clone().filter(|s| !s.is_empty()),
        postal_code: address.postal_code.clone().unwrap_or_default(),
        country_code: address
            .country
            .clone()
            .unwrap_or_default()
            .to_ascii_uppercase(),
        phone_number: session
            .customer_details
            .as_ref()
            .and_then(|c| c.phone.clone())
            .filter(|p| !p.is_empty()),
    })
}

/// First word is the first name; the rest is the last name.
fn split_name(name: &str) -> (String, String) {
    let name = name.trim();
    match name.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}
