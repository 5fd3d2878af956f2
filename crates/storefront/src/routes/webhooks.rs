//! Payment processor webhooks.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::info;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::payment::webhook::{SIGNATURE_HEADER, verify_signature};
use crate::payment::{PaymentError, SignatureError, StripeEvent};
use crate::state::AppState;

/// `POST /webhooks/stripe`
///
/// Verifies the delivery's signature against the raw body, then hands the
/// event to the reconciler. Anything acknowledged gets `{"received": true}`;
/// a 500 makes the processor redeliver.
///
/// # Errors
///
/// 400 for a missing or invalid signature or an unparsable payload
/// (including a session object that does not parse), 500 if reconciliation
/// failed in a way a redelivery could fix.
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(PaymentError::Signature(SignatureError::MissingHeader))?;

    verify_signature(
        state.webhook_secret().expose_secret(),
        &body,
        signature,
        chrono::Utc::now().timestamp(),
    )
    .map_err(PaymentError::from)?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid event payload: {e}")))?;

    add_breadcrumb(
        "webhook",
        "Verified event",
        Some(&[
            ("event_id", event.id.as_str()),
            ("event_type", event.event_type.as_str()),
        ]),
    );

    let outcome = state.reconciler().handle_event(&event).await?;
    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        outcome = ?outcome,
        "Webhook processed"
    );

    Ok(Json(json!({ "received": true })))
}
