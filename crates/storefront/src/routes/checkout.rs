//! Hosted checkout session endpoints.

use axum::{
    Json,
    extract::{Path, State},
};
use pineapple_checkout_core::{CheckoutSessionId, Email, Money, OrderCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{AppError, Result};
use crate::payment::{CheckoutSession, CheckoutSessionRequest, SessionLineItem, is_valid_session_id};
use crate::state::AppState;

/// Body of `POST /api/checkout/session`.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub order_code: OrderCode,
}

/// Response of `POST /api/checkout/session`.
#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub id: CheckoutSessionId,
    pub url: Option<String>,
}

/// What a confirmation page may show about a checkout session.
///
/// Personal details are masked and no payment credential is ever included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub order_code: Option<OrderCode>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub email: Option<String>,
    pub customer_name: Option<String>,
    pub shipping: Option<ShippingSummary>,
    pub line_items: Vec<SummaryLine>,
    pub amount_total: Option<Money>,
    pub currency: Option<String>,
}

impl SessionSummary {
    /// Whether the session can no longer change: completed, paid or expired.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self.status.as_deref(), Some("complete" | "expired"))
            || self.payment_status.as_deref() == Some("paid")
    }
}

/// Destination without street lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingSummary {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryLine {
    pub description: String,
    pub quantity: u32,
    pub amount_total: Money,
}

impl From<&CheckoutSession> for SessionSummary {
    fn from(session: &CheckoutSession) -> Self {
        let customer = session.customer_details.as_ref();

        Self {
            order_code: session.order_code(),
            status: session.status.clone(),
            payment_status: session.payment_status.clone(),
            email: customer
                .and_then(|c| c.email.as_deref())
                .and_then(|e| Email::parse(e).ok())
                .map(|e| e.masked()),
            customer_name: customer
                .and_then(|c| c.name.as_deref())
                .and_then(mask_name),
            shipping: session
                .shipping()
                .and_then(|s| s.address.as_ref())
                .map(|a| ShippingSummary {
                    city: a.city.clone(),
                    state: a.state.clone(),
                    country: a.country.clone(),
                }),
            line_items: session
                .line_items
                .as_ref()
                .map(|list| {
                    list.data
                        .iter()
                        .map(|item| SummaryLine {
                            description: item.description.clone().unwrap_or_default(),
                            quantity: item.quantity.unwrap_or(1),
                            amount_total: Money::from_minor(item.amount_total),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            amount_total: session.amount_total.map(Money::from_minor),
            currency: session.currency.clone(),
        }
    }
}

/// "Jane Doe" becomes "Jane D.".
fn mask_name(name: &str) -> Option<String> {
    let mut parts = name.split_whitespace();
    let first = parts.next()?;
    Some(match parts.last().and_then(|last| last.chars().next()) {
        Some(initial) => format!("{first} {initial}."),
        None => first.to_string(),
    })
}

/// Create a hosted checkout session for an order.
///
/// # Errors
///
/// 404 if the order does not exist, 400 if it cannot be paid, 502 if the
/// platform or processor fails.
#[instrument(skip(state, request), fields(order_code = %request.order_code))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreatedSession>> {
    let order = state
        .admin()
        .order_by_code(&request.order_code)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {}", request.order_code)))?;

    if order.state.is_settled() {
        return Err(AppError::BadRequest("Order is already paid".to_string()));
    }
    if order.lines.is_empty() {
        return Err(AppError::BadRequest("Order is empty".to_string()));
    }

    let line_items = order
        .lines
        .iter()
        .map(|line| {
            let variant = &line.product_variant;
            let name = match &variant.product {
                Some(product) if product.name != variant.name => {
                    format!("{} - {}", product.name, variant.name)
                }
                _ => variant.name.clone(),
            };
            SessionLineItem {
                name,
                unit_amount: line.unit_price_with_tax,
                quantity: line.quantity,
            }
        })
        .collect();

    let config = state.config();
    let base_url = config.base_url.trim_end_matches('/');
    let session_request = CheckoutSessionRequest {
        order_code: order.code.clone(),
        line_items,
        currency: config.stripe.currency,
        customer_email: order.customer.as_ref().map(|c| c.email_address.clone()),
        success_url: format!("{base_url}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel_url: format!("{base_url}/checkout"),
        shipping_countries: config.stripe.shipping_countries.clone(),
    };

    let session = state
        .processor()
        .create_checkout_session(&session_request)
        .await?;
    info!(session_id = %session.id, "Created hosted checkout session");

    Ok(Json(CreatedSession {
        id: session.id,
        url: session.url,
    }))
}

/// Redacted summary of a checkout session for the confirmation page.
///
/// # Errors
///
/// 400 for a malformed id, 404 for an unknown session.
#[instrument(skip(state))]
pub async fn session_summary(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>> {
    if !is_valid_session_id(&session_id) {
        return Err(AppError::BadRequest("Invalid session id".to_string()));
    }
    let session_id = CheckoutSessionId::new(session_id);

    if let Some(summary) = state.summaries().get(&session_id).await {
        debug!("Session summary cache hit");
        return Ok(Json(summary));
    }

    let session = state
        .processor()
        .retrieve_session(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?;

    let summary = SessionSummary::from(&session);
    // An open session can still change; only settled answers are reused
    if summary.is_final() {
        state
            .summaries()
            .insert(session_id, summary.clone())
            .await;
    }

    Ok(Json(summary))
}
