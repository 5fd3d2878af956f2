//! Payment processor REST client for hosted checkout sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pineapple_checkout_core::{CheckoutSessionId, CurrencyCode, Money, OrderCode, PaymentIntentId};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::PaymentError;
use crate::config::StripeConfig;

/// Metadata key carrying the commerce order code on sessions and intents.
pub const ORDER_CODE_METADATA_KEY: &str = "order_code";

/// Server-side payment processor operations.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a hosted checkout session.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Fetch a checkout session with its line items, or `None` if the
    /// processor does not know it.
    async fn retrieve_session(
        &self,
        id: &CheckoutSessionId,
    ) -> Result<Option<CheckoutSession>, PaymentError>;
}

/// Whether `id` looks like a checkout session id (`cs_` + alphanumerics).
#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    id.strip_prefix("cs_").is_some_and(|rest| {
        !rest.is_empty()
            && rest.len() <= 255
            && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

// =============================================================================
// Requests
// =============================================================================

/// A priced line for a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_amount: Money,
    pub quantity: u32,
}

/// Parameters for a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub order_code: OrderCode,
    pub line_items: Vec<SessionLineItem>,
    pub currency: CurrencyCode,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub shipping_countries: Vec<String>,
}

impl CheckoutSessionRequest {
    /// Encode as the processor's bracketed form parameters.
    #[must_use]
    pub fn to_form(&self) -> Vec<(String, String)> {
        let code = self.order_code.to_string();
        let mut params = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            ("client_reference_id".to_string(), code.clone()),
            (format!("metadata[{ORDER_CODE_METADATA_KEY}]"), code.clone()),
            (
                format!("payment_intent_data[metadata][{ORDER_CODE_METADATA_KEY}]"),
                code,
            ),
        ];

        if let Some(email) = &self.customer_email {
            params.push(("customer_email".to_string(), email.clone()));
        }

        for (i, country) in self.shipping_countries.iter().enumerate() {
            params.push((
                format!("shipping_address_collection[allowed_countries][{i}]"),
                country.clone(),
            ));
        }

        let currency = self.currency.lower();
        for (i, item) in self.line_items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            params.push((
                format!("{prefix}[price_data][currency]"),
                currency.clone(),
            ));
            params.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
            params.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount.minor().to_string(),
            ));
            params.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        }

        params
    }
}

// =============================================================================
// Responses
// =============================================================================

/// A field the processor returns either as an id or as the expanded object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

/// A hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: CheckoutSessionId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<Expandable>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
    #[serde(default)]
    pub collected_information: Option<CollectedInformation>,
    #[serde(default)]
    pub line_items: Option<LineItemList>,
}

impl CheckoutSession {
    /// The commerce order this session pays for.
    #[must_use]
    pub fn order_code(&self) -> Option<OrderCode> {
        self.metadata
            .get(ORDER_CODE_METADATA_KEY)
            .or(self.client_reference_id.as_ref())
            .filter(|code| !code.is_empty())
            .map(OrderCode::new)
    }

    #[must_use]
    pub fn payment_intent_id(&self) -> Option<PaymentIntentId> {
        self.payment_intent
            .as_ref()
            .map(|intent| PaymentIntentId::new(intent.id()))
    }

    /// Transaction id to record against the order: the payment intent, or
    /// the session itself when no intent exists.
    #[must_use]
    pub fn transaction_id(&self) -> String {
        self.payment_intent_id()
            .map_or_else(|| self.id.to_string(), PaymentIntentId::into_inner)
    }

    /// Shipping details, wherever this API version put them.
    #[must_use]
    pub fn shipping(&self) -> Option<&ShippingDetails> {
        self.shipping_details.as_ref().or_else(|| {
            self.collected_information
                .as_ref()
                .and_then(|info| info.shipping_details.as_ref())
        })
    }

    /// Whether funds have been captured (or none were owed).
    #[must_use]
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid" | "no_payment_required")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ShippingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<StripeAddress>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StripeAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CollectedInformation {
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LineItemList {
    #[serde(default)]
    pub data: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub amount_total: i64,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

// =============================================================================
// StripeClient
// =============================================================================

/// REST client for the payment processor.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

impl StripeClient {
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            inner: Arc::new(StripeClientInner {
                client: reqwest::Client::new(),
                api_base: config.api_base.clone(),
                secret_key: config.secret_key.clone(),
            }),
        }
    }

    async fn parse_response(response: reqwest::Response) -> Result<CheckoutSession, PaymentError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body).map_or_else(
                |_| body.chars().take(200).collect(),
                |e| {
                    let kind = e.error.kind.unwrap_or_else(|| "api_error".to_string());
                    e.error
                        .message
                        .map_or_else(|| kind.clone(), |m| format!("{kind}: {m}"))
                },
            );
            tracing::error!(status = %status, message = %message, "Payment processor returned an error");
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    #[instrument(skip(self, request), fields(order_code = %request.order_code))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .inner
            .client
            .post(format!("{}/v1/checkout/sessions", self.inner.api_base))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .form(&request.to_form())
            .send()
            .await?;

        let session = Self::parse_response(response).await?;
        debug!(session_id = %session.id, "Created checkout session");
        Ok(session)
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn retrieve_session(
        &self,
        id: &CheckoutSessionId,
    ) -> Result<Option<CheckoutSession>, PaymentError> {
        let mut url = url::Url::parse(&format!(
            "{}/v1/checkout/sessions/{id}",
            self.inner.api_base
        ))
        .map_err(|e| PaymentError::Api {
            status: 0,
            message: format!("invalid processor URL: {e}"),
        })?;
        url.query_pairs_mut()
            .append_pair("expand[]", "line_items")
            .append_pair("expand[]", "payment_intent");

        let response = self
            .inner
            .client
            .get(url)
            .bearer_auth(self.inner.secret_key.expose_secret())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Self::parse_response(response).await.map(Some)
    }
}
