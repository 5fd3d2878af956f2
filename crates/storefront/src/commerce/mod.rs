//! Commerce platform (Vendure) Shop and Admin API clients.
//!
//! # Architecture
//!
//! - GraphQL envelopes from `graphql_client`, HTTP via `reqwest` 0.13
//! - The platform owns the order state machine; every mutation returns either
//!   the updated order or an `ErrorResult` which becomes
//!   [`CommerceError::Rejected`]
//! - The Shop API session is a bearer token issued in a response header and
//!   persisted through [`crate::storage::LocalStore`]
//!
//! [`ShopApi`] and [`AdminApi`] are the seams the cart engine, checkout flow
//! and webhook reconciler depend on, so each can run against an in-memory
//! platform in tests.

mod admin;
mod client;
pub mod conversions;
pub mod queries;
mod transport;
pub mod types;

pub use admin::AdminClient;
pub use client::ShopClient;
pub use types::*;

use async_trait::async_trait;
use pineapple_checkout_core::{
    OrderCode, OrderId, OrderLineId, OrderState, ShippingMethodId, VariantId,
};
use thiserror::Error;

/// Error code the platform uses when a line mutation hits a non-`AddingItems` order.
pub const ORDER_MODIFICATION_ERROR: &str = "ORDER_MODIFICATION_ERROR";

/// Errors that can occur when talking to the commerce platform.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("commerce API returned HTTP {status}")]
    Status { status: u16, body: String },

    /// Rate limited by the platform.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Response carried neither data nor errors.
    #[error("commerce API response for {0} had no data")]
    MissingData(&'static str),

    /// GraphQL-level errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// The platform rejected the operation with an `ErrorResult`.
    ///
    /// Displays the platform's message verbatim so it can be shown to the
    /// customer.
    #[error("{}", .0.message)]
    Rejected(RemoteError),
}

impl CommerceError {
    /// Whether this is the "order may only be modified while in
    /// `AddingItems`" rejection that a reset can clear.
    #[must_use]
    pub fn is_wrong_state(&self) -> bool {
        match self {
            Self::Rejected(remote) => remote.is_wrong_state(),
            Self::GraphQL(errors) => errors
                .iter()
                .any(|e| is_wrong_state_message(&e.message)),
            _ => false,
        }
    }

    /// Whether the platform answered and refused, as opposed to the request
    /// never completing.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::GraphQL(_))
    }

    /// Whether the failure is in transport (network, HTTP status, rate limit).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Status { .. } | Self::RateLimited(_)
        )
    }

    /// The structured rejection, if this is one.
    #[must_use]
    pub const fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Rejected(remote) => Some(remote),
            _ => None,
        }
    }

    /// Build a [`Self::Rejected`] error.
    #[must_use]
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected(RemoteError {
            code: code.into(),
            message: message.into(),
        })
    }
}

/// An `ErrorResult` returned by a platform mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Machine-readable code, e.g. `ORDER_MODIFICATION_ERROR`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl RemoteError {
    #[must_use]
    pub fn is_wrong_state(&self) -> bool {
        self.code == ORDER_MODIFICATION_ERROR || is_wrong_state_message(&self.message)
    }
}

fn is_wrong_state_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("may only be modified") && message.contains("addingitems")
}

/// A GraphQL error returned by the platform.
#[derive(Debug, Clone)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// `extensions.code`, when present.
    pub code: Option<String>,
    /// Source locations in the query.
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    pub path: Vec<serde_json::Value>,
}

/// Location in a GraphQL query where an error occurred.
#[derive(Debug, Clone)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    if errors.is_empty() {
        return "(no error details provided)".to_string();
    }

    errors
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut parts = Vec::new();

            if let Some(code) = &e.code {
                parts.push(format!("[{code}]"));
            }

            if !e.message.is_empty() {
                parts.push(e.message.clone());
            }

            if !e.path.is_empty() {
                let path_str = e
                    .path
                    .iter()
                    .map(|p| match p {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(".");
                parts.push(format!("path: {path_str}"));
            }

            if let Some(loc) = e.locations.first() {
                parts.push(format!("at line {}:{}", loc.line, loc.column));
            }

            if parts.is_empty() {
                format!("[error {}]: (no details)", i + 1)
            } else {
                parts.join(" ")
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// API seams
// =============================================================================

/// Customer-session operations against the Shop API.
///
/// Every call that changes the order returns the order as the platform now
/// sees it. Line operations only accept platform-assigned [`OrderLineId`]s.
#[async_trait]
pub trait ShopApi: Send + Sync {
    /// The session's active order, if one exists.
    async fn active_order(&self) -> Result<Option<RemoteOrder>, CommerceError>;

    /// Add a variant to the active order, creating the order if needed.
    async fn add_item(
        &self,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<RemoteOrder, CommerceError>;

    /// Set the quantity of an existing line.
    async fn adjust_line(
        &self,
        line_id: &OrderLineId,
        quantity: u32,
    ) -> Result<RemoteOrder, CommerceError>;

    /// Remove a line.
    async fn remove_line(&self, line_id: &OrderLineId) -> Result<RemoteOrder, CommerceError>;

    /// Attach guest customer details to the active order.
    async fn set_customer(&self, input: &CustomerInput) -> Result<RemoteOrder, CommerceError>;

    /// Set the shipping address of the active order.
    async fn set_shipping_address(
        &self,
        input: &AddressInput,
    ) -> Result<RemoteOrder, CommerceError>;

    /// Shipping methods eligible for the active order, cheapest first.
    async fn eligible_shipping_methods(&self) -> Result<Vec<ShippingMethodQuote>, CommerceError>;

    /// Select a shipping method.
    async fn set_shipping_method(
        &self,
        id: &ShippingMethodId,
    ) -> Result<RemoteOrder, CommerceError>;

    /// Ask the platform to move the active order to `state`.
    async fn transition_state(&self, state: OrderState) -> Result<RemoteOrder, CommerceError>;

    /// Move the active order back to `AddingItems`.
    async fn reset_to_adding_items(&self) -> Result<RemoteOrder, CommerceError> {
        self.transition_state(OrderState::AddingItems).await
    }

    /// Create a payment intent for the active order and return its client
    /// secret.
    async fn create_payment_intent(&self) -> Result<String, CommerceError>;
}

/// Privileged operations against the Admin API, addressed by order.
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Look up an order by its public code.
    async fn order_by_code(&self, code: &OrderCode) -> Result<Option<RemoteOrder>, CommerceError>;

    /// Attach customer details to an order.
    async fn set_customer_for_order(
        &self,
        order_id: &OrderId,
        input: &CustomerInput,
    ) -> Result<RemoteOrder, CommerceError>;

    /// Set an order's shipping address.
    async fn set_shipping_address(
        &self,
        order_id: &OrderId,
        input: &AddressInput,
    ) -> Result<RemoteOrder, CommerceError>;

    /// Shipping methods eligible for an order, cheapest first.
    async fn eligible_shipping_methods(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<ShippingMethodQuote>, CommerceError>;

    /// Select a shipping method for an order.
    async fn set_shipping_method(
        &self,
        order_id: &OrderId,
        id: &ShippingMethodId,
    ) -> Result<RemoteOrder, CommerceError>;

    /// Move an order to `state`.
    async fn transition_state(
        &self,
        order_id: &OrderId,
        state: OrderState,
    ) -> Result<RemoteOrder, CommerceError>;

    /// Record a payment taken outside the platform.
    async fn add_manual_payment(
        &self,
        input: &ManualPaymentInput,
    ) -> Result<RemoteOrder, CommerceError>;
}
