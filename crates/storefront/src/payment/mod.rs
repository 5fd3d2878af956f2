//! Payment processor (Stripe) integration.
//!
//! # Components
//!
//! - [`PaymentClient`] owns the single checkout widget container and drives
//!   the embedded address and payment widgets through [`PaymentElements`]
//! - [`StripeClient`] talks to the processor's REST API for hosted checkout
//!   sessions (behind the [`PaymentProcessor`] seam)
//! - [`webhook`] verifies signed webhook deliveries

mod elements;
mod stripe;
pub mod webhook;

pub use elements::{
    CollectedAddress, ConfirmOutcome, PaymentClient, PaymentElements, WidgetHandle, WidgetKind,
};
pub use stripe::{
    CheckoutSession, CheckoutSessionRequest, CollectedInformation, CustomerDetails, Expandable,
    LineItem, LineItemList, ORDER_CODE_METADATA_KEY, PaymentProcessor, SessionLineItem,
    ShippingDetails, StripeAddress, StripeClient, is_valid_session_id,
};
pub use webhook::{SignatureError, StripeEvent};

use thiserror::Error;

/// Errors from the payment processor or its widgets.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The single widget container already holds a widget.
    #[error("the checkout container already holds the {0} widget")]
    ContainerOccupied(WidgetKind),

    /// The operation needs a widget that is not mounted.
    #[error("no {0} widget is mounted")]
    NotMounted(WidgetKind),

    /// The widget library reported an error.
    #[error("payment widget error: {0}")]
    Widget(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor API returned an error response.
    #[error("payment processor returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Webhook signature verification failed.
    #[error("invalid webhook signature: {0}")]
    Signature(#[from] SignatureError),
}
