//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::commerce::CommerceError;
use crate::payment::PaymentError;
use crate::reconciler::WebhookError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Commerce platform operation failed.
    #[error("Commerce error: {0}")]
    Commerce(#[from] CommerceError),

    /// Payment processor operation failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Webhook processing failed.
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Commerce(_) => StatusCode::BAD_GATEWAY,
            Self::Payment(PaymentError::Signature(_)) => StatusCode::BAD_REQUEST,
            Self::Payment(PaymentError::Api { status: 404, .. }) | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::Webhook(WebhookError::MalformedSession { .. }) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Webhook(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Webhook(WebhookError::MalformedSession { .. }) => {
                "Invalid event payload".to_string()
            }
            Self::Webhook(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Payment(PaymentError::Signature(_)) => "Invalid signature".to_string(),
            Self::Commerce(_) | Self::Payment(_) if status == StatusCode::NOT_FOUND => {
                "Not found".to_string()
            }
            Self::Commerce(_) | Self::Payment(_) => "External service error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for a processing step.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of steps
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("webhook", "Verified event", Some(&[("event_id", "evt_123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
