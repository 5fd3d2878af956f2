//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use pineapple_checkout_core::CheckoutSessionId;
use secrecy::SecretString;

use crate::commerce::{AdminApi, AdminClient};
use crate::config::StorefrontConfig;
use crate::payment::{PaymentProcessor, StripeClient};
use crate::reconciler::WebhookReconciler;
use crate::routes::checkout::SessionSummary;

/// How long a session summary is served from cache.
pub const SUMMARY_TTL: Duration = Duration::from_secs(300);

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// platform and processor clients and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    admin: Arc<dyn AdminApi>,
    processor: Arc<dyn PaymentProcessor>,
    reconciler: WebhookReconciler,
    summaries: Cache<CheckoutSessionId, SessionSummary>,
}

impl AppState {
    /// Create the application state with live platform and processor clients.
    #[must_use]
    pub fn new(config: StorefrontConfig) -> Self {
        let admin: Arc<dyn AdminApi> = Arc::new(AdminClient::new(&config.commerce));
        let processor: Arc<dyn PaymentProcessor> = Arc::new(StripeClient::new(&config.stripe));
        Self::from_parts(config, admin, processor)
    }

    /// Create the application state around existing clients.
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        admin: Arc<dyn AdminApi>,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let summaries = Cache::builder()
            .max_capacity(1000)
            .time_to_live(SUMMARY_TTL)
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                reconciler: WebhookReconciler::new(admin.clone()),
                config,
                admin,
                processor,
                summaries,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The commerce platform's Admin API.
    #[must_use]
    pub fn admin(&self) -> &dyn AdminApi {
        self.inner.admin.as_ref()
    }

    /// The payment processor.
    #[must_use]
    pub fn processor(&self) -> &dyn PaymentProcessor {
        self.inner.processor.as_ref()
    }

    #[must_use]
    pub fn reconciler(&self) -> &WebhookReconciler {
        &self.inner.reconciler
    }

    /// Webhook signing secret.
    #[must_use]
    pub fn webhook_secret(&self) -> &SecretString {
        &self.inner.config.stripe.webhook_secret
    }

    /// Cached session summaries.
    #[must_use]
    pub fn summaries(&self) -> &Cache<CheckoutSessionId, SessionSummary> {
        &self.inner.summaries
    }
}
