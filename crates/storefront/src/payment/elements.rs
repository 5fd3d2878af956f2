//! Embedded checkout widgets.
//!
//! The checkout page has exactly one widget container. It holds the address
//! widget during the shipping step and the payment widget during the payment
//! step, never both. [`PaymentClient`] enforces that by refusing to mount
//! into an occupied container.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::PaymentError;
use crate::commerce::AddressInput;

/// Reason reported when the widget library fails a payment without one.
const DEFAULT_FAILURE_REASON: &str = "Payment failed";

/// The two widgets the container can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Address,
    Payment,
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address => write!(f, "address"),
            Self::Payment => write!(f, "payment"),
        }
    }
}

/// Opaque handle to a mounted widget.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WidgetHandle(String);

impl WidgetHandle {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A shipping address collected by the address widget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedAddress {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl From<&CollectedAddress> for AddressInput {
    fn from(address: &CollectedAddress) -> Self {
        Self {
            full_name: address.name.clone(),
            street_line1: address.line1.clone(),
            street_line2: address.line2.clone().filter(|s| !s.is_empty()),
            city: address.city.clone(),
            province: address.state.clone().filter(|s| !s.is_empty()),
            postal_code: address.postal_code.clone(),
            country_code: address.country.to_ascii_uppercase(),
            phone_number: address.phone.clone().filter(|s| !s.is_empty()),
        }
    }
}

/// Result of confirming a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The processor accepted the payment.
    Succeeded { status: Option<String> },
    /// The customer is being sent elsewhere (3-D Secure, bank redirect) and
    /// will come back to the return URL.
    RequiresRedirect,
    /// The payment was declined or errored.
    Failed { reason: String },
}

/// The processor's embedded widget library.
#[async_trait]
pub trait PaymentElements: Send + Sync {
    /// Mount the address widget, prefilled with the customer's name.
    async fn mount_address(&self, prefill_name: &str) -> Result<WidgetHandle, PaymentError>;

    /// The address entered so far, or `None` if the form is incomplete.
    async fn read_address(
        &self,
        widget: &WidgetHandle,
    ) -> Result<Option<CollectedAddress>, PaymentError>;

    /// Mount the payment widget bound to a payment intent's client secret.
    async fn mount_payment(&self, client_secret: &SecretString)
    -> Result<WidgetHandle, PaymentError>;

    /// Confirm the payment entered in the widget.
    async fn confirm_payment(
        &self,
        widget: &WidgetHandle,
        client_secret: &SecretString,
        return_url: &str,
    ) -> Result<ConfirmOutcome, PaymentError>;

    /// Remove a widget from the container.
    async fn unmount(&self, widget: &WidgetHandle) -> Result<(), PaymentError>;
}

enum Container {
    Empty,
    Address(WidgetHandle),
    Payment {
        widget: WidgetHandle,
        client_secret: SecretString,
    },
}

impl Container {
    const fn kind(&self) -> Option<WidgetKind> {
        match self {
            Self::Empty => None,
            Self::Address(_) => Some(WidgetKind::Address),
            Self::Payment { .. } => Some(WidgetKind::Payment),
        }
    }
}

/// Drives the checkout widget container.
pub struct PaymentClient {
    elements: Arc<dyn PaymentElements>,
    container: Mutex<Container>,
}

impl PaymentClient {
    #[must_use]
    pub fn new(elements: Arc<dyn PaymentElements>) -> Self {
        Self {
            elements,
            container: Mutex::new(Container::Empty),
        }
    }

    /// Which widget currently occupies the container.
    pub async fn mounted(&self) -> Option<WidgetKind> {
        self.container.lock().await.kind()
    }

    /// Mount the address widget.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::ContainerOccupied`] if any widget is already
    /// mounted, or the widget library's error.
    pub async fn create_address_widget(&self, prefill_name: &str) -> Result<(), PaymentError> {
        let mut container = self.container.lock().await;
        if let Some(kind) = container.kind() {
            return Err(PaymentError::ContainerOccupied(kind));
        }

        let widget = self.elements.mount_address(prefill_name).await?;
        debug!(widget = widget.as_str(), "Mounted address widget");
        *container = Container::Address(widget);
        Ok(())
    }

    /// The completed address, or `None` if the customer has not finished the
    /// form.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::NotMounted`] if the address widget is not
    /// mounted.
    pub async fn completed_address(&self) -> Result<Option<CollectedAddress>, PaymentError> {
        let container = self.container.lock().await;
        let Container::Address(widget) = &*container else {
            return Err(PaymentError::NotMounted(WidgetKind::Address));
        };
        self.elements.read_address(widget).await
    }

    /// Mount the payment widget for a payment intent.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::ContainerOccupied`] if any widget is already
    /// mounted, or the widget library's error.
    pub async fn create_payment_widget(&self, client_secret: SecretString) -> Result<(), PaymentError> {
        let mut container = self.container.lock().await;
        if let Some(kind) = container.kind() {
            return Err(PaymentError::ContainerOccupied(kind));
        }

        let widget = self.elements.mount_payment(&client_secret).await?;
        debug!(widget = widget.as_str(), "Mounted payment widget");
        *container = Container::Payment {
            widget,
            client_secret,
        };
        Ok(())
    }

    /// Confirm the payment in the mounted payment widget.
    ///
    /// A failure always carries a reason.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::NotMounted`] if the payment widget is not
    /// mounted, or the widget library's error.
    pub async fn confirm(&self, return_url: &str) -> Result<ConfirmOutcome, PaymentError> {
        let container = self.container.lock().await;
        let Container::Payment {
            widget,
            client_secret,
        } = &*container
        else {
            return Err(PaymentError::NotMounted(WidgetKind::Payment));
        };

        match self
            .elements
            .confirm_payment(widget, client_secret, return_url)
            .await?
        {
            ConfirmOutcome::Failed { reason } if reason.trim().is_empty() => {
                Ok(ConfirmOutcome::Failed {
                    reason: DEFAULT_FAILURE_REASON.to_string(),
                })
            }
            outcome => Ok(outcome),
        }
    }

    /// Unmount the address widget if it is mounted.
    pub async fn destroy_address_widget(&self) {
        self.destroy(WidgetKind::Address).await;
    }

    /// Unmount the payment widget (and drop its client secret) if it is
    /// mounted.
    pub async fn destroy_payment_widget(&self) {
        self.destroy(WidgetKind::Payment).await;
    }

    /// Unmount whatever is mounted.
    pub async fn release(&self) {
        self.destroy_address_widget().await;
        self.destroy_payment_widget().await;
    }

    async fn destroy(&self, kind: WidgetKind) {
        let mut container = self.container.lock().await;
        if container.kind() != Some(kind) {
            return;
        }

        let widget = match std::mem::replace(&mut *container, Container::Empty) {
            Container::Address(widget) | Container::Payment { widget, .. } => widget,
            Container::Empty => return,
        };

        // The container is free either way; a failed unmount only leaks the
        // widget library's DOM node.
        if let Err(e) = self.elements.unmount(&widget).await {
            warn!(widget = widget.as_str(), kind = %kind, error = %e, "Failed to unmount widget");
        } else {
            debug!(widget = widget.as_str(), kind = %kind, "Unmounted widget");
        }
    }
}
