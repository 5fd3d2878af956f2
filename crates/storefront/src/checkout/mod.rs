//! Checkout state machine.
//!
//! Walks the customer through `Contact → Shipping → Payment → Confirmed`.
//! Each step advances only after the commerce platform has accepted the
//! step's data, and the order is put back into `AddingItems` whenever the
//! customer retreats from (or abandons) the payment step, so the cart never
//! stays locked.
//!
//! Submissions are serialized: while one is in flight the session is marked
//! `processing` and any other submission fails with [`CheckoutError::Busy`].

mod poll;

pub use poll::{DEFAULT_ATTEMPTS, DEFAULT_INTERVAL, SettlementPoller, Sleeper, TokioSleeper};

use std::sync::Arc;

use pineapple_checkout_core::{CheckoutStep, Email, OrderCode, OrderState};
use secrecy::SecretString;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::cart::CartEngine;
use crate::commerce::{AddressInput, CommerceError, CustomerInput, ShippingMethodQuote, ShopApi};
use crate::payment::{
    CollectedAddress, ConfirmOutcome, PaymentClient, PaymentElements, PaymentError,
};

/// Errors surfaced by checkout actions.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("no checkout is in progress")]
    NoSession,

    #[error("another checkout action is still processing")]
    Busy,

    #[error("checkout is on the {actual} step, not {expected}")]
    WrongStep {
        expected: CheckoutStep,
        actual: CheckoutStep,
    },

    /// Customer input failed local validation.
    #[error("{0}")]
    Invalid(String),

    #[error("Please complete your shipping address")]
    AddressIncomplete,

    #[error("No shipping methods are available for this address")]
    NoShippingMethod,

    /// The processor declined or failed the payment.
    #[error("{0}")]
    PaymentDeclined(String),

    #[error(transparent)]
    Remote(#[from] CommerceError),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Contact details entered on the first step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContactDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl ContactDetails {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    fn validate(&self) -> Result<CustomerInput, CheckoutError> {
        let first_name = self.first_name.trim();
        let last_name = self.last_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(CheckoutError::Invalid(
                "First and last name are required".to_string(),
            ));
        }

        let email = Email::parse(&self.email)
            .map_err(|_| CheckoutError::Invalid("Please enter a valid email address".to_string()))?;

        Ok(CustomerInput {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email_address: email.into_inner(),
        })
    }
}

/// The checkout session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckoutState {
    pub step: CheckoutStep,
    pub contact: Option<ContactDetails>,
    pub shipping_address: Option<CollectedAddress>,
    pub shipping_method: Option<ShippingMethodQuote>,
    /// Cached once the order has entered `ArrangingPayment`.
    pub order_code: Option<OrderCode>,
    pub processing: bool,
    /// Message from the last failed action, for display.
    pub error: Option<String>,
}

/// How a payment submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The customer is being redirected for authentication; the return URL
    /// picks the flow back up.
    Redirecting,
    /// Payment succeeded and the checkout is complete.
    ///
    /// `settlement_observed` is false when polling ran out before the
    /// platform showed the order as paid; the webhook reconciler still
    /// records the payment.
    Confirmed {
        order_code: Option<OrderCode>,
        settlement_observed: bool,
    },
}

/// Clears `processing` when a submission ends, however it ends.
struct Processing<'a> {
    state: &'a watch::Sender<Option<CheckoutState>>,
}

impl Drop for Processing<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| match state {
            Some(state) if state.processing => {
                state.processing = false;
                true
            }
            _ => false,
        });
    }
}

/// The checkout state machine.
pub struct CheckoutFlow {
    commerce: Arc<dyn ShopApi>,
    payments: PaymentClient,
    cart: Arc<CartEngine>,
    poller: SettlementPoller,
    state: watch::Sender<Option<CheckoutState>>,
}

impl CheckoutFlow {
    #[must_use]
    pub fn new(
        commerce: Arc<dyn ShopApi>,
        elements: Arc<dyn PaymentElements>,
        cart: Arc<CartEngine>,
        poller: SettlementPoller,
    ) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            commerce,
            payments: PaymentClient::new(elements),
            cart,
            poller,
            state,
        }
    }

    /// The current session, if checkout is in progress.
    #[must_use]
    pub fn state(&self) -> Option<CheckoutState> {
        self.state.borrow().clone()
    }

    /// Subscribe to session changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<CheckoutState>> {
        self.state.subscribe()
    }

    /// The widget container, for hosts that need to know what is mounted.
    #[must_use]
    pub const fn payments(&self) -> &PaymentClient {
        &self.payments
    }

    /// Start checkout, or resume the session already in progress.
    pub fn begin(&self) -> CheckoutState {
        let mut current = CheckoutState::default();
        self.state.send_if_modified(|state| match state {
            Some(existing) if existing.step != CheckoutStep::Confirmed => {
                current = existing.clone();
                false
            }
            _ => {
                *state = Some(CheckoutState::default());
                true
            }
        });
        current
    }

    /// Submit contact details and move to shipping.
    ///
    /// # Errors
    ///
    /// Returns a validation error or the platform's rejection; the step does
    /// not advance and the entered details are kept.
    #[instrument(skip(self, contact))]
    pub async fn submit_contact(&self, contact: ContactDetails) -> Result<(), CheckoutError> {
        let (_processing, _) = self.start(Some(CheckoutStep::Contact))?;
        let result = self.submit_contact_inner(contact).await;
        self.record(&result);
        result
    }

    /// Submit the shipping address, arrange payment and move to payment.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::AddressIncomplete`] without any remote call
    /// if the address form is unfinished, otherwise the first failing
    /// step's error. On failure the address widget is back in place and the
    /// order is modifiable again.
    #[instrument(skip(self))]
    pub async fn submit_shipping(&self) -> Result<(), CheckoutError> {
        let (_processing, _) = self.start(Some(CheckoutStep::Shipping))?;
        let result = self.submit_shipping_inner().await;
        self.record(&result);
        result
    }

    /// Confirm the payment.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::PaymentDeclined`] with the processor's reason;
    /// the payment widget stays mounted for another attempt.
    #[instrument(skip(self))]
    pub async fn submit_payment(&self, return_url: &str) -> Result<PaymentOutcome, CheckoutError> {
        let (_processing, _) = self.start(Some(CheckoutStep::Payment))?;
        let result = self.submit_payment_inner(return_url).await;
        self.record(&result);
        result
    }

    /// Go back one step.
    ///
    /// Leaving the payment step resets the order to `AddingItems` first; if
    /// that fails the flow stays on payment.
    ///
    /// # Errors
    ///
    /// Returns the reset failure, or a widget error after the step changed.
    #[instrument(skip(self))]
    pub async fn back(&self) -> Result<CheckoutStep, CheckoutError> {
        let (_processing, step) = self.start(None)?;
        let result = match step {
            CheckoutStep::Payment => self.back_to_shipping().await,
            CheckoutStep::Shipping => {
                self.payments.destroy_address_widget().await;
                self.update(|state| state.step = CheckoutStep::Contact);
                Ok(CheckoutStep::Contact)
            }
            CheckoutStep::Contact | CheckoutStep::Confirmed => Ok(step),
        };
        self.record(&result);
        result
    }

    /// Cancel checkout and discard the session.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Busy`] while a submission is in flight, or
    /// the reset failure when abandoning the payment step (the session is
    /// kept so the customer can retry).
    #[instrument(skip(self))]
    pub async fn abandon(&self) -> Result<(), CheckoutError> {
        let (processing, step) = match self.start(None) {
            Ok(started) => started,
            Err(CheckoutError::NoSession) => return Ok(()),
            Err(e) => return Err(e),
        };

        if step == CheckoutStep::Payment
            && let Err(e) = self.reset_order().await
        {
            let result = Err(e);
            self.record(&result);
            return result;
        }

        self.payments.release().await;
        drop(processing);
        self.state.send_replace(None);
        info!(step = %step, "Checkout abandoned");
        Ok(())
    }

    // =========================================================================
    // Steps
    // =========================================================================

    async fn submit_contact_inner(&self, contact: ContactDetails) -> Result<(), CheckoutError> {
        self.update(|state| state.contact = Some(contact.clone()));
        let input = contact.validate()?;

        self.commerce.set_customer(&input).await?;
        self.payments
            .create_address_widget(&contact.full_name())
            .await?;

        self.update(|state| state.step = CheckoutStep::Shipping);
        info!("Contact details accepted");
        Ok(())
    }

    async fn submit_shipping_inner(&self) -> Result<(), CheckoutError> {
        let address = self
            .payments
            .completed_address()
            .await?
            .ok_or(CheckoutError::AddressIncomplete)?;
        self.update(|state| state.shipping_address = Some(address.clone()));

        self.commerce
            .set_shipping_address(&AddressInput::from(&address))
            .await?;
        self.payments.destroy_address_widget().await;

        if let Err(e) = self.arrange_payment().await {
            self.recover_shipping_step().await;
            return Err(e);
        }

        self.update(|state| state.step = CheckoutStep::Payment);
        info!("Payment arranged");
        Ok(())
    }

    async fn arrange_payment(&self) -> Result<(), CheckoutError> {
        let method = self
            .commerce
            .eligible_shipping_methods()
            .await?
            .into_iter()
            .next()
            .ok_or(CheckoutError::NoShippingMethod)?;
        self.commerce.set_shipping_method(&method.id).await?;
        self.update(|state| state.shipping_method = Some(method));

        let order = self
            .commerce
            .transition_state(OrderState::ArrangingPayment)
            .await?;
        self.update(|state| state.order_code = Some(order.code.clone()));

        let client_secret = self.commerce.create_payment_intent().await?;
        self.payments
            .create_payment_widget(SecretString::from(client_secret))
            .await?;
        Ok(())
    }

    /// Put the shipping step back together after `arrange_payment` failed
    /// part way through.
    async fn recover_shipping_step(&self) {
        match self.commerce.active_order().await {
            Ok(Some(order)) if !order.state.is_modifiable() => {
                if let Err(e) = self.reset_order().await {
                    warn!(error = %e, "Failed to unlock order after shipping step failure");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to check order after shipping step failure"),
        }

        self.payments.destroy_payment_widget().await;
        if let Err(e) = self.payments.create_address_widget(&self.contact_name()).await {
            warn!(error = %e, "Failed to remount address widget");
        }
    }

    async fn submit_payment_inner(&self, return_url: &str) -> Result<PaymentOutcome, CheckoutError> {
        match self.payments.confirm(return_url).await? {
            ConfirmOutcome::RequiresRedirect => {
                info!("Payment requires redirect");
                Ok(PaymentOutcome::Redirecting)
            }
            ConfirmOutcome::Failed { reason } => Err(CheckoutError::PaymentDeclined(reason)),
            ConfirmOutcome::Succeeded { status } => {
                info!(status = ?status, "Payment confirmed");
                Ok(self.complete().await)
            }
        }
    }

    /// Wait for settlement, then finish the checkout either way.
    async fn complete(&self) -> PaymentOutcome {
        let settlement_observed = self
            .poller
            .wait_for_settlement(self.commerce.as_ref())
            .await;
        if !settlement_observed {
            warn!("Settlement not observed before polling ran out; relying on webhook");
        }

        self.payments.destroy_payment_widget().await;
        self.cart.clear();

        let order_code = self.state().and_then(|state| state.order_code);
        self.update(|state| {
            state.step = CheckoutStep::Confirmed;
            state.error = None;
        });

        PaymentOutcome::Confirmed {
            order_code,
            settlement_observed,
        }
    }

    async fn back_to_shipping(&self) -> Result<CheckoutStep, CheckoutError> {
        self.reset_order().await?;
        self.payments.destroy_payment_widget().await;
        self.update(|state| state.step = CheckoutStep::Shipping);

        self.payments
            .create_address_widget(&self.contact_name())
            .await?;
        Ok(CheckoutStep::Shipping)
    }

    /// Move the order back to `AddingItems`.
    ///
    /// A refused reset is fine if the order is already modifiable or gone.
    async fn reset_order(&self) -> Result<(), CheckoutError> {
        match self.commerce.reset_to_adding_items().await {
            Ok(_) => Ok(()),
            Err(e) if e.is_rejection() => match self.commerce.active_order().await? {
                None => Ok(()),
                Some(order) if order.state.is_modifiable() => Ok(()),
                Some(_) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Session bookkeeping
    // =========================================================================

    fn start(
        &self,
        expected: Option<CheckoutStep>,
    ) -> Result<(Processing<'_>, CheckoutStep), CheckoutError> {
        let mut outcome = Err(CheckoutError::NoSession);
        self.state.send_if_modified(|state| {
            let Some(state) = state else {
                return false;
            };
            if state.processing {
                outcome = Err(CheckoutError::Busy);
                return false;
            }
            if let Some(expected) = expected
                && state.step != expected
            {
                outcome = Err(CheckoutError::WrongStep {
                    expected,
                    actual: state.step,
                });
                return false;
            }
            state.processing = true;
            state.error = None;
            outcome = Ok(state.step);
            true
        });

        outcome.map(|step| (Processing { state: &self.state }, step))
    }

    fn update(&self, mutate: impl FnOnce(&mut CheckoutState)) {
        self.state.send_if_modified(|state| match state {
            Some(state) => {
                mutate(state);
                true
            }
            None => false,
        });
    }

    fn record<T>(&self, result: &Result<T, CheckoutError>) {
        if let Err(e) = result {
            let message = e.to_string();
            warn!(error = %message, "Checkout action failed");
            self.update(|state| state.error = Some(message));
        }
    }

    fn contact_name(&self) -> String {
        self.state()
            .and_then(|state| state.contact)
            .map(|contact| contact.full_name())
            .unwrap_or_default()
    }
}
