//! In-memory collaborators for tests.
//!
//! [`FakePlatform`] models the parts of the commerce platform's order state
//! machine the storefront depends on: one active order per session, line
//! edits only in `AddingItems`, the checks guarding `ArrangingPayment`, and
//! manual payments settling an order and detaching it from the session.
//! Every operation yields once so concurrent callers interleave the way they
//! do against the real API.

#![allow(clippy::expect_used, clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use pineapple_checkout_core::{
    CheckoutSessionId, CurrencyCode, CustomerId, Money, OrderCode, OrderId, OrderLineId, OrderState,
    ShippingMethodId, VariantId,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::Notify;

use crate::cart::VariantDetails;
use crate::checkout::{ContactDetails, Sleeper};
use crate::config::{CommerceConfig, StorefrontConfig, StripeConfig};
use crate::commerce::{
    AddressInput, AdminApi, CommerceError, CustomerInput, GraphQLError, ManualPaymentInput,
    OrderAddress, ProductRef, RemoteCustomer, RemoteOrder, RemoteOrderLine, RemotePayment,
    RemoteVariant, ShippingMethodQuote, ShopApi,
};
use crate::payment::{
    CheckoutSession, CheckoutSessionRequest, CollectedAddress, ConfirmOutcome,
    ORDER_CODE_METADATA_KEY, PaymentElements, PaymentError, PaymentProcessor, StripeEvent,
    WidgetHandle,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Commerce platform
// =============================================================================

/// Platform operations, as recorded by [`FakePlatform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShopOp {
    ActiveOrder,
    AddItem,
    AdjustLine,
    RemoveLine,
    SetCustomer,
    SetShippingAddress,
    EligibleShippingMethods,
    SetShippingMethod,
    TransitionState,
    ResetToAddingItems,
    CreatePaymentIntent,
    OrderByCode,
    AdminSetCustomer,
    AdminSetShippingAddress,
    AdminEligibleShippingMethods,
    AdminSetShippingMethod,
    AdminTransitionState,
    AddManualPayment,
}

/// Holds one call inside the platform until released.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    released: Notify,
}

impl Gate {
    /// Wait until the gated call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the gated call proceed.
    pub fn release(&self) {
        self.released.notify_one();
    }
}

struct CatalogEntry {
    product: String,
    variant: String,
    price: Money,
}

struct FakeLine {
    id: OrderLineId,
    variant_id: VariantId,
    quantity: u32,
}

struct FakeOrder {
    id: OrderId,
    code: OrderCode,
    state: OrderState,
    customer: Option<RemoteCustomer>,
    shipping_address: Option<OrderAddress>,
    shipping_method: Option<ShippingMethodQuote>,
    lines: Vec<FakeLine>,
    payments: Vec<RemotePayment>,
}

impl FakeOrder {
    fn ensure_modifiable(&self) -> Result<(), CommerceError> {
        if self.state.is_modifiable() {
            Ok(())
        } else {
            Err(CommerceError::rejected(
                crate::commerce::ORDER_MODIFICATION_ERROR,
                format!(
                    "Order \"{}\" is in the \"{}\" state. Order contents may only be modified when in the \"AddingItems\" state",
                    self.code, self.state
                ),
            ))
        }
    }

    fn missing_for_payment(&self) -> Option<&'static str> {
        if self.lines.is_empty() {
            Some("the order is empty")
        } else if self.customer.is_none() {
            Some("no customer has been set")
        } else if self.shipping_address.is_none() {
            Some("no shipping address has been set")
        } else if self.shipping_method.is_none() {
            Some("no shipping method has been set")
        } else {
            None
        }
    }
}

#[derive(Default)]
struct Platform {
    catalog: HashMap<VariantId, CatalogEntry>,
    orders: Vec<FakeOrder>,
    active: Option<OrderCode>,
    next_order: u32,
    next_line: u32,
    next_customer: u32,
    next_payment: u32,
    calls: Vec<ShopOp>,
    failures: HashMap<ShopOp, VecDeque<CommerceError>>,
    gates: HashMap<ShopOp, Arc<Gate>>,
    settle_countdown: Option<u32>,
}

impl Platform {
    fn create_order(&mut self, state: OrderState) -> OrderCode {
        self.next_order += 1;
        let code = OrderCode::new(format!("NP{:06}", self.next_order));
        self.orders.push(FakeOrder {
            id: OrderId::new(self.next_order.to_string()),
            code: code.clone(),
            state,
            customer: None,
            shipping_address: None,
            shipping_method: None,
            lines: Vec::new(),
            payments: Vec::new(),
        });
        code
    }

    fn next_line_id(&mut self) -> OrderLineId {
        self.next_line += 1;
        OrderLineId::new(format!("L{}", self.next_line))
    }

    fn active_code(&self) -> Result<OrderCode, CommerceError> {
        self.active.clone().ok_or_else(|| {
            CommerceError::rejected(
                "NO_ACTIVE_ORDER_ERROR",
                "There is no active Order associated with the current session",
            )
        })
    }

    fn code_for(&self, id: &OrderId) -> Result<OrderCode, CommerceError> {
        self.orders
            .iter()
            .find(|o| &o.id == id)
            .map(|o| o.code.clone())
            .ok_or_else(|| not_found("Order", id.as_str()))
    }

    fn order_mut(&mut self, code: &OrderCode) -> Result<&mut FakeOrder, CommerceError> {
        self.orders
            .iter_mut()
            .find(|o| &o.code == code)
            .ok_or_else(|| not_found("Order", code.as_str()))
    }

    fn remote(&self, code: &OrderCode) -> Result<RemoteOrder, CommerceError> {
        let order = self
            .orders
            .iter()
            .find(|o| &o.code == code)
            .ok_or_else(|| not_found("Order", code.as_str()))?;

        let lines: Vec<RemoteOrderLine> = order
            .lines
            .iter()
            .map(|line| {
                let (product, variant, price) = self.catalog.get(&line.variant_id).map_or_else(
                    || (String::new(), line.variant_id.to_string(), Money::ZERO),
                    |entry| (entry.product.clone(), entry.variant.clone(), entry.price),
                );
                RemoteOrderLine {
                    id: line.id.clone(),
                    quantity: line.quantity,
                    unit_price_with_tax: price,
                    line_price_with_tax: price.times(line.quantity),
                    featured_asset: None,
                    product_variant: RemoteVariant {
                        id: line.variant_id.clone(),
                        name: variant,
                        product: Some(ProductRef { name: product }),
                    },
                }
            })
            .collect();

        let sub_total: Money = lines.iter().map(|l| l.line_price_with_tax).sum();
        let shipping = order
            .shipping_method
            .as_ref()
            .map_or(Money::ZERO, |m| m.price_with_tax);

        Ok(RemoteOrder {
            id: order.id.clone(),
            code: order.code.clone(),
            state: order.state.clone(),
            currency_code: Some("USD".to_string()),
            total_quantity: order.lines.iter().map(|l| l.quantity).sum(),
            sub_total_with_tax: sub_total,
            shipping_with_tax: shipping,
            total_with_tax: sub_total + shipping,
            customer: order.customer.clone(),
            shipping_address: order.shipping_address.clone(),
            lines,
            payments: order.payments.clone(),
        })
    }

    fn add_line(
        &mut self,
        code: &OrderCode,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<(), CommerceError> {
        if !self.catalog.contains_key(variant_id) {
            return Err(not_found("ProductVariant", variant_id.as_str()));
        }
        let line_id = self.next_line_id();
        let order = self.order_mut(code)?;
        order.ensure_modifiable()?;

        match order.lines.iter_mut().find(|l| &l.variant_id == variant_id) {
            Some(line) => line.quantity += quantity,
            None => order.lines.push(FakeLine {
                id: line_id,
                variant_id: variant_id.clone(),
                quantity,
            }),
        }
        Ok(())
    }

    fn set_customer(&mut self, code: &OrderCode, input: &CustomerInput) -> Result<(), CommerceError> {
        self.next_customer += 1;
        let id = CustomerId::new(format!("C{}", self.next_customer));
        self.order_mut(code)?.customer = Some(RemoteCustomer {
            id,
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            email_address: input.email_address.clone(),
        });
        Ok(())
    }

    fn set_address(&mut self, code: &OrderCode, input: &AddressInput) -> Result<(), CommerceError> {
        self.order_mut(code)?.shipping_address = Some(OrderAddress {
            full_name: Some(input.full_name.clone()),
            street_line1: Some(input.street_line1.clone()),
            street_line2: input.street_line2.clone(),
            city: Some(input.city.clone()),
            province: input.province.clone(),
            postal_code: Some(input.postal_code.clone()),
            country_code: Some(input.country_code.clone()),
        });
        Ok(())
    }

    fn set_method(&mut self, code: &OrderCode, id: &ShippingMethodId) -> Result<(), CommerceError> {
        let order = self.order_mut(code)?;
        order.ensure_modifiable()?;
        let method = shipping_methods()
            .into_iter()
            .find(|m| &m.id == id)
            .ok_or_else(|| {
                CommerceError::rejected(
                    "INELIGIBLE_SHIPPING_METHOD_ERROR",
                    "This Order is not eligible for the selected ShippingMethod",
                )
            })?;
        order.shipping_method = Some(method);
        Ok(())
    }

    fn transition(&mut self, code: &OrderCode, target: OrderState) -> Result<(), CommerceError> {
        let order = self.order_mut(code)?;
        let refusal = match (&order.state, &target) {
            (OrderState::AddingItems, OrderState::ArrangingPayment) => {
                order.missing_for_payment().map(|reason| format!(": {reason}"))
            }
            (OrderState::ArrangingPayment, OrderState::AddingItems) => None,
            _ => Some(String::new()),
        };

        if let Some(reason) = refusal {
            return Err(CommerceError::rejected(
                "ORDER_STATE_TRANSITION_ERROR",
                format!(
                    "Cannot transition Order from \"{}\" to \"{target}\"{reason}",
                    order.state
                ),
            ));
        }
        order.state = target;
        Ok(())
    }

    fn add_payment(&mut self, input: &ManualPaymentInput) -> Result<OrderCode, CommerceError> {
        let code = self.code_for(&input.order_id)?;
        self.next_payment += 1;
        let payment_id = format!("P{}", self.next_payment);

        let order = self.order_mut(&code)?;
        if order.state != OrderState::ArrangingPayment {
            return Err(CommerceError::rejected(
                "MANUAL_PAYMENT_STATE_ERROR",
                "A manual payment may only be added when in the \"ArrangingPayment\" state",
            ));
        }
        order.payments.push(RemotePayment {
            id: payment_id,
            method: input.method.clone(),
            state: "Settled".to_string(),
            transaction_id: Some(input.transaction_id.clone()),
        });
        order.state = OrderState::PaymentSettled;

        if self.active.as_ref() == Some(&code) {
            self.active = None;
        }
        Ok(code)
    }

    /// Settle the active order as a processor-side payment would.
    fn settle_active(&mut self) {
        let Some(code) = self.active.take() else {
            return;
        };
        if let Ok(order) = self.order_mut(&code) {
            order.state = OrderState::PaymentSettled;
        }
    }
}

fn not_found(entity: &str, id: &str) -> CommerceError {
    CommerceError::GraphQL(vec![GraphQLError {
        message: format!("No {entity} with the id \"{id}\" could be found"),
        code: Some("ENTITY_NOT_FOUND".to_string()),
        locations: Vec::new(),
        path: Vec::new(),
    }])
}

fn shipping_methods() -> Vec<ShippingMethodQuote> {
    vec![
        ShippingMethodQuote {
            id: ShippingMethodId::new("1"),
            name: "Standard Shipping".to_string(),
            price_with_tax: Money::from_minor(500),
        },
        ShippingMethodQuote {
            id: ShippingMethodId::new("2"),
            name: "Express Shipping".to_string(),
            price_with_tax: Money::from_minor(1500),
        },
    ]
}

/// Record the call, then apply any gate or injected failure.
async fn enter(state: &Mutex<Platform>, op: ShopOp) -> Result<(), CommerceError> {
    let (gate, failure) = {
        let mut state = lock(state);
        state.calls.push(op);
        let failure = state.failures.get_mut(&op).and_then(VecDeque::pop_front);
        (state.gates.remove(&op), failure)
    };

    if let Some(gate) = gate {
        gate.entered.notify_one();
        gate.released.notified().await;
    }
    tokio::task::yield_now().await;

    failure.map_or(Ok(()), Err)
}

/// In-memory commerce platform with one customer session.
pub struct FakePlatform {
    state: Arc<Mutex<Platform>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    /// A platform selling `V1` (1799), `V2` (250) and `V3` (999).
    #[must_use]
    pub fn new() -> Self {
        let platform = Self {
            state: Arc::new(Mutex::new(Platform::default())),
        };
        platform
            .with_variant("V1", "Pineapple Pouch", "Large", 1799)
            .with_variant("V2", "Pineapple Pouch", "Sample", 250)
            .with_variant("V3", "Pineapple Pouch", "Travel", 999)
    }

    #[must_use]
    pub fn with_variant(self, id: &str, product: &str, variant: &str, price: i64) -> Self {
        lock(&self.state).catalog.insert(
            VariantId::new(id),
            CatalogEntry {
                product: product.to_string(),
                variant: variant.to_string(),
                price: Money::from_minor(price),
            },
        );
        self
    }

    /// The Shop API as seen by the customer session.
    #[must_use]
    pub fn shop(&self) -> Arc<dyn ShopApi> {
        Arc::new(FakeShop {
            state: self.state.clone(),
        })
    }

    /// The Admin API.
    #[must_use]
    pub fn admin(&self) -> Arc<dyn AdminApi> {
        Arc::new(FakeAdmin {
            state: self.state.clone(),
        })
    }

    /// Hold the next `op` call until the returned gate is released.
    #[must_use]
    pub fn gate_next(&self, op: ShopOp) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        lock(&self.state).gates.insert(op, gate.clone());
        gate
    }

    /// Fail the next `op` call with `error`.
    pub fn fail_next(&self, op: ShopOp, error: CommerceError) {
        lock(&self.state)
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// How many times `op` has been called.
    #[must_use]
    pub fn count(&self, op: ShopOp) -> usize {
        lock(&self.state).calls.iter().filter(|c| **c == op).count()
    }

    /// Every call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ShopOp> {
        lock(&self.state).calls.clone()
    }

    /// Move the active order to `state` behind the storefront's back.
    pub fn force_state(&self, state: OrderState) {
        let mut platform = lock(&self.state);
        if let Some(code) = platform.active.clone()
            && let Ok(order) = platform.order_mut(&code)
        {
            order.state = state;
        }
    }

    /// State of the session's active order.
    #[must_use]
    pub fn active_state(&self) -> Option<OrderState> {
        let platform = lock(&self.state);
        let code = platform.active.clone()?;
        platform
            .orders
            .iter()
            .find(|o| o.code == code)
            .map(|o| o.state.clone())
    }

    /// Drop the session's link to its order, as an expired session would.
    pub fn expire_session(&self) {
        lock(&self.state).active = None;
    }

    /// Settle the active order on the `polls`-th active-order read from now.
    pub fn settle_on_poll(&self, polls: u32) {
        lock(&self.state).settle_countdown = Some(polls.max(1));
    }

    /// Create an order outside the session (as the hosted checkout flow
    /// would have left it) and return its code.
    pub fn seed_order(&self, state: OrderState, lines: &[(&str, u32)]) -> OrderCode {
        let mut platform = lock(&self.state);
        let code = platform.create_order(OrderState::AddingItems);
        for (variant, quantity) in lines {
            platform
                .add_line(&code, &VariantId::new(*variant), *quantity)
                .expect("seeded variant exists");
        }
        if let Ok(order) = platform.order_mut(&code) {
            order.state = state;
        }
        code
    }

    /// An order as the platform sees it, wherever it is.
    #[must_use]
    pub fn order(&self, code: &OrderCode) -> Option<RemoteOrder> {
        lock(&self.state).remote(code).ok()
    }
}

struct FakeShop {
    state: Arc<Mutex<Platform>>,
}

impl FakeShop {
    async fn run<T>(
        &self,
        op: ShopOp,
        f: impl FnOnce(&mut Platform) -> Result<T, CommerceError> + Send,
    ) -> Result<T, CommerceError> {
        enter(&self.state, op).await?;
        f(&mut lock(&self.state))
    }
}

#[async_trait]
impl ShopApi for FakeShop {
    async fn active_order(&self) -> Result<Option<RemoteOrder>, CommerceError> {
        self.run(ShopOp::ActiveOrder, |p| {
            let due = match &mut p.settle_countdown {
                Some(remaining) => {
                    *remaining = remaining.saturating_sub(1);
                    *remaining == 0
                }
                None => false,
            };
            if due {
                p.settle_countdown = None;
                p.settle_active();
            }

            match p.active.clone() {
                Some(code) => p.remote(&code).map(Some),
                None => Ok(None),
            }
        })
        .await
    }

    async fn add_item(
        &self,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::AddItem, |p| {
            let code = match p.active.clone() {
                Some(code) => code,
                None => {
                    let code = p.create_order(OrderState::AddingItems);
                    p.active = Some(code.clone());
                    code
                }
            };
            p.add_line(&code, variant_id, quantity)?;
            p.remote(&code)
        })
        .await
    }

    async fn adjust_line(
        &self,
        line_id: &OrderLineId,
        quantity: u32,
    ) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::AdjustLine, |p| {
            let code = p.active_code()?;
            let order = p.order_mut(&code)?;
            order.ensure_modifiable()?;
            let position = order
                .lines
                .iter()
                .position(|l| &l.id == line_id)
                .ok_or_else(|| not_found("OrderLine", line_id.as_str()))?;
            if quantity == 0 {
                order.lines.remove(position);
            } else if let Some(line) = order.lines.get_mut(position) {
                line.quantity = quantity;
            }
            p.remote(&code)
        })
        .await
    }

    async fn remove_line(&self, line_id: &OrderLineId) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::RemoveLine, |p| {
            let code = p.active_code()?;
            let order = p.order_mut(&code)?;
            order.ensure_modifiable()?;
            let before = order.lines.len();
            order.lines.retain(|l| &l.id != line_id);
            if order.lines.len() == before {
                return Err(not_found("OrderLine", line_id.as_str()));
            }
            p.remote(&code)
        })
        .await
    }

    async fn set_customer(&self, input: &CustomerInput) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::SetCustomer, |p| {
            let code = p.active_code()?;
            p.set_customer(&code, input)?;
            p.remote(&code)
        })
        .await
    }

    async fn set_shipping_address(
        &self,
        input: &AddressInput,
    ) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::SetShippingAddress, |p| {
            let code = p.active_code()?;
            p.set_address(&code, input)?;
            p.remote(&code)
        })
        .await
    }

    async fn eligible_shipping_methods(&self) -> Result<Vec<ShippingMethodQuote>, CommerceError> {
        self.run(ShopOp::EligibleShippingMethods, |p| {
            Ok(if p.active.is_some() {
                shipping_methods()
            } else {
                Vec::new()
            })
        })
        .await
    }

    async fn set_shipping_method(
        &self,
        id: &ShippingMethodId,
    ) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::SetShippingMethod, |p| {
            let code = p.active_code()?;
            p.set_method(&code, id)?;
            p.remote(&code)
        })
        .await
    }

    async fn transition_state(&self, state: OrderState) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::TransitionState, |p| {
            let code = p.active_code()?;
            p.transition(&code, state)?;
            p.remote(&code)
        })
        .await
    }

    /// Resetting an order that is already in `AddingItems` succeeds.
    async fn reset_to_adding_items(&self) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::ResetToAddingItems, |p| {
            let code = p.active_code()?;
            if !p.order_mut(&code)?.state.is_modifiable() {
                p.transition(&code, OrderState::AddingItems)?;
            }
            p.remote(&code)
        })
        .await
    }

    async fn create_payment_intent(&self) -> Result<String, CommerceError> {
        self.run(ShopOp::CreatePaymentIntent, |p| {
            let code = p.active_code()?;
            let order = p.order_mut(&code)?;
            if order.state != OrderState::ArrangingPayment {
                return Err(CommerceError::GraphQL(vec![GraphQLError {
                    message: format!(
                        "Order \"{code}\" must be in the ArrangingPayment state to create a payment intent"
                    ),
                    code: Some("INTERNAL_SERVER_ERROR".to_string()),
                    locations: Vec::new(),
                    path: Vec::new(),
                }]));
            }
            Ok(format!("pi_{}_secret_{code}", order.id))
        })
        .await
    }
}

struct FakeAdmin {
    state: Arc<Mutex<Platform>>,
}

impl FakeAdmin {
    async fn run<T>(
        &self,
        op: ShopOp,
        f: impl FnOnce(&mut Platform) -> Result<T, CommerceError> + Send,
    ) -> Result<T, CommerceError> {
        enter(&self.state, op).await?;
        f(&mut lock(&self.state))
    }
}

#[async_trait]
impl AdminApi for FakeAdmin {
    async fn order_by_code(&self, code: &OrderCode) -> Result<Option<RemoteOrder>, CommerceError> {
        self.run(ShopOp::OrderByCode, |p| Ok(p.remote(code).ok()))
            .await
    }

    async fn set_customer_for_order(
        &self,
        order_id: &OrderId,
        input: &CustomerInput,
    ) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::AdminSetCustomer, |p| {
            let code = p.code_for(order_id)?;
            p.set_customer(&code, input)?;
            p.remote(&code)
        })
        .await
    }

    async fn set_shipping_address(
        &self,
        order_id: &OrderId,
        input: &AddressInput,
    ) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::AdminSetShippingAddress, |p| {
            let code = p.code_for(order_id)?;
            p.set_address(&code, input)?;
            p.remote(&code)
        })
        .await
    }

    async fn eligible_shipping_methods(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<ShippingMethodQuote>, CommerceError> {
        self.run(ShopOp::AdminEligibleShippingMethods, |p| {
            p.code_for(order_id)?;
            Ok(shipping_methods())
        })
        .await
    }

    async fn set_shipping_method(
        &self,
        order_id: &OrderId,
        id: &ShippingMethodId,
    ) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::AdminSetShippingMethod, |p| {
            let code = p.code_for(order_id)?;
            p.set_method(&code, id)?;
            p.remote(&code)
        })
        .await
    }

    async fn transition_state(
        &self,
        order_id: &OrderId,
        state: OrderState,
    ) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::AdminTransitionState, |p| {
            let code = p.code_for(order_id)?;
            p.transition(&code, state)?;
            p.remote(&code)
        })
        .await
    }

    async fn add_manual_payment(
        &self,
        input: &ManualPaymentInput,
    ) -> Result<RemoteOrder, CommerceError> {
        self.run(ShopOp::AddManualPayment, |p| {
            let code = p.add_payment(input)?;
            p.remote(&code)
        })
        .await
    }
}

// =============================================================================
// Payment widgets
// =============================================================================

#[derive(Default)]
struct ElementsState {
    next_handle: u32,
    mounted: Vec<WidgetHandle>,
    max_mounted: usize,
    last_prefill: Option<String>,
    last_client_secret: Option<String>,
    last_return_url: Option<String>,
    address: Option<CollectedAddress>,
    confirm_outcome: Option<ConfirmOutcome>,
    fail_next_mount: Option<String>,
}

/// In-memory widget library with a single container.
#[derive(Default)]
pub struct FakeElements {
    state: Mutex<ElementsState>,
}

impl FakeElements {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mount(&self, kind: &str) -> Result<WidgetHandle, PaymentError> {
        let mut state = lock(&self.state);
        if let Some(message) = state.fail_next_mount.take() {
            return Err(PaymentError::Widget(message));
        }
        state.next_handle += 1;
        let handle = WidgetHandle::new(format!("{kind}-{}", state.next_handle));
        state.mounted.push(handle.clone());
        state.max_mounted = state.max_mounted.max(state.mounted.len());
        Ok(handle)
    }

    fn ensure_mounted(&self, widget: &WidgetHandle) -> Result<(), PaymentError> {
        if lock(&self.state).mounted.contains(widget) {
            Ok(())
        } else {
            Err(PaymentError::Widget(format!("{} is not mounted", widget.as_str())))
        }
    }

    /// Widgets currently mounted.
    #[must_use]
    pub fn mounted_count(&self) -> usize {
        lock(&self.state).mounted.len()
    }

    /// Most widgets ever mounted at once.
    #[must_use]
    pub fn max_mounted(&self) -> usize {
        lock(&self.state).max_mounted
    }

    #[must_use]
    pub fn last_prefill(&self) -> Option<String> {
        lock(&self.state).last_prefill.clone()
    }

    #[must_use]
    pub fn last_client_secret(&self) -> Option<String> {
        lock(&self.state).last_client_secret.clone()
    }

    #[must_use]
    pub fn last_return_url(&self) -> Option<String> {
        lock(&self.state).last_return_url.clone()
    }

    /// Complete the address form.
    pub fn fill_address(&self, address: CollectedAddress) {
        lock(&self.state).address = Some(address);
    }

    /// Outcome of every later confirmation (default: succeeded).
    pub fn set_confirm_outcome(&self, outcome: ConfirmOutcome) {
        lock(&self.state).confirm_outcome = Some(outcome);
    }

    pub fn fail_next_mount(&self, message: &str) {
        lock(&self.state).fail_next_mount = Some(message.to_string());
    }
}

#[async_trait]
impl PaymentElements for FakeElements {
    async fn mount_address(&self, prefill_name: &str) -> Result<WidgetHandle, PaymentError> {
        tokio::task::yield_now().await;
        let handle = self.mount("address")?;
        lock(&self.state).last_prefill = Some(prefill_name.to_string());
        Ok(handle)
    }

    async fn read_address(
        &self,
        widget: &WidgetHandle,
    ) -> Result<Option<CollectedAddress>, PaymentError> {
        self.ensure_mounted(widget)?;
        Ok(lock(&self.state).address.clone())
    }

    async fn mount_payment(
        &self,
        client_secret: &SecretString,
    ) -> Result<WidgetHandle, PaymentError> {
        tokio::task::yield_now().await;
        let handle = self.mount("payment")?;
        lock(&self.state).last_client_secret = Some(client_secret.expose_secret().to_string());
        Ok(handle)
    }

    async fn confirm_payment(
        &self,
        widget: &WidgetHandle,
        _client_secret: &SecretString,
        return_url: &str,
    ) -> Result<ConfirmOutcome, PaymentError> {
        self.ensure_mounted(widget)?;
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        state.last_return_url = Some(return_url.to_string());
        Ok(state
            .confirm_outcome
            .clone()
            .unwrap_or(ConfirmOutcome::Succeeded {
                status: Some("succeeded".to_string()),
            }))
    }

    async fn unmount(&self, widget: &WidgetHandle) -> Result<(), PaymentError> {
        let mut state = lock(&self.state);
        let before = state.mounted.len();
        state.mounted.retain(|w| w != widget);
        if state.mounted.len() == before {
            return Err(PaymentError::Widget(format!("{} is not mounted", widget.as_str())));
        }
        Ok(())
    }
}

// =============================================================================
// Poll timing
// =============================================================================

/// Records requested sleeps and returns immediately.
#[derive(Default)]
pub struct InstantSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// Payment processor
// =============================================================================

#[derive(Default)]
struct ProcessorState {
    sessions: HashMap<CheckoutSessionId, CheckoutSession>,
    created: Vec<CheckoutSessionRequest>,
    retrievals: usize,
}

/// In-memory hosted checkout sessions.
#[derive(Default)]
pub struct FakeProcessor {
    state: Mutex<ProcessorState>,
}

impl FakeProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, session: CheckoutSession) {
        lock(&self.state).sessions.insert(session.id.clone(), session);
    }

    #[must_use]
    pub fn created(&self) -> Vec<CheckoutSessionRequest> {
        lock(&self.state).created.clone()
    }

    #[must_use]
    pub fn retrievals(&self) -> usize {
        lock(&self.state).retrievals
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut state = lock(&self.state);
        let id = format!("cs_test_{}", state.created.len() + 1);
        let amount: i64 = request
            .line_items
            .iter()
            .map(|item| item.unit_amount.times(item.quantity).minor())
            .sum();

        let session: CheckoutSession = serde_json::from_value(json!({
            "id": id,
            "url": format!("https://checkout.stripe.test/c/pay/{id}"),
            "status": "open",
            "payment_status": "unpaid",
            "amount_total": amount,
            "currency": request.currency.lower(),
            "client_reference_id": request.order_code,
            "metadata": {ORDER_CODE_METADATA_KEY: request.order_code},
        }))?;

        state.created.push(request.clone());
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn retrieve_session(
        &self,
        id: &CheckoutSessionId,
    ) -> Result<Option<CheckoutSession>, PaymentError> {
        let mut state = lock(&self.state);
        state.retrievals += 1;
        Ok(state.sessions.get(id).cloned())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Catalog details for the pouch at `price` minor units.
#[must_use]
pub fn pouch(price: i64) -> VariantDetails {
    VariantDetails {
        product_name: "Pineapple Pouch".to_string(),
        variant_name: "Large".to_string(),
        unit_price: Money::from_minor(price),
        image_ref: None,
    }
}

#[must_use]
pub fn jane() -> ContactDetails {
    ContactDetails {
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        email: "jane@example.com".to_string(),
    }
}

#[must_use]
pub fn sample_address() -> CollectedAddress {
    CollectedAddress {
        name: "Jane Doe".to_string(),
        line1: "1 Main St".to_string(),
        line2: None,
        city: "Springfield".to_string(),
        state: Some("IL".to_string()),
        postal_code: "62701".to_string(),
        country: "US".to_string(),
        phone: None,
    }
}

/// A paid, completed checkout session object for `order_code`.
#[must_use]
pub fn session_json(order_code: &OrderCode, payment_intent: &str) -> serde_json::Value {
    json!({
        "id": "cs_test_a1b2c3",
        "object": "checkout.session",
        "status": "complete",
        "payment_status": "paid",
        "payment_intent": payment_intent,
        "amount_total": 2299,
        "currency": "usd",
        "client_reference_id": order_code,
        "metadata": {ORDER_CODE_METADATA_KEY: order_code},
        "customer_details": {
            "email": "jane@example.com",
            "name": "Jane Doe",
            "phone": "+15555550123"
        },
        "shipping_details": {
            "name": "Jane Doe",
            "address": {
                "line1": "1 Main St",
                "line2": null,
                "city": "Springfield",
                "state": "IL",
                "postal_code": "62701",
                "country": "US"
            }
        },
        "line_items": {
            "data": [
                {"description": "Pineapple Pouch - Large", "quantity": 1, "amount_total": 1799}
            ]
        }
    })
}

#[must_use]
pub fn paid_session(order_code: &OrderCode, payment_intent: &str) -> CheckoutSession {
    serde_json::from_value(session_json(order_code, payment_intent))
        .expect("fixture session deserializes")
}

/// Raw `checkout.session.completed` payload.
#[must_use]
pub fn completed_event_json(order_code: &OrderCode, payment_intent: &str) -> String {
    json!({
        "id": "evt_test_1",
        "object": "event",
        "type": crate::payment::webhook::CHECKOUT_SESSION_COMPLETED,
        "created": 1_760_000_000,
        "livemode": false,
        "data": {"object": session_json(order_code, payment_intent)}
    })
    .to_string()
}

#[must_use]
pub fn completed_event(order_code: &OrderCode, payment_intent: &str) -> StripeEvent {
    serde_json::from_str(&completed_event_json(order_code, payment_intent))
        .expect("fixture event deserializes")
}

// =============================================================================
// Configuration
// =============================================================================

/// Signing secret used by [`test_config`].
pub const WEBHOOK_SECRET: &str = "whsec_test_9fK2mQ7vLx4RzT8bWn3Jc6Hd";

/// Configuration pointing at unreachable local endpoints.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        base_url: "https://shop.test".to_string(),
        commerce: CommerceConfig {
            shop_api_url: "http://127.0.0.1:9/shop-api".to_string(),
            admin_api_url: "http://127.0.0.1:9/admin-api".to_string(),
            admin_token: SecretString::from("admin_test_token"),
            auth_token_header: "vendure-auth-token".to_string(),
        },
        stripe: StripeConfig {
            secret_key: SecretString::from("sk_test_key"),
            webhook_secret: SecretString::from(WEBHOOK_SECRET),
            api_base: "http://127.0.0.1:9".to_string(),
            currency: CurrencyCode::USD,
            shipping_countries: vec!["US".to_string()],
        },
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}
