//! Cart reconciliation engine.
//!
//! Keeps a local [`CartSnapshot`] in step with the commerce platform's active
//! order:
//!
//! - Mutations apply optimistically, then call the platform, then re-derive
//!   the snapshot from a fresh read of the order.
//! - A failed mutation restores the snapshot taken before it and re-syncs;
//!   local state is never patched forward from a failed call.
//! - Items are mirrored to durable storage. When the platform has no active
//!   order (expired session) the persisted items are replayed to rebuild it.
//! - An order stuck outside `AddingItems` (abandoned checkout) is reset and
//!   the mutation retried once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pineapple_checkout_core::{
    CartItem, CartItemError, CartSnapshot, LineId, Money, OrderLineId, VariantId,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::commerce::conversions::snapshot_from_order;
use crate::commerce::{CommerceError, RemoteOrder, ShopApi};
use crate::storage::{LocalStore, keys};

/// Errors surfaced by cart mutations.
///
/// By the time one is returned the local snapshot has already been rolled
/// back.
#[derive(Debug, Error)]
pub enum CartError {
    #[error(transparent)]
    Remote(#[from] CommerceError),

    #[error(transparent)]
    Item(#[from] CartItemError),

    #[error("cart line {0} not found")]
    LineNotFound(LineId),
}

/// Observable cart state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CartState {
    pub snapshot: CartSnapshot,
    /// A sync is in flight.
    pub syncing: bool,
}

/// Display details for a variant, known from the product page before the
/// platform confirms the line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantDetails {
    pub product_name: String,
    pub variant_name: String,
    pub unit_price: Money,
    pub image_ref: Option<String>,
}

/// The cart engine. Share it behind an `Arc`.
pub struct CartEngine {
    commerce: Arc<dyn ShopApi>,
    store: Arc<dyn LocalStore>,
    state: watch::Sender<CartState>,
    syncs_in_flight: AtomicUsize,
    restore_guard: Mutex<()>,
}

impl CartEngine {
    /// Create an engine, seeding the snapshot from persisted items so a cart
    /// is visible before the first sync completes.
    #[must_use]
    pub fn new(commerce: Arc<dyn ShopApi>, store: Arc<dyn LocalStore>) -> Self {
        let snapshot = load_persisted(store.as_ref())
            .map(CartSnapshot::from_items)
            .unwrap_or_default();
        let (state, _) = watch::channel(CartState {
            snapshot,
            syncing: false,
        });

        Self {
            commerce,
            store,
            state,
            syncs_in_flight: AtomicUsize::new(0),
            restore_guard: Mutex::new(()),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.state.borrow().snapshot.clone()
    }

    /// Whether a sync is in flight.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.state.borrow().syncing
    }

    /// Subscribe to cart state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.subscribe()
    }

    /// Add `quantity` of a variant.
    ///
    /// The line appears immediately (merged into an existing line for the
    /// same variant) and is confirmed by a sync once the platform accepts it.
    ///
    /// # Errors
    ///
    /// Returns the platform's error after rolling back.
    #[instrument(skip(self, details), fields(variant_id = %variant_id))]
    pub async fn add(
        &self,
        variant_id: &VariantId,
        quantity: u32,
        details: &VariantDetails,
    ) -> Result<(), CartError> {
        let item = CartItem::new(
            LineId::tentative(),
            variant_id.clone(),
            quantity,
            details.unit_price,
        )?
        .with_names(details.product_name.clone(), details.variant_name.clone())
        .with_image(details.image_ref.clone());

        let before = self.snapshot();
        self.apply(|snapshot| snapshot.add_or_merge(item));

        let result = self
            .with_reset_retry(|| self.commerce.add_item(variant_id, quantity))
            .await;
        self.settle(before, result).await
    }

    /// Set a line's quantity. Zero or less removes the line.
    ///
    /// A line still waiting for its platform id is resolved by a sync first.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] for an unknown line, or the
    /// platform's error after rolling back.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn update_quantity(&self, line_id: &LineId, quantity: i64) -> Result<(), CartError> {
        let Ok(quantity) = u32::try_from(quantity) else {
            return self.remove(line_id).await;
        };
        if quantity == 0 {
            return self.remove(line_id).await;
        }

        let remote_id = self.resolve_line(line_id).await?;
        let local_id = LineId::Confirmed(remote_id.clone());

        let before = self.snapshot();
        let mut updated = Ok(false);
        self.apply(|snapshot| updated = snapshot.set_line_quantity(&local_id, quantity));
        if !updated? {
            return Err(CartError::LineNotFound(line_id.clone()));
        }

        let result = self
            .with_reset_retry(|| self.commerce.adjust_line(&remote_id, quantity))
            .await;
        self.settle(before, result).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] for an unknown line, or the
    /// platform's error after rolling back.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove(&self, line_id: &LineId) -> Result<(), CartError> {
        let remote_id = self.resolve_line(line_id).await?;
        let local_id = LineId::Confirmed(remote_id.clone());

        let before = self.snapshot();
        let mut removed = None;
        self.apply(|snapshot| removed = snapshot.remove_line(&local_id));
        if removed.is_none() {
            return Err(CartError::LineNotFound(line_id.clone()));
        }

        let result = self
            .with_reset_retry(|| self.commerce.remove_line(&remote_id))
            .await;
        self.settle(before, result).await
    }

    /// Re-derive the snapshot from the platform.
    ///
    /// Adopts the active order if there is one. Otherwise replays persisted
    /// items into a new order, or clears the cart if there is nothing to
    /// replay. Calling this repeatedly without remote changes leaves the
    /// snapshot unchanged.
    ///
    /// # Errors
    ///
    /// Returns the platform's error; the snapshot is left as it was.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<(), CartError> {
        self.begin_sync();
        let result = self.sync_inner().await;
        self.end_sync();
        result
    }

    /// Empty the local cart and its persisted copy. Does not touch the
    /// platform (used after an order completes).
    pub fn clear(&self) {
        self.publish(CartSnapshot::empty());
        if let Err(e) = self.store.remove(keys::CART_ITEMS) {
            warn!(error = %e, "Failed to clear persisted cart");
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn sync_inner(&self) -> Result<(), CartError> {
        match self.commerce.active_order().await? {
            Some(order) => {
                self.adopt(&order);
                Ok(())
            }
            None => self.restore_or_clear().await,
        }
    }

    /// Rebuild a missing order from persisted items.
    ///
    /// Serialized so concurrent syncs cannot each replay the same items.
    async fn restore_or_clear(&self) -> Result<(), CartError> {
        let _guard = self.restore_guard.lock().await;

        // Another sync may have restored since our caller read `None`
        if let Some(order) = self.commerce.active_order().await? {
            self.adopt(&order);
            return Ok(());
        }

        let items = load_persisted(self.store.as_ref())
            .filter(|items| !items.is_empty())
            .unwrap_or_else(|| self.snapshot().into_items());

        if items.is_empty() {
            debug!("No active order and nothing to restore");
            self.clear();
            return Ok(());
        }

        info!(count = items.len(), "Restoring cart into a new order");
        for item in &items {
            if let Err(e) = self
                .commerce
                .add_item(item.variant_id(), item.quantity())
                .await
            {
                warn!(
                    variant_id = %item.variant_id(),
                    quantity = item.quantity(),
                    error = %e,
                    "Failed to restore cart item"
                );
            }
        }

        match self.commerce.active_order().await? {
            Some(order) => self.adopt(&order),
            None => {
                warn!("Platform has no order after restoring cart");
                self.clear();
            }
        }
        Ok(())
    }

    /// Run a line mutation, resetting a stuck order and retrying once if the
    /// platform refuses because the order left `AddingItems`.
    async fn with_reset_retry<F, Fut>(&self, op: F) -> Result<RemoteOrder, CommerceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<RemoteOrder, CommerceError>>,
    {
        match op().await {
            Err(e) if e.is_wrong_state() => {
                info!(error = %e, "Order is locked for checkout, resetting to AddingItems");
                self.commerce.reset_to_adding_items().await?;
                op().await
            }
            result => result,
        }
    }

    /// Finish a mutation: sync on success, roll back on failure.
    async fn settle(
        &self,
        before: CartSnapshot,
        result: Result<RemoteOrder, CommerceError>,
    ) -> Result<(), CartError> {
        match result {
            Ok(_) => self.sync().await,
            Err(e) => {
                warn!(error = %e, "Cart mutation failed, rolling back");
                self.rollback(before).await;
                Err(e.into())
            }
        }
    }

    /// Restore the pre-mutation snapshot, then re-derive from the platform.
    async fn rollback(&self, before: CartSnapshot) {
        self.publish(before.clone());
        self.persist(&before);

        if let Err(e) = self.sync().await {
            error!(error = %e, "Sync after rollback failed, keeping previous cart");
        }
    }

    /// Map a local line id to the platform's.
    async fn resolve_line(&self, line_id: &LineId) -> Result<OrderLineId, CartError> {
        match line_id {
            LineId::Confirmed(id) => {
                if self.snapshot().find_line(line_id).is_none() {
                    return Err(CartError::LineNotFound(line_id.clone()));
                }
                Ok(id.clone())
            }
            LineId::Tentative(_) => {
                let variant_id = self
                    .snapshot()
                    .find_line(line_id)
                    .map(|item| item.variant_id().clone())
                    .ok_or_else(|| CartError::LineNotFound(line_id.clone()))?;

                debug!(variant_id = %variant_id, "Resolving tentative line");
                self.sync().await?;

                self.snapshot()
                    .find_variant(&variant_id)
                    .and_then(|item| item.id().confirmed().cloned())
                    .ok_or_else(|| CartError::LineNotFound(line_id.clone()))
            }
        }
    }

    fn adopt(&self, order: &RemoteOrder) {
        let snapshot = snapshot_from_order(order);
        debug!(
            order_code = %order.code,
            state = %order.state,
            lines = snapshot.items().len(),
            "Adopted active order"
        );
        self.persist(&snapshot);
        self.publish(snapshot);
    }

    fn apply(&self, mutate: impl FnOnce(&mut CartSnapshot)) {
        let mut snapshot = self.snapshot();
        mutate(&mut snapshot);
        self.persist(&snapshot);
        self.publish(snapshot);
    }

    fn publish(&self, snapshot: CartSnapshot) {
        self.state.send_if_modified(|state| {
            if state.snapshot == snapshot {
                false
            } else {
                state.snapshot = snapshot;
                true
            }
        });
    }

    fn persist(&self, snapshot: &CartSnapshot) {
        let result = serde_json::to_string(snapshot.items())
            .map_err(crate::storage::StorageError::from)
            .and_then(|json| self.store.set(keys::CART_ITEMS, &json));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist cart");
        }
    }

    fn begin_sync(&self) {
        if self.syncs_in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
            self.state.send_modify(|state| state.syncing = true);
        }
    }

    fn end_sync(&self) {
        if self.syncs_in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.send_modify(|state| state.syncing = false);
        }
    }
}

fn load_persisted(store: &dyn LocalStore) -> Option<Vec<CartItem>> {
    let json = store.get(keys::CART_ITEMS)?;
    match serde_json::from_str(&json) {
        Ok(items) => Some(items),
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable persisted cart");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;
    use pineapple_checkout_core::{OrderState, ShippingMethodId};
    use tokio::sync::Notify;

    use super::*;
    use crate::commerce::{
        AddressInput, CustomerInput, ORDER_MODIFICATION_ERROR, ShippingMethodQuote,
    };
    use crate::storage::MemoryStore;
    use crate::test_utils::{FakePlatform, ShopOp, pouch};

    struct Harness {
        platform: Arc<FakePlatform>,
        store: Arc<MemoryStore>,
        engine: Arc<CartEngine>,
    }

    fn harness() -> Harness {
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(CartEngine::new(platform.shop(), store.clone()));
        Harness {
            platform,
            store,
            engine,
        }
    }

    fn v1() -> VariantId {
        VariantId::new("V1")
    }

    fn persisted(store: &MemoryStore) -> Vec<CartItem> {
        serde_json::from_str(&store.get(keys::CART_ITEMS).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_add_shows_optimistic_line_then_confirms() {
        let h = harness();
        let gate = h.platform.gate_next(ShopOp::AddItem);

        let engine = h.engine.clone();
        let task = tokio::spawn(async move { engine.add(&v1(), 1, &pouch(1799)).await });

        gate.entered().await;
        let optimistic = h.engine.snapshot();
        assert_eq!(optimistic.items().len(), 1);
        assert_eq!(optimistic.items()[0].variant_id(), &v1());
        assert_eq!(optimistic.items()[0].quantity(), 1);
        assert_eq!(optimistic.items()[0].line_total(), Money::from_minor(1799));
        assert_eq!(optimistic.total(), Money::from_minor(1799));
        assert_eq!(optimistic.quantity(), 1);
        assert!(optimistic.has_tentative_lines());

        gate.release();
        task.await.unwrap().unwrap();

        let confirmed = h.engine.snapshot();
        assert!(!confirmed.has_tentative_lines());
        assert_eq!(confirmed.total(), Money::from_minor(1799));
        assert_eq!(persisted(&h.store).len(), 1);
    }

    #[tokio::test]
    async fn test_add_merges_same_variant() {
        let h = harness();
        h.engine.add(&v1(), 1, &pouch(1799)).await.unwrap();
        h.engine.add(&v1(), 2, &pouch(1799)).await.unwrap();

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.items().len(), 1);
        assert_eq!(snapshot.quantity(), 3);
        assert_eq!(snapshot.total(), Money::from_minor(5397));
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let h = harness();
        h.engine.add(&v1(), 2, &pouch(1799)).await.unwrap();

        h.engine.sync().await.unwrap();
        let first = h.engine.snapshot();
        h.engine.sync().await.unwrap();
        assert_eq!(h.engine.snapshot(), first);
        assert!(!h.engine.is_syncing());
    }

    #[tokio::test]
    async fn test_failed_adjust_restores_original_quantity() {
        let h = harness();
        h.engine.add(&v1(), 2, &pouch(1799)).await.unwrap();
        let line = h.engine.snapshot().items()[0].id().clone();

        h.platform.fail_next(
            ShopOp::AdjustLine,
            CommerceError::rejected("INSUFFICIENT_STOCK_ERROR", "Only 3 items available"),
        );
        let err = h.engine.update_quantity(&line, 5).await.unwrap_err();
        assert_eq!(err.to_string(), "Only 3 items available");

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.items()[0].quantity(), 2);
        assert_eq!(snapshot.total(), Money::from_minor(3598));

        let reference = Arc::new(CartEngine::new(h.platform.shop(), Arc::new(MemoryStore::new())));
        reference.sync().await.unwrap();
        assert_eq!(snapshot, reference.snapshot());
    }

    #[tokio::test]
    async fn test_failed_update_to_zero_restores_line() {
        let h = harness();
        h.engine.add(&v1(), 2, &pouch(1799)).await.unwrap();
        let line = h.engine.snapshot().items()[0].id().clone();

        h.platform.fail_next(
            ShopOp::RemoveLine,
            CommerceError::rejected("UNKNOWN_ERROR", "Line could not be removed"),
        );
        let err = h.engine.update_quantity(&line, 0).await.unwrap_err();
        assert_eq!(err.to_string(), "Line could not be removed");

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.items().len(), 1);
        assert_eq!(snapshot.items()[0].id(), &line);
        assert_eq!(snapshot.items()[0].quantity(), 2);
        assert_eq!(snapshot.total(), Money::from_minor(3598));
        assert_eq!(persisted(&h.store)[0].quantity(), 2);
    }

    #[tokio::test]
    async fn test_failed_remove_restores_line() {
        let h = harness();
        h.engine.add(&v1(), 2, &pouch(1799)).await.unwrap();
        let line = h.engine.snapshot().items()[0].id().clone();

        h.platform.fail_next(
            ShopOp::RemoveLine,
            CommerceError::rejected("UNKNOWN_ERROR", "Line could not be removed"),
        );
        let err = h.engine.remove(&line).await.unwrap_err();
        assert_eq!(err.to_string(), "Line could not be removed");

        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.items().len(), 1);
        assert_eq!(snapshot.items()[0].id(), &line);
        assert_eq!(snapshot.items()[0].quantity(), 2);
        assert_eq!(h.platform.active_state(), Some(OrderState::AddingItems));
    }

    #[tokio::test]
    async fn test_failed_add_on_empty_cart_is_not_replayed() {
        let h = harness();
        h.platform.fail_next(
            ShopOp::AddItem,
            CommerceError::rejected("INSUFFICIENT_STOCK_ERROR", "Out of stock"),
        );

        assert!(h.engine.add(&v1(), 1, &pouch(1799)).await.is_err());
        assert!(h.engine.snapshot().is_empty());
        assert_eq!(h.platform.count(ShopOp::AddItem), 1);
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let h = harness();
        h.engine.add(&v1(), 1, &pouch(1799)).await.unwrap();
        let line = h.engine.snapshot().items()[0].id().clone();

        h.engine.update_quantity(&line, 0).await.unwrap();

        assert!(h.engine.snapshot().is_empty());
        assert_eq!(h.platform.count(ShopOp::RemoveLine), 1);
        assert_eq!(h.platform.count(ShopOp::AdjustLine), 0);
        assert!(persisted(&h.store).is_empty());
    }

    #[tokio::test]
    async fn test_negative_quantity_removes_line() {
        let h = harness();
        h.engine.add(&v1(), 1, &pouch(1799)).await.unwrap();
        let line = h.engine.snapshot().items()[0].id().clone();

        h.engine.update_quantity(&line, -3).await.unwrap();
        assert!(h.engine.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_line_is_reported() {
        let h = harness();
        let missing = LineId::Confirmed(OrderLineId::new("nope"));
        assert!(matches!(
            h.engine.update_quantity(&missing, 2).await,
            Err(CartError::LineNotFound(_))
        ));
        assert_eq!(h.platform.count(ShopOp::AdjustLine), 0);
    }

    #[tokio::test]
    async fn test_stuck_order_is_reset_and_retried_once() {
        let h = harness();
        h.engine.add(&v1(), 1, &pouch(1799)).await.unwrap();
        h.platform.force_state(OrderState::ArrangingPayment);

        h.engine
            .add(&VariantId::new("V2"), 1, &pouch(250))
            .await
            .unwrap();

        assert_eq!(h.platform.count(ShopOp::ResetToAddingItems), 1);
        assert_eq!(h.platform.count(ShopOp::AddItem), 3);
        assert_eq!(h.engine.snapshot().quantity(), 2);
        assert_eq!(h.platform.active_state(), Some(OrderState::AddingItems));
    }

    #[tokio::test]
    async fn test_stuck_order_retry_failure_rolls_back() {
        let h = harness();
        h.engine.add(&v1(), 1, &pouch(1799)).await.unwrap();
        let before = h.engine.snapshot();
        h.platform.force_state(OrderState::ArrangingPayment);
        h.platform.fail_next(
            ShopOp::ResetToAddingItems,
            CommerceError::rejected("ORDER_STATE_TRANSITION_ERROR", "Cannot transition"),
        );

        let err = h.engine.add(&v1(), 1, &pouch(1799)).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot transition");
        assert_eq!(h.engine.snapshot(), before);
        // The original attempt plus nothing else: no retry without a reset
        assert_eq!(h.platform.count(ShopOp::AddItem), 2);
    }

    #[tokio::test]
    async fn test_wrong_state_by_code_triggers_reset() {
        let h = harness();
        h.engine.add(&v1(), 1, &pouch(1799)).await.unwrap();
        h.platform.fail_next(
            ShopOp::AddItem,
            CommerceError::rejected(ORDER_MODIFICATION_ERROR, "locked"),
        );

        h.engine.add(&v1(), 1, &pouch(1799)).await.unwrap();
        assert_eq!(h.platform.count(ShopOp::ResetToAddingItems), 1);
    }

    #[tokio::test]
    async fn test_expired_session_restores_from_persistence() {
        let h = harness();
        h.engine.add(&v1(), 2, &pouch(1799)).await.unwrap();
        h.platform.expire_session();

        let engine = CartEngine::new(h.platform.shop(), h.store.clone());
        assert_eq!(engine.snapshot().quantity(), 2);

        engine.sync().await.unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.quantity(), 2);
        assert!(!snapshot.has_tentative_lines());
        assert!(h.platform.active_state().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_syncs_restore_once() {
        let h = harness();
        h.engine.add(&v1(), 1, &pouch(1799)).await.unwrap();
        h.platform.expire_session();
        let adds_before = h.platform.count(ShopOp::AddItem);

        let (a, b) = tokio::join!(h.engine.sync(), h.engine.sync());
        a.unwrap();
        b.unwrap();

        assert_eq!(h.platform.count(ShopOp::AddItem), adds_before + 1);
        assert_eq!(h.engine.snapshot().quantity(), 1);
    }

    /// Once armed, holds back the answer of the next active-order read until
    /// released, so a sync can act on a stale `None`.
    struct StaleRead {
        inner: Arc<dyn ShopApi>,
        armed: AtomicBool,
        read: Notify,
        answer: Notify,
    }

    impl StaleRead {
        fn new(inner: Arc<dyn ShopApi>) -> Self {
            Self {
                inner,
                armed: AtomicBool::new(false),
                read: Notify::new(),
                answer: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl ShopApi for StaleRead {
        async fn active_order(&self) -> Result<Option<RemoteOrder>, CommerceError> {
            let order = self.inner.active_order().await;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.read.notify_one();
                self.answer.notified().await;
            }
            order
        }

        async fn add_item(
            &self,
            variant_id: &VariantId,
            quantity: u32,
        ) -> Result<RemoteOrder, CommerceError> {
            self.inner.add_item(variant_id, quantity).await
        }

        async fn adjust_line(
            &self,
            line_id: &OrderLineId,
            quantity: u32,
        ) -> Result<RemoteOrder, CommerceError> {
            self.inner.adjust_line(line_id, quantity).await
        }

        async fn remove_line(&self, line_id: &OrderLineId) -> Result<RemoteOrder, CommerceError> {
            self.inner.remove_line(line_id).await
        }

        async fn set_customer(&self, input: &CustomerInput) -> Result<RemoteOrder, CommerceError> {
            self.inner.set_customer(input).await
        }

        async fn set_shipping_address(
            &self,
            input: &AddressInput,
        ) -> Result<RemoteOrder, CommerceError> {
            self.inner.set_shipping_address(input).await
        }

        async fn eligible_shipping_methods(
            &self,
        ) -> Result<Vec<ShippingMethodQuote>, CommerceError> {
            self.inner.eligible_shipping_methods().await
        }

        async fn set_shipping_method(
            &self,
            id: &ShippingMethodId,
        ) -> Result<RemoteOrder, CommerceError> {
            self.inner.set_shipping_method(id).await
        }

        async fn transition_state(
            &self,
            state: OrderState,
        ) -> Result<RemoteOrder, CommerceError> {
            self.inner.transition_state(state).await
        }

        async fn create_payment_intent(&self) -> Result<String, CommerceError> {
            self.inner.create_payment_intent().await
        }
    }

    #[tokio::test]
    async fn test_sync_with_stale_empty_read_adopts_restored_order() {
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(MemoryStore::new());
        let shop = Arc::new(StaleRead::new(platform.shop()));
        let engine = Arc::new(CartEngine::new(shop.clone(), store.clone()));

        engine.add(&v1(), 1, &pouch(1799)).await.unwrap();
        platform.expire_session();
        let adds_before = platform.count(ShopOp::AddItem);
        shop.armed.store(true, Ordering::SeqCst);

        let late = engine.clone();
        let late_sync = tokio::spawn(async move { late.sync().await });
        shop.read.notified().await;

        // Restores while the other sync still holds its empty read
        engine.sync().await.unwrap();
        assert_eq!(platform.count(ShopOp::AddItem), adds_before + 1);

        shop.answer.notify_one();
        late_sync.await.unwrap().unwrap();

        assert_eq!(platform.count(ShopOp::AddItem), adds_before + 1);
        assert_eq!(engine.snapshot().quantity(), 1);
        assert_eq!(persisted(&store)[0].quantity(), 1);
    }

    #[tokio::test]
    async fn test_sync_without_order_or_persistence_clears() {
        let h = harness();
        h.engine.sync().await.unwrap();
        assert!(h.engine.snapshot().is_empty());
        assert_eq!(h.store.get(keys::CART_ITEMS), None);
        assert_eq!(h.platform.count(ShopOp::AddItem), 0);
    }

    #[tokio::test]
    async fn test_totals_hold_after_every_mutation() {
        let h = harness();
        let mut rx = h.engine.subscribe();

        h.engine.add(&v1(), 1, &pouch(1799)).await.unwrap();
        assert!(rx.borrow_and_update().snapshot.totals_consistent());

        h.engine
            .add(&VariantId::new("V2"), 3, &pouch(250))
            .await
            .unwrap();
        assert!(rx.borrow_and_update().snapshot.totals_consistent());

        let line = h.engine.snapshot().items()[1].id().clone();
        h.engine.update_quantity(&line, 1).await.unwrap();
        let state = rx.borrow_and_update().clone();
        assert!(state.snapshot.totals_consistent());
        assert_eq!(state.snapshot.total(), Money::from_minor(2049));
    }

    #[tokio::test]
    async fn test_clear_empties_local_state_only() {
        let h = harness();
        h.engine.add(&v1(), 1, &pouch(1799)).await.unwrap();

        h.engine.clear();
        assert!(h.engine.snapshot().is_empty());
        assert_eq!(h.store.get(keys::CART_ITEMS), None);
        assert!(h.platform.active_state().is_some());
    }
}
