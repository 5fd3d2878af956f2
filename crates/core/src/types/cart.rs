//! Cart items and snapshots.
//!
//! A [`CartSnapshot`] is the client-side view of the customer's order. Its
//! `total` and `quantity` are derived from the items on every mutation and
//! cannot be set independently, and a snapshot never holds two items for the
//! same variant.
//!
//! Items added optimistically carry a [`LineId::Tentative`] placeholder until
//! the commerce platform assigns a real line id. Only [`LineId::Confirmed`]
//! ids may ever be sent back to the platform.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::id::{OrderLineId, VariantId};
use super::money::Money;

/// Prefix used when a tentative id is rendered as a string.
const TENTATIVE_PREFIX: &str = "tmp_";

/// Errors from constructing or mutating a [`CartItem`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartItemError {
    /// Quantity must be at least one; zero means "remove the line".
    #[error("cart item quantity must be at least 1")]
    ZeroQuantity,
    /// Unit prices are never negative.
    #[error("unit price cannot be negative (got {0})")]
    NegativePrice(i64),
}

/// Identifier of a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LineId {
    /// Line id assigned by the commerce platform.
    Confirmed(OrderLineId),
    /// Local placeholder for an optimistic line not yet confirmed remotely.
    Tentative(Uuid),
}

impl LineId {
    /// Create a fresh tentative id.
    #[must_use]
    pub fn tentative() -> Self {
        Self::Tentative(Uuid::new_v4())
    }

    /// The platform line id, if this line has been confirmed.
    #[must_use]
    pub const fn confirmed(&self) -> Option<&OrderLineId> {
        match self {
            Self::Confirmed(id) => Some(id),
            Self::Tentative(_) => None,
        }
    }

    /// Whether this is a local placeholder.
    #[must_use]
    pub const fn is_tentative(&self) -> bool {
        matches!(self, Self::Tentative(_))
    }
}

impl From<OrderLineId> for LineId {
    fn from(id: OrderLineId) -> Self {
        Self::Confirmed(id)
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed(id) => f.write_str(id.as_str()),
            Self::Tentative(uuid) => write!(f, "{TENTATIVE_PREFIX}{uuid}"),
        }
    }
}

impl FromStr for LineId {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.strip_prefix(TENTATIVE_PREFIX)
            .and_then(|rest| Uuid::parse_str(rest).ok())
            .map_or_else(|| Self::Confirmed(OrderLineId::new(s)), Self::Tentative))
    }
}

impl Serialize for LineId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LineId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let Ok(id) = s.parse::<Self>();
        Ok(id)
    }
}

/// One line of the cart.
///
/// `line_total` is always `unit_price × quantity`; it is serialized for
/// consumers but recomputed (never trusted) when a record is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "CartItemRecord")]
pub struct CartItem {
    id: LineId,
    variant_id: VariantId,
    name: String,
    variant_name: String,
    quantity: u32,
    unit_price: Money,
    line_total: Money,
    image_ref: Option<String>,
}

/// Wire shape of a persisted cart item.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartItemRecord {
    id: LineId,
    variant_id: VariantId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    variant_name: String,
    quantity: u32,
    unit_price: Money,
    #[serde(default)]
    image_ref: Option<String>,
}

impl TryFrom<CartItemRecord> for CartItem {
    type Error = CartItemError;

    fn try_from(record: CartItemRecord) -> Result<Self, Self::Error> {
        Ok(
            Self::new(record.id, record.variant_id, record.quantity, record.unit_price)?
                .with_names(record.name, record.variant_name)
                .with_image(record.image_ref),
        )
    }
}

impl CartItem {
    /// Create a cart item.
    ///
    /// # Errors
    ///
    /// Returns an error if `quantity` is zero or `unit_price` is negative.
    pub fn new(
        id: LineId,
        variant_id: VariantId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Self, CartItemError> {
        if quantity == 0 {
            return Err(CartItemError::ZeroQuantity);
        }
        if unit_price.minor() < 0 {
            return Err(CartItemError::NegativePrice(unit_price.minor()));
        }
        Ok(Self {
            id,
            variant_id,
            name: String::new(),
            variant_name: String::new(),
            quantity,
            unit_price,
            line_total: unit_price.times(quantity),
            image_ref: None,
        })
    }

    /// Set product and variant display names.
    #[must_use]
    pub fn with_names(mut self, name: impl Into<String>, variant_name: impl Into<String>) -> Self {
        self.name = name.into();
        self.variant_name = variant_name.into();
        self
    }

    /// Set the image reference.
    #[must_use]
    pub fn with_image(mut self, image_ref: Option<String>) -> Self {
        self.image_ref = image_ref;
        self
    }

    /// Change the quantity, recomputing the line total.
    ///
    /// # Errors
    ///
    /// Returns [`CartItemError::ZeroQuantity`] for zero; remove the line instead.
    pub fn set_quantity(&mut self, quantity: u32) -> Result<(), CartItemError> {
        if quantity == 0 {
            return Err(CartItemError::ZeroQuantity);
        }
        self.quantity = quantity;
        self.line_total = self.unit_price.times(quantity);
        Ok(())
    }

    #[must_use]
    pub const fn id(&self) -> &LineId {
        &self.id
    }

    #[must_use]
    pub const fn variant_id(&self) -> &VariantId {
        &self.variant_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn variant_name(&self) -> &str {
        &self.variant_name
    }

    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    #[must_use]
    pub const fn unit_price(&self) -> Money {
        self.unit_price
    }

    #[must_use]
    pub const fn line_total(&self) -> Money {
        self.line_total
    }

    #[must_use]
    pub fn image_ref(&self) -> Option<&str> {
        self.image_ref.as_deref()
    }
}

/// Derived view of the cart: ordered items plus their totals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CartSnapshot {
    items: Vec<CartItem>,
    total: Money,
    quantity: u32,
}

impl CartSnapshot {
    /// An empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from items, folding duplicate variants into the first
    /// line that carries them.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut snapshot = Self::empty();
        for item in items {
            snapshot.merge(item);
        }
        snapshot.recompute();
        snapshot
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<CartItem> {
        self.items
    }

    /// Sum of all line totals.
    #[must_use]
    pub const fn total(&self) -> Money {
        self.total
    }

    /// Sum of all item quantities.
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn find_line(&self, id: &LineId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    #[must_use]
    pub fn find_variant(&self, variant_id: &VariantId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.variant_id == variant_id)
    }

    /// Whether any line is still waiting for a platform-assigned id.
    #[must_use]
    pub fn has_tentative_lines(&self) -> bool {
        self.items.iter().any(|item| item.id.is_tentative())
    }

    /// Add an item, merging its quantity into an existing line for the same
    /// variant (keeping that line's id and price) or appending it.
    pub fn add_or_merge(&mut self, item: CartItem) {
        self.merge(item);
        self.recompute();
    }

    /// Set a line's quantity. Returns `false` if the line does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CartItemError::ZeroQuantity`] for zero; use [`Self::remove_line`].
    pub fn set_line_quantity(&mut self, id: &LineId, quantity: u32) -> Result<bool, CartItemError> {
        let Some(item) = self.items.iter_mut().find(|item| &item.id == id) else {
            return Ok(false);
        };
        item.set_quantity(quantity)?;
        self.recompute();
        Ok(true)
    }

    /// Remove a line, returning it if it existed.
    pub fn remove_line(&mut self, id: &LineId) -> Option<CartItem> {
        let index = self.items.iter().position(|item| &item.id == id)?;
        let removed = self.items.remove(index);
        self.recompute();
        Some(removed)
    }

    /// Check the derived fields against the items.
    #[must_use]
    pub fn totals_consistent(&self) -> bool {
        self.total == self.items.iter().map(CartItem::line_total).sum::<Money>()
            && self.quantity == sum_quantity(&self.items)
    }

    fn merge(&mut self, item: CartItem) {
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|existing| existing.variant_id == item.variant_id)
        {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
            existing.line_total = existing.unit_price.times(existing.quantity);
        } else {
            self.items.push(item);
        }
    }

    fn recompute(&mut self) {
        self.total = self.items.iter().map(CartItem::line_total).sum();
        self.quantity = sum_quantity(&self.items);
    }
}

fn sum_quantity(items: &[CartItem]) -> u32 {
    items
        .iter()
        .fold(0_u32, |acc, item| acc.saturating_add(item.quantity))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn item(id: LineId, variant: &str, quantity: u32, price: i64) -> CartItem {
        CartItem::new(id, VariantId::new(variant), quantity, Money::from_minor(price))
            .unwrap()
            .with_names("Pineapple Pouch", variant)
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let result = CartItem::new(
            LineId::tentative(),
            VariantId::new("V1"),
            0,
            Money::from_minor(100),
        );
        assert_eq!(result, Err(CartItemError::ZeroQuantity));
    }

    #[test]
    fn test_snapshot_totals_follow_items() {
        let mut snapshot = CartSnapshot::empty();
        snapshot.add_or_merge(item(LineId::tentative(), "V1", 1, 1799));
        assert_eq!(snapshot.total(), Money::from_minor(1799));
        assert_eq!(snapshot.quantity(), 1);

        snapshot.add_or_merge(item(LineId::tentative(), "V2", 2, 500));
        assert_eq!(snapshot.total(), Money::from_minor(2799));
        assert_eq!(snapshot.quantity(), 3);
        assert!(snapshot.totals_consistent());
    }

    #[test]
    fn test_merge_keeps_one_line_per_variant() {
        let confirmed = LineId::from(OrderLineId::new("L1"));
        let mut snapshot = CartSnapshot::from_items([item(confirmed.clone(), "V1", 1, 1799)]);
        snapshot.add_or_merge(item(LineId::tentative(), "V1", 2, 1799));

        assert_eq!(snapshot.items().len(), 1);
        assert_eq!(snapshot.items()[0].id(), &confirmed);
        assert_eq!(snapshot.items()[0].quantity(), 3);
        assert_eq!(snapshot.total(), Money::from_minor(5397));
    }

    #[test]
    fn test_set_quantity_and_remove() {
        let id = LineId::from(OrderLineId::new("L1"));
        let mut snapshot = CartSnapshot::from_items([item(id.clone(), "V1", 1, 1799)]);

        assert!(snapshot.set_line_quantity(&id, 4).unwrap());
        assert_eq!(snapshot.total(), Money::from_minor(7196));

        let missing = LineId::from(OrderLineId::new("nope"));
        assert!(!snapshot.set_line_quantity(&missing, 2).unwrap());

        let removed = snapshot.remove_line(&id).unwrap();
        assert_eq!(removed.quantity(), 4);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.total(), Money::ZERO);
        assert_eq!(snapshot.quantity(), 0);
    }

    #[test]
    fn test_line_id_string_forms() {
        let tentative = LineId::tentative();
        let parsed: LineId = tentative.to_string().parse().unwrap();
        assert_eq!(parsed, tentative);
        assert!(parsed.is_tentative());

        let confirmed: LineId = "42".parse().unwrap();
        assert_eq!(confirmed.confirmed().map(OrderLineId::as_str), Some("42"));
    }

    #[test]
    fn test_persisted_record_recomputes_line_total() {
        let json = r#"[{"id":"L1","variantId":"V1","name":"Pouch","variantName":"Large",
            "quantity":2,"unitPrice":1799,"lineTotal":1,"imageRef":null}]"#;
        let items: Vec<CartItem> = serde_json::from_str(json).unwrap();
        assert_eq!(items[0].line_total(), Money::from_minor(3598));
    }

    #[test]
    fn test_persisted_record_with_zero_quantity_is_rejected() {
        let json = r#"{"id":"L1","variantId":"V1","quantity":0,"unitPrice":1799}"#;
        assert!(serde_json::from_str::<CartItem>(json).is_err());
    }
}
