//! Wire types for the commerce platform's Shop and Admin APIs.

use pineapple_checkout_core::{
    CustomerId, Money, OrderCode, OrderId, OrderLineId, OrderState, ShippingMethodId, VariantId,
};
use serde::{Deserialize, Serialize};

use super::CommerceError;

// =============================================================================
// Orders
// =============================================================================

/// An order as returned by either API (the `ActiveOrder` fragment).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOrder {
    pub id: OrderId,
    pub code: OrderCode,
    pub state: OrderState,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub total_quantity: u32,
    #[serde(default)]
    pub sub_total_with_tax: Money,
    #[serde(default)]
    pub shipping_with_tax: Money,
    #[serde(default)]
    pub total_with_tax: Money,
    #[serde(default)]
    pub customer: Option<RemoteCustomer>,
    #[serde(default)]
    pub shipping_address: Option<OrderAddress>,
    #[serde(default)]
    pub lines: Vec<RemoteOrderLine>,
    #[serde(default)]
    pub payments: Vec<RemotePayment>,
}

impl RemoteOrder {
    /// The line holding `variant_id`, if any.
    #[must_use]
    pub fn line_for_variant(&self, variant_id: &VariantId) -> Option<&RemoteOrderLine> {
        self.lines
            .iter()
            .find(|line| &line.product_variant.id == variant_id)
    }

    /// Whether a payment with this transaction id has already been recorded.
    #[must_use]
    pub fn has_payment(&self, transaction_id: &str) -> bool {
        self.payments
            .iter()
            .any(|p| p.transaction_id.as_deref() == Some(transaction_id))
    }
}

/// One line of a [`RemoteOrder`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOrderLine {
    pub id: OrderLineId,
    pub quantity: u32,
    pub unit_price_with_tax: Money,
    #[serde(default)]
    pub line_price_with_tax: Money,
    #[serde(default)]
    pub featured_asset: Option<Asset>,
    pub product_variant: RemoteVariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Asset {
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteVariant {
    pub id: VariantId,
    pub name: String,
    #[serde(default)]
    pub product: Option<ProductRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCustomer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
}

/// Address as stored on an order. Every field is optional on the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAddress {
    pub full_name: Option<String>,
    pub street_line1: Option<String>,
    pub street_line2: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePayment {
    pub id: String,
    pub method: String,
    pub state: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// A shipping method eligible for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMethodQuote {
    pub id: ShippingMethodId,
    pub name: String,
    pub price_with_tax: Money,
}

// =============================================================================
// Mutation results
// =============================================================================

/// The `ErrorResult` arm of a mutation union.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResult {
    pub error_code: String,
    pub message: String,
}

/// A mutation result union: the payload or an `ErrorResult`.
///
/// `ErrorResult` is tried first since the success payloads never carry an
/// `errorCode` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MutationResult<T> {
    Err(ErrorResult),
    Ok(T),
}

impl<T> MutationResult<T> {
    /// Convert into a `Result`, mapping `ErrorResult` to
    /// [`CommerceError::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns the platform's rejection.
    pub fn into_result(self) -> Result<T, CommerceError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Err(e) => Err(CommerceError::rejected(e.error_code, e.message)),
        }
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Guest customer details (`CreateCustomerInput`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
}

/// Shipping address (`CreateAddressInput`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    pub full_name: String,
    pub street_line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_line2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    pub postal_code: String,
    pub country_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// A payment taken by an external processor (`ManualPaymentInput`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualPaymentInput {
    pub order_id: OrderId,
    pub method: String,
    pub transaction_id: String,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ORDER_JSON: &str = r#"{
        "__typename": "Order",
        "id": "1",
        "code": "NP-0001",
        "state": "AddingItems",
        "currencyCode": "USD",
        "totalQuantity": 2,
        "subTotalWithTax": 3598,
        "shippingWithTax": 0,
        "totalWithTax": 3598,
        "customer": null,
        "shippingAddress": null,
        "lines": [{
            "id": "L1",
            "quantity": 2,
            "unitPriceWithTax": 1799,
            "linePriceWithTax": 3598,
            "featuredAsset": {"preview": "https://cdn.example.com/pouch.jpg"},
            "productVariant": {"id": "V1", "name": "Large", "product": {"name": "Pineapple Pouch"}}
        }]
    }"#;

    #[test]
    fn test_order_deserializes() {
        let order: RemoteOrder = serde_json::from_str(ORDER_JSON).unwrap();
        assert_eq!(order.code.as_str(), "NP-0001");
        assert_eq!(order.state, OrderState::AddingItems);
        assert_eq!(order.lines.len(), 1);
        assert!(order.line_for_variant(&VariantId::new("V1")).is_some());
        assert!(order.payments.is_empty());
    }

    #[test]
    fn test_mutation_result_picks_order() {
        let result: MutationResult<RemoteOrder> = serde_json::from_str(ORDER_JSON).unwrap();
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_mutation_result_picks_error_result() {
        let json = r#"{
            "__typename": "OrderModificationError",
            "errorCode": "ORDER_MODIFICATION_ERROR",
            "message": "Order contents may only be modified when in the \"AddingItems\" state"
        }"#;
        let result: MutationResult<RemoteOrder> = serde_json::from_str(json).unwrap();
        let err = result.into_result().unwrap_err();
        assert!(err.is_wrong_state());
    }

    #[test]
    fn test_address_input_omits_empty_optionals() {
        let input = AddressInput {
            full_name: "Jane Doe".to_string(),
            street_line1: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            country_code: "US".to_string(),
            ..AddressInput::default()
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["streetLine1"], "1 Main St");
        assert!(json.get("province").is_none());
    }
}
