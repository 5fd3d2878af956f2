//! Order and checkout state enums.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Order state as reported by the commerce platform's order state machine.
///
/// The platform is the single arbiter of legal transitions; this enum only
/// names the states the storefront reasons about. Unknown states are kept
/// verbatim in [`OrderState::Other`] so a platform upgrade never breaks
/// deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderState {
    /// Cart phase; the only state in which lines may be modified.
    AddingItems,
    /// Checkout has begun; lines are locked until reset.
    ArrangingPayment,
    PaymentAuthorized,
    PaymentSettled,
    PartiallyShipped,
    Shipped,
    PartiallyDelivered,
    Delivered,
    Modifying,
    ArrangingAdditionalPayment,
    Cancelled,
    Draft,
    /// Any state this build does not know about.
    Other(String),
}

impl OrderState {
    /// The platform's name for this state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AddingItems => "AddingItems",
            Self::ArrangingPayment => "ArrangingPayment",
            Self::PaymentAuthorized => "PaymentAuthorized",
            Self::PaymentSettled => "PaymentSettled",
            Self::PartiallyShipped => "PartiallyShipped",
            Self::Shipped => "Shipped",
            Self::PartiallyDelivered => "PartiallyDelivered",
            Self::Delivered => "Delivered",
            Self::Modifying => "Modifying",
            Self::ArrangingAdditionalPayment => "ArrangingAdditionalPayment",
            Self::Cancelled => "Cancelled",
            Self::Draft => "Draft",
            Self::Other(s) => s,
        }
    }

    /// Whether lines may be added, adjusted or removed.
    #[must_use]
    pub const fn is_modifiable(&self) -> bool {
        matches!(self, Self::AddingItems)
    }

    /// Whether payment has been settled (or the order has moved beyond it).
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::PaymentSettled
                | Self::PartiallyShipped
                | Self::Shipped
                | Self::PartiallyDelivered
                | Self::Delivered
        )
    }
}

impl From<String> for OrderState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "AddingItems" => Self::AddingItems,
            "ArrangingPayment" => Self::ArrangingPayment,
            "PaymentAuthorized" => Self::PaymentAuthorized,
            "PaymentSettled" => Self::PaymentSettled,
            "PartiallyShipped" => Self::PartiallyShipped,
            "Shipped" => Self::Shipped,
            "PartiallyDelivered" => Self::PartiallyDelivered,
            "Delivered" => Self::Delivered,
            "Modifying" => Self::Modifying,
            "ArrangingAdditionalPayment" => Self::ArrangingAdditionalPayment,
            "Cancelled" => Self::Cancelled,
            "Draft" => Self::Draft,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for OrderState {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<OrderState> for String {
    fn from(state: OrderState) -> Self {
        match state {
            OrderState::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps of the storefront checkout, in forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    #[default]
    Contact,
    Shipping,
    Payment,
    Confirmed,
}

impl CheckoutStep {
    /// The step a "Back" action returns to, if any.
    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::Contact | Self::Confirmed => None,
            Self::Shipping => Some(Self::Contact),
            Self::Payment => Some(Self::Shipping),
        }
    }
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contact => write!(f, "contact"),
            Self::Shipping => write!(f, "shipping"),
            Self::Payment => write!(f, "payment"),
            Self::Confirmed => write!(f, "confirmed"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_state_from_platform_names() {
        assert_eq!(OrderState::from("AddingItems"), OrderState::AddingItems);
        assert_eq!(
            OrderState::from("PaymentSettled"),
            OrderState::PaymentSettled
        );
        assert_eq!(
            OrderState::from("SomethingNew"),
            OrderState::Other("SomethingNew".to_string())
        );
    }

    #[test]
    fn test_order_state_serde_keeps_unknown_states() {
        let state: OrderState = serde_json::from_str("\"Fulfilling\"").unwrap();
        assert_eq!(serde_json::to_string(&state).unwrap(), "\"Fulfilling\"");

        let json = serde_json::to_string(&OrderState::ArrangingPayment).unwrap();
        assert_eq!(json, "\"ArrangingPayment\"");
    }

    #[test]
    fn test_order_state_predicates() {
        assert!(OrderState::AddingItems.is_modifiable());
        assert!(!OrderState::ArrangingPayment.is_modifiable());
        assert!(OrderState::PaymentSettled.is_settled());
        assert!(OrderState::Delivered.is_settled());
        assert!(!OrderState::PaymentAuthorized.is_settled());
    }

    #[test]
    fn test_checkout_step_previous() {
        assert_eq!(CheckoutStep::Payment.previous(), Some(CheckoutStep::Shipping));
        assert_eq!(CheckoutStep::Shipping.previous(), Some(CheckoutStep::Contact));
        assert_eq!(CheckoutStep::Contact.previous(), None);
        assert_eq!(CheckoutStep::Confirmed.previous(), None);
        assert!(CheckoutStep::Contact < CheckoutStep::Confirmed);
    }
}
