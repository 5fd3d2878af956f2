//! Newtype IDs for type-safe entity references.
//!
//! The commerce platform hands out opaque string identifiers for every
//! entity. Use the `define_id!` macro to create wrappers that prevent
//! accidentally passing a variant ID where an order line ID is expected.

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use pineapple_checkout_core::define_id;
/// define_id!(WidgetId);
/// define_id!(GadgetId);
///
/// let widget = WidgetId::new("1");
/// let gadget = GadgetId::new("1");
///
/// // These are different types, so this won't compile:
/// // let _: WidgetId = gadget;
/// assert_eq!(widget.as_str(), gadget.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Commerce platform entity IDs
define_id!(OrderId);
define_id!(OrderLineId);
define_id!(VariantId);
define_id!(CustomerId);
define_id!(ShippingMethodId);

// Customer-facing order code (e.g. "AB12CD34EF"). This is the only identifier
// that stays stable once an order leaves the customer's active session.
define_id!(OrderCode);

// Payment processor identifiers
define_id!(CheckoutSessionId);
define_id!(PaymentIntentId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_as_str() {
        let id = OrderLineId::new("L1");
        assert_eq!(id.as_str(), "L1");
        assert_eq!(id.to_string(), "L1");
    }

    #[test]
    fn test_id_serializes_transparently() {
        let code = OrderCode::from("AB12CD34EF");
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"AB12CD34EF\"");

        let parsed: OrderCode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, code);
    }
}
