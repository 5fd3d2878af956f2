//! GraphQL documents for the commerce platform.
//!
//! Every order-returning document selects the same `ActiveOrder` fragment so
//! all responses deserialize into [`super::RemoteOrder`].

/// A named GraphQL document.
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    pub name: &'static str,
    pub document: &'static str,
}

macro_rules! order_fragment {
    () => {
        r"
fragment ActiveOrder on Order {
  __typename
  id
  code
  state
  currencyCode
  totalQuantity
  subTotalWithTax
  shippingWithTax
  totalWithTax
  customer { id firstName lastName emailAddress }
  shippingAddress { fullName streetLine1 streetLine2 city province postalCode countryCode }
  lines {
    id
    quantity
    unitPriceWithTax
    linePriceWithTax
    featuredAsset { preview }
    productVariant { id name product { name } }
  }
  payments { id method state transactionId }
}
"
    };
}

macro_rules! operation {
    ($name:ident, $op:literal, $body:literal) => {
        pub const $name: Operation = Operation {
            name: $op,
            document: concat!($body, order_fragment!()),
        };
    };
}

// =============================================================================
// Shop API
// =============================================================================

operation!(
    GET_ACTIVE_ORDER,
    "GetActiveOrder",
    "query GetActiveOrder { activeOrder { ...ActiveOrder } }"
);

operation!(
    ADD_ITEM_TO_ORDER,
    "AddItemToOrder",
    r"mutation AddItemToOrder($productVariantId: ID!, $quantity: Int!) {
  addItemToOrder(productVariantId: $productVariantId, quantity: $quantity) {
    ...ActiveOrder
    ... on ErrorResult { errorCode message }
  }
}"
);

operation!(
    ADJUST_ORDER_LINE,
    "AdjustOrderLine",
    r"mutation AdjustOrderLine($orderLineId: ID!, $quantity: Int!) {
  adjustOrderLine(orderLineId: $orderLineId, quantity: $quantity) {
    ...ActiveOrder
    ... on ErrorResult { errorCode message }
  }
}"
);

operation!(
    REMOVE_ORDER_LINE,
    "RemoveOrderLine",
    r"mutation RemoveOrderLine($orderLineId: ID!) {
  removeOrderLine(orderLineId: $orderLineId) {
    ...ActiveOrder
    ... on ErrorResult { errorCode message }
  }
}"
);

operation!(
    SET_CUSTOMER_FOR_ORDER,
    "SetCustomerForOrder",
    r"mutation SetCustomerForOrder($input: CreateCustomerInput!) {
  setCustomerForOrder(input: $input) {
    ...ActiveOrder
    ... on ErrorResult { errorCode message }
  }
}"
);

operation!(
    SET_ORDER_SHIPPING_ADDRESS,
    "SetOrderShippingAddress",
    r"mutation SetOrderShippingAddress($input: CreateAddressInput!) {
  setOrderShippingAddress(input: $input) {
    ...ActiveOrder
    ... on ErrorResult { errorCode message }
  }
}"
);

pub const GET_ELIGIBLE_SHIPPING_METHODS: Operation = Operation {
    name: "GetEligibleShippingMethods",
    document: "query GetEligibleShippingMethods { eligibleShippingMethods { id name priceWithTax } }",
};

operation!(
    SET_ORDER_SHIPPING_METHOD,
    "SetOrderShippingMethod",
    r"mutation SetOrderShippingMethod($shippingMethodId: [ID!]!) {
  setOrderShippingMethod(shippingMethodId: $shippingMethodId) {
    ...ActiveOrder
    ... on ErrorResult { errorCode message }
  }
}"
);

operation!(
    TRANSITION_ORDER_TO_STATE,
    "TransitionOrderToState",
    r"mutation TransitionOrderToState($state: String!) {
  transitionOrderToState(state: $state) {
    ...ActiveOrder
    ... on ErrorResult { errorCode message }
  }
}"
);

pub const CREATE_PAYMENT_INTENT: Operation = Operation {
    name: "CreateStripePaymentIntent",
    document: "mutation CreateStripePaymentIntent { createStripePaymentIntent }",
};

// =============================================================================
// Admin API
// =============================================================================

operation!(
    ADMIN_ORDER_BY_CODE,
    "GetOrderByCode",
    r"query GetOrderByCode($code: String!) {
  orders(options: { filter: { code: { eq: $code } }, take: 1 }) {
    items { ...ActiveOrder }
  }
}"
);

operation!(
    ADMIN_SET_CUSTOMER,
    "SetCustomerForDraftOrder",
    r"mutation SetCustomerForDraftOrder($orderId: ID!, $input: CreateCustomerInput!) {
  setCustomerForDraftOrder(orderId: $orderId, input: $input) {
    ...ActiveOrder
    ... on ErrorResult { errorCode message }
  }
}"
);

operation!(
    ADMIN_SET_SHIPPING_ADDRESS,
    "SetDraftOrderShippingAddress",
    r"mutation SetDraftOrderShippingAddress($orderId: ID!, $input: CreateAddressInput!) {
  setDraftOrderShippingAddress(orderId: $orderId, input: $input) {
    ...ActiveOrder
  }
}"
);

pub const ADMIN_ELIGIBLE_SHIPPING_METHODS: Operation = Operation {
    name: "EligibleShippingMethodsForDraftOrder",
    document: r"query EligibleShippingMethodsForDraftOrder($orderId: ID!) {
  eligibleShippingMethodsForDraftOrder(orderId: $orderId) { id name priceWithTax }
}",
};

operation!(
    ADMIN_SET_SHIPPING_METHOD,
    "SetDraftOrderShippingMethod",
    r"mutation SetDraftOrderShippingMethod($orderId: ID!, $shippingMethodId: ID!) {
  setDraftOrderShippingMethod(orderId: $orderId, shippingMethodId: $shippingMethodId) {
    ...ActiveOrder
    ... on ErrorResult { errorCode message }
  }
}"
);

operation!(
    ADMIN_TRANSITION_ORDER,
    "TransitionOrderToStateAdmin",
    r"mutation TransitionOrderToStateAdmin($id: ID!, $state: String!) {
  transitionOrderToState(id: $id, state: $state) {
    ...ActiveOrder
    ... on ErrorResult { errorCode message }
  }
}"
);

operation!(
    ADMIN_ADD_MANUAL_PAYMENT,
    "AddManualPaymentToOrder",
    r"mutation AddManualPaymentToOrder($input: ManualPaymentInput!) {
  addManualPaymentToOrder(input: $input) {
    ...ActiveOrder
    ... on ErrorResult { errorCode message }
  }
}"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_documents_include_fragment() {
        for op in [
            GET_ACTIVE_ORDER,
            ADD_ITEM_TO_ORDER,
            TRANSITION_ORDER_TO_STATE,
            ADMIN_ORDER_BY_CODE,
            ADMIN_ADD_MANUAL_PAYMENT,
        ] {
            assert!(op.document.contains("...ActiveOrder"), "{}", op.name);
            assert!(
                op.document.contains("fragment ActiveOrder on Order"),
                "{}",
                op.name
            );
        }
    }

    #[test]
    fn test_plain_documents_have_no_fragment() {
        assert!(!GET_ELIGIBLE_SHIPPING_METHODS.document.contains("fragment"));
        assert!(!CREATE_PAYMENT_INTENT.document.contains("fragment"));
    }
}
