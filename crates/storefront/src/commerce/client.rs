//! Shop API client for the customer's session.

use std::sync::Arc;

use async_trait::async_trait;
use pineapple_checkout_core::{OrderLineId, OrderState, ShippingMethodId, VariantId};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::queries::{self, Operation};
use super::transport;
use super::{
    AddressInput, CommerceError, CustomerInput, MutationResult, RemoteOrder, ShippingMethodQuote,
    ShopApi,
};
use crate::config::CommerceConfig;
use crate::storage::{LocalStore, keys};

/// Client for the commerce platform's Shop API.
///
/// The session token is read from storage before every request and replaced
/// whenever the platform issues a new one, so the session (and its active
/// order) survives restarts.
#[derive(Clone)]
pub struct ShopClient {
    inner: Arc<ShopClientInner>,
}

struct ShopClientInner {
    client: reqwest::Client,
    endpoint: String,
    token_header: String,
    store: Arc<dyn LocalStore>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveOrderData {
    active_order: Option<RemoteOrder>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddItemData {
    add_item_to_order: MutationResult<RemoteOrder>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustLineData {
    adjust_order_line: MutationResult<RemoteOrder>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveLineData {
    remove_order_line: MutationResult<RemoteOrder>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetCustomerData {
    set_customer_for_order: MutationResult<RemoteOrder>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetAddressData {
    set_order_shipping_address: MutationResult<RemoteOrder>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShippingMethodsData {
    eligible_shipping_methods: Vec<ShippingMethodQuote>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetShippingMethodData {
    set_order_shipping_method: MutationResult<RemoteOrder>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransitionData {
    transition_order_to_state: Option<MutationResult<RemoteOrder>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentIntentData {
    create_stripe_payment_intent: Option<String>,
}

impl ShopClient {
    /// Create a Shop API client whose session token lives in `store`.
    #[must_use]
    pub fn new(config: &CommerceConfig, store: Arc<dyn LocalStore>) -> Self {
        Self {
            inner: Arc::new(ShopClientInner {
                client: reqwest::Client::new(),
                endpoint: config.shop_api_url.clone(),
                token_header: config.auth_token_header.clone(),
                store,
            }),
        }
    }

    /// Execute a GraphQL operation with the current session token.
    async fn execute<V, T>(&self, operation: Operation, variables: V) -> Result<T, CommerceError>
    where
        V: serde::Serialize + Send,
        T: DeserializeOwned,
    {
        let token = self.inner.store.get(keys::AUTH_TOKEN);
        let reply = transport::execute(
            &self.inner.client,
            &self.inner.endpoint,
            &self.inner.token_header,
            token.as_deref(),
            operation,
            variables,
        )
        .await;

        if let Some(new_token) = reply.session_token
            && token.as_deref() != Some(new_token.as_str())
        {
            debug!(operation = operation.name, "Commerce session token rotated");
            if let Err(e) = self.inner.store.set(keys::AUTH_TOKEN, &new_token) {
                warn!(error = %e, "Failed to persist commerce session token");
            }
        }

        reply.outcome
    }
}

#[async_trait]
impl ShopApi for ShopClient {
    #[instrument(skip(self))]
    async fn active_order(&self) -> Result<Option<RemoteOrder>, CommerceError> {
        let data: ActiveOrderData = self.execute(queries::GET_ACTIVE_ORDER, json!({})).await?;
        Ok(data.active_order)
    }

    #[instrument(skip(self), fields(variant_id = %variant_id))]
    async fn add_item(
        &self,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<RemoteOrder, CommerceError> {
        let data: AddItemData = self
            .execute(
                queries::ADD_ITEM_TO_ORDER,
                json!({ "productVariantId": variant_id, "quantity": quantity }),
            )
            .await?;
        data.add_item_to_order.into_result()
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn adjust_line(
        &self,
        line_id: &OrderLineId,
        quantity: u32,
    ) -> Result<RemoteOrder, CommerceError> {
        let data: AdjustLineData = self
            .execute(
                queries::ADJUST_ORDER_LINE,
                json!({ "orderLineId": line_id, "quantity": quantity }),
            )
            .await?;
        data.adjust_order_line.into_result()
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn remove_line(&self, line_id: &OrderLineId) -> Result<RemoteOrder, CommerceError> {
        let data: RemoveLineData = self
            .execute(queries::REMOVE_ORDER_LINE, json!({ "orderLineId": line_id }))
            .await?;
        data.remove_order_line.into_result()
    }

    #[instrument(skip(self, input))]
    async fn set_customer(&self, input: &CustomerInput) -> Result<RemoteOrder, CommerceError> {
        let data: SetCustomerData = self
            .execute(queries::SET_CUSTOMER_FOR_ORDER, json!({ "input": input }))
            .await?;
        data.set_customer_for_order.into_result()
    }

    #[instrument(skip(self, input))]
    async fn set_shipping_address(
        &self,
        input: &AddressInput,
    ) -> Result<RemoteOrder, CommerceError> {
        let data: SetAddressData = self
            .execute(queries::SET_ORDER_SHIPPING_ADDRESS, json!({ "input": input }))
            .await?;
        data.set_order_shipping_address.into_result()
    }

    #[instrument(skip(self))]
    async fn eligible_shipping_methods(&self) -> Result<Vec<ShippingMethodQuote>, CommerceError> {
        let data: ShippingMethodsData = self
            .execute(queries::GET_ELIGIBLE_SHIPPING_METHODS, json!({}))
            .await?;
        Ok(data.eligible_shipping_methods)
    }

    #[instrument(skip(self), fields(shipping_method_id = %id))]
    async fn set_shipping_method(
        &self,
        id: &ShippingMethodId,
    ) -> Result<RemoteOrder, CommerceError> {
        let data: SetShippingMethodData = self
            .execute(
                queries::SET_ORDER_SHIPPING_METHOD,
                json!({ "shippingMethodId": [id] }),
            )
            .await?;
        data.set_order_shipping_method.into_result()
    }

    #[instrument(skip(self), fields(state = %state))]
    async fn transition_state(&self, state: OrderState) -> Result<RemoteOrder, CommerceError> {
        let data: TransitionData = self
            .execute(
                queries::TRANSITION_ORDER_TO_STATE,
                json!({ "state": state.as_str() }),
            )
            .await?;
        data.transition_order_to_state
            .ok_or(CommerceError::MissingData(queries::TRANSITION_ORDER_TO_STATE.name))?
            .into_result()
    }

    #[instrument(skip(self))]
    async fn create_payment_intent(&self) -> Result<String, CommerceError> {
        let data: PaymentIntentData = self
            .execute(queries::CREATE_PAYMENT_INTENT, json!({}))
            .await?;
        data.create_stripe_payment_intent
            .filter(|secret| !secret.is_empty())
            .ok_or(CommerceError::MissingData(queries::CREATE_PAYMENT_INTENT.name))
    }
}
