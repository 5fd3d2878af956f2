//! Admin API client used by the webhook reconciler.

use std::sync::Arc;

use async_trait::async_trait;
use pineapple_checkout_core::{OrderCode, OrderId, OrderState, ShippingMethodId};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::instrument;

use super::queries::{self, Operation};
use super::transport;
use super::{
    AddressInput, AdminApi, CommerceError, CustomerInput, ManualPaymentInput, MutationResult,
    RemoteOrder, ShippingMethodQuote,
};
use crate::config::CommerceConfig;

/// Client for the commerce platform's Admin API.
///
/// Authenticates with a long-lived API token rather than a customer session.
#[derive(Clone)]
pub struct AdminClient {
    inner: Arc<AdminClientInner>,
}

struct AdminClientInner {
    client: reqwest::Client,
    endpoint: String,
    token_header: String,
    token: SecretString,
}

#[derive(Deserialize)]
struct OrderList {
    items: Vec<RemoteOrder>,
}

#[derive(Deserialize)]
struct OrdersData {
    orders: OrderList,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetCustomerData {
    set_customer_for_draft_order: MutationResult<RemoteOrder>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetAddressData {
    set_draft_order_shipping_address: RemoteOrder,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShippingMethodsData {
    eligible_shipping_methods_for_draft_order: Vec<ShippingMethodQuote>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetShippingMethodData {
    set_draft_order_shipping_method: MutationResult<RemoteOrder>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransitionData {
    transition_order_to_state: Option<MutationResult<RemoteOrder>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManualPaymentData {
    add_manual_payment_to_order: MutationResult<RemoteOrder>,
}

impl AdminClient {
    /// Create a new Admin API client.
    #[must_use]
    pub fn new(config: &CommerceConfig) -> Self {
        Self {
            inner: Arc::new(AdminClientInner {
                client: reqwest::Client::new(),
                endpoint: config.admin_api_url.clone(),
                token_header: config.auth_token_header.clone(),
                token: config.admin_token.clone(),
            }),
        }
    }

    async fn execute<V, T>(&self, operation: Operation, variables: V) -> Result<T, CommerceError>
    where
        V: serde::Serialize + Send,
        T: DeserializeOwned,
    {
        transport::execute(
            &self.inner.client,
            &self.inner.endpoint,
            &self.inner.token_header,
            Some(self.inner.token.expose_secret()),
            operation,
            variables,
        )
        .await
        .outcome
    }
}

#[async_trait]
impl AdminApi for AdminClient {
    #[instrument(skip(self), fields(order_code = %code))]
    async fn order_by_code(&self, code: &OrderCode) -> Result<Option<RemoteOrder>, CommerceError> {
        let data: OrdersData = self
            .execute(queries::ADMIN_ORDER_BY_CODE, json!({ "code": code }))
            .await?;
        Ok(data.orders.items.into_iter().next())
    }

    #[instrument(skip(self, input), fields(order_id = %order_id))]
    async fn set_customer_for_order(
        &self,
        order_id: &OrderId,
        input: &CustomerInput,
    ) -> Result<RemoteOrder, CommerceError> {
        let data: SetCustomerData = self
            .execute(
                queries::ADMIN_SET_CUSTOMER,
                json!({ "orderId": order_id, "input": input }),
            )
            .await?;
        data.set_customer_for_draft_order.into_result()
    }

    #[instrument(skip(self, input), fields(order_id = %order_id))]
    async fn set_shipping_address(
        &self,
        order_id: &OrderId,
        input: &AddressInput,
    ) -> Result<RemoteOrder, CommerceError> {
        let data: SetAddressData = self
            .execute(
                queries::ADMIN_SET_SHIPPING_ADDRESS,
                json!({ "orderId": order_id, "input": input }),
            )
            .await?;
        Ok(data.set_draft_order_shipping_address)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn eligible_shipping_methods(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<ShippingMethodQuote>, CommerceError> {
        let data: ShippingMethodsData = self
            .execute(
                queries::ADMIN_ELIGIBLE_SHIPPING_METHODS,
                json!({ "orderId": order_id }),
            )
            .await?;
        Ok(data.eligible_shipping_methods_for_draft_order)
    }

    #[instrument(skip(self), fields(order_id = %order_id, shipping_method_id = %id))]
    async fn set_shipping_method(
        &self,
        order_id: &OrderId,
        id: &ShippingMethodId,
    ) -> Result<RemoteOrder, CommerceError> {
        let data: SetShippingMethodData = self
            .execute(
                queries::ADMIN_SET_SHIPPING_METHOD,
                json!({ "orderId": order_id, "shippingMethodId": id }),
            )
            .await?;
        data.set_draft_order_shipping_method.into_result()
    }

    #[instrument(skip(self), fields(order_id = %order_id, state = %state))]
    async fn transition_state(
        &self,
        order_id: &OrderId,
        state: OrderState,
    ) -> Result<RemoteOrder, CommerceError> {
        let data: TransitionData = self
            .execute(
                queries::ADMIN_TRANSITION_ORDER,
                json!({ "id": order_id, "state": state.as_str() }),
            )
            .await?;
        data.transition_order_to_state
            .ok_or(CommerceError::MissingData(queries::ADMIN_TRANSITION_ORDER.name))?
            .into_result()
    }

    #[instrument(skip(self, input), fields(order_id = %input.order_id, method = %input.method))]
    async fn add_manual_payment(
        &self,
        input: &ManualPaymentInput,
    ) -> Result<RemoteOrder, CommerceError> {
        let data: ManualPaymentData = self
            .execute(queries::ADMIN_ADD_MANUAL_PAYMENT, json!({ "input": input }))
            .await?;
        data.add_manual_payment_to_order.into_result()
    }
}
