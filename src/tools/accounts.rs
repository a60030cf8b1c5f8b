//! Account tools: visible accounts, account details, portfolio and orders

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::registry::Tool;
use super::schema::{ParamSpec, ParamType};
use super::types::{flatten_decimals, non_empty, take_array, NoArgs};
use crate::transport::{ApiRequest, ApiTransport};
use crate::Result;

/// Input for tools scoped to one trading account
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AccountInput {
    /// Trading account identifier, e.g. "A12345"
    pub account_id: String,
}

fn account_params() -> Vec<ParamSpec> {
    vec![ParamSpec::required("account_id", ParamType::String)]
}

async fn fetch_account(transport: &ApiTransport, account_id: &str) -> Result<Value> {
    let raw = transport
        .call_json(&ApiRequest::get(&["v1", "accounts", account_id]))
        .await?;
    Ok(flatten_decimals(raw))
}

/// Lists the accounts the session token may act on
pub struct GetAccountsTool {
    transport: Arc<ApiTransport>,
}

impl GetAccountsTool {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Tool for GetAccountsTool {
    const NAME: &'static str = super::TOOL_GET_ACCOUNTS;
    type Input = NoArgs;

    fn description(&self) -> &'static str {
        "List the trading account identifiers visible to the current session"
    }

    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn execute(&self, _input: NoArgs) -> Result<Value> {
        let credential = self.transport.refresher().ensure_valid().await?;
        Ok(json!({
            "account_ids": credential.account_ids(),
            "count": credential.account_ids().len(),
            "readonly": credential.readonly(),
        }))
    }
}

/// Raw account details
pub struct GetAccountInfoTool {
    transport: Arc<ApiTransport>,
}

impl GetAccountInfoTool {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Tool for GetAccountInfoTool {
    const NAME: &'static str = super::TOOL_GET_ACCOUNT_INFO;
    type Input = AccountInput;

    fn description(&self) -> &'static str {
        "Get full details of one trading account"
    }

    fn params(&self) -> Vec<ParamSpec> {
        account_params()
    }

    async fn execute(&self, input: AccountInput) -> Result<Value> {
        let account_id = non_empty("account_id", &input.account_id)?;
        fetch_account(&self.transport, &account_id).await
    }
}

/// Positions and balances of one account
pub struct GetPortfolioTool {
    transport: Arc<ApiTransport>,
}

impl GetPortfolioTool {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Tool for GetPortfolioTool {
    const NAME: &'static str = super::TOOL_GET_PORTFOLIO;
    type Input = AccountInput;

    fn description(&self) -> &'static str {
        "Get positions, cash balances and equity of one trading account"
    }

    fn params(&self) -> Vec<ParamSpec> {
        account_params()
    }

    async fn execute(&self, input: AccountInput) -> Result<Value> {
        let account_id = non_empty("account_id", &input.account_id)?;
        let mut account = fetch_account(&self.transport, &account_id).await?;

        let positions = take_array(&mut account, "positions");
        let cash = take_array(&mut account, "cash");
        Ok(json!({
            "account_id": account_id,
            "equity": account.get("equity").cloned().unwrap_or(Value::Null),
            "unrealized_profit": account.get("unrealized_profit").cloned().unwrap_or(Value::Null),
            "positions_count": positions.len(),
            "positions": positions,
            "cash": cash,
        }))
    }
}

/// Orders placed on one account
pub struct GetOrdersTool {
    transport: Arc<ApiTransport>,
}

impl GetOrdersTool {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Tool for GetOrdersTool {
    const NAME: &'static str = super::TOOL_GET_ORDERS;
    type Input = AccountInput;

    fn description(&self) -> &'static str {
        "List open and historical orders of one trading account"
    }

    fn params(&self) -> Vec<ParamSpec> {
        account_params()
    }

    async fn execute(&self, input: AccountInput) -> Result<Value> {
        let account_id = non_empty("account_id", &input.account_id)?;
        let raw = self
            .transport
            .call_json(&ApiRequest::get(&["v1", "accounts", account_id.as_str(), "orders"]))
            .await?;
        let orders = take_array(&mut flatten_decimals(raw), "orders");

        Ok(json!({
            "account_id": account_id,
            "count": orders.len(),
            "orders": orders,
        }))
    }
}
