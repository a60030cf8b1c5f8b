//! Tools exposed to the LLM orchestrator
//!
//! Every tool implements `Tool`, is registered once in `default_registry`
//! and is invoked through `ToolDispatcher`.

mod accounts;
pub mod dispatcher;
mod health;
mod instruments;
mod market_data;
pub mod registry;
pub mod schema;
mod session;
mod types;

use std::sync::Arc;

use crate::transport::ApiTransport;
use crate::Result;

pub use accounts::{
    AccountInput, GetAccountInfoTool, GetAccountsTool, GetOrdersTool, GetPortfolioTool,
};
pub use dispatcher::{ToolDispatcher, ToolFailure, ToolInvocationRequest, ToolResult};
pub use health::CheckApiHealthTool;
pub use instruments::{GetAssetsTool, SearchInput, SearchInstrumentsTool};
pub use market_data::{
    CandlesInput, GetCandlesTool, GetOrderbookTool, GetQuotesTool, OrderbookInput, QuoteInput,
    Timeframe,
};
pub use registry::{Tool, ToolDescriptor, ToolHandler, ToolRegistry, ToolSpec};
pub use schema::{ParamSpec, ParamType};
pub use session::{GetTokenDetailsTool, RefreshTokenTool};
pub use types::{flatten_decimals, NoArgs};

pub const TOOL_CHECK_API_HEALTH: &str = "check_api_health";
pub const TOOL_GET_TOKEN_DETAILS: &str = "get_token_details";
pub const TOOL_REFRESH_TOKEN: &str = "refresh_token";
pub const TOOL_GET_ACCOUNTS: &str = "get_accounts";
pub const TOOL_GET_ACCOUNT_INFO: &str = "get_account_info";
pub const TOOL_GET_PORTFOLIO: &str = "get_portfolio";
pub const TOOL_GET_ORDERS: &str = "get_orders";
pub const TOOL_GET_QUOTES: &str = "get_quotes";
pub const TOOL_GET_ORDERBOOK: &str = "get_orderbook";
pub const TOOL_GET_CANDLES: &str = "get_candles";
pub const TOOL_SEARCH_INSTRUMENTS: &str = "search_instruments";
pub const TOOL_GET_ASSETS: &str = "get_assets";

/// Registry holding every trading tool, wired to one transport
pub fn default_registry(transport: Arc<ApiTransport>) -> Result<ToolRegistry> {
    let refresher = Arc::clone(transport.refresher());
    let mut registry = ToolRegistry::new();

    registry.register_tool(CheckApiHealthTool::new(Arc::clone(&transport)))?;
    registry.register_tool(GetTokenDetailsTool::new(Arc::clone(&refresher)))?;
    registry.register_tool(RefreshTokenTool::new(refresher))?;
    registry.register_tool(GetAccountsTool::new(Arc::clone(&transport)))?;
    registry.register_tool(GetAccountInfoTool::new(Arc::clone(&transport)))?;
    registry.register_tool(GetPortfolioTool::new(Arc::clone(&transport)))?;
    registry.register_tool(GetOrdersTool::new(Arc::clone(&transport)))?;
    registry.register_tool(GetQuotesTool::new(Arc::clone(&transport)))?;
    registry.register_tool(GetOrderbookTool::new(Arc::clone(&transport)))?;
    registry.register_tool(GetCandlesTool::new(Arc::clone(&transport)))?;
    registry.register_tool(SearchInstrumentsTool::new(Arc::clone(&transport)))?;
    registry.register_tool(GetAssetsTool::new(transport))?;

    tracing::info!(tools = registry.len(), "Tool registry ready");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{expired_credential, valid_credential, Harness};
    use serde_json::{json, Value};

    const QUOTE: &str = r#"{"symbol": "SBER@MISX", "quote": {
        "last": {"value": "312.45"}, "bid": {"value": "312.40"}, "ask": {"value": "312.50"}
    }}"#;

    fn dispatcher(h: &Harness) -> ToolDispatcher {
        let registry = default_registry(Arc::clone(&h.transport)).unwrap();
        ToolDispatcher::new(Arc::new(registry))
    }

    fn quotes_request() -> ToolInvocationRequest {
        ToolInvocationRequest::new(TOOL_GET_QUOTES, json!({"symbol": "SBER@MISX"}))
    }

    #[tokio::test]
    async fn test_catalogue_contains_every_tool() {
        let h = Harness::new(None).await;
        let registry = default_registry(Arc::clone(&h.transport)).unwrap();

        let names: Vec<&str> = registry.names().collect();
        for expected in [
            TOOL_CHECK_API_HEALTH,
            TOOL_GET_TOKEN_DETAILS,
            TOOL_REFRESH_TOKEN,
            TOOL_GET_ACCOUNTS,
            TOOL_GET_PORTFOLIO,
            TOOL_GET_QUOTES,
            TOOL_SEARCH_INSTRUMENTS,
            TOOL_GET_ORDERBOOK,
            TOOL_GET_CANDLES,
            TOOL_GET_ORDERS,
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        assert_eq!(registry.len(), 12);
    }

    #[tokio::test]
    async fn test_declared_params_agree_with_published_schema() {
        let h = Harness::new(None).await;
        let registry = default_registry(Arc::clone(&h.transport)).unwrap();

        for name in registry.names() {
            let spec = registry.resolve(name).unwrap();
            let properties = spec.input_schema["properties"].as_object().unwrap();
            let required: Vec<&str> = spec.input_schema["required"]
                .as_array()
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            assert_eq!(properties.len(), spec.params.len(), "{}", name);
            for param in &spec.params {
                assert!(properties.contains_key(param.name), "{}.{}", name, param.name);
                assert_eq!(required.contains(&param.name), param.required, "{}.{}", name, param.name);
            }
        }
    }

    #[tokio::test]
    async fn test_quotes_with_valid_credential_skip_auth() {
        let h = Harness::new(Some(valid_credential("jwt-stored"))).await;
        h.backend.push_ok(200, QUOTE);

        let result = dispatcher(&h).invoke(quotes_request()).await;

        let envelope = serde_json::to_value(&result).unwrap();
        assert_eq!(envelope["status"], "success");
        assert_eq!(envelope["data"]["symbol"], "SBER@MISX");
        assert_eq!(envelope["data"]["last"], "312.45");
        assert_eq!(h.session.calls(), 0);
    }

    #[tokio::test]
    async fn test_quotes_with_expired_credential_refresh_once() {
        let h = Harness::new(Some(expired_credential("jwt-old"))).await;
        h.backend.push_ok(200, QUOTE);

        let result = dispatcher(&h).invoke(quotes_request()).await;

        assert!(result.is_success());
        assert_eq!(h.session.calls(), 1);
        assert_eq!(h.backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_quotes_recover_from_unauthorized() {
        let h = Harness::new(Some(valid_credential("jwt-revoked"))).await;
        h.backend.push_ok(401, r#"{"message": "token expired"}"#);
        h.backend.push_ok(200, QUOTE);

        let result = dispatcher(&h).invoke(quotes_request()).await;

        assert!(result.is_success());
        assert_eq!(h.backend.calls(), 2);
        assert_eq!(h.session.calls(), 1);
    }

    #[tokio::test]
    async fn test_token_details_stable_across_calls() {
        let h = Harness::new(Some(valid_credential("jwt-stored"))).await;
        let dispatcher = dispatcher(&h);
        let request = ToolInvocationRequest::new(TOOL_GET_TOKEN_DETAILS, json!({}));

        let first = dispatcher.invoke(request.clone()).await;
        let second = dispatcher.invoke(request).await;

        assert!(first.is_success());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_candles_missing_arguments_listed_together() {
        let h = Harness::new(Some(valid_credential("jwt"))).await;

        let result = dispatcher(&h)
            .invoke(ToolInvocationRequest::new(
                TOOL_GET_CANDLES,
                json!({"symbol": "SBER@MISX", "timeframe": "D"}),
            ))
            .await;

        match result {
            ToolResult::Failure { error } => {
                assert_eq!(error.kind, ErrorKind::Validation);
                assert!(error.message.contains("`from`"));
                assert!(error.message.contains("`to`"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(h.backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_instrument_is_upstream_error() {
        let h = Harness::new(Some(valid_credential("jwt"))).await;
        h.backend.push_ok(404, r#"{"message": "instrument not found"}"#);

        let result = dispatcher(&h).invoke(quotes_request()).await;

        assert_eq!(result.error_kind(), Some(ErrorKind::Upstream));
    }
}
