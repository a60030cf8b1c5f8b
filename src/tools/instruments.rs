//! Instrument catalogue tools

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::registry::Tool;
use super::schema::{ParamSpec, ParamType};
use super::types::{non_empty, take_array, NoArgs};
use crate::transport::{ApiRequest, ApiTransport};
use crate::{Error, Result};

pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

const SEARCH_FIELDS: [&str; 3] = ["symbol", "ticker", "name"];

async fn fetch_assets(transport: &ApiTransport) -> Result<Vec<Value>> {
    let mut raw = transport.call_json(&ApiRequest::get(&["v1", "assets"])).await?;
    Ok(take_array(&mut raw, "assets"))
}

/// Every tradable instrument
pub struct GetAssetsTool {
    transport: Arc<ApiTransport>,
}

impl GetAssetsTool {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Tool for GetAssetsTool {
    const NAME: &'static str = super::TOOL_GET_ASSETS;
    type Input = NoArgs;

    fn description(&self) -> &'static str {
        "List every instrument available for trading"
    }

    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn execute(&self, _input: NoArgs) -> Result<Value> {
        let assets = fetch_assets(&self.transport).await?;
        Ok(json!({
            "count": assets.len(),
            "assets": assets,
        }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchInput {
    /// Text to look for in the symbol, ticker or name
    pub query: String,
    /// Maximum number of matches to return
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_SEARCH_LIMIT
}

/// Case-insensitive substring search over the instrument catalogue
pub struct SearchInstrumentsTool {
    transport: Arc<ApiTransport>,
}

impl SearchInstrumentsTool {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport }
    }
}

fn matches_query(asset: &Value, needle: &str) -> bool {
    SEARCH_FIELDS.iter().any(|field| {
        asset
            .get(*field)
            .and_then(Value::as_str)
            .is_some_and(|text| text.to_lowercase().contains(needle))
    })
}

#[async_trait]
impl Tool for SearchInstrumentsTool {
    const NAME: &'static str = super::TOOL_SEARCH_INSTRUMENTS;
    type Input = SearchInput;

    fn description(&self) -> &'static str {
        "Search instruments by symbol, ticker or name"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("query", ParamType::String),
            ParamSpec::optional("limit", ParamType::Integer, json!(DEFAULT_SEARCH_LIMIT)),
        ]
    }

    async fn execute(&self, input: SearchInput) -> Result<Value> {
        let query = non_empty("query", &input.query)?;
        if input.limit == 0 {
            return Err(Error::Validation(vec![
                "parameter `limit` must be at least 1".to_string(),
            ]));
        }

        let needle = query.to_lowercase();
        let assets = fetch_assets(&self.transport).await?;
        let total = assets.len();
        let instruments: Vec<Value> = assets
            .into_iter()
            .filter(|asset| matches_query(asset, &needle))
            .take(input.limit as usize)
            .collect();
        tracing::debug!(query = %query, matched = instruments.len(), total = total, "Instrument search");

        Ok(json!({
            "query": query,
            "count": instruments.len(),
            "instruments": instruments,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{valid_credential, Harness};

    const ASSETS: &str = r#"{"assets": [
        {"symbol": "SBER@MISX", "ticker": "SBER", "name": "Sberbank", "mic": "MISX", "type": "EQUITIES"},
        {"symbol": "SBERP@MISX", "ticker": "SBERP", "name": "Sberbank pref", "mic": "MISX", "type": "EQUITIES"},
        {"symbol": "GAZP@MISX", "ticker": "GAZP", "name": "Gazprom", "mic": "MISX", "type": "EQUITIES"}
    ]}"#;

    fn search(query: &str, limit: u32) -> SearchInput {
        SearchInput {
            query: query.to_string(),
            limit,
        }
    }

    #[tokio::test]
    async fn test_search_case_insensitive_with_limit() {
        let h = Harness::new(Some(valid_credential("jwt"))).await;
        h.backend.push_ok(200, ASSETS);

        let out = SearchInstrumentsTool::new(Arc::clone(&h.transport))
            .execute(search("sber", 1))
            .await
            .unwrap();

        assert_eq!(out["count"], 1);
        assert_eq!(out["instruments"][0]["symbol"], "SBER@MISX");
    }

    #[tokio::test]
    async fn test_search_by_name() {
        let h = Harness::new(Some(valid_credential("jwt"))).await;
        h.backend.push_ok(200, ASSETS);

        let out = SearchInstrumentsTool::new(Arc::clone(&h.transport))
            .execute(search("GAZPROM", DEFAULT_SEARCH_LIMIT))
            .await
            .unwrap();

        assert_eq!(out["instruments"][0]["ticker"], "GAZP");
    }

    #[tokio::test]
    async fn test_no_match_is_empty_success() {
        let h = Harness::new(Some(valid_credential("jwt"))).await;
        h.backend.push_ok(200, ASSETS);

        let out = SearchInstrumentsTool::new(Arc::clone(&h.transport))
            .execute(search("NOSUCH", DEFAULT_SEARCH_LIMIT))
            .await
            .unwrap();

        assert_eq!(out["count"], 0);
        assert_eq!(out["instruments"], json!([]));
    }

    #[tokio::test]
    async fn test_assets_listing() {
        let h = Harness::new(Some(valid_credential("jwt"))).await;
        h.backend.push_ok(200, ASSETS);

        let out = GetAssetsTool::new(Arc::clone(&h.transport))
            .execute(NoArgs {})
            .await
            .unwrap();

        assert_eq!(out["count"], 3);
        assert_eq!(h.backend.requests()[0].url.path(), "/v1/assets");
    }
}
