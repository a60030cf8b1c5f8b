//! API reachability tool

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::registry::Tool;
use super::schema::ParamSpec;
use super::types::NoArgs;
use crate::transport::ApiTransport;
use crate::Result;

/// Probes the trading API without a session token
pub struct CheckApiHealthTool {
    transport: Arc<ApiTransport>,
}

impl CheckApiHealthTool {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Tool for CheckApiHealthTool {
    const NAME: &'static str = super::TOOL_CHECK_API_HEALTH;
    type Input = NoArgs;

    fn description(&self) -> &'static str {
        "Check whether the trading API is reachable and how long a round trip takes"
    }

    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn execute(&self, _input: NoArgs) -> Result<Value> {
        let report = self.transport.probe().await;
        if !report.reachable {
            tracing::warn!(error = ?report.error, "Trading API unreachable");
        }
        Ok(serde_json::to_value(report)?)
    }
}
