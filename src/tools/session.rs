//! Session token tools
//!
//! Expose credential metadata to the LLM. The token itself never leaves the
//! credential store.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::registry::Tool;
use super::schema::ParamSpec;
use super::types::NoArgs;
use crate::auth::TokenRefresher;
use crate::Result;

/// Reports issuance and expiry of the current session token
pub struct GetTokenDetailsTool {
    refresher: Arc<TokenRefresher>,
}

impl GetTokenDetailsTool {
    pub fn new(refresher: Arc<TokenRefresher>) -> Self {
        Self { refresher }
    }
}

#[async_trait]
impl Tool for GetTokenDetailsTool {
    const NAME: &'static str = super::TOOL_GET_TOKEN_DETAILS;
    type Input = NoArgs;

    fn description(&self) -> &'static str {
        "Get issuance time, expiry and account scope of the current session token"
    }

    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn execute(&self, _input: NoArgs) -> Result<Value> {
        // Report what is stored; only mint when nothing has been minted yet
        let credential = match self.refresher.current().await {
            Some(credential) => credential,
            None => self.refresher.ensure_valid().await?,
        };
        let info = credential.info(self.refresher.policy().safety_margin());
        Ok(serde_json::to_value(info)?)
    }
}

/// Forces an unconditional token refresh
pub struct RefreshTokenTool {
    refresher: Arc<TokenRefresher>,
}

impl RefreshTokenTool {
    pub fn new(refresher: Arc<TokenRefresher>) -> Self {
        Self { refresher }
    }
}

#[async_trait]
impl Tool for RefreshTokenTool {
    const NAME: &'static str = super::TOOL_REFRESH_TOKEN;
    type Input = NoArgs;

    fn description(&self) -> &'static str {
        "Force a new session token to be minted and return its expiry"
    }

    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn execute(&self, _input: NoArgs) -> Result<Value> {
        let credential = self.refresher.force_refresh(None).await?;
        info!(expires_at = %credential.expires_at(), "Session token refreshed on request");
        let info = credential.info(self.refresher.policy().safety_margin());
        Ok(serde_json::to_value(info)?)
    }
}
