//! Finam session endpoint client
//!
//! Exchanges the long-lived access secret for a short-lived session JWT
//! (`POST /v1/sessions`) and reads the session's metadata
//! (`POST /v1/sessions/details`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{RefreshError, RefreshErrorKind};
use crate::config::ApiConfig;
use crate::transport::{BackendError, HttpBackend, UpstreamRequest, UpstreamResponse};

/// What the auth endpoint granted
#[derive(Debug)]
pub struct SessionGrant {
    pub token: SecretString,
    /// Absolute expiry, when the endpoint states one
    pub expires_at: Option<DateTime<Utc>>,
    /// Relative lifetime in seconds, when the endpoint states one
    pub expires_in: Option<u64>,
    pub account_ids: Vec<String>,
    pub readonly: bool,
}

impl SessionGrant {
    /// A grant with no lifetime or account metadata
    pub fn bare(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_at: None,
            expires_in: None,
            account_ids: Vec::new(),
            readonly: false,
        }
    }
}

/// Trait for upstream auth endpoints
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Mint a new session token from the long-lived secret
    async fn create_session(
        &self,
        secret: &SecretString,
    ) -> std::result::Result<SessionGrant, RefreshError>;
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct SessionDetailsResponse {
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    account_ids: Vec<String>,
    #[serde(default)]
    readonly: bool,
}

/// Session client for Finam TradeAPI over any `HttpBackend`
pub struct HttpSessionClient {
    backend: Arc<dyn HttpBackend>,
    api: ApiConfig,
}

impl HttpSessionClient {
    pub fn new(backend: Arc<dyn HttpBackend>, api: ApiConfig) -> Self {
        Self { backend, api }
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> std::result::Result<UpstreamResponse, RefreshError> {
        let url = self
            .api
            .endpoint(path)
            .map_err(|e| RefreshError::new(RefreshErrorKind::Unavailable, e.to_string()))?;
        let request = UpstreamRequest::new(Method::POST, url).json(body);

        match tokio::time::timeout(self.api.request_timeout(), self.backend.send(request)).await {
            Err(_) | Ok(Err(BackendError::Timeout)) => Err(RefreshError::new(
                RefreshErrorKind::Timeout,
                format!("auth endpoint {} timed out", path),
            )),
            Ok(Err(e)) => Err(RefreshError::new(
                RefreshErrorKind::Unavailable,
                format!("auth endpoint unreachable: {}", e),
            )),
            Ok(Ok(response)) => Ok(response),
        }
    }

    /// Session metadata is best-effort: a failure here still leaves a usable token
    async fn details(&self, token: &str) -> Option<SessionDetailsResponse> {
        let response = match self.post("/v1/sessions/details", json!({ "token": token })).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch session details");
                return None;
            }
        };
        if !response.is_success() {
            tracing::warn!(
                status = response.status,
                message = %response.error_message(),
                "Session details request rejected"
            );
            return None;
        }
        match response.json::<SessionDetailsResponse>() {
            Ok(details) => Some(details),
            Err(e) => {
                tracing::warn!(error = %e, "Malformed session details response");
                None
            }
        }
    }
}

#[async_trait]
impl SessionClient for HttpSessionClient {
    async fn create_session(
        &self,
        secret: &SecretString,
    ) -> std::result::Result<SessionGrant, RefreshError> {
        let response = self
            .post("/v1/sessions", json!({ "secret": secret.expose_secret() }))
            .await?;

        if !response.is_success() {
            let kind = if response.is_transient_failure() {
                RefreshErrorKind::Unavailable
            } else {
                RefreshErrorKind::Rejected
            };
            return Err(RefreshError::new(
                kind,
                format!(
                    "auth endpoint returned HTTP {}: {}",
                    response.status,
                    response.error_message()
                ),
            ));
        }

        let created: CreateSessionResponse = response.json().map_err(|e| {
            RefreshError::new(
                RefreshErrorKind::Unavailable,
                format!("malformed session response: {}", e),
            )
        })?;
        let token = created.token.filter(|t| !t.is_empty()).ok_or_else(|| {
            RefreshError::new(
                RefreshErrorKind::Rejected,
                "auth endpoint returned no token",
            )
        })?;

        let mut grant = SessionGrant::bare(token.clone());
        grant.expires_in = created.expires_in;
        if let Some(details) = self.details(&token).await {
            grant.expires_at = details.expires_at;
            grant.account_ids = details.account_ids;
            grant.readonly = details.readonly;
        }
        Ok(grant)
    }
}
