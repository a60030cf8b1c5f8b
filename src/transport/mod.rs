//! Authenticated access to the Finam trading API
//!
//! Every tool handler goes through `ApiTransport::call`, which:
//! - attaches a valid session token
//! - on HTTP 401 forces exactly one token refresh and repeats the call once
//! - bounds every call with the configured timeout
//! - classifies failures into transient and non-transient errors

mod http;

pub use http::{BackendError, HttpBackend, ReqwestBackend, UpstreamRequest, UpstreamResponse};

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{Credential, TokenRefresher};
use crate::config::ApiConfig;
use crate::{Error, Result};

/// A trading API call, relative to the configured base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path segments, percent-encoded individually when the URL is built
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new<S: AsRef<str>>(method: Method, segments: &[S]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| s.as_ref().to_string()).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get<S: AsRef<str>>(segments: &[S]) -> Self {
        Self::new(Method::GET, segments)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Slash-joined path for logs and messages
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    fn url(&self, api: &ApiConfig) -> Result<Url> {
        let mut url = api.base()?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Base URL '{}' cannot carry a path", api.base_url)))?
            .pop_if_empty()
            .extend(&self.segments);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

/// Result of an unauthenticated reachability probe
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub reachable: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Performs authenticated calls against the trading API
pub struct ApiTransport {
    backend: Arc<dyn HttpBackend>,
    refresher: Arc<TokenRefresher>,
    api: ApiConfig,
}

impl ApiTransport {
    pub fn new(backend: Arc<dyn HttpBackend>, refresher: Arc<TokenRefresher>, api: ApiConfig) -> Self {
        Self {
            backend,
            refresher,
            api,
        }
    }

    pub fn refresher(&self) -> &Arc<TokenRefresher> {
        &self.refresher
    }

    /// Perform one authenticated call, retrying once after a forced refresh on 401
    pub async fn call(&self, request: &ApiRequest) -> Result<UpstreamResponse> {
        let credential = self.refresher.ensure_valid().await?;
        let response = self.send(request, &credential).await?;
        if !response.is_auth_failure() {
            return Self::classify(request, response);
        }

        warn!(
            path = %request.path(),
            "Upstream rejected session token, forcing refresh"
        );
        let fresh = self.refresher.force_refresh(Some(&credential)).await?;
        let retry = self.send(request, &fresh).await?;
        if retry.is_auth_failure() {
            return Err(Error::Auth(format!(
                "upstream rejected refreshed token for {}: {}",
                request.path(),
                retry.error_message()
            )));
        }
        Self::classify(request, retry)
    }

    /// `call` and decode the body as JSON
    pub async fn call_json(&self, request: &ApiRequest) -> Result<Value> {
        let response = self.call(request).await?;
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        response.json()
    }

    /// Unauthenticated GET of `{base_url}/v1`, timing the round trip
    pub async fn probe(&self) -> HealthReport {
        let url = match ApiRequest::get(&["v1"]).url(&self.api) {
            Ok(url) => url,
            Err(e) => {
                return HealthReport {
                    reachable: false,
                    status_code: None,
                    latency_ms: 0,
                    error: Some(e.to_string()),
                }
            }
        };

        let start = Instant::now();
        let outcome = tokio::time::timeout(
            self.api.request_timeout(),
            self.backend.send(UpstreamRequest::new(Method::GET, url)),
        )
        .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(response)) => HealthReport {
                reachable: true,
                status_code: Some(response.status),
                latency_ms,
                error: None,
            },
            Ok(Err(e)) => HealthReport {
                reachable: false,
                status_code: None,
                latency_ms,
                error: Some(e.to_string()),
            },
            Err(_) => HealthReport {
                reachable: false,
                status_code: None,
                latency_ms,
                error: Some(BackendError::Timeout.to_string()),
            },
        }
    }

    async fn send(&self, request: &ApiRequest, credential: &Credential) -> Result<UpstreamResponse> {
        let mut upstream =
            UpstreamRequest::new(request.method.clone(), request.url(&self.api)?).bearer(credential.bearer());
        if let Some(body) = &request.body {
            upstream = upstream.json(body.clone());
        }

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.api.request_timeout(), self.backend.send(upstream)).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(response)) => {
                debug!(
                    backend = self.backend.name(),
                    method = %request.method,
                    path = %request.path(),
                    status = response.status,
                    latency_ms = latency_ms,
                    "Trading API call completed"
                );
                Ok(response)
            }
            Ok(Err(BackendError::Timeout)) | Err(_) => Err(Error::transient(format!(
                "{} {} timed out after {} ms",
                request.method,
                request.path(),
                self.api.request_timeout_ms
            ))),
            Ok(Err(e)) => Err(Error::transient(format!(
                "{} {} failed: {}",
                request.method,
                request.path(),
                e
            ))),
        }
    }

    fn classify(request: &ApiRequest, response: UpstreamResponse) -> Result<UpstreamResponse> {
        if response.is_success() {
            return Ok(response);
        }
        let message = format!("{} {}: {}", request.method, request.path(), response.error_message());
        if response.is_transient_failure() {
            Err(Error::Transient {
                status: Some(response.status),
                message,
            })
        } else {
            Err(Error::Upstream {
                status: Some(response.status),
                message,
            })
        }
    }
}
