//! Scripted fakes for the network seams, shared by unit tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::SecretString;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::auth::{
    Credential, CredentialStore, RefreshError, RefreshErrorKind, SessionClient, SessionGrant,
    TokenRefresher,
};
use crate::config::{ApiConfig, TokenPolicy};
use crate::transport::{ApiTransport, BackendError, HttpBackend, UpstreamRequest, UpstreamResponse};

type Step = (
    Option<std::time::Duration>,
    Result<UpstreamResponse, BackendError>,
);

/// Backend that replays queued responses in order and records requests
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_ok(&self, status: u16, body: &str) {
        self.push(None, Ok(UpstreamResponse::new(status, body)));
    }

    pub(crate) fn push_err(&self, err: BackendError) {
        self.push(None, Err(err));
    }

    pub(crate) fn push_delayed(&self, delay: std::time::Duration, status: u16, body: &str) {
        self.push(Some(delay), Ok(UpstreamResponse::new(status, body)));
    }

    fn push(&self, delay: Option<std::time::Duration>, result: Result<UpstreamResponse, BackendError>) {
        self.steps.lock().unwrap().push_back((delay, result));
    }

    pub(crate) fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, BackendError> {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some((delay, result)) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Err(BackendError::Other("unscripted request".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Backend that answers 401 to revoked bearers and 200 to everyone else
pub(crate) struct RevokingBackend {
    revoked: Vec<String>,
    body: String,
    calls: AtomicUsize,
}

impl RevokingBackend {
    pub(crate) fn new(revoked: &[&str], body: &str) -> Self {
        Self {
            revoked: revoked.iter().map(|s| s.to_string()).collect(),
            body: body.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpBackend for RevokingBackend {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent callers pile up on the same rejection
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        match &request.bearer {
            Some(token) if self.revoked.contains(token) => {
                Ok(UpstreamResponse::new(401, r#"{"message": "token revoked"}"#))
            }
            _ => Ok(UpstreamResponse::new(200, self.body.clone())),
        }
    }

    fn name(&self) -> &'static str {
        "revoking"
    }
}

/// Auth endpoint that mints `jwt-<n>` on the n-th call
#[derive(Default)]
pub(crate) struct FakeSessionClient {
    calls: AtomicUsize,
    failures: Mutex<VecDeque<RefreshErrorKind>>,
    delay: Option<std::time::Duration>,
    expires_in: Option<u64>,
    account_ids: Vec<String>,
}

impl FakeSessionClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn with_expires_in(mut self, secs: u64) -> Self {
        self.expires_in = Some(secs);
        self
    }

    pub(crate) fn with_accounts(mut self, ids: &[&str]) -> Self {
        self.account_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub(crate) fn fail_next(&self, kind: RefreshErrorKind) {
        self.failures.lock().unwrap().push_back(kind);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionClient for FakeSessionClient {
    async fn create_session(&self, _secret: &SecretString) -> Result<SessionGrant, RefreshError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = self.failures.lock().unwrap().pop_front() {
            return Err(RefreshError::new(kind, format!("scripted failure #{}", n)));
        }
        let mut grant = SessionGrant::bare(format!("jwt-{}", n));
        grant.expires_in = self.expires_in;
        grant.account_ids = self.account_ids.clone();
        Ok(grant)
    }
}

pub(crate) fn valid_credential(token: &str) -> Credential {
    let now = Utc::now();
    Credential::new(
        SecretString::from(token.to_string()),
        now,
        now + Duration::seconds(3600),
    )
}

pub(crate) fn expired_credential(token: &str) -> Credential {
    let now = Utc::now();
    Credential::new(
        SecretString::from(token.to_string()),
        now - Duration::seconds(3600),
        now - Duration::seconds(60),
    )
}

pub(crate) fn test_api_config() -> ApiConfig {
    ApiConfig {
        base_url: "https://api.test".to_string(),
        request_timeout_ms: 500,
        connect_timeout_ms: 500,
    }
}

/// Transport wired to scripted fakes, with an optional pre-stored credential
pub(crate) struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub session: Arc<FakeSessionClient>,
    pub store: Arc<CredentialStore>,
    pub refresher: Arc<TokenRefresher>,
    pub transport: Arc<ApiTransport>,
}

impl Harness {
    pub(crate) async fn new(stored: Option<Credential>) -> Self {
        Self::with_session(stored, FakeSessionClient::new()).await
    }

    pub(crate) async fn with_session(stored: Option<Credential>, session: FakeSessionClient) -> Self {
        let backend = Arc::new(ScriptedBackend::new());
        let session = Arc::new(session);
        let store = Arc::new(CredentialStore::new(SecretString::from("secret".to_string())));
        if let Some(credential) = stored {
            store.set(Arc::new(credential)).await;
        }
        let refresher = Arc::new(TokenRefresher::new(
            Arc::clone(&store),
            Arc::clone(&session) as Arc<dyn SessionClient>,
            TokenPolicy::default(),
        ));
        let transport = Arc::new(ApiTransport::new(
            Arc::clone(&backend) as Arc<dyn HttpBackend>,
            Arc::clone(&refresher),
            test_api_config(),
        ));
        Self {
            backend,
            session,
            store,
            refresher,
            transport,
        }
    }
}
