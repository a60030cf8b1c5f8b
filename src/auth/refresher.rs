//! Token refresher
//!
//! Keeps the stored credential usable. Concurrent callers that need a new
//! token attach to the single in-flight refresh instead of starting their own.
//! The refresh runs as its own task, so it completes and clears itself even
//! when every caller waiting on it is dropped.

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Credential, CredentialStore, RefreshError, RefreshErrorKind, SessionClient};
use crate::config::TokenPolicy;
use crate::{Error, Result};

type RefreshOutcome = std::result::Result<Arc<Credential>, RefreshError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// A joined refresh can finish after its credential already aged out; retry once
const MAX_REFRESH_ATTEMPTS: usize = 2;

#[derive(Default)]
struct RefreshState {
    generation: u64,
    inflight: Option<(u64, SharedRefresh)>,
    last_failure: Option<(Instant, RefreshError)>,
}

/// Mints session credentials from the secret held by the store
pub struct TokenRefresher {
    store: Arc<CredentialStore>,
    session: Arc<dyn SessionClient>,
    policy: TokenPolicy,
    state: Arc<Mutex<RefreshState>>,
}

impl TokenRefresher {
    pub fn new(
        store: Arc<CredentialStore>,
        session: Arc<dyn SessionClient>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            store,
            session,
            policy,
            state: Arc::new(Mutex::new(RefreshState::default())),
        }
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Current credential without any refresh
    pub async fn current(&self) -> Option<Arc<Credential>> {
        self.store.get().await
    }

    /// Return the stored credential if still valid, otherwise refresh
    pub async fn ensure_valid(&self) -> Result<Arc<Credential>> {
        if let Some(credential) = self.store.get().await {
            if credential.is_valid(self.policy.safety_margin()) {
                return Ok(credential);
            }
            debug!(expires_at = %credential.expires_at(), "Stored credential expired");
        }
        self.refresh(None, false).await
    }

    /// Refresh regardless of the local expiry clock.
    ///
    /// `rejected` is the credential upstream refused. If the store already
    /// holds a different valid credential, that one is returned instead of
    /// minting again.
    pub async fn force_refresh(&self, rejected: Option<&Arc<Credential>>) -> Result<Arc<Credential>> {
        self.refresh(rejected, true).await
    }

    async fn refresh(
        &self,
        rejected: Option<&Arc<Credential>>,
        forced: bool,
    ) -> Result<Arc<Credential>> {
        for _ in 0..MAX_REFRESH_ATTEMPTS {
            let refresh = match self.join_or_start(rejected, forced).await? {
                Joined::Current(credential) => return Ok(credential),
                Joined::Refresh(refresh) => refresh,
            };
            let credential = refresh.await?;
            if credential.is_valid(self.policy.safety_margin()) {
                return Ok(credential);
            }
            warn!(
                expires_at = %credential.expires_at(),
                "Refreshed credential expired before use, refreshing again"
            );
        }
        Err(Error::Auth(
            "refreshed session token expired before it could be used".to_string(),
        ))
    }

    async fn join_or_start(
        &self,
        rejected: Option<&Arc<Credential>>,
        forced: bool,
    ) -> Result<Joined> {
        let mut state = self.state.lock().await;
        if let Some((_, inflight)) = &state.inflight {
            debug!("Joining in-flight token refresh");
            return Ok(Joined::Refresh(inflight.clone()));
        }

        if let Some(current) = self.store.get().await {
            let superseded = match rejected {
                Some(stale) => !Arc::ptr_eq(stale, &current),
                None => !forced,
            };
            if superseded && current.is_valid(self.policy.safety_margin()) {
                return Ok(Joined::Current(current));
            }
        }
        if let Some((failed_at, error)) = &state.last_failure {
            if failed_at.elapsed() < self.policy.refresh_backoff() {
                debug!(error = %error, "Token refresh backing off");
                return Err(error.clone().into());
            }
        }

        state.generation += 1;
        let generation = state.generation;
        let task = tokio::spawn(run_refresh(
            generation,
            Arc::clone(&self.state),
            Arc::clone(&self.session),
            Arc::clone(&self.store),
            self.policy.clone(),
        ));
        let refresh = async move {
            task.await.unwrap_or_else(|e| {
                Err(RefreshError::new(
                    RefreshErrorKind::Unavailable,
                    format!("token refresh task failed: {}", e),
                ))
            })
        }
        .boxed()
        .shared();
        state.inflight = Some((generation, refresh.clone()));
        Ok(Joined::Refresh(refresh))
    }
}

enum Joined {
    Current(Arc<Credential>),
    Refresh(SharedRefresh),
}

/// Mint, then retire the in-flight slot and record the outcome
async fn run_refresh(
    generation: u64,
    state: Arc<Mutex<RefreshState>>,
    session: Arc<dyn SessionClient>,
    store: Arc<CredentialStore>,
    policy: TokenPolicy,
) -> RefreshOutcome {
    let outcome = AssertUnwindSafe(mint(session, store, policy))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            Err(RefreshError::new(
                RefreshErrorKind::Unavailable,
                "token refresh panicked",
            ))
        });

    let mut state = state.lock().await;
    if state
        .inflight
        .as_ref()
        .is_some_and(|(inflight, _)| *inflight == generation)
    {
        state.inflight = None;
    }
    state.last_failure = outcome
        .as_ref()
        .err()
        .map(|error| (Instant::now(), error.clone()));
    outcome
}

/// One call to the auth endpoint. The store is only written on success.
async fn mint(
    session: Arc<dyn SessionClient>,
    store: Arc<CredentialStore>,
    policy: TokenPolicy,
) -> RefreshOutcome {
    let issued_at = Utc::now();
    let grant = match session.create_session(store.secret()).await {
        Ok(grant) => grant,
        Err(e) => {
            warn!(error = %e, kind = ?e.kind, "Token refresh failed");
            return Err(e);
        }
    };

    let stated = grant.expires_at.or_else(|| {
        grant.expires_in.and_then(|secs| {
            let expires_at = expiry_after(issued_at, secs);
            if expires_at.is_none() {
                warn!(expires_in = secs, "Stated token lifetime out of range, using default");
            }
            expires_at
        })
    });
    let expires_at = stated
        .or_else(|| issued_at.checked_add_signed(policy.default_lifetime()))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let credential = Arc::new(
        Credential::new(grant.token, issued_at, expires_at)
            .with_accounts(grant.account_ids, grant.readonly),
    );
    if !credential.is_valid(policy.safety_margin()) {
        warn!(
            expires_at = %credential.expires_at(),
            safety_margin_secs = policy.safety_margin_secs,
            "Granted token expires within the safety margin"
        );
        return Err(RefreshError::new(
            RefreshErrorKind::Unavailable,
            format!(
                "granted session token expires at {}, inside the {}s safety margin",
                credential.expires_at(),
                policy.safety_margin_secs
            ),
        ));
    }

    store.set(Arc::clone(&credential)).await;
    info!(
        issued_at = %credential.issued_at(),
        expires_at = %credential.expires_at(),
        accounts = credential.account_ids().len(),
        "Minted new session token"
    );
    Ok(credential)
}

fn expiry_after(issued_at: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let delta = TimeDelta::try_seconds(i64::try_from(secs).ok()?)?;
    issued_at.checked_add_signed(delta)
}
