//! Session credential and its in-process store
//!
//! SECURITY NOTE:
//! - The bearer token is held in a `SecretString` and never serialized
//! - Only expiry metadata leaves this module through `CredentialInfo`

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Short-lived bearer credential minted from the long-lived secret
pub struct Credential {
    token: SecretString,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    /// Accounts the session may act on, as reported by the auth endpoint
    account_ids: Vec<String>,
    readonly: bool,
}

impl Credential {
    /// Build a credential. `expires_at` is clamped to stay after `issued_at`.
    pub fn new(
        token: SecretString,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let expires_at = if expires_at > issued_at {
            expires_at
        } else {
            issued_at + Duration::seconds(1)
        };
        Self {
            token,
            issued_at,
            expires_at,
            account_ids: Vec::new(),
            readonly: false,
        }
    }

    pub fn with_accounts(mut self, account_ids: Vec<String>, readonly: bool) -> Self {
        self.account_ids = account_ids;
        self.readonly = readonly;
        self
    }

    pub(crate) fn bearer(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn account_ids(&self) -> &[String] {
        &self.account_ids
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// Valid iff `now < expires_at - safety_margin`
    pub fn is_valid_at(&self, now: DateTime<Utc>, safety_margin: Duration) -> bool {
        self.expires_at
            .checked_sub_signed(safety_margin)
            .is_some_and(|deadline| now < deadline)
    }

    pub fn is_valid(&self, safety_margin: Duration) -> bool {
        self.is_valid_at(Utc::now(), safety_margin)
    }

    /// Metadata safe to hand to the LLM runtime
    pub fn info(&self, safety_margin: Duration) -> CredentialInfo {
        CredentialInfo {
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            valid: self.is_valid(safety_margin),
            account_ids: self.account_ids.clone(),
            readonly: self.readonly,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("account_ids", &self.account_ids)
            .field("readonly", &self.readonly)
            .finish()
    }
}

/// Public view of a credential (never includes the token)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialInfo {
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub valid: bool,
    pub account_ids: Vec<String>,
    pub readonly: bool,
}

/// Holds the long-lived secret and the current credential snapshot.
///
/// Readers get an `Arc` to an immutable credential, so a concurrent `set`
/// swaps the pointer and can never expose a half-written value. The secret
/// is only reachable inside the crate, by the refresher.
pub struct CredentialStore {
    secret: SecretString,
    current: RwLock<Option<Arc<Credential>>>,
}

impl CredentialStore {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            current: RwLock::new(None),
        }
    }

    pub(crate) fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub async fn get(&self) -> Option<Arc<Credential>> {
        self.current.read().await.clone()
    }

    pub async fn set(&self, credential: Arc<Credential>) {
        *self.current.write().await = Some(credential);
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("secret", &"[REDACTED]")
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(lifetime_secs: i64) -> Credential {
        let now = Utc::now();
        Credential::new(
            SecretString::from("jwt-abc".to_string()),
            now,
            now + Duration::seconds(lifetime_secs),
        )
    }

    #[test]
    fn test_safety_margin_shortens_validity() {
        let cred = credential(120);
        assert!(cred.is_valid(Duration::seconds(60)));
        assert!(!cred.is_valid(Duration::seconds(180)));
    }

    #[test]
    fn test_oversized_margin_means_invalid() {
        let cred = credential(120);
        assert!(!cred.is_valid(Duration::MAX));
    }

    #[test]
    fn test_expiry_clamped_after_issue() {
        let now = Utc::now();
        let cred = Credential::new(SecretString::from("t".to_string()), now, now);
        assert!(cred.expires_at() > cred.issued_at());
    }

    #[test]
    fn test_debug_redacts_token() {
        let cred = credential(60);
        let rendered = format!("{:?}", cred);
        assert!(!rendered.contains("jwt-abc"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_info_omits_token() {
        let cred = credential(600).with_accounts(vec!["A1".to_string()], true);
        let value = serde_json::to_value(cred.info(Duration::seconds(60))).unwrap();
        assert!(!value.to_string().contains("jwt-abc"));
        assert_eq!(value["account_ids"][0], "A1");
        assert_eq!(value["readonly"], true);
        assert_eq!(value["valid"], true);
    }

    #[tokio::test]
    async fn test_store_replaces_atomically() {
        let store = CredentialStore::new(SecretString::from("secret".to_string()));
        assert!(store.get().await.is_none());

        let first = Arc::new(credential(60));
        store.set(Arc::clone(&first)).await;
        let snapshot = store.get().await.unwrap();

        store.set(Arc::new(credential(600))).await;
        // Earlier snapshot is untouched by the replacement
        assert!(Arc::ptr_eq(&snapshot, &first));
        assert!(!Arc::ptr_eq(&store.get().await.unwrap(), &first));
    }

    #[tokio::test]
    async fn test_store_keeps_secret_out_of_debug() {
        let store = CredentialStore::new(SecretString::from("long-lived-key".to_string()));
        store.set(Arc::new(credential(600))).await;

        let rendered = format!("{:?}", store);
        assert!(!rendered.contains("long-lived-key"));
        assert!(!rendered.contains("jwt-abc"));
        assert_eq!(store.secret().expose_secret(), "long-lived-key");
    }
}
