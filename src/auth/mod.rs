//! Session token lifecycle
//!
//! - `CredentialStore` holds the current bearer credential
//! - `TokenRefresher` mints new credentials, one refresh at a time
//! - `SessionClient` talks to the upstream auth endpoint

mod credential;
mod refresher;
mod session;

pub use credential::{Credential, CredentialInfo, CredentialStore};
pub use refresher::TokenRefresher;
pub use session::{HttpSessionClient, SessionClient, SessionGrant};

use crate::Error;

/// Why a refresh failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshErrorKind {
    /// The auth endpoint refused the secret
    Rejected,
    /// The auth endpoint could not be reached or answered garbage
    Unavailable,
    /// The auth call exceeded its deadline
    Timeout,
}

/// Refresh failure shared by every caller waiting on the same refresh
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RefreshError {
    pub kind: RefreshErrorKind,
    pub message: String,
}

impl RefreshError {
    pub fn new(kind: RefreshErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<RefreshError> for Error {
    fn from(e: RefreshError) -> Self {
        match e.kind {
            // Timeouts never count as an authentication verdict
            RefreshErrorKind::Timeout => Error::transient(e.message),
            RefreshErrorKind::Rejected | RefreshErrorKind::Unavailable => Error::Auth(e.message),
        }
    }
}
