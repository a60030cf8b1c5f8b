//! Error types for the trading assistant core

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid arguments: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Transient upstream failure{}: {message}", fmt_status(.status))]
    Transient { status: Option<u16>, message: String },

    #[error("Upstream error{}: {message}", fmt_status(.status))]
    Upstream { status: Option<u16>, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stable error classification surfaced to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "ValidationError")]
    Validation,
    #[serde(rename = "UnknownToolError")]
    UnknownTool,
    #[serde(rename = "DuplicateToolError")]
    DuplicateTool,
    #[serde(rename = "AuthError")]
    Auth,
    #[serde(rename = "TransientError")]
    Transient,
    #[serde(rename = "UpstreamError")]
    Upstream,
    #[serde(rename = "ConfigError")]
    Config,
    #[serde(rename = "InternalError")]
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::UnknownTool => "UnknownToolError",
            ErrorKind::DuplicateTool => "DuplicateToolError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::Transient => "TransientError",
            ErrorKind::Upstream => "UpstreamError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error for the tool result envelope.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::UnknownTool(_) => ErrorKind::UnknownTool,
            Error::DuplicateTool(_) => ErrorKind::DuplicateTool,
            Error::Auth(_) => ErrorKind::Auth,
            Error::Transient { .. } => ErrorKind::Transient,
            // A body we cannot decode came from upstream
            Error::Upstream { .. } | Error::Json(_) => ErrorKind::Upstream,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a caller may reasonably retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }

    /// HTTP status reported by upstream, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transient { status, .. } | Error::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    pub(crate) fn transient(message: impl Into<String>) -> Self {
        Error::Transient {
            status: None,
            message: message.into(),
        }
    }
}
