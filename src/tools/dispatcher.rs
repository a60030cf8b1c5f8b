//! Tool dispatcher
//!
//! The single entry point for the orchestrator. Every invocation ends in a
//! `ToolResult`, whatever the handler or the network did.

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};

use super::registry::ToolRegistry;
use crate::audit::{AuditEntry, AuditLog};
use crate::error::ErrorKind;
use crate::{Error, Result};

/// One call from the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    /// Correlation id echoed back by the stdio server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ToolInvocationRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            request_id: None,
        }
    }
}

/// Typed failure surfaced to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Uniform result envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResult {
    Success {
        data: Value,
    },
    #[serde(rename = "error")]
    Failure {
        error: ToolFailure,
    },
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ToolResult::Success { .. } => None,
            ToolResult::Failure { error } => Some(error.kind),
        }
    }
}

impl From<Error> for ToolResult {
    fn from(e: Error) -> Self {
        ToolResult::Failure {
            error: ToolFailure {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

/// Resolves, validates and runs tools
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    audit: Option<AuditLog>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            audit: None,
        }
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Invoke a tool by name. Never fails and never panics outward.
    pub async fn invoke(&self, request: ToolInvocationRequest) -> ToolResult {
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = info_span!("tool", tool = %request.tool_name, request_id = %request_id);

        let start = Instant::now();
        let outcome = AssertUnwindSafe(self.run(&request).instrument(span.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Error::Internal(panic_message(panic))));
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(data) => {
                span.in_scope(|| info!(duration_ms = duration_ms, "Tool call succeeded"));
                ToolResult::Success { data }
            }
            Err(e) => {
                span.in_scope(|| {
                    warn!(
                        kind = %e.kind(),
                        error = %e,
                        duration_ms = duration_ms,
                        "Tool call failed"
                    )
                });
                ToolResult::from(e)
            }
        };

        if let Some(audit) = &self.audit {
            let (error_kind, error) = match &result {
                ToolResult::Success { .. } => (None, None),
                ToolResult::Failure { error } => (Some(error.kind), Some(error.message.clone())),
            };
            audit
                .record(AuditEntry {
                    timestamp: Utc::now(),
                    request_id,
                    tool_name: request.tool_name,
                    arguments: request.arguments,
                    status: if result.is_success() { "success" } else { "error" },
                    error_kind,
                    error,
                    duration_ms,
                })
                .await;
        }

        result
    }

    async fn run(&self, request: &ToolInvocationRequest) -> Result<Value> {
        let spec = self.registry.resolve(&request.tool_name)?;
        let arguments = self.registry.validate(&spec, request.arguments.clone())?;
        spec.handler.handle(arguments).await
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("tool handler panicked: {}", detail)
}
