//! Tool-call audit log
//!
//! Appends one JSON line per dispatched tool call. Writing never affects the
//! result returned to the orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::ErrorKind;

/// Entry in the audit log
#[derive(Debug, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub status: &'static str,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    fn write(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

/// JSONL audit sink shared by concurrent dispatches
#[derive(Clone)]
pub struct AuditLog {
    writer: Arc<Mutex<AuditLogWriter>>,
}

impl AuditLog {
    /// # Arguments
    /// * `log_path` - Path to the audit log file (JSONL format)
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(AuditLogWriter {
                path: log_path.into(),
            })),
        }
    }

    pub async fn record(&self, mut entry: AuditEntry) {
        entry.arguments = truncate(&entry.arguments);
        let writer = self.writer.lock().await;
        if let Err(e) = writer.write(&entry) {
            tracing::warn!(error = %e, "Failed to write audit log entry");
        }
    }
}

/// Keep oversized argument payloads out of the log
fn truncate(value: &Value) -> Value {
    let s = serde_json::to_string(value).unwrap_or_default();
    if s.len() > 1000 {
        let cut: String = s.chars().take(1000).collect();
        serde_json::json!(format!("{}... [truncated]", cut))
    } else {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn entry(status: &'static str, error_kind: Option<ErrorKind>) -> AuditEntry {
        AuditEntry {
            timestamp: Utc::now(),
            request_id: "req-1".to_string(),
            tool_name: "get_quotes".to_string(),
            arguments: json!({"symbol": "SBER@MISX"}),
            status,
            error_kind,
            error: None,
            duration_ms: 12,
        }
    }

    #[tokio::test]
    async fn test_appends_jsonl_lines() {
        let temp_file = NamedTempFile::new().unwrap();
        let log = AuditLog::new(temp_file.path());

        log.record(entry("success", None)).await;
        log.record(entry("error", Some(ErrorKind::Transient))).await;

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tool_name"], "get_quotes");
        assert_eq!(lines[1]["error_kind"], "TransientError");
    }

    #[test]
    fn test_large_arguments_truncated() {
        let big = json!({"query": "x".repeat(5000)});
        let truncated = truncate(&big);
        assert!(truncated.as_str().unwrap().ends_with("[truncated]"));
    }
}
