//! Assistant runner
//!
//! Wires credential store, refresher, transport, registry and dispatcher
//! into one stack, and serves tool invocations over newline-delimited JSON.

use secrecy::SecretString;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::auth::{CredentialStore, HttpSessionClient, SessionClient, TokenRefresher};
use crate::config::Config;
use crate::tools::{default_registry, ToolDispatcher, ToolInvocationRequest, ToolRegistry, ToolResult};
use crate::transport::{ApiTransport, HttpBackend, ReqwestBackend};
use crate::{Error, Result};

/// Fully wired trading assistant core
pub struct AssistantRunner {
    config: Config,
    dispatcher: Arc<ToolDispatcher>,
}

impl AssistantRunner {
    /// Build the stack on the production HTTP backend
    pub fn new(config: Config, secret: SecretString) -> Result<Self> {
        let backend = Arc::new(ReqwestBackend::new(&config.api)?);
        Self::with_backend(config, secret, backend)
    }

    /// Build the stack on any HTTP backend
    pub fn with_backend(
        config: Config,
        secret: SecretString,
        backend: Arc<dyn HttpBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let session: Arc<dyn SessionClient> =
            Arc::new(HttpSessionClient::new(Arc::clone(&backend), config.api.clone()));
        let refresher = Arc::new(TokenRefresher::new(
            Arc::new(CredentialStore::new(secret)),
            session,
            config.token.clone(),
        ));
        let transport = Arc::new(ApiTransport::new(backend, refresher, config.api.clone()));

        let mut dispatcher = ToolDispatcher::new(Arc::new(default_registry(transport)?));
        if let Some(path) = &config.audit_log_path {
            info!(path = %path, "Auditing tool calls");
            dispatcher = dispatcher.with_audit_log(AuditLog::new(path));
        }

        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    pub async fn invoke(&self, request: ToolInvocationRequest) -> ToolResult {
        self.dispatcher.invoke(request).await
    }

    /// Dispatch every request line from `input` concurrently and write one
    /// envelope per line to `output`, in completion order.
    pub async fn serve<R, W>(&self, input: R, output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Value>();

        let read = async move {
            let mut lines = input.lines();
            let mut tasks = JoinSet::new();
            let mut received = 0usize;

            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                received += 1;

                match serde_json::from_str::<ToolInvocationRequest>(line) {
                    Ok(request) => {
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let tx = tx.clone();
                        tasks.spawn(async move {
                            let request_id = request.request_id.clone();
                            let result = dispatcher.invoke(request).await;
                            let _ = tx.send(envelope(&result, request_id.as_deref()));
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Malformed request line");
                        let result = ToolResult::from(Error::Validation(vec![format!(
                            "malformed request: {}",
                            e
                        )]));
                        let _ = tx.send(envelope(&result, request_id_of(line).as_deref()));
                    }
                }
            }

            drop(tx);
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Dispatch task failed");
                }
            }
            debug!(requests = received, "Input closed");
            Ok::<_, Error>(())
        };

        let write = write_envelopes(rx, output);

        let (read, write) = tokio::join!(read, write);
        read?;
        write
    }
}

async fn write_envelopes<W>(mut rx: mpsc::UnboundedReceiver<Value>, mut output: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        let mut line = serde_json::to_vec(&envelope)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}

/// Serialized `ToolResult`, with the caller's `request_id` echoed when given
pub fn envelope(result: &ToolResult, request_id: Option<&str>) -> Value {
    let mut value = serde_json::to_value(result).unwrap_or_else(|e| {
        serde_json::json!({
            "status": "error",
            "error": {"kind": "InternalError", "message": e.to_string()}
        })
    });
    if let (Some(id), Some(obj)) = (request_id, value.as_object_mut()) {
        obj.insert("request_id".to_string(), Value::String(id.to_string()));
    }
    value
}

/// Best-effort `request_id` from a line that failed to parse as a request
fn request_id_of(line: &str) -> Option<String> {
    serde_json::from_str::<Value>(line)
        .ok()?
        .get("request_id")?
        .as_str()
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_api_config, ScriptedBackend};
    use serde_json::json;
    use std::collections::HashMap;

    fn runner(backend: Arc<ScriptedBackend>) -> AssistantRunner {
        let config = Config {
            api: test_api_config(),
            ..Config::default()
        };
        AssistantRunner::with_backend(
            config,
            SecretString::from("long-lived-secret".to_string()),
            backend,
        )
        .unwrap()
    }

    async fn serve_lines(runner: &AssistantRunner, input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        runner
            .serve(tokio::io::BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_serve_answers_every_line_with_request_ids() {
        let runner = runner(Arc::new(ScriptedBackend::new()));
        let input = concat!(
            r#"{"tool_name": "nope", "arguments": {}, "request_id": "a"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"tool_name": "get_quotes", "arguments": {}, "request_id": "b"}"#,
            "\n",
            r#"{"arguments": {}, "request_id": "c"}"#,
            "\n",
        );

        let envelopes = serve_lines(&runner, input).await;
        assert_eq!(envelopes.len(), 4);

        let by_id: HashMap<String, &Value> = envelopes
            .iter()
            .filter_map(|e| Some((e.get("request_id")?.as_str()?.to_string(), e)))
            .collect();
        assert_eq!(by_id["a"]["error"]["kind"], "UnknownToolError");
        assert_eq!(by_id["b"]["error"]["kind"], "ValidationError");
        assert_eq!(by_id["c"]["error"]["kind"], "ValidationError");

        let anonymous: Vec<_> = envelopes
            .iter()
            .filter(|e| e.get("request_id").is_none())
            .collect();
        assert_eq!(anonymous.len(), 1);
        assert!(anonymous[0]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("malformed request"));
    }

    #[tokio::test]
    async fn test_first_call_mints_session_over_http() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ok(200, r#"{"token": "jwt-live"}"#);
        backend.push_ok(
            200,
            r#"{"created_at": "2024-03-01T10:00:00Z", "expires_at": "2099-01-01T00:00:00Z",
                "account_ids": ["A1"], "readonly": true}"#,
        );
        let runner = runner(Arc::clone(&backend));

        let result = runner
            .invoke(ToolInvocationRequest::new("get_accounts", json!({})))
            .await;

        let data = match result {
            ToolResult::Success { data } => data,
            other => panic!("expected success, got {:?}", other),
        };
        assert_eq!(data["account_ids"], json!(["A1"]));
        assert_eq!(data["readonly"], true);

        let requests = backend.requests();
        assert_eq!(requests[0].url.path(), "/v1/sessions");
        assert_eq!(requests[1].url.path(), "/v1/sessions/details");
    }

    #[test]
    fn test_invalid_config_rejected_at_startup() {
        let mut config = Config::default();
        config.token.safety_margin_secs = 10_000;
        let result = AssistantRunner::with_backend(
            config,
            SecretString::from("s".to_string()),
            Arc::new(ScriptedBackend::new()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
