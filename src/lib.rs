//! Finam Trade Assistant core
//!
//! The tool-execution layer between an LLM orchestrator and the Finam
//! TradeAPI:
//! - Mints and caches short-lived session tokens from a long-lived secret
//! - Performs authenticated API calls with a single retry on token rejection
//! - Exposes trading operations as named, schema-validated tools
//!
//! # Security Model
//!
//! - The long-lived secret and session tokens are held as `SecretString`
//! - No tool output ever contains a token
//! - Every tool call ends in a typed `ToolResult` envelope
//! - Optional JSONL audit trail of all tool calls

pub mod audit;
pub mod auth;
pub mod config;
pub mod runner;
pub mod tools;
pub mod transport;

mod error;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{ApiConfig, Config, TokenPolicy, ACCESS_TOKEN_ENV};
pub use error::{Error, ErrorKind, Result};
pub use runner::AssistantRunner;
pub use tools::{ToolDispatcher, ToolFailure, ToolInvocationRequest, ToolRegistry, ToolResult};
