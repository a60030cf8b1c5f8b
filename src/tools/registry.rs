//! Tool registry
//!
//! Tools are registered once at start-up and looked up by name afterwards.
//! Each tool declares its parameters explicitly (used for validation) and a
//! typed input struct (used for decoding and for the published JSON Schema).

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::schema::{self, ParamSpec};
use crate::{Error, Result};

/// A named operation exposed to the LLM runtime
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    const NAME: &'static str;
    type Input: DeserializeOwned + JsonSchema + Send;

    fn description(&self) -> &'static str;

    /// Declared parameters, checked before `execute` is called
    fn params(&self) -> Vec<ParamSpec>;

    async fn execute(&self, input: Self::Input) -> Result<Value>;
}

/// Type-erased handler stored in the registry
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, arguments: Map<String, Value>) -> Result<Value>;
}

struct TypedHandler<T>(T);

#[async_trait]
impl<T: Tool> ToolHandler for TypedHandler<T> {
    async fn handle(&self, arguments: Map<String, Value>) -> Result<Value> {
        let input: T::Input = serde_json::from_value(Value::Object(arguments))
            .map_err(|e| Error::Validation(vec![e.to_string()]))?;
        self.0.execute(input).await
    }
}

/// Registered tool: name, schema and handler
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    /// JSON Schema of the input, as published to the LLM
    pub input_schema: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolSpec {
    pub fn from_tool<T: Tool>(tool: T) -> Self {
        let mut input_schema = serde_json::to_value(schemars::schema_for!(T::Input))
            .unwrap_or_else(|_| json!({"type": "object"}));
        if let Some(obj) = input_schema.as_object_mut() {
            obj.remove("$schema");
            obj.remove("title");
            obj.entry("properties").or_insert_with(|| json!({}));
        }
        Self {
            name: T::NAME.to_string(),
            description: tool.description().to_string(),
            params: tool.params(),
            input_schema,
            handler: Arc::new(TypedHandler(tool)),
        }
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }

    /// OpenAI function-calling representation
    pub fn openai_function(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

/// Public listing entry for a tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Static catalog of tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<ToolSpec>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec) -> Result<()> {
        if self.tools.contains_key(&spec.name) {
            return Err(Error::DuplicateTool(spec.name));
        }
        tracing::debug!(tool = %spec.name, params = spec.params.len(), "Registered tool");
        self.tools.insert(spec.name.clone(), Arc::new(spec));
        Ok(())
    }

    pub fn register_tool<T: Tool>(&mut self, tool: T) -> Result<()> {
        self.register(ToolSpec::from_tool(tool))
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<ToolSpec>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    /// Validate arguments against the tool's declared parameters, applying defaults
    pub fn validate(&self, spec: &ToolSpec, arguments: Value) -> Result<Map<String, Value>> {
        schema::validate(&spec.params, arguments)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|spec| spec.descriptor()).collect()
    }

    pub fn openai_tools(&self) -> Vec<Value> {
        self.tools.values().map(|spec| spec.openai_function()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
