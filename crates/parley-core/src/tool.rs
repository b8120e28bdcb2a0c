//! Tool system: capabilities the model may invoke during a turn.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::error::{ParleyError, Result};
use crate::provider::{FunctionDefinition, ToolDefinition};

/// Abstract tool trait.
///
/// # Example
///
/// ```rust,ignore
/// struct EchoTool;
///
/// #[async_trait]
/// impl Tool for EchoTool {
///     fn name(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Echo the given text" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({
///             "type": "object",
///             "properties": { "text": { "type": "string" } },
///             "required": ["text"]
///         })
///     }
///
///     async fn execute(&self, args: Value) -> Result<Value> {
///         Ok(serde_json::json!({ "text": args["text"] }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls.
    fn name(&self) -> &str;

    /// Description of what the tool does.
    fn description(&self) -> &str;

    /// JSON Schema for tool parameters.
    fn parameters(&self) -> Value;

    /// Execute the tool, producing a result mapping.
    async fn execute(&self, args: Value) -> Result<Value>;

    /// Convert to the backend's tool definition format.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters: self.parameters(),
            },
        }
    }
}

/// Registry of the tools declared to the backend.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        tracing::debug!("Registered tool: {}", name);
        self.tools.insert(name, Box::new(tool));
    }

    /// Check if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool definitions, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ParleyError::ToolNotFound(name.to_string()))?;

        tracing::info!("Executing tool: {} with args: {}", name, args);

        match tool.execute(args).await {
            Ok(result) => {
                tracing::debug!("Tool {} completed", name);
                Ok(result)
            }
            Err(e) => {
                tracing::error!("Tool {} failed: {}", name, e);
                Err(ParleyError::ToolExecution {
                    tool: name.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Execute a tool, folding any failure into a structured error value.
    ///
    /// Never fails: unknown tools and tool errors come back as
    /// `{"error": "..."}` so they can be fed to the model as the tool's answer.
    pub async fn invoke(&self, name: &str, args: Value) -> Value {
        match self.execute(name, args).await {
            Ok(result) => result,
            Err(ParleyError::ToolNotFound(tool)) => json!({ "error": format!("Unknown tool: {}", tool) }),
            Err(e) => json!({ "error": e.to_string() }),
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase text"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, args: Value) -> Result<Value> {
            match args["text"].as_str() {
                Some(t) => Ok(json!({ "text": t.to_uppercase() })),
                None => Err(ParleyError::Other("missing text".into())),
            }
        }
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let mut reg = ToolRegistry::new();
        reg.register(Upper);
        let out = reg.invoke("upper", json!({"text": "hi"})).await;
        assert_eq!(out, json!({"text": "HI"}));
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool_is_data() {
        let reg = ToolRegistry::new();
        let out = reg.invoke("nope", json!({})).await;
        assert_eq!(out["error"], "Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_invoke_failure_is_data() {
        let mut reg = ToolRegistry::new();
        reg.register(Upper);
        let out = reg.invoke("upper", json!({})).await;
        assert!(out["error"].as_str().unwrap().contains("missing text"));
    }

    #[test]
    fn test_definitions() {
        let mut reg = ToolRegistry::new();
        reg.register(Upper);
        let defs = reg.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].r#type, "function");
        assert_eq!(defs[0].function.name, "upper");
    }
}
