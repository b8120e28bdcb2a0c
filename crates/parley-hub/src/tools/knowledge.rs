//! Knowledge base search tool.

use async_trait::async_trait;
use serde_json::{Value, json};

use parley_core::error::Result;
use parley_core::tool::Tool;

/// Search the internal knowledge base.
pub struct KnowledgeBaseTool;

impl KnowledgeBaseTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for KnowledgeBaseTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search internal knowledge base"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let query = args["query"].as_str().unwrap_or_default();
        Ok(json!({
            "query": query,
            "results": [format!("Found info on '{}'", query), "Related documents"],
            "source": "knowledge_base"
        }))
    }
}
