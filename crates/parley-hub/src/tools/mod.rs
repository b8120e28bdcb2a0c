//! Built-in tools offered to the model.

pub mod knowledge;
pub mod weather;

pub use knowledge::KnowledgeBaseTool;
pub use weather::WeatherTool;

use parley_core::tool::ToolRegistry;

/// Registry holding every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(WeatherTool::new());
    registry.register(KnowledgeBaseTool::new());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_registry_schema() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["get_weather", "search_knowledge_base"]);

        let defs = serde_json::to_value(registry.definitions()).unwrap();
        assert_eq!(defs[0]["type"], "function");
        assert_eq!(defs[0]["function"]["parameters"]["required"], json!(["location"]));
        assert_eq!(defs[1]["function"]["parameters"]["required"], json!(["query"]));
    }

    #[tokio::test]
    async fn test_unknown_tool_result() {
        let registry = default_registry();
        let out = registry.invoke("launch_rocket", json!({})).await;
        assert_eq!(out["error"], "Unknown tool: launch_rocket");
    }
}
