//! Weather lookup tool.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use parley_core::error::Result;
use parley_core::tool::Tool;

/// Current conditions for a location.
///
/// Answers from a fixed simulated report; no external service is called.
pub struct WeatherTool;

impl WeatherTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get current weather for a location"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City name, e.g. 'London', 'New York'"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let location = args["location"].as_str().unwrap_or("Unknown");
        debug!("Weather lookup for {}", location);
        Ok(json!({
            "location": location,
            "temperature": "72°F",
            "conditions": "Sunny",
            "humidity": "45%",
            "source": "weather_api"
        }))
    }
}
