//! Intent routing: tag each user turn with a coarse intent.
//!
//! Matching is case-insensitive substring search over keyword sets that are
//! checked in priority order; the first set with a hit wins, so overlapping
//! sets resolve by position.

use serde::{Deserialize, Serialize};

/// Routing tag for a user turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Weather,
    Search,
    Technical,
    #[default]
    General,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::Search => "search",
            Self::Technical => "technical",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A route with the keywords that select it.
#[derive(Debug, Clone)]
pub struct RouteSlot {
    pub route: Route,
    pub keywords: Vec<String>,
}

/// Keyword classifier. Slots are evaluated in registration order.
#[derive(Debug, Clone)]
pub struct IntentRouter {
    slots: Vec<RouteSlot>,
}

const WEATHER: &[&str] = &["weather", "temperature", "climate", "forecast", "rain", "snow"];
const SEARCH: &[&str] = &["search", "find", "look up", "research", "tell me about"];
const TECHNICAL: &[&str] = &[
    "code",
    "python",
    "javascript",
    "java",
    "program",
    "programming",
    "debug",
];

impl IntentRouter {
    /// A router with no slots; everything routes to `General`.
    pub fn empty() -> Self {
        Self { slots: Vec::new() }
    }

    /// Append a slot at the lowest priority so far.
    pub fn register(&mut self, route: Route, keywords: &[&str]) {
        self.slots.push(RouteSlot {
            route,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        });
    }

    /// Classify a message.
    pub fn classify(&self, message: &str) -> Route {
        let msg_lower = message.to_lowercase();
        self.slots
            .iter()
            .find(|slot| slot.keywords.iter().any(|kw| msg_lower.contains(kw.as_str())))
            .map(|slot| slot.route)
            .unwrap_or(Route::General)
    }

    pub fn slots(&self) -> &[RouteSlot] {
        &self.slots
    }
}

impl Default for IntentRouter {
    fn default() -> Self {
        let mut router = Self::empty();
        router.register(Route::Weather, WEATHER);
        router.register(Route::Search, SEARCH);
        router.register(Route::Technical, TECHNICAL);
        router
    }
}

/// Classify with the standard keyword sets.
pub fn classify(message: &str) -> Route {
    IntentRouter::default().classify(message)
}
