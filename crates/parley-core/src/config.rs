//! Configuration management for Parley.
//!
//! Settings come from a TOML file (missing file means defaults), then
//! environment overrides, then command-line flags applied by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ParleyError, Result};
use crate::orchestrator::{DEFAULT_SYSTEM_PROMPT, OrchestratorConfig};
use crate::provider::BackendConfig;
use crate::summarizer::SummaryConfig;

/// Top-level Parley configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    /// Model backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// HTTP listener.
    #[serde(default)]
    pub server: ServerSettings,

    /// Session lifecycle.
    #[serde(default)]
    pub session: SessionSettings,

    /// Durable store.
    #[serde(default)]
    pub store: StoreSettings,

    /// Post-session summaries.
    #[serde(default)]
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Inactivity limit, measured from session creation.
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,

    /// History messages sent as context with each turn.
    #[serde(default = "default_max_context")]
    pub max_context_messages: usize,

    /// Custom system prompt (None = built-in prompt).
    pub system_prompt: Option<String>,
}

fn default_session_timeout() -> u64 {
    1800
}

fn default_max_context() -> usize {
    10
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_session_timeout(),
            max_context_messages: default_max_context(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite database path (None = data dir default).
    pub path: Option<PathBuf>,
}

impl StoreSettings {
    /// The configured path, or `<data dir>/parley/parley.db`.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("parley")
                .join("parley.db")
        })
    }
}

impl ParleyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ParleyError::Config(format!("Failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| ParleyError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ParleyError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
            .join("config.toml")
    }

    /// Apply `OLLAMA_URL`, `OLLAMA_MODEL`, `HOST`, `PORT` and `PARLEY_DB`.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("OLLAMA_URL") {
            self.backend.url = url;
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            self.backend.model = model;
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ParleyError::Config(format!("PORT is not a valid port: {}", port)))?;
        }
        if let Some(db) = get("PARLEY_DB") {
            self.store.path = Some(PathBuf::from(db));
        }
        Ok(())
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.backend.url.trim().is_empty() {
            return Err(ParleyError::Config("backend.url must not be empty".into()));
        }
        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            return Err(ParleyError::Config(format!(
                "backend.url must be an http(s) URL: {}",
                self.backend.url
            )));
        }
        if self.backend.model.trim().is_empty() {
            return Err(ParleyError::Config("backend.model must not be empty".into()));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ParleyError::Config("backend.timeout_secs must be positive".into()));
        }
        if self.session.timeout_secs == 0 {
            return Err(ParleyError::Config("session.timeout_secs must be positive".into()));
        }
        if self.session.max_context_messages == 0 {
            return Err(ParleyError::Config(
                "session.max_context_messages must be positive".into(),
            ));
        }
        if self.summary.max_transcript_chars == 0 || self.summary.max_summary_chars == 0 {
            return Err(ParleyError::Config("summary limits must be positive".into()));
        }
        if self.summary.timeout_secs == 0 {
            return Err(ParleyError::Config("summary.timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Orchestrator settings derived from this config.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            system_prompt: self
                .session
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            model: Some(self.backend.model.clone()),
            temperature: self.backend.temperature,
            timeout: self.backend.timeout(),
        }
    }
}
