//! Configuration loading and validation for UniDesk.
//!
//! Loads configuration from `~/.unidesk/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.unidesk/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name, used in logs
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    #[serde(default)]
    pub agent: AgentSettings,

    /// Department site the announcement tools scrape
    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("site", &self.site)
            .field("retrieval", &self.retrieval)
            .field("session", &self.session)
            .finish()
    }
}

/// Limits for the tool-using specialist loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    /// Per-call tool timeout
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_max_tool_iterations() -> usize {
    25
}
fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_url")]
    pub url: String,

    #[serde(default = "default_school")]
    pub school: String,

    #[serde(default = "default_department")]
    pub department: String,
}

fn default_site_url() -> String {
    "https://eem.bakircay.edu.tr".into()
}
fn default_school() -> String {
    "Izmir Bakircay Universitesi".into()
}
fn default_department() -> String {
    "Elektrik Elektronik Mühendisliği".into()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: default_site_url(),
            school: default_school(),
            department: default_department(),
        }
    }
}

/// Vector store and search defaults.
#[derive(Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Only "qdrant"; nothing ingests into an in-process store
    #[serde(default = "default_retrieval_backend")]
    pub backend: String,

    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qdrant_api_key: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_k")]
    pub default_k: i64,

    #[serde(default)]
    pub score_threshold: f32,

    /// Course id used when a turn does not name one
    #[serde(default = "default_course_id")]
    pub default_course_id: String,
}

fn default_retrieval_backend() -> String {
    "qdrant".into()
}
fn default_qdrant_url() -> String {
    "http://localhost:6333".into()
}
fn default_collection() -> String {
    "school_data".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-large".into()
}
fn default_k() -> i64 {
    5
}
fn default_course_id() -> String {
    "regulations".into()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: default_retrieval_backend(),
            qdrant_url: default_qdrant_url(),
            qdrant_api_key: None,
            collection: default_collection(),
            embedding_model: default_embedding_model(),
            default_k: default_k(),
            score_threshold: 0.0,
            default_course_id: default_course_id(),
        }
    }
}

impl std::fmt::Debug for RetrievalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalConfig")
            .field("backend", &self.backend)
            .field("qdrant_url", &self.qdrant_url)
            .field("qdrant_api_key", &redact(&self.qdrant_api_key))
            .field("collection", &self.collection)
            .field("embedding_model", &self.embedding_model)
            .field("default_k", &self.default_k)
            .field("score_threshold", &self.score_threshold)
            .field("default_course_id", &self.default_course_id)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_session_backend")]
    pub backend: String,

    /// SQLite file; defaults to `~/.unidesk/sessions.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_session_backend() -> String {
    "sqlite".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_session_backend(),
            path: None,
        }
    }
}

impl SessionConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("sessions.db"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.unidesk/config.toml).
    ///
    /// Environment overrides:
    /// - `UNIDESK_API_KEY`, then `OPENAI_API_KEY` (only when the file has no key)
    /// - `UNIDESK_MODEL`, `UNIDESK_BASE_URL`
    /// - `QDRANT_URL`, `QDRANT_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (injectable for tests).
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("UNIDESK_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(model) = lookup("UNIDESK_MODEL") {
            self.default_model = model;
        }
        if let Some(base_url) = lookup("UNIDESK_BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(url) = lookup("QDRANT_URL").filter(|u| !u.is_empty()) {
            self.retrieval.qdrant_url = url;
        }
        if let Some(key) = lookup("QDRANT_API_KEY").filter(|k| !k.is_empty()) {
            self.retrieval.qdrant_api_key = Some(key);
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs_home().join(".unidesk")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be > 0".into(),
            ));
        }

        if self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.tool_timeout_secs must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.score_threshold) {
            return Err(ConfigError::ValidationError(
                "retrieval.score_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.retrieval.backend != "qdrant" {
            return Err(ConfigError::ValidationError(format!(
                "retrieval.backend must be \"qdrant\", got \"{}\" (regulations are only ingested into Qdrant)",
                self.retrieval.backend
            )));
        }

        if !matches!(self.session.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "session.backend must be \"sqlite\" or \"memory\", got \"{}\"",
                self.session.backend
            )));
        }

        if self.site.url.trim().is_empty() {
            return Err(ConfigError::ValidationError("site.url must not be empty".into()));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            base_url: default_base_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentSettings::default(),
            site: SiteConfig::default(),
            retrieval: RetrievalConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
