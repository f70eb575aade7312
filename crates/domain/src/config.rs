//! Gateway configuration, loaded from `config.toml`.
//!
//! Every section has serde defaults so a missing file or a partial file
//! yields a runnable dev configuration. API keys are never stored in the
//! file; sections name the environment variable to read instead.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub choice: ChoiceConfig,
    #[serde(default)]
    pub data_agent: DataAgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// CORS origin for the web front-end; `*` in dev.
    #[serde(default = "d_origin")]
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            allowed_origin: d_origin(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the outer research loop decides it is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Repeat while the provider's finish reason is not `stop`.
    StopReason,
    /// Repeat while neither tool output nor answer text has appeared;
    /// for providers whose tool-calling signal is not a finish reason.
    ToolSignal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_loop_mode")]
    pub loop_mode: LoopMode,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    /// Per-invocation ceiling on outer loop iterations.
    #[serde(default = "d_max_loops")]
    pub max_loops: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            model: d_model(),
            api_key_env: d_api_key_env(),
            loop_mode: d_loop_mode(),
            max_tokens: d_max_tokens(),
            max_loops: d_max_loops(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History trimming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Messages retained for stop-reason providers.
    #[serde(default = "d_cap_stop")]
    pub cap_stop_reason: usize,
    /// Smaller retention for tool-signal providers (tighter contexts).
    #[serde(default = "d_cap_tool")]
    pub cap_tool_signal: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cap_stop_reason: d_cap_stop(),
            cap_tool_signal: d_cap_tool(),
        }
    }
}

impl HistoryConfig {
    pub fn cap_for(&self, mode: LoopMode) -> usize {
        match mode {
            LoopMode::StopReason => self.cap_stop_reason,
            LoopMode::ToolSignal => self.cap_tool_signal,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Choice gate / data agent / tools / storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceConfig {
    /// Auto-decline an unanswered choice prompt after this long.
    #[serde(default = "d_choice_timeout")]
    pub timeout_secs: u64,
}

impl Default for ChoiceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: d_choice_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataAgentConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_agent_endpoint")]
    pub endpoint: String,
}

impl Default for DataAgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: d_agent_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "d_search_endpoint")]
    pub search_endpoint: String,
    #[serde(default = "d_search_key_env")]
    pub search_api_key_env: String,
    #[serde(default = "d_property_endpoint")]
    pub property_endpoint: String,
    #[serde(default = "d_max_results")]
    pub max_results: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            search_endpoint: d_search_endpoint(),
            search_api_key_env: d_search_key_env(),
            property_endpoint: d_property_endpoint(),
            max_results: d_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
        }
    }
}

// ── Serde default helpers ──────────────────────────────────────────

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    3210
}
fn d_origin() -> String {
    "*".into()
}
fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_model() -> String {
    "gpt-4o".into()
}
fn d_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn d_loop_mode() -> LoopMode {
    LoopMode::StopReason
}
fn d_max_tokens() -> u32 {
    2500
}
fn d_max_loops() -> usize {
    8
}
fn d_cap_stop() -> usize {
    10
}
fn d_cap_tool() -> usize {
    6
}
fn d_choice_timeout() -> u64 {
    300
}
fn d_true() -> bool {
    true
}
fn d_agent_endpoint() -> String {
    "http://127.0.0.1:8600/v1/agent/stream".into()
}
fn d_search_endpoint() -> String {
    "https://api.tavily.com/search".into()
}
fn d_search_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn d_property_endpoint() -> String {
    "http://127.0.0.1:8700/v1/listings/search".into()
}
fn d_max_results() -> usize {
    8
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
