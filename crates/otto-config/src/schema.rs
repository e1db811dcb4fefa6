// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Driver identifier: "openai" (any OpenAI-compatible endpoint) or "mock".
    pub provider: String,
    /// Model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    pub api_key: Option<String>,
    /// Base URL override.  Useful for local proxies, LiteLLM, or gateways.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0)
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
        }
    }
}

fn default_max_steps() -> u32 {
    500
}
fn default_max_scheduled_runs() -> u32 {
    1000
}
fn default_checkpoint_events() -> u64 {
    10_000
}
fn default_tool_timeout_secs() -> u64 {
    300
}
fn default_tool_attempts() -> u32 {
    3
}
fn default_lm_timeout_secs() -> u64 {
    120
}
fn default_lm_attempts() -> u32 {
    2
}

/// Engine tunables.  The serde defaults mirror the engine's own constants;
/// a deployment overrides them per installation, not per submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Step budget applied when a submission does not carry one
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Run budget applied to schedules that do not carry one
    #[serde(default = "default_max_scheduled_runs")]
    pub max_scheduled_runs: u32,
    /// Journal length above which a scheduler checkpoints itself
    #[serde(default = "default_checkpoint_events")]
    pub checkpoint_events: u64,
    /// Per-attempt timeout for external tool activities, in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Attempts for external tool activities before giving up
    #[serde(default = "default_tool_attempts")]
    pub tool_attempts: u32,
    /// Per-attempt timeout for model-completion activities, in seconds
    #[serde(default = "default_lm_timeout_secs")]
    pub lm_timeout_secs: u64,
    /// Attempts for model-completion activities
    #[serde(default = "default_lm_attempts")]
    pub lm_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_scheduled_runs: default_max_scheduled_runs(),
            checkpoint_events: default_checkpoint_events(),
            tool_timeout_secs: default_tool_timeout_secs(),
            tool_attempts: default_tool_attempts(),
            lm_timeout_secs: default_lm_timeout_secs(),
            lm_attempts: default_lm_attempts(),
        }
    }
}

fn default_fetch_max_chars() -> usize {
    50_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Builtin tools registered at startup.  Submissions can only select
    /// tools that exist in the registry.
    #[serde(default = "ToolsConfig::default_enabled")]
    pub enabled: Vec<String>,
    /// Character cap for web_fetch responses
    #[serde(default = "default_fetch_max_chars")]
    pub fetch_max_chars: usize,
}

impl ToolsConfig {
    fn default_enabled() -> Vec<String> {
        vec!["echo".into(), "web_fetch".into()]
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            fetch_max_chars: default_fetch_max_chars(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
