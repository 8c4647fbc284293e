//! Gateway configuration loading and validation.
//!
//! Reads `gateway.yaml` and resolves environment variables. Config is the
//! single source of truth for the model endpoint, the tool-provider launch
//! command, the server bind address, and turn limits — the core modules
//! receive these values injected and never read configuration themselves.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::agent::TurnLimits;
use crate::inference::ModelSettings;
use crate::provider::ProviderConfig;

/// Config file name searched upward from the working directory.
const CONFIG_FILE: &str = "gateway.yaml";

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find {CONFIG_FILE}")]
    NotFound,

    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Model endpoint section.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSection {
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

/// Server section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

/// Turn limits section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LimitsSection {
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default = "default_tool_result_limit")]
    pub tool_result_limit: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            tool_result_limit: default_tool_result_limit(),
        }
    }
}

fn default_max_tool_rounds() -> usize {
    8
}

fn default_tool_result_limit() -> usize {
    6_000
}

/// Top-level gateway configuration (mirrors `gateway.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub model: ModelSection,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub limits: LimitsSection,
    /// Optional system prompt prepended to every conversation.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl GatewayConfig {
    /// Model settings for the inference client.
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            base_url: self.model.base_url.trim_end_matches('/').to_string(),
            model: self.model.model.clone(),
            // Empty string means "no key" so `${VAR:-}` interpolation works.
            api_key: self
                .model
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty()),
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
        }
    }

    /// Turn limits for the orchestrator.
    pub fn turn_limits(&self) -> TurnLimits {
        TurnLimits {
            max_tool_rounds: self.limits.max_tool_rounds,
            tool_result_limit: self.limits.tool_result_limit,
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Resolve the config path.
///
/// Honors `TOOLGATE_CONFIG` if set, otherwise walks upward from `start`
/// looking for `gateway.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    if let Ok(explicit) = std::env::var("TOOLGATE_CONFIG") {
        let candidate = PathBuf::from(&explicit);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(ConfigError::NotFound)
}

/// Load and parse the gateway configuration file.
///
/// Performs environment-variable interpolation on string values matching
/// `${VAR_NAME}` or `${VAR_NAME:-default}`.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
