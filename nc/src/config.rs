//! Console configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main console configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine connection
    pub engine: EngineConfig,

    /// Polling cadences
    pub polling: PollingConfig,

    /// Interactive console settings
    pub ui: UiConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.base_url.trim().is_empty() {
            return Err(eyre::eyre!("engine.base-url must not be empty"));
        }
        if engine.ws_url.trim().is_empty() {
            return Err(eyre::eyre!("engine.ws-url must not be empty"));
        }
        if !engine.flow_path.contains("{planId}") {
            return Err(eyre::eyre!(
                "engine.flow-path must contain {{planId}}, got '{}'",
                engine.flow_path
            ));
        }
        if !engine.step_execute_path.contains("{planId}") || !engine.step_execute_path.contains("{stepId}") {
            return Err(eyre::eyre!(
                "engine.step-execute-path must contain {{planId}} and {{stepId}}, got '{}'",
                engine.step_execute_path
            ));
        }

        let polling = &self.polling;
        for (key, value) in [
            ("active-executions-ms", polling.active_executions_ms),
            ("dashboard-stats-ms", polling.dashboard_stats_ms),
            ("plan-status-ms", polling.plan_status_ms),
            ("plan-list-ms", polling.plan_list_ms),
        ] {
            if value == 0 {
                return Err(eyre::eyre!("polling.{} must be greater than zero", key));
            }
        }
        if self.ui.tick_ms == 0 {
            return Err(eyre::eyre!("ui.tick-ms must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .nebula-console.yml
        let local_config = PathBuf::from(".nebula-console.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/nebula-console/nebula-console.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("nebula-console").join("nebula-console.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Engine connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// HTTP API root
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// WebSocket endpoint for status push
    #[serde(rename = "ws-url")]
    pub ws_url: String,

    /// Environment variable holding the bearer token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Request timeout in milliseconds; 0 disables the bound
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Flow endpoint template, `{planId}` is substituted
    #[serde(rename = "flow-path")]
    pub flow_path: String,

    /// Execute-step endpoint template, `{planId}` and `{stepId}` are substituted
    #[serde(rename = "step-execute-path")]
    pub step_execute_path: String,
}

impl EngineConfig {
    /// Token from the configured environment variable, if set and non-empty
    pub fn token_from_env(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.trim().is_empty())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/nebula-control-plane/api/v1".to_string(),
            ws_url: "ws://localhost:8080/nebula-control-plane/ws".to_string(),
            token_env: "NEBULA_AUTH_TOKEN".to_string(),
            timeout_ms: 30_000,
            flow_path: "/execution-plans/{planId}/flow".to_string(),
            step_execute_path: "/execution-plans/{planId}/steps/{stepId}/execute".to_string(),
        }
    }
}

/// Polling cadences; each loop runs independently
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    #[serde(rename = "active-executions-ms")]
    pub active_executions_ms: u64,

    #[serde(rename = "dashboard-stats-ms")]
    pub dashboard_stats_ms: u64,

    #[serde(rename = "plan-status-ms")]
    pub plan_status_ms: u64,

    #[serde(rename = "plan-list-ms")]
    pub plan_list_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            active_executions_ms: 5_000,
            dashboard_stats_ms: 30_000,
            plan_status_ms: 5_000,
            plan_list_ms: 30_000,
        }
    }
}

/// Interactive console settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Event loop tick in milliseconds
    #[serde(rename = "tick-ms")]
    pub tick_ms: u64,

    /// How long a toast stays visible
    #[serde(rename = "toast-ms")]
    pub toast_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            toast_ms: 4_000,
        }
    }
}
