//! Handler deployment configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`.geoprocessing.toml`)
//! 2. Environment variables
//!
//! Environment variables override TOML configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [geoprocessing]
//! execution_mode = "async"
//! tasks_table = "gp-tasks"
//! async_handler_function_name = "area-async-worker"
//! wss_ref = "abc123"
//! wss_region = "us-west-2"
//! wss_stage = "prod"
//! ```
//!
//! # Environment Variables
//!
//! | Variable                      | Field                         |
//! |-------------------------------|-------------------------------|
//! | `GP_EXECUTION_MODE`           | `execution_mode`              |
//! | `RUN_AS_SYNC`                 | `run_as_sync`                 |
//! | `TASKS_TABLE`                 | `tasks_table`                 |
//! | `ASYNC_HANDLER_FUNCTION_NAME` | `async_handler_function_name` |
//! | `WSS_REF`                     | `wss_ref`                     |
//! | `WSS_REGION`                  | `wss_region`                  |
//! | `WSS_STAGE`                   | `wss_stage`                   |

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_CONFIG_FILE, DEFAULT_TASKS_TABLE, ENV_ASYNC_HANDLER_FUNCTION_NAME,
    ENV_EXECUTION_MODE, ENV_RUN_AS_SYNC, ENV_TASKS_TABLE, ENV_WSS_REF, ENV_WSS_REGION,
    ENV_WSS_STAGE,
};
use crate::types::options::{ExecutionMode, HandlerOptions};

/// Deployment configuration for a
/// [`GeoprocessingHandler`](crate::handler::GeoprocessingHandler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Overrides the mode declared in [`HandlerOptions`].
    pub execution_mode: Option<ExecutionMode>,

    /// Forces synchronous execution and skips the cache read. Set on the
    /// async worker so it computes instead of handing off again.
    pub run_as_sync: bool,

    /// Task table name.
    pub tasks_table: String,

    /// Worker function for async mode.
    pub async_handler_function_name: Option<String>,

    /// Socket API id for the default notification channel.
    pub wss_ref: Option<String>,

    /// Socket API region.
    pub wss_region: Option<String>,

    /// Socket API stage.
    pub wss_stage: Option<String>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            execution_mode: None,
            run_as_sync: false,
            tasks_table: DEFAULT_TASKS_TABLE.to_string(),
            async_handler_function_name: None,
            wss_ref: None,
            wss_region: None,
            wss_stage: None,
        }
    }
}

impl HandlerConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. `.geoprocessing.toml` in the working directory
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(contents) = std::fs::read_to_string(DEFAULT_CONFIG_FILE) {
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply environment
    /// overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse the `[geoprocessing]` table from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            geoprocessing: HandlerConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(full.geoprocessing)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`, which maps a variable name to its
    /// value. Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(mode) = lookup(ENV_EXECUTION_MODE) {
            match mode.parse() {
                Ok(mode) => self.execution_mode = Some(mode),
                Err(e) => tracing::warn!(variable = ENV_EXECUTION_MODE, error = %e, "ignoring override"),
            }
        }

        if let Some(flag) = lookup(ENV_RUN_AS_SYNC) {
            match parse_flag(&flag) {
                Some(v) => self.run_as_sync = v,
                None => tracing::warn!(variable = ENV_RUN_AS_SYNC, value = %flag, "ignoring override"),
            }
        }

        if let Some(table) = non_empty(lookup(ENV_TASKS_TABLE)) {
            self.tasks_table = table;
        }
        if let Some(name) = non_empty(lookup(ENV_ASYNC_HANDLER_FUNCTION_NAME)) {
            self.async_handler_function_name = Some(name);
        }
        if let Some(v) = non_empty(lookup(ENV_WSS_REF)) {
            self.wss_ref = Some(v);
        }
        if let Some(v) = non_empty(lookup(ENV_WSS_REGION)) {
            self.wss_region = Some(v);
        }
        if let Some(v) = non_empty(lookup(ENV_WSS_STAGE)) {
            self.wss_stage = Some(v);
        }
    }

    /// Default notification channel address, when the socket API is fully
    /// configured.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoprocessing::config::HandlerConfig;
    ///
    /// let config = HandlerConfig::default().with_wss("abc", "us-west-2", "prod");
    /// assert_eq!(
    ///     config.channel_address().as_deref(),
    ///     Some("wss://abc.execute-api.us-west-2.amazonaws.com/prod")
    /// );
    /// assert_eq!(HandlerConfig::default().channel_address(), None);
    /// ```
    pub fn channel_address(&self) -> Option<String> {
        let reference = self.wss_ref.as_deref().filter(|s| !s.is_empty())?;
        let region = self.wss_region.as_deref().filter(|s| !s.is_empty())?;
        let stage = self.wss_stage.as_deref().filter(|s| !s.is_empty())?;
        Some(format!(
            "wss://{reference}.execute-api.{region}.amazonaws.com/{stage}"
        ))
    }

    /// The mode a handler with `options` runs in: `run_as_sync` wins, then
    /// the configured override, then the declared mode.
    pub fn effective_mode(&self, options: &HandlerOptions) -> ExecutionMode {
        if self.run_as_sync {
            return ExecutionMode::Sync;
        }
        self.execution_mode.unwrap_or(options.execution_mode)
    }

    /// Sets the execution mode override.
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = Some(mode);
        self
    }

    /// Sets `run_as_sync`.
    pub fn with_run_as_sync(mut self, run_as_sync: bool) -> Self {
        self.run_as_sync = run_as_sync;
        self
    }

    /// Sets the task table name.
    pub fn with_tasks_table(mut self, table: impl Into<String>) -> Self {
        self.tasks_table = table.into();
        self
    }

    /// Sets the async worker function name.
    pub fn with_async_handler_function_name(mut self, name: impl Into<String>) -> Self {
        self.async_handler_function_name = Some(name.into());
        self
    }

    /// Sets the socket API reference, region and stage.
    pub fn with_wss(
        mut self,
        reference: impl Into<String>,
        region: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        self.wss_ref = Some(reference.into());
        self.wss_region = Some(region.into());
        self.wss_stage = Some(stage.into());
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading configuration file.
    #[error("Failed to read config file '{path}': {error}")]
    Io {
        /// Path to the configuration file.
        path: String,
        /// Error message.
        error: String,
    },
    /// Parse error in configuration.
    #[error("Failed to parse config: {0}")]
    Parse(String),
}
