//! Service-level options declared by the author of a geoprocessing function.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where the computation runs relative to the triggering invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// The triggering invocation computes and blocks until terminal.
    #[default]
    Sync,
    /// The triggering invocation creates a pending task and hands off to a
    /// separately invoked worker.
    Async,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

/// Options a service author declares alongside the computation.
///
/// # Examples
///
/// ```
/// use geoprocessing::{ExecutionMode, HandlerOptions};
///
/// let options = HandlerOptions::new("zonal-area")
///     .with_execution_mode(ExecutionMode::Async)
///     .with_description("Area of each zone within the sketch");
/// assert_eq!(options.title, "zonal-area");
/// assert_eq!(options.execution_mode, ExecutionMode::Async);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerOptions {
    /// Service name; the first half of every task key.
    pub title: String,

    /// Human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared execution mode.
    #[serde(default)]
    pub execution_mode: ExecutionMode,
}

impl HandlerOptions {
    /// Creates options for a synchronous service named `title`.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            execution_mode: ExecutionMode::Sync,
        }
    }

    /// Sets the execution mode.
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_mode_parses_case_insensitively() {
        assert_eq!("ASYNC".parse::<ExecutionMode>(), Ok(ExecutionMode::Async));
        assert_eq!(" sync ".parse::<ExecutionMode>(), Ok(ExecutionMode::Sync));
        assert!("later".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: HandlerOptions = serde_json::from_str(r#"{"title": "svc"}"#).unwrap();
        assert_eq!(options.execution_mode, ExecutionMode::Sync);
        assert!(options.description.is_none());

        let options: HandlerOptions =
            serde_json::from_str(r#"{"title": "svc", "executionMode": "async"}"#).unwrap();
        assert_eq!(options.execution_mode, ExecutionMode::Async);
    }
}
