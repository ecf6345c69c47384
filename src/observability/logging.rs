//! Logging configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable checked first for filter directives.
pub const LOG_ENV: &str = "BOTSTORE_LOG";

/// Output format of the `fmt` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, multi-line.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; unknown names yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging settings, read from the `[logging]` config table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Default filter directives when no environment override is set.
    pub level: Option<String>,
    /// Optional log file; stderr when absent.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds the filter from `BOTSTORE_LOG`, then `RUST_LOG`, then the
    /// configured level, then `info` (`debug` when verbose).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the directives do not parse.
    pub fn filter(&self, verbose: bool) -> Result<EnvFilter> {
        self.filter_with(verbose, |key| std::env::var(key).ok())
    }

    pub(crate) fn filter_with(
        &self,
        verbose: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<EnvFilter> {
        let directives = self.directives_with(verbose, lookup);
        EnvFilter::try_new(&directives).map_err(|e| {
            Error::InvalidConfig(format!("invalid log filter '{directives}': {e}"))
        })
    }

    fn directives_with(&self, verbose: bool, lookup: impl Fn(&str) -> Option<String>) -> String {
        [LOG_ENV, "RUST_LOG"]
            .iter()
            .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
            .or_else(|| self.level.clone())
            .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string())
    }
}
