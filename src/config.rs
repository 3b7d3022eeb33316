//! Configuration for the policy service
//!
//! Values come from code (builder methods) or from the environment:
//!
//! ```ignore
//! let config = PolicyConfig::from_env();
//! let config = PolicyConfig::default().with_data_dir("/var/lib/mailpolicy");
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Default directory for log files
const DEFAULT_LOG_DIR: &str = "logs";

/// Default log file name (the rolling appender adds a date suffix)
const DEFAULT_LOG_FILE: &str = "mailpolicy.log";

/// Output format for the log file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory the rolling log files are written to
    pub dir: PathBuf,
    /// Base name of the log file
    pub file_name: String,
    /// Level used when `RUST_LOG` is not set
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
            file_name: DEFAULT_LOG_FILE.to_string(),
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Where account snapshots are persisted; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl PolicyConfig {
    /// Build a configuration from `MAILPOLICY_*` environment variables
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("MAILPOLICY_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(dir) = env::var("MAILPOLICY_LOG_DIR") {
            config.logging.dir = PathBuf::from(dir);
        }
        if let Ok(file_name) = env::var("MAILPOLICY_LOG_FILE") {
            config.logging.file_name = file_name;
        }
        if let Ok(level) = env::var("MAILPOLICY_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = env::var("MAILPOLICY_LOG_FORMAT")
            .ok()
            .and_then(|s| LogFormat::parse(&s))
        {
            config.logging.format = format;
        }

        tracing::debug!("Loaded configuration from environment: {:?}", config);
        config
    }

    /// Persist account state under the given directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Replace the logging settings
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PolicyConfig::default();
        assert!(config.data_dir.is_none());
        assert_eq!(config.logging.dir, PathBuf::from("logs"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_builder() {
        let config = PolicyConfig::default().with_data_dir("/tmp/policy");
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/policy")));
    }

    #[test]
    fn test_partial_json() {
        let config: PolicyConfig =
            serde_json::from_str(r#"{"logging": {"format": "json"}}"#).unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.file_name, "mailpolicy.log");
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("xml"), None);
    }
}
