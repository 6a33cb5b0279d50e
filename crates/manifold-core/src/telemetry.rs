//! Tracing setup for the manifold binaries.
//!
//! The `[log]` config section picks the line format and the default filter;
//! `MANIFOLD_LOG` or `RUST_LOG` replace the filter at startup. Logs always go
//! to stderr so `manifold run` keeps stdout for the event stream.

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::ConfigError;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "MANIFOLD_LOG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON, one object per event.
    Json,
}

/// The `[log]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when no filter variable is set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Apply the `--json` and `--verbose` command-line switches.
    pub fn with_flags(mut self, json: bool, verbose: bool) -> Self {
        if json {
            self.format = LogFormat::Json;
        }
        if verbose {
            self.filter = "debug".to_string();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        EnvFilter::try_new(&self.filter)
            .map(|_| ())
            .map_err(|e| ConfigError::Invalid {
                key: "log.filter".to_string(),
                reason: e.to_string(),
            })
    }
}

/// Filter from `MANIFOLD_LOG`, then `RUST_LOG`, then `directive`.
pub fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Only the first call in a process takes
/// effect.
pub fn init_tracing(log: &LogConfig) {
    let filter = env_filter(&log.filter);
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let installed = match log.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init(),
    };
    if installed.is_ok() {
        tracing::debug!(format = ?log.format, filter = %log.filter, "tracing initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(&LogConfig::default());
        init_tracing(&LogConfig::default().with_flags(true, true));
    }

    #[test]
    fn test_flags_override_config() {
        let log = LogConfig {
            format: LogFormat::Text,
            filter: "warn,manifold_core=info".to_string(),
        };
        assert_eq!(log.clone().with_flags(false, false), log);

        let flagged = log.with_flags(true, true);
        assert_eq!(flagged.format, LogFormat::Json);
        assert_eq!(flagged.filter, "debug");
    }

    #[test]
    fn test_bad_filter_is_invalid() {
        let log = LogConfig {
            filter: "manifold_core=loud".to_string(),
            ..LogConfig::default()
        };
        assert!(matches!(
            log.validate(),
            Err(ConfigError::Invalid { key, .. }) if key == "log.filter"
        ));
        assert!(LogConfig::default().validate().is_ok());
    }

    #[test]
    fn test_format_parses_lowercase() {
        let log: LogConfig = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.filter, "info");
    }
}
