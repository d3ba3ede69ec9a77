//! Session engine configuration.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default keepalive interval for live sessions, in seconds.
pub const DEFAULT_PROLONG_INTERVAL_SECS: u64 = 60;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Session engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval between keepalive requests for a live session.
    pub prolong_interval_secs: u64,

    /// Persistent storage directory handed to every surface.
    pub storage_path: PathBuf,

    /// Scheme of application-local links, e.g. `app` for `app://...`.
    pub local_scheme: String,

    /// Web hosts whose links are rewritten into local links.
    pub link_hosts: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prolong_interval_secs: DEFAULT_PROLONG_INTERVAL_SECS,
            storage_path: default_storage_path(),
            local_scheme: "app".to_string(),
            link_hosts: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns error describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prolong_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "prolong_interval_secs must be positive".to_string(),
            ));
        }
        let scheme_ok = !self.local_scheme.is_empty()
            && self
                .local_scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok {
            return Err(ConfigError::Invalid(format!(
                "local_scheme {:?} is not a valid URI scheme",
                self.local_scheme
            )));
        }
        Ok(())
    }

    #[must_use]
    pub const fn prolong_interval(&self) -> Duration {
        Duration::from_secs(self.prolong_interval_secs)
    }
}

fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("miniapp")
        .join("webview")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = SessionConfig::from_json_str(r#"{"link_hosts":["example.org"]}"#).unwrap();
        assert_eq!(config.prolong_interval(), Duration::from_secs(60));
        assert_eq!(config.local_scheme, "app");
        assert_eq!(config.link_hosts, vec!["example.org".to_string()]);
        assert!(config.storage_path.ends_with("miniapp/webview"));
    }

    #[test]
    fn rejects_zero_interval() {
        let err = SessionConfig::from_json_str(r#"{"prolong_interval_secs":0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_scheme() {
        let err = SessionConfig::from_json_str(r#"{"local_scheme":"a b"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            SessionConfig::from_json_str("{"),
            Err(ConfigError::Json(_))
        ));
    }
}
