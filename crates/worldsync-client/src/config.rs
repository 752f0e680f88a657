//! TOML-based configuration for the synchronization client.
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return
//! value of `some_fn()` when the field is absent from the TOML file, so a
//! partial (or missing) config file always yields a working configuration.
//!
//! ```toml
//! host = "sim.lab.local"
//! port = 6600
//! reply_timeout_ms = 5000
//! strict_handshake = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Client configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Hostname or IP address of the simulation server.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port of the simulation server.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on waiting for a creation reply during `push`.
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// Sleep between socket polls while waiting for a reply.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Fail the handshake on an unexpected status code instead of
    /// proceeding with a warning.
    #[serde(default)]
    pub strict_handshake: bool,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    6600
}
fn default_reply_timeout_ms() -> u64 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            reply_timeout_ms: default_reply_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            strict_handshake: false,
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Loads the configuration from `path`, returning
    /// `ClientConfig::default()` if the file does not yet exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors other than
    /// "not found", and [`ConfigError::Parse`] if the TOML is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_expected_values() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 6600);
        assert_eq!(cfg.reply_timeout(), Duration::from_secs(5));
        assert!(!cfg.strict_handshake);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: ClientConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_defaults() {
        let cfg: ClientConfig = toml::from_str(
            r#"
host = "sim.lab.local"
port = 7000
strict_handshake = true
"#,
        )
        .expect("deserialize partial");

        assert_eq!(cfg.host, "sim.lab.local");
        assert_eq!(cfg.port, 7000);
        assert!(cfg.strict_handshake);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.reply_timeout_ms, 5000);
        assert_eq!(cfg.poll_interval_ms, 1);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = ClientConfig::default();
        cfg.port = 9000;
        cfg.log_level = "debug".to_string();

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: ClientConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result = ClientConfig::load(Path::new("/dev/null"));
        // /dev/null reads as empty, which is valid; exercise the parse path
        // directly instead.
        assert!(result.is_ok());
        let parsed: Result<ClientConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let cfg = ClientConfig::load(Path::new("/nonexistent/worldsync.toml"))
            .expect("missing file must not be an error");
        assert_eq!(cfg, ClientConfig::default());
    }
}
