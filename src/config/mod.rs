//! Configuration for the remote subsystem
//!
//! This module handles loading and validating the remote-port settings from
//! environment variables or a TOML file. The full application preference
//! store lives outside this crate; only the values the coordinator needs
//! cross this seam.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Default remote listener port
pub const DEFAULT_REMOTE_PORT: u16 = 8786;

/// Remote coordination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Loopback TCP port for the listener and for probes
    pub port: u16,

    /// Whether single-instance coordination is enabled at all
    pub enabled: bool,

    /// Client-side probe timeout in milliseconds
    pub probe_timeout_ms: u64,

    /// Listener-side read deadline per connection in milliseconds
    pub read_timeout_ms: u64,

    /// Identifier this instance answers PING with
    pub instance_id: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_REMOTE_PORT,
            enabled: true,
            probe_timeout_ms: 1000,
            read_timeout_ms: 2000,
            instance_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Top-level config file layout: a `[remote]` table
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    remote: RemoteConfig,
}

impl RemoteConfig {
    /// Load configuration from `REFBASE_*` environment variables, falling
    /// back to defaults for anything unset
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = std::env::var("REFBASE_REMOTE_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
        {
            config.port = port;
        }

        if let Some(enabled) = std::env::var("REFBASE_REMOTE_ENABLED")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
        {
            config.enabled = enabled;
        }

        if let Some(timeout) = std::env::var("REFBASE_PROBE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.probe_timeout_ms = timeout;
        }

        if let Some(timeout) = std::env::var("REFBASE_READ_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.read_timeout_ms = timeout;
        }

        if let Ok(id) = std::env::var("REFBASE_INSTANCE_ID") {
            config.instance_id = id;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file with a `[remote]` table
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        let config = file.remote;
        config.validate()?;
        Ok(config)
    }

    /// Validate settings the rest of the subsystem relies on
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("remote port must be non-zero");
        }
        if self.probe_timeout_ms == 0 {
            bail!("probe timeout must be non-zero");
        }
        if self.read_timeout_ms == 0 {
            bail!("read timeout must be non-zero");
        }
        if self.instance_id.is_empty() {
            bail!("instance id must not be empty");
        }
        Ok(())
    }

    /// Probe timeout as a [`Duration`]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Per-connection read deadline as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RemoteConfig::default();
        assert_eq!(config.port, DEFAULT_REMOTE_PORT);
        assert!(config.enabled);
        assert_eq!(config.probe_timeout(), Duration::from_millis(1000));
        assert_eq!(config.read_timeout(), Duration::from_millis(2000));
        assert!(!config.instance_id.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_instance_ids_are_unique_per_process_default() {
        let a = RemoteConfig::default();
        let b = RemoteConfig::default();
        assert_ne!(a.instance_id, b.instance_id);
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let config = RemoteConfig {
            port: 0,
            ..RemoteConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_instance_id() {
        let config = RemoteConfig {
            instance_id: String::new(),
            ..RemoteConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml_table() {
        let file: ConfigFile = toml::from_str(
            r#"
            [remote]
            port = 9000
            enabled = false
            probe_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(file.remote.port, 9000);
        assert!(!file.remote.enabled);
        assert_eq!(file.remote.probe_timeout_ms, 250);
        // unset fields keep their defaults
        assert_eq!(file.remote.read_timeout_ms, 2000);
    }
}
