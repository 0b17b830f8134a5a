use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite::http::Uri;

use crate::channel::ReconnectPolicy;
use crate::error::ChannelError;

/// Channel settings, loaded from TOML. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// WebSocket endpoint of the UI server (`ws://` or `wss://`).
    pub url: Option<String>,
    /// Interval between keep-alive pings. `0` disables pinging.
    pub ping_interval_ms: u64,
    /// Base reconnect delay.
    pub reconnect_interval_ms: u64,
    /// Growth factor applied per consecutive reconnect attempt.
    pub reconnect_penalty_factor: f64,
    /// Quiet period after which the attempt counter starts over.
    pub reconnect_reset_after_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: None,
            ping_interval_ms: 45_000,
            reconnect_interval_ms: 10_000,
            reconnect_penalty_factor: 1.5,
            reconnect_reset_after_secs: 60 * 60,
        }
    }
}

impl ChannelConfig {
    /// Config pointing at `url`, everything else default.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Load config from a TOML file path. Returns None if file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        check_config_permissions(path);

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        Ok(Some(config))
    }

    /// Save config to a TOML file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        Ok(())
    }

    /// `None` when pinging is disabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_ms > 0).then(|| Duration::from_millis(self.ping_interval_ms))
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            interval: Duration::from_millis(self.reconnect_interval_ms),
            penalty_factor: self.reconnect_penalty_factor,
            reset_after: Duration::from_secs(self.reconnect_reset_after_secs),
        }
    }
}

/// Default config location: `<config dir>/renku-notify/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("renku-notify").join("config.toml"))
}

/// Errors that can occur when loading or saving config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {1}", .0.display())]
    ReadFailed(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config {}: {1}", .0.display())]
    ParseFailed(PathBuf, #[source] toml::de::Error),
    #[error("Failed to write config {}: {1}", .0.display())]
    WriteFailed(PathBuf, #[source] std::io::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
}

/// Warn if the config file is world-readable. The channel URL may embed a
/// session token in its query string.
#[cfg(unix)]
pub fn check_config_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(metadata) = std::fs::metadata(path) else {
        return;
    };
    let mode = metadata.permissions().mode();
    if mode & 0o004 != 0 {
        tracing::warn!(
            "Config file {} is world-readable (mode {:o}); consider restricting permissions to 600.",
            path.display(),
            mode & 0o7777,
        );
    }
}

#[cfg(not(unix))]
pub fn check_config_permissions(_path: &Path) {}

// ── URLs ───────────────────────────────────────────────────────────

/// Check that `url` is an absolute `ws://` or `wss://` URI with a host.
pub fn validate_ws_url(url: &str) -> Result<(), ChannelError> {
    let invalid = |reason: &str| ChannelError::InvalidUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };
    let uri: Uri = url.parse().map_err(|_| invalid("not a valid URI"))?;
    match uri.scheme_str() {
        Some("ws") | Some("wss") => {}
        Some(_) => return Err(invalid("scheme must be ws or wss")),
        None => return Err(invalid("missing scheme")),
    }
    match uri.host() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(invalid("missing host")),
    }
}

/// Derive the channel endpoint from the UI-server base URL.
///
/// `https://renkulab.io/ui-server` becomes `wss://renkulab.io/ui-server/ws`.
pub fn websocket_url_from_uiserver(base: &str) -> Result<String, ChannelError> {
    let trimmed = base.trim_end_matches('/');
    let url = match trimmed.strip_prefix("http") {
        Some(rest) => format!("ws{}/ws", rest),
        None => format!("{}/ws", trimmed),
    };
    validate_ws_url(&url)?;
    Ok(url)
}
