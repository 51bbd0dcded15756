//! Configuration loading and persistence.
//!
//! Settings come from `config.json` in the config directory, then
//! environment variables, then command-line flags (applied by the
//! commands themselves).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_TTL_SECS, DEFAULT_VAPID_SUBJECT, HTTP_REQUEST_TIMEOUT};
use crate::notifications::ContentEncoding;

/// Configuration for the relay and the `send` command.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Listen address for `serve`.
    pub bind_address: String,
    /// VAPID `sub` claim (`mailto:` or `https:` contact).
    pub vapid_subject: String,
    /// Message TTL in seconds.
    pub ttl: u32,
    /// Per-attempt push service timeout in seconds.
    pub request_timeout: u64,
    /// Payload content coding.
    pub content_encoding: ContentEncoding,
    /// Directory of static files served next to the relay endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            vapid_subject: DEFAULT_VAPID_SUBJECT.to_string(),
            ttl: DEFAULT_TTL_SECS,
            request_timeout: HTTP_REQUEST_TIMEOUT.as_secs(),
            content_encoding: ContentEncoding::default(),
            static_dir: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `WEBPUSH_RELAY_CONFIG_DIR` wins; otherwise the platform config dir
    /// (e.g. `~/.config/webpush-relay`).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("WEBPUSH_RELAY_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("webpush-relay"))
    }

    /// Path of `config.json`.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file means defaults; a malformed one is an error.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?.unwrap_or_default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Option<Self>> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        Ok(Some(config))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Unparseable numeric or encoding
    /// values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Hosting platforms hand out a port and expect every interface.
        if let Some(port) = lookup("PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.bind_address = format!("0.0.0.0:{port}"),
                Err(_) => log::warn!("[Config] Ignoring invalid PORT={}", port),
            }
        }

        if let Some(bind_address) = lookup("WEBPUSH_BIND_ADDRESS") {
            self.bind_address = bind_address;
        }

        if let Some(subject) = lookup("WEBPUSH_VAPID_SUBJECT") {
            self.vapid_subject = subject;
        }

        if let Some(ttl) = lookup("WEBPUSH_TTL") {
            match ttl.parse::<u32>() {
                Ok(ttl) => self.ttl = ttl,
                Err(_) => log::warn!("[Config] Ignoring invalid WEBPUSH_TTL={}", ttl),
            }
        }

        if let Some(timeout) = lookup("WEBPUSH_REQUEST_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(timeout) if timeout > 0 => self.request_timeout = timeout,
                _ => log::warn!("[Config] Ignoring invalid WEBPUSH_REQUEST_TIMEOUT={}", timeout),
            }
        }

        if let Some(dir) = lookup("WEBPUSH_STATIC_DIR") {
            self.static_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }

        if let Some(encoding) = lookup("WEBPUSH_CONTENT_ENCODING") {
            match encoding.parse() {
                Ok(encoding) => self.content_encoding = encoding,
                Err(e) => log::warn!("[Config] Ignoring WEBPUSH_CONTENT_ENCODING: {}", e),
            }
        }
    }

    /// Per-attempt push service timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let config_path = dir.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }
}
