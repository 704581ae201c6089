//! Client configuration.
//!
//! Loaded from TOML (`<config_dir>/seance/config.toml` by default), then
//! overridden by `SEANCE_*` environment variables, then by CLI flags. Every
//! field has a default so an empty or missing file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, Result};

/// Environment variable names.
pub const ENV_API_URL: &str = "SEANCE_API_URL";
pub const ENV_PUSH_URL: &str = "SEANCE_PUSH_URL";
pub const ENV_AUTH_TOKEN: &str = "SEANCE_AUTH_TOKEN";
pub const ENV_ACTOR_ID: &str = "SEANCE_ACTOR_ID";

/// Placeholder replaced with the lookup id in detail path templates.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Configuration for one call-session client.
///
/// All intervals are in milliseconds.
///
/// # Example
///
/// ```rust
/// use seance_client::ClientConfig;
///
/// let config = ClientConfig {
///     api_base_url: "https://api.example.test/v1".to_string(),
///     status_poll_ms: 1_000,
///     ..Default::default()
/// };
/// assert_eq!(config.timer_poll_interval().as_millis(), 1_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the REST API (no trailing slash needed).
    pub api_base_url: String,

    /// WebSocket URL of the push channel. Push is disabled when absent.
    pub push_url: Option<String>,

    /// Bearer token sent with every API request.
    pub auth_token: Option<String>,

    /// Id of the local practitioner, sent in the push `register` frame.
    pub actor_id: Option<String>,

    /// Role sent in the push `register` frame.
    pub actor_role: String,

    /// Per-request HTTP timeout. A timeout counts as a transient failure.
    pub request_timeout_ms: u64,

    pub status_poll_ms: u64,
    pub timer_poll_ms: u64,
    /// Local clock period (countdown and stale-sync fallback).
    pub clock_tick_ms: u64,
    /// Re-check period while waiting for token and room.
    pub token_wait_ms: u64,
    /// Fixed delay before retrying a failed audio connection.
    pub connect_retry_backoff_ms: u64,
    /// Cap on consecutive connection retries. `None` retries until disposal.
    pub connect_retry_max_attempts: Option<u32>,
    /// Delay between termination and the navigate-away event.
    pub navigate_delay_ms: u64,

    /// Call-detail endpoint templates, tried in order. `{id}` is replaced
    /// with the lookup id.
    pub detail_paths: Vec<String>,

    pub push_retry_initial_ms: u64,
    pub push_retry_max_ms: u64,
    pub push_retry_multiplier: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            push_url: None,
            auth_token: None,
            actor_id: None,
            actor_role: "psychic".to_string(),
            request_timeout_ms: 8_000,
            status_poll_ms: 2_000,
            timer_poll_ms: 1_000,
            clock_tick_ms: 1_000,
            token_wait_ms: 500,
            connect_retry_backoff_ms: 3_000,
            connect_retry_max_attempts: None,
            navigate_delay_ms: 2_000,
            detail_paths: vec![
                "/call-details/{id}".to_string(),
                "/call-sessions/{id}".to_string(),
                "/call-requests/{id}".to_string(),
            ],
            push_retry_initial_ms: 1_000,
            push_retry_max_ms: 30_000,
            push_retry_multiplier: 2.0,
        }
    }
}

impl ClientConfig {
    /// Default config file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("seance").join("config.toml"))
    }

    /// Loads a TOML config file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// `ClientError::Config` if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ClientError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|reason| ClientError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parses config from a TOML string.
    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Applies `SEANCE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup (used by tests).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(url) = lookup(ENV_PUSH_URL) {
            self.push_url = Some(url);
        }
        if let Some(token) = lookup(ENV_AUTH_TOKEN) {
            self.auth_token = Some(token);
        }
        if let Some(id) = lookup(ENV_ACTOR_ID) {
            self.actor_id = Some(id);
        }
    }

    /// Checks URLs and intervals.
    ///
    /// # Errors
    ///
    /// `ClientError::InvalidUrl` for unparseable API or push URLs,
    /// `ClientError::Config` for zero poll intervals.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api_base_url).map_err(|e| ClientError::InvalidUrl {
            url: self.api_base_url.clone(),
            reason: e.to_string(),
        })?;
        if let Some(push) = &self.push_url {
            let parsed = url::Url::parse(push).map_err(|e| ClientError::InvalidUrl {
                url: push.clone(),
                reason: e.to_string(),
            })?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(ClientError::InvalidUrl {
                    url: push.clone(),
                    reason: "push URL must use ws:// or wss://".to_string(),
                });
            }
        }
        let intervals = [
            ("status_poll_ms", self.status_poll_ms),
            ("timer_poll_ms", self.timer_poll_ms),
            ("clock_tick_ms", self.clock_tick_ms),
            ("token_wait_ms", self.token_wait_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ClientError::Config {
                    path: PathBuf::new(),
                    reason: format!("{name} must be greater than zero"),
                });
            }
        }
        Ok(())
    }

    /// Expands a detail path template for `id`.
    pub fn detail_path(template: &str, id: &str) -> String {
        template.replace(ID_PLACEHOLDER, id)
    }

    // ------------------------------------------------------------------------
    // Duration accessors
    // ------------------------------------------------------------------------

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_ms)
    }

    pub fn timer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.timer_poll_ms)
    }

    pub fn clock_tick_interval(&self) -> Duration {
        Duration::from_millis(self.clock_tick_ms)
    }

    pub fn token_wait_interval(&self) -> Duration {
        Duration::from_millis(self.token_wait_ms)
    }

    pub fn connect_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_retry_backoff_ms)
    }

    pub fn navigate_delay(&self) -> Duration {
        Duration::from_millis(self.navigate_delay_ms)
    }

    pub fn push_retry_initial(&self) -> Duration {
        Duration::from_millis(self.push_retry_initial_ms)
    }

    pub fn push_retry_max(&self) -> Duration {
        Duration::from_millis(self.push_retry_max_ms)
    }
}
