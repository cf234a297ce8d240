use serde::{Deserialize, Serialize};
use std::{env, path::Path, time::Duration};
use url::Url;

use super::server::ConfigError;

pub const ENV_SERVER_URL: &str = "HUDDLE_SERVER_URL";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Settings for the chat client: where the server lives and how the live view
/// paces its fetches and scroll behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: Url,
    /// Refresh interval for the newest page while push is disconnected.
    pub poll_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Distance from the bottom, in pixels or rows, within which new content
    /// keeps the view pinned to the newest message.
    pub auto_scroll_threshold: f64,
    pub auto_scroll_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: Url::parse(DEFAULT_SERVER_URL).expect("default server URL is valid"),
            poll_interval_ms: 1_000,
            fetch_timeout_ms: 10_000,
            reconnect_delay_ms: 1_000,
            auto_scroll_threshold: 100.0,
            auto_scroll_delay_ms: 100,
        }
    }
}

impl ClientConfig {
    /// Resolves client settings from defaults, an optional file and
    /// `HUDDLE_SERVER_URL`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be parsed or the URL is invalid.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                match path.extension().and_then(|ext| ext.to_str()) {
                    Some("yaml" | "yml") => {
                        serde_yml::from_str(&content).map_err(|err| ConfigError::Parse {
                            format: "yaml",
                            message: err.to_string(),
                        })?
                    }
                    Some("json") => {
                        serde_json::from_str(&content).map_err(|err| ConfigError::Parse {
                            format: "json",
                            message: err.to_string(),
                        })?
                    }
                    Some("toml") => toml::from_str(&content).map_err(|err| ConfigError::Parse {
                        format: "toml",
                        message: err.to_string(),
                    })?,
                    _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
                }
            }
            None => Self::default(),
        };

        if let Ok(value) = env::var(ENV_SERVER_URL) {
            config.server_url = Url::parse(&value).map_err(|_| ConfigError::InvalidEnv {
                var: ENV_SERVER_URL,
                value: value.clone(),
                reason: "must be an absolute http(s) URL",
            })?;
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_server_url(mut self, server_url: Url) -> Self {
        self.server_url = server_url;
        self
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub const fn auto_scroll_delay(&self) -> Duration {
        Duration::from_millis(self.auto_scroll_delay_ms)
    }
}
