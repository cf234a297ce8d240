use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;

pub const ENV_PROFILE: &str = "HUDDLE_PROFILE";
pub const ENV_SERVER_PORT: &str = "HUDDLE_SERVER_PORT";
pub const ENV_DATABASE_URL: &str = "HUDDLE_DATABASE_URL";
pub const ENV_LOG_LEVEL: &str = "HUDDLE_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "HUDDLE_LOG_FORMAT";

/// Lower bound for the SSE keep-alive interval.
pub const MIN_HEARTBEAT_SECONDS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format} configuration: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
    #[error("Unsupported configuration format for {0}. Use 'yaml', 'json' or 'toml'.")]
    UnsupportedFormat(PathBuf),
    #[error("Invalid {var} value '{value}': {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Deployment profile; selects the baseline defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Dev,
    Test,
    Prod,
}

impl FromStr for Profile {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" | "production" => Ok(Self::Prod),
            _ => Err("expected one of dev, test, prod"),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err("expected 'text' or 'json'"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CorsConfig {
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allow_credentials: false,
            max_age_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_id_header: String,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            request_id_header: "x-request-id".into(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Without a URL the server keeps messages in memory.
    pub url: Option<String>,
    pub max_connections: u32,
    pub statement_timeout_ms: u64,
    pub bootstrap_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            statement_timeout_ms: 5_000,
            bootstrap_path: PathBuf::from("huddle-server/db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    pub heartbeat_seconds: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying the profile id verified by the upstream auth provider.
    pub profile_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            profile_header: "x-huddle-profile".into(),
        }
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub profile: Profile,
    pub server: ServerConfig,
    pub db: DatabaseConfig,
    pub logging: LoggingConfig,
    pub stream: StreamConfig,
    pub auth: AuthConfig,
}

impl Config {
    /// Baseline settings for a deployment profile.
    #[must_use]
    pub fn default_for_profile(profile: Profile) -> Self {
        let mut config = Self {
            profile,
            ..Self::default()
        };

        match profile {
            Profile::Dev => {
                config.logging.level = "debug".into();
            }
            Profile::Test => {
                config.logging.level = "warn".into();
                config.server.host = "127.0.0.1".into();
                config.server.port = 0;
                config.stream.heartbeat_seconds = MIN_HEARTBEAT_SECONDS;
            }
            Profile::Prod => {
                config.logging.format = LogFormat::Json;
                config.db.max_connections = 20;
            }
        }

        config
    }

    /// Resolves configuration from profile defaults, an optional file, the
    /// environment and finally the command-line port override.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable is malformed, or the resolved configuration is invalid.
    pub fn load_config(
        config_path: Option<&Path>,
        port_override: Option<u16>,
    ) -> Result<Self, ConfigError> {
        let profile = match env::var(ENV_PROFILE) {
            Ok(value) => value.parse().map_err(|reason| ConfigError::InvalidEnv {
                var: ENV_PROFILE,
                value,
                reason,
            })?,
            Err(_) => Profile::Dev,
        };

        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::default_for_profile(profile),
        };

        config.apply_env_overrides()?;

        if let Some(port) = port_override {
            config.server.port = port;
        }

        config.validate().map_err(ConfigError::Invalid)?;
        debug!(profile = %config.profile, port = config.server.port, "configuration resolved");
        Ok(config)
    }

    /// Parses a configuration file; the format follows the extension.
    ///
    /// # Errors
    /// Returns an error for unreadable files, unknown extensions, or parse failures.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("yaml" | "yml") => {
                serde_yml::from_str(&content).map_err(|err| ConfigError::Parse {
                    format: "yaml",
                    message: err.to_string(),
                })
            }
            Some("json") => serde_json::from_str(&content).map_err(|err| ConfigError::Parse {
                format: "json",
                message: err.to_string(),
            }),
            Some("toml") => toml::from_str(&content).map_err(|err| ConfigError::Parse {
                format: "toml",
                message: err.to_string(),
            }),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = env::var(ENV_SERVER_PORT) {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_SERVER_PORT,
                value: port.clone(),
                reason: "must be a valid number between 1 and 65535",
            })?;
        }
        if let Ok(url) = env::var(ENV_DATABASE_URL) {
            let url = url.trim().to_string();
            self.db.url = (!url.is_empty()).then_some(url);
        }
        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Ok(format) = env::var(ENV_LOG_FORMAT) {
            self.logging.format = format.parse().map_err(|reason| ConfigError::InvalidEnv {
                var: ENV_LOG_FORMAT,
                value: format.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Checks the resolved configuration.
    ///
    /// # Errors
    /// Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 && self.profile != Profile::Test {
            errors.push("Invalid server port. Must be greater than 0.".to_string());
        }
        if self.db.max_connections == 0 {
            errors.push("db.max_connections must be greater than 0".to_string());
        }
        if !is_valid_header_name(&self.server.request_id_header) {
            errors.push(format!(
                "server.request_id_header is not a valid header name: {}",
                self.server.request_id_header
            ));
        }
        if !is_valid_header_name(&self.auth.profile_header) {
            errors.push(format!(
                "auth.profile_header is not a valid header name: {}",
                self.auth.profile_header
            ));
        }
        if self.stream.heartbeat_seconds < MIN_HEARTBEAT_SECONDS {
            errors.push(format!(
                "stream.heartbeat_seconds must be at least {MIN_HEARTBEAT_SECONDS}"
            ));
        }
        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error" | "off"
        ) {
            errors.push(format!("unknown log level: {}", self.logging.level));
        }
        if self.server.cors.allow_credentials && self.server.cors.allowed_origins.is_empty() {
            errors.push(
                "server.cors.allow_credentials requires explicit allowed_origins".to_string(),
            );
        }
        if self.profile == Profile::Prod && self.db.url.is_none() {
            errors.push("db.url is required for the prod profile".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}
