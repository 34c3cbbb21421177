use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{env, fs, path::Path, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::warn;

/// Errors raised while assembling the runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported configuration format for {0}; use yaml, toml or json")]
    UnsupportedFormat(PathBuf),

    #[error("failed to parse configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid {name} value `{value}`: {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Deployment profile selecting the baseline defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Dev,
    Test,
    Prod,
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(format!("unknown profile `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_id_header: String,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Chat stream tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseConfig {
    /// Seconds between heartbeats on an idle stream. Zero emits as fast as the client reads
    /// and is rejected in the prod profile.
    pub heartbeat_seconds: u64,
    /// Buffered events per listener before it is evicted.
    pub queue_capacity: usize,
    /// Heartbeats delivered before the connection is recycled.
    pub max_heartbeats: u32,
}

impl SseConfig {
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds)
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            heartbeat_seconds: 25,
            queue_capacity: 256,
            max_heartbeats: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL. Without one the server keeps records in memory.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_token: Option<String>,
    pub llm_deployment_id: String,
    pub agent_deployment_id: String,
    pub agent_deployment_url: Option<String>,
    pub agent_deployment_token: Option<String>,
    pub default_model: String,
    pub default_model_friendly_name: String,
    pub use_llm_gateway: bool,
    pub request_timeout_seconds: u64,
}

impl LlmConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_cookie_name: String,
    /// Header set by a trusted proxy carrying the caller's user UUID.
    pub user_header: Option<String>,
}

/// Root configuration for the docchat server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub profile: Profile,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub sse: SseConfig,
    pub db: DatabaseConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
}

impl Config {
    /// Baseline values for a profile before any file or environment overrides.
    #[must_use]
    pub fn default_for_profile(profile: Profile) -> Self {
        let (level, format, origins) = match profile {
            Profile::Dev => (
                "debug",
                LogFormat::Text,
                vec![
                    "http://localhost:5173".to_string(),
                    "http://localhost:8080".to_string(),
                ],
            ),
            Profile::Test => ("warn", LogFormat::Text, Vec::new()),
            Profile::Prod => ("info", LogFormat::Json, Vec::new()),
        };

        Self {
            profile,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                request_id_header: "x-request-id".to_string(),
                cors: CorsConfig {
                    allowed_origins: origins,
                    allow_credentials: true,
                    max_age_seconds: 600,
                },
            },
            logging: LoggingConfig {
                level: level.to_string(),
                format,
            },
            sse: SseConfig::default(),
            db: DatabaseConfig {
                url: None,
                max_connections: 10,
            },
            llm: LlmConfig {
                endpoint: "https://app.datarobot.com/api/v2".to_string(),
                api_token: None,
                llm_deployment_id: String::new(),
                agent_deployment_id: String::new(),
                agent_deployment_url: None,
                agent_deployment_token: None,
                default_model: "azure/gpt-4o-2024-11-20".to_string(),
                default_model_friendly_name: "Azure OpenAI GPT-4o".to_string(),
                use_llm_gateway: false,
                request_timeout_seconds: 120,
            },
            session: SessionConfig {
                session_cookie_name: "session".to_string(),
                user_header: None,
            },
        }
    }

    /// Loads the configuration from defaults, an optional file, the environment and CLI overrides.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a `.yaml`, `.yml`, `.toml` or `.json` file.
    /// * `port_override` - Optional port number taking precedence over everything else.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read or parsed, an environment
    /// variable holds an invalid value, or the resulting configuration fails validation.
    pub fn load_config(
        config_path: Option<PathBuf>,
        port_override: Option<u16>,
    ) -> Result<Self, ConfigError> {
        let profile = match env_string("DOCCHAT_PROFILE") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::InvalidEnv {
                name: "DOCCHAT_PROFILE",
                value: raw,
                reason,
            })?,
            None => Profile::default(),
        };

        let mut config = Self::default_for_profile(profile);

        if let Some(path) = config_path {
            config = config.merge_file(&path)?;
        }

        config.apply_env_overrides()?;

        if let Some(port) = port_override {
            config.server.port = port;
        }

        config.validate()?;
        Ok(config)
    }

    fn merge_file(self, path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let overlay: Value = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => {
                serde_yml::from_str(&content).map_err(|err| parse_error(err.to_string()))?
            }
            Some("toml") => toml::from_str(&content).map_err(|err| parse_error(err.to_string()))?,
            Some("json") => {
                serde_json::from_str(&content).map_err(|err| parse_error(err.to_string()))?
            }
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        let mut base = serde_json::to_value(&self).map_err(|err| parse_error(err.to_string()))?;
        merge_values(&mut base, overlay);
        serde_json::from_value(base).map_err(|err| parse_error(err.to_string()))
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(port) = env_parse("DOCCHAT_SERVER_PORT")? {
            self.server.port = port;
        }
        if let Some(url) = env_string("DOCCHAT_DATABASE_URL") {
            self.db.url = Some(url);
        }
        if let Some(level) = env_string("DOCCHAT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = env_parse("DOCCHAT_LOG_FORMAT")? {
            self.logging.format = format;
        }
        if let Some(seconds) = env_parse("DOCCHAT_SSE_HEARTBEAT_SECONDS")? {
            self.sse.heartbeat_seconds = seconds;
        }
        if let Some(capacity) = env_parse("DOCCHAT_SSE_QUEUE_CAPACITY")? {
            self.sse.queue_capacity = capacity;
        }
        if let Some(max) = env_parse("DOCCHAT_SSE_MAX_HEARTBEATS")? {
            self.sse.max_heartbeats = max;
        }
        if let Some(endpoint) = env_string("DOCCHAT_LLM_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
        if let Some(token) = env_string("DOCCHAT_LLM_API_TOKEN") {
            self.llm.api_token = Some(token);
        }
        if let Some(url) = env_string("DOCCHAT_AGENT_DEPLOYMENT_URL") {
            self.llm.agent_deployment_url = Some(url);
        }
        if let Some(token) = env_string("DOCCHAT_AGENT_DEPLOYMENT_TOKEN") {
            self.llm.agent_deployment_token = Some(token);
        }
        Ok(())
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing every violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server port must be greater than 0");
        }
        if self.sse.queue_capacity == 0 {
            errors.push("sse queue_capacity must be greater than 0");
        }
        if self.sse.max_heartbeats == 0 {
            errors.push("sse max_heartbeats must be greater than 0");
        }
        if self.db.max_connections == 0 {
            errors.push("db max_connections must be greater than 0");
        }
        if self.sse.heartbeat_seconds == 0 {
            if self.profile == Profile::Prod {
                errors.push("sse heartbeat_seconds must be greater than 0 in the prod profile");
            } else {
                warn!(
                    profile = ?self.profile,
                    max_heartbeats = self.sse.max_heartbeats,
                    "sse heartbeat_seconds is 0; idle streams recycle immediately"
                );
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_for_profile(Profile::default())
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = env_string(name) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidEnv {
            name,
            reason: err.to_string(),
            value: raw,
        })
}

/// Recursively overlays `overlay` onto `base`; objects merge key by key, everything else replaces.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
