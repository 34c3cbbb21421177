//! # Configuration
//!
//! Layered server configuration: profile defaults, an optional file, `DOCCHAT_*`
//! environment variables and finally command-line overrides.

pub mod server;

pub use server::{
    Config, ConfigError, CorsConfig, DatabaseConfig, LlmConfig, LogFormat, LoggingConfig,
    Profile, ServerConfig, SessionConfig, SseConfig,
};
