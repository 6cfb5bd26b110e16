//! # chat-common
//!
//! Shared plumbing for the gateway and chat service binaries: configuration
//! loading, tracing initialization, and the process-level error type.

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{
    AppConfig, BackendConfig, ConfigError, DatabaseConfig, Environment, GameConfig, MqBackend,
    MqConfig, RedisConfig, RobustMqConfig, ServerConfig,
};
pub use error::AppError;
pub use telemetry::{init_tracing, try_init_tracing, TracingConfig};
