//! Configuration loading (strict YAML parsing).

mod app_config;

pub use app_config::{
    AppConfig, BackendConfig, ConfigError, DatabaseConfig, Environment, GameConfig, MqBackend,
    MqConfig, RedisConfig, RobustMqConfig, ServerConfig,
};
