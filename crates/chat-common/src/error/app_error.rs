//! Application error type for the binaries' startup and run paths.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(String),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("server error: {0}")]
    Server(String),
}
