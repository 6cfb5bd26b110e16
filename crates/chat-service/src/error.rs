//! Service error types.

use chat_bus::BusError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Persistence queue is full; the caller gets no ACK and may retry.
    #[error("server overloaded, persistence queue full")]
    Overloaded,

    #[error("invalid request payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Bus(#[from] BusError),
}
