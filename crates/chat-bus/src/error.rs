//! Bus error type.

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("mqtt error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("bus connection error: {0}")]
    Connection(String),

    #[error("bus is closed")]
    Closed,
}
