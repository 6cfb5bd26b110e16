//! # chat-bus
//!
//! Message bus abstraction used between gateways and chat services: a named
//! topic pub/sub with at-least-once semantics on the MQTT backend and
//! fire-and-forget semantics on the Redis and in-process backends.

mod error;
mod local;
mod mqtt;
mod redis_bus;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use error::BusError;
pub use local::LocalBus;
pub use mqtt::{MqttBus, MqttBusConfig};
pub use redis_bus::RedisBus;

/// Buffer size of each subscription's delivery channel.
pub(crate) const DELIVERY_BUFFER: usize = 100;

/// One message received on a subscribed topic.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publish/subscribe contract the rest of the system depends on.
///
/// Subscriptions own their delivery channel: dropping the receiver ends the
/// backing listener task, and `close()` ends them all.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish one payload to a topic.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError>;

    /// Subscribe to a topic, returning a lazy stream of deliveries.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Delivery>, BusError>;

    /// Shut down the bus and unblock all consumers.
    async fn close(&self);
}
