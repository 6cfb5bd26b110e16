//! In-process backend.
//!
//! Topic fan-out inside one process, with the same fire-and-forget semantics
//! as the Redis backend. Used by the integration tests and by co-located
//! single-process deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::{BusError, Delivery, MessageBus, DELIVERY_BUFFER};

const TOPIC_BUFFER: usize = 256;

#[derive(Default)]
pub struct LocalBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl LocalBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        let mut topics = self.topics.lock().expect("local bus lock poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_BUFFER).0)
            .clone()
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        // No subscribers is fine: fire-and-forget.
        let _ = self.topic_sender(topic).send(payload.to_vec());
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Delivery>, BusError> {
        let mut topic_rx = self.topic_sender(topic).subscribe();
        let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_BUFFER);
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                match topic_rx.recv().await {
                    Ok(payload) => {
                        let delivery = Delivery {
                            topic: topic.clone(),
                            payload,
                        };
                        if delivery_tx.send(delivery).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(topic = %topic, lagged = n, "Local bus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(delivery_rx)
    }

    async fn close(&self) {
        self.topics.lock().expect("local bus lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_all_current_subscribers() {
        let bus = LocalBus::new();

        let mut a = bus.subscribe("t").await.unwrap();
        let mut b = bus.subscribe("t").await.unwrap();

        bus.publish("t", b"one").await.unwrap();

        assert_eq!(a.recv().await.unwrap().payload, b"one");
        assert_eq!(b.recv().await.unwrap().payload, b"one");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = LocalBus::new();
        bus.publish("nobody", b"x").await.unwrap();
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = LocalBus::new();

        let mut a = bus.subscribe("a").await.unwrap();
        bus.publish("b", b"wrong topic").await.unwrap();
        bus.publish("a", b"right topic").await.unwrap();

        let got = a.recv().await.unwrap();
        assert_eq!(got.topic, "a");
        assert_eq!(got.payload, b"right topic");
    }

    #[tokio::test]
    async fn close_ends_subscriber_streams() {
        let bus = LocalBus::new();
        let mut rx = bus.subscribe("t").await.unwrap();

        bus.close().await;

        assert!(rx.recv().await.is_none());
    }
}
