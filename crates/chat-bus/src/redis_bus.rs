//! Redis pub/sub backend.
//!
//! Fire-and-forget: a publish reaches the subscribers connected at that
//! moment and is never persisted. Each subscription runs its own listener
//! task with a dedicated pub/sub connection, reconnecting with a fixed delay
//! until its delivery channel is dropped or the bus is closed.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{mpsc, watch};

use crate::{BusError, Delivery, MessageBus, DELIVERY_BUFFER};

const RECONNECT_DELAY_MS: u64 = 1000;

pub struct RedisBus {
    client: redis::Client,
    publish_conn: ConnectionManager,
    shutdown_tx: watch::Sender<bool>,
}

impl RedisBus {
    /// Connect to Redis at `addr` (host:port), optionally authenticating.
    pub async fn connect(addr: &str, password: &str) -> Result<Self, BusError> {
        let url = if password.is_empty() {
            format!("redis://{addr}")
        } else {
            format!("redis://:{password}@{addr}")
        };

        let client = redis::Client::open(url)?;
        let publish_conn = ConnectionManager::new(client.clone()).await?;
        let (shutdown_tx, _) = watch::channel(false);

        tracing::info!(addr = %addr, "Connected to Redis bus");

        Ok(Self {
            client,
            publish_conn,
            shutdown_tx,
        })
    }

    /// Run one pub/sub connection until error, shutdown, or receiver drop.
    ///
    /// Returns `true` when the listener should stop for good.
    async fn run_listener(
        client: &redis::Client,
        topic: &str,
        delivery_tx: &mpsc::Sender<Delivery>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<bool, BusError> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;

        tracing::debug!(topic = %topic, "Redis subscription established");

        let mut stream = pubsub.on_message();

        loop {
            tokio::select! {
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        tracing::warn!(topic = %topic, "Redis pub/sub stream ended");
                        return Ok(false);
                    };

                    let delivery = Delivery {
                        topic: topic.to_string(),
                        payload: msg.get_payload_bytes().to_vec(),
                    };

                    if delivery_tx.send(delivery).await.is_err() {
                        // Consumer is gone; tear the subscription down.
                        return Ok(true);
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return Ok(true);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        let mut conn = self.publish_conn.clone();
        let receivers: u32 = conn.publish(topic, payload).await?;

        tracing::trace!(topic = %topic, receivers = receivers, "Published to Redis");

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Delivery>, BusError> {
        if *self.shutdown_tx.borrow() {
            return Err(BusError::Closed);
        }

        let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_BUFFER);
        let client = self.client.clone();
        let topic = topic.to_string();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                match Self::run_listener(&client, &topic, &delivery_tx, &mut shutdown_rx).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(topic = %topic, error = %e, "Redis subscriber error, reconnecting");
                    }
                }

                if *shutdown_rx.borrow() || delivery_tx.is_closed() {
                    break;
                }
                tokio::time::sleep(tokio::time::Duration::from_millis(RECONNECT_DELAY_MS)).await;
            }

            tracing::debug!(topic = %topic, "Redis subscriber stopped");
        });

        Ok(delivery_rx)
    }

    async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
