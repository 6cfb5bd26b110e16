//! MQTT backend (RobustMQ or any v4 broker).
//!
//! QoS 1 on both publish and subscribe, keep-alive 60s. One client drives a
//! single event loop task; incoming publishes are fanned out to the matching
//! subscription's delivery channel. The event loop reconnects by itself as
//! long as it keeps being polled, so errors only cost a short backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, watch, RwLock};

use crate::{BusError, Delivery, MessageBus, DELIVERY_BUFFER};

const KEEP_ALIVE_SECS: u64 = 60;
const RECONNECT_DELAY_MS: u64 = 1000;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Broker settings, mirroring the `mq.robustmq` config section.
#[derive(Debug, Clone)]
pub struct MqttBusConfig {
    /// Broker address, `host:port` with an optional `tcp://` scheme.
    pub broker: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
}

pub struct MqttBus {
    client: AsyncClient,
    subscriptions: Arc<RwLock<HashMap<String, mpsc::Sender<Delivery>>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl MqttBus {
    pub fn connect(config: &MqttBusConfig) -> Result<Self, BusError> {
        let (host, port) = parse_broker(&config.broker)?;

        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }

        let (client, mut event_loop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);
        let subscriptions: Arc<RwLock<HashMap<String, mpsc::Sender<Delivery>>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task_subscriptions = subscriptions.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = event_loop.poll() => match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let guard = task_subscriptions.read().await;
                            if let Some(tx) = guard.get(&publish.topic) {
                                let delivery = Delivery {
                                    topic: publish.topic.clone(),
                                    payload: publish.payload.to_vec(),
                                };
                                if tx.try_send(delivery).is_err() {
                                    tracing::warn!(
                                        topic = %publish.topic,
                                        "MQTT delivery channel full or closed, dropping"
                                    );
                                }
                            }
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            tracing::info!("Connected to MQTT broker");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "MQTT connection lost, retrying");
                            tokio::time::sleep(Duration::from_millis(RECONNECT_DELAY_MS)).await;
                        }
                    },
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("MQTT event loop stopped");
        });

        Ok(Self {
            client,
            subscriptions,
            shutdown_tx,
        })
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Delivery>, BusError> {
        if *self.shutdown_tx.borrow() {
            return Err(BusError::Closed);
        }

        let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_BUFFER);
        self.subscriptions
            .write()
            .await
            .insert(topic.to_string(), delivery_tx);

        self.client.subscribe(topic, QoS::AtLeastOnce).await?;

        tracing::debug!(topic = %topic, "MQTT subscription established");

        Ok(delivery_rx)
    }

    async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        self.subscriptions.write().await.clear();
        let _ = self.client.disconnect().await;
    }
}

/// Accepts `host:port`, `tcp://host:port`, or `mqtt://host:port`.
fn parse_broker(broker: &str) -> Result<(String, u16), BusError> {
    let stripped = broker
        .strip_prefix("tcp://")
        .or_else(|| broker.strip_prefix("mqtt://"))
        .unwrap_or(broker);

    match stripped.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| BusError::Connection(format!("invalid broker port in {broker:?}")))?;
            Ok((host.to_string(), port))
        }
        None => Ok((stripped.to_string(), 1883)),
    }
}
