//! Service wiring: bus consumers, persistence pool, diagnostics.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use tokio::net::TcpListener;

use chat_bus::{Delivery, MessageBus, MqttBus, MqttBusConfig, RedisBus};
use chat_common::{AppConfig, AppError, MqBackend};
use chat_core::{topics, ChatRequest};
use chat_db::PgMessageStore;

use crate::persist::{self, PersistQueue, PERSIST_QUEUE_CAPACITY, PERSIST_WORKERS};
use crate::service::ChatService;
use crate::ServiceError;

/// Build the message bus selected by `mq.type`.
pub async fn bus_from_config(config: &AppConfig) -> Result<Arc<dyn MessageBus>, AppError> {
    match config.mq.backend {
        MqBackend::Redis => {
            tracing::info!("Using Redis message bus");
            let bus = RedisBus::connect(&config.redis.addr, &config.redis.password)
                .await
                .map_err(|e| AppError::Bus(e.to_string()))?;
            Ok(Arc::new(bus))
        }
        MqBackend::Robustmq => {
            tracing::info!("Using RobustMQ (MQTT) message bus");
            let bus = MqttBus::connect(&MqttBusConfig {
                broker: config.mq.robustmq.broker.clone(),
                client_id: config.mq.robustmq.client_id.clone(),
                username: config.mq.robustmq.username.clone(),
                password: config.mq.robustmq.password.clone(),
            })
            .map_err(|e| AppError::Bus(e.to_string()))?;
            Ok(Arc::new(bus))
        }
    }
}

/// Wire everything up and serve until shutdown.
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let bus = bus_from_config(&config).await?;

    tracing::info!("Connecting to PostgreSQL...");
    let pool_config = chat_db::PoolConfig {
        dsn: config.database.dsn.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        ..Default::default()
    };
    let pool = chat_db::create_pool(&pool_config)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    let store = Arc::new(PgMessageStore::new(pool));
    tracing::info!("PostgreSQL connection established");

    let (persist_queue, persist_rx) = PersistQueue::new(PERSIST_QUEUE_CAPACITY);
    persist::spawn_workers(PERSIST_WORKERS, persist_rx, store);

    let service = Arc::new(ChatService::new(bus.clone(), persist_queue));

    if config.games.is_empty() {
        tracing::warn!("No games configured, nothing to consume");
    }

    // One consumer task per game topic; each request is handled on its own
    // task so a slow insert or publish never stalls the stream.
    for game in &config.games {
        let topic = topics::game_request(&game.id);
        let mut requests = bus
            .subscribe(&topic)
            .await
            .map_err(|e| AppError::Bus(e.to_string()))?;

        let service = service.clone();
        tokio::spawn(async move {
            tracing::info!(topic = %topic, "Listening for chat requests");
            while let Some(delivery) = requests.recv().await {
                let service = service.clone();
                tokio::spawn(async move {
                    handle_delivery(service, delivery).await;
                });
            }
            tracing::warn!(topic = %topic, "Request subscription ended");
        });
    }

    if !config.server.env.is_production() {
        if let Some(diag_port) = config.server.diag_port {
            spawn_diag_server(service.clone(), config.server.host.clone(), diag_port);
        }
    }

    tracing::info!(games = config.games.len(), "Chat service running");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::Server(e.to_string()))?;

    tracing::info!("Shutting down");
    bus.close().await;

    Ok(())
}

async fn handle_delivery(service: Arc<ChatService>, delivery: Delivery) {
    let req = match ChatRequest::from_bytes(&delivery.payload) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!(topic = %delivery.topic, error = %e, "Dropping unparsable request");
            return;
        }
    };

    match service.handle_request(req).await {
        // The ACK is already on the broadcast topic.
        Ok(_) => {}
        Err(ServiceError::Overloaded) => {
            tracing::warn!(topic = %delivery.topic, "Request refused, server overloaded");
        }
        Err(e) => {
            tracing::warn!(topic = %delivery.topic, error = %e, "Request failed");
        }
    }
}

fn spawn_diag_server(service: Arc<ChatService>, host: String, port: u16) {
    tokio::spawn(async move {
        let app = Router::new()
            .route("/health", get(health_check))
            .route("/debug/stats", get(debug_stats))
            .with_state(service);

        let addr = format!("{host}:{port}");
        match TcpListener::bind(&addr).await {
            Ok(listener) => {
                tracing::info!("Diagnostics listening on http://{addr}");
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::warn!(error = %e, "Diagnostic server failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to bind diagnostic port"),
        }
    });
}

async fn health_check() -> &'static str {
    "OK"
}

async fn debug_stats(State(service): State<Arc<ChatService>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "persist_queue_depth": service.persist_depth(),
        "persist_queue_capacity": PERSIST_QUEUE_CAPACITY,
    }))
}
