//! Gateway server setup.

mod handler;
mod state;

pub use handler::ws_handler;
pub use state::GatewayState;

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router as AxumRouter};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use chat_bus::{MessageBus, MqttBus, MqttBusConfig, RedisBus};
use chat_common::{AppConfig, AppError, MqBackend};
use chat_core::topics;

use crate::connection::SessionRegistry;
use crate::metrics::GatewayMetrics;
use crate::router::Router;

const METRICS_REPORT_PERIOD: Duration = Duration::from_secs(30);

/// Routes served on the public port.
pub fn create_router() -> AxumRouter<GatewayState> {
    AxumRouter::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn debug_stats(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let snapshot = state.metrics().snapshot();
    Json(serde_json::json!({
        "sessions": state.registry().session_count(),
        "metrics": snapshot,
    }))
}

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

/// Wire everything up and serve until the process exits.
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let bus = bus_from_config(&config).await?;

    let registry = Arc::new(SessionRegistry::new());
    let metrics = Arc::new(GatewayMetrics::default());
    metrics.spawn_periodic_report(METRICS_REPORT_PERIOD);

    let router = Arc::new(Router::new(registry.clone(), bus.clone(), metrics.clone()));

    // Every gateway consumes the shared broadcast topic; each delivery is
    // handled on its own task so one slow target cannot stall the stream.
    let mut broadcasts = bus
        .subscribe(topics::BROADCAST)
        .await
        .map_err(|e| AppError::Bus(e.to_string()))?;

    let broadcast_router = router.clone();
    tokio::spawn(async move {
        tracing::info!(topic = topics::BROADCAST, "Listening for bus broadcasts");
        while let Some(delivery) = broadcasts.recv().await {
            let router = broadcast_router.clone();
            tokio::spawn(async move {
                router.handle_bus_message(&delivery.payload);
            });
        }
        tracing::warn!("Broadcast subscription ended");
    });

    let state = GatewayState::new(registry, router, metrics, config);

    // Diagnostic server on its own port, never in production.
    if !state.config().server.env.is_production() {
        if let Some(diag_port) = state.config().server.diag_port {
            spawn_diag_server(state.clone(), diag_port);
        }
    }

    let app = create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = state.config().server.address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Server(format!("failed to bind {addr}: {e}")))?;

    tracing::info!("Gateway listening on ws://{addr}/ws");

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Server(e.to_string()))
}

fn spawn_diag_server(state: GatewayState, port: u16) {
    let host = state.config().server.host.clone();
    tokio::spawn(async move {
        let app = AxumRouter::new()
            .route("/health", get(health_check))
            .route("/debug/stats", get(debug_stats))
            .with_state(state);

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
