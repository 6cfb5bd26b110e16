//! Gateway state.
//!
//! Shared dependencies for the WebSocket server, injected into handlers.

use std::sync::Arc;

use chat_common::AppConfig;

use crate::connection::SessionRegistry;
use crate::metrics::GatewayMetrics;
use crate::router::Router;

#[derive(Clone)]
pub struct GatewayState {
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    metrics: Arc<GatewayMetrics>,
    config: Arc<AppConfig>,
}

impl GatewayState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        router: Arc<Router>,
        metrics: Arc<GatewayMetrics>,
        config: AppConfig,
    ) -> Self {
        Self {
            registry,
            router,
            metrics,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
