//! Gateway performance counters.
//!
//! Plain atomics, injected through the server state rather than a process
//! global. A background task logs the totals periodically; the same snapshot
//! backs the diagnostic endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

#[derive(Default)]
pub struct GatewayMetrics {
    connections_total: AtomicU64,
    disconnections_total: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_routed: AtomicU64,
    routing_errors: AtomicU64,
    decode_errors: AtomicU64,
    broadcasts_dropped: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub messages_routed: u64,
    pub routing_errors: u64,
    pub decode_errors: u64,
    pub broadcasts_dropped: u64,
}

impl GatewayMetrics {
    pub fn on_connect(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_disconnect(&self) {
        self.disconnections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_routed(&self) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_routing_errors(&self) {
        self.routing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_decode_errors(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_broadcasts_dropped(&self) {
        self.broadcasts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.connections_total.load(Ordering::Relaxed);
        let gone = self.disconnections_total.load(Ordering::Relaxed);

        MetricsSnapshot {
            connections_total: total,
            connections_active: total.saturating_sub(gone),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            routing_errors: self.routing_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            broadcasts_dropped: self.broadcasts_dropped.load(Ordering::Relaxed),
        }
    }

    /// Log the counters at a fixed cadence until the process exits.
    pub fn spawn_periodic_report(self: &Arc<Self>, period: Duration) {
        let metrics = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // skip the immediate tick
            loop {
                ticker.tick().await;
                let snap = metrics.snapshot();
                tracing::info!(
                    connections_active = snap.connections_active,
                    connections_total = snap.connections_total,
                    received = snap.messages_received,
                    sent = snap.messages_sent,
                    routed = snap.messages_routed,
                    routing_errors = snap.routing_errors,
                    decode_errors = snap.decode_errors,
                    dropped = snap.broadcasts_dropped,
                    "Gateway metrics"
                );
            }
        });
    }
}
