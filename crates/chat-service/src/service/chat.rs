//! The fan-out pipeline: persist, acknowledge, broadcast.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chat_bus::MessageBus;
use chat_core::{topics, BusMessage, ChatRequest, ChatResponse, MessageBroadcast};

use crate::error::ServiceError;
use crate::persist::PersistQueue;

pub struct ChatService {
    bus: Arc<dyn MessageBus>,
    persist: PersistQueue,
    /// Correlation ids for ACKs. Persistence is asynchronous, so the
    /// authoritative record id is not known here; clients only use this
    /// value to match responses within a session.
    next_message_id: AtomicI64,
}

impl ChatService {
    pub fn new(bus: Arc<dyn MessageBus>, persist: PersistQueue) -> Self {
        Self {
            bus,
            persist,
            next_message_id: AtomicI64::new(1),
        }
    }

    /// Requests currently waiting for a persistence worker.
    #[must_use]
    pub fn persist_depth(&self) -> usize {
        self.persist.depth()
    }

    fn next_message_id(&self) -> i64 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Process one chat request.
    ///
    /// Enqueues the request for persistence, publishes the sender's ACK and
    /// (for direct messages) the recipient's broadcast on the `broadcast`
    /// topic, and returns the ACK so a direct transport can forward it
    /// without the bus.
    pub async fn handle_request(&self, req: ChatRequest) -> Result<ChatResponse, ServiceError> {
        let handle = request_handle(&req);
        tracing::debug!(
            sender_id = req.base.user_id,
            receiver_id = req.receiver_id,
            msg = %handle,
            "Message received"
        );

        if let Err(e) = self.persist.try_enqueue(req.clone()) {
            tracing::warn!(msg = %handle, error = %e, "Persistence queue refused request");
            return Err(ServiceError::Overloaded);
        }

        let message_id = self.next_message_id();

        let response = ChatResponse {
            base: req.base.clone(),
            success: true,
            error_message: None,
            message_id,
            timestamp: chrono::Utc::now().timestamp(),
            target_user_id: req.base.user_id,
            target_session_id: None,
        };

        self.publish(BusMessage::Response(response.clone()), &handle)
            .await;

        if req.receiver_id != 0 {
            let broadcast = MessageBroadcast {
                message_id,
                sender_id: req.base.user_id,
                sender_name: None,
                content: req.content.clone(),
                msg_type: req.msg_type,
                timestamp: req.base.timestamp,
                target_user_id: req.receiver_id,
            };

            self.publish(BusMessage::Broadcast(broadcast), &handle).await;
        }

        tracing::debug!(msg = %handle, message_id = message_id, "Fan-out complete");

        Ok(response)
    }

    /// Best-effort publish: failures are logged, never propagated, so one
    /// broken bus hop cannot poison the caller's ACK.
    async fn publish(&self, message: BusMessage, handle: &str) {
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(msg = %handle, error = %e, "Failed to encode bus message");
                return;
            }
        };

        if let Err(e) = self.bus.publish(topics::BROADCAST, &bytes).await {
            tracing::error!(msg = %handle, error = %e, "Failed to publish to broadcast");
        }
    }
}

/// Short log descriptor: sender, receiver, content prefix.
fn request_handle(req: &ChatRequest) -> String {
    let prefix: String = req.content.chars().take(20).collect();
    format!("{}->{}:{}", req.base.user_id, req.receiver_id, prefix)
}
