//! Frame routing.
//!
//! Two entry points: `dispatch` for frames read from clients, and
//! `handle_bus_message` for payloads delivered on the bus `broadcast` topic.
//! The gateway parses exactly one payload shape (`ChatRequest`, for the
//! `game_id` and the user bind); everything else moves as opaque bytes.

use std::sync::Arc;

use chat_bus::{BusError, MessageBus};
use chat_core::{frame, topics, BusMessage, ChatRequest, Frame, FrameFlags, Route};

use crate::connection::{EnqueueError, RegistryError, Session, SessionRegistry};
use crate::metrics::GatewayMetrics;

/// Errors surfaced by `dispatch`.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Route byte outside the known classes. Fatal for the session.
    #[error("unknown route: {0}")]
    UnknownRoute(u8),

    /// Known route with no handler behind it yet.
    #[error("route {0:?} not implemented")]
    UnimplementedRoute(Route),

    #[error("invalid chat payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("missing game_id")]
    MissingGameId,

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl RouterError {
    /// Whether the reader should close the session over this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnknownRoute(_))
    }
}

/// Outcome of routing one bus message to a local client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivered {
    /// Queued on a local session.
    Queued,
    /// No local session for the target; another gateway will deliver it.
    NoLocalSession,
    /// A local session exists but its outbound queue was full.
    Dropped,
}

pub struct Router {
    registry: Arc<SessionRegistry>,
    bus: Arc<dyn MessageBus>,
    metrics: Arc<GatewayMetrics>,
}

impl Router {
    pub fn new(
        registry: Arc<SessionRegistry>,
        bus: Arc<dyn MessageBus>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            registry,
            bus,
            metrics,
        }
    }

    /// Route one inbound frame from a client.
    pub async fn dispatch(&self, session: &Arc<Session>, frame: &Frame) -> Result<(), RouterError> {
        match Route::from_u8(frame.route) {
            Some(Route::Chat) => self.dispatch_chat(session, frame).await,
            Some(Route::System) => Ok(()), // heartbeats and the like
            Some(route @ Route::Game) => Err(RouterError::UnimplementedRoute(route)),
            None => Err(RouterError::UnknownRoute(frame.route)),
        }
    }

    async fn dispatch_chat(
        &self,
        session: &Arc<Session>,
        frame: &Frame,
    ) -> Result<(), RouterError> {
        // The only payload parse the gateway does.
        let req = ChatRequest::from_bytes(&frame.payload)?;

        if req.base.game_id.is_empty() {
            return Err(RouterError::MissingGameId);
        }

        // Bind the session to its user on the first identified request.
        if session.user_id() == 0 && req.base.user_id > 0 {
            tracing::info!(
                session_id = %session.id(),
                user_id = req.base.user_id,
                "Binding session"
            );
            if let Err(RegistryError::SessionGone(id)) =
                self.registry.bind(req.base.user_id, session.id())
            {
                // The session raced its own teardown; forward anyway.
                tracing::warn!(session_id = %id, "Bind failed, session already gone");
            }
        }

        // Forward the payload only; the chat service never sees the frame
        // header.
        self.bus
            .publish(&topics::game_request(&req.base.game_id), &frame.payload)
            .await?;

        Ok(())
    }

    /// Handle one payload delivered on the `broadcast` topic.
    pub fn handle_bus_message(&self, payload: &[u8]) {
        let message = match BusMessage::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                // Not for us or malformed; the topic is shared.
                tracing::debug!(error = %e, size = payload.len(), "Unroutable bus message");
                return;
            }
        };

        if !message.has_target() {
            tracing::debug!("Bus message without target, ignoring");
            return;
        }

        match self.route_to_client(
            Route::Chat,
            message.target_user_id(),
            message.target_session_id(),
            payload,
        ) {
            Delivered::Queued => self.metrics.inc_routed(),
            Delivered::NoLocalSession => {
                // Normal: the recipient is connected to another gateway.
                tracing::debug!(
                    target_user_id = message.target_user_id(),
                    "No local session for bus message"
                );
            }
            Delivered::Dropped => self.metrics.inc_broadcasts_dropped(),
        }
    }

    /// Frame a payload and enqueue it for a local target, if any.
    ///
    /// The session id wins over the user id when both are present.
    pub fn route_to_client(
        &self,
        route: Route,
        target_user_id: i32,
        target_session_id: Option<&str>,
        payload: &[u8],
    ) -> Delivered {
        let by_session = target_session_id
            .filter(|id| !id.is_empty())
            .and_then(|id| self.registry.get(id));

        let session = match by_session {
            Some(s) => Some(s),
            None if target_user_id > 0 => self.registry.get_by_user(target_user_id),
            None => None,
        };

        let Some(session) = session else {
            return Delivered::NoLocalSession;
        };

        let encoded = frame::encode(route, FrameFlags::NONE, 0, payload.to_vec());

        match session.try_enqueue(encoded) {
            Ok(()) => Delivered::Queued,
            Err(EnqueueError::Full { used, capacity }) => {
                tracing::warn!(
                    session_id = %session.id(),
                    user_id = session.user_id(),
                    usage_pct = used * 100 / capacity,
                    "Message dropped, outbound queue full"
                );
                Delivered::Dropped
            }
            Err(EnqueueError::Closed) => {
                // Session is tearing down; same as not having it locally.
                Delivered::NoLocalSession
            }
        }
    }
}
