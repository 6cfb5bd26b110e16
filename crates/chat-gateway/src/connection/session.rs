//! A single client session.
//!
//! The session owns nothing but its identity and the sending half of the
//! outbound queue; the writer task owns the receiving half and drains it in
//! enqueue order. Producers obtained from a registry lookup can only
//! `try_enqueue`, so a slow client never blocks fan-out.

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Outbound queue capacity in frames.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Session lifecycle.
///
/// `Connected → Bound → Closing → Closed`; `Closed` is terminal for the
/// session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connected = 0,
    Bound = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connected,
            1 => Self::Bound,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Failure modes of a non-blocking enqueue.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("outbound queue full ({used}/{capacity})")]
    Full { used: usize, capacity: usize },

    #[error("outbound queue closed")]
    Closed,
}

/// Server-side state for one live client connection.
pub struct Session {
    id: String,
    /// 0 until bound; written once by the router, read by teardown and
    /// logging.
    user_id: AtomicI32,
    state: AtomicU8,
    outbound_tx: mpsc::Sender<Bytes>,
    auth_token: Option<String>,
}

impl Session {
    /// Create a session around the sending half of its outbound queue.
    pub fn new(outbound_tx: mpsc::Sender<Bytes>, auth_token: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: AtomicI32::new(0),
            state: AtomicU8::new(SessionState::Connected as u8),
            outbound_tx,
            auth_token,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> i32 {
        self.user_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_user_id(&self, user_id: i32) {
        self.user_id.store(user_id, Ordering::Release);
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn mark_bound(&self) {
        // Only a live connected session can become bound.
        let _ = self.state.compare_exchange(
            SessionState::Connected as u8,
            SessionState::Bound as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Enter `Closing` from any non-terminal state.
    pub fn begin_close(&self) {
        let mut current = self.state.load(Ordering::Acquire);
        while current != SessionState::Closed as u8 && current != SessionState::Closing as u8 {
            match self.state.compare_exchange(
                current,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Terminal transition once both pumps exited and the registry entry is
    /// gone.
    pub fn mark_closed(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::Release);
    }

    /// Enqueue one pre-framed buffer without blocking.
    pub fn try_enqueue(&self, frame: Bytes) -> Result<(), EnqueueError> {
        self.outbound_tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full {
                used: self.queue_used(),
                capacity: OUTBOUND_QUEUE_CAPACITY,
            },
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Frames currently waiting in the outbound queue.
    pub fn queue_used(&self) -> usize {
        OUTBOUND_QUEUE_CAPACITY - self.outbound_tx.capacity()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id.load(Ordering::Relaxed))
            .field("state", &self.state())
            .finish()
    }
}
