//! Asynchronous persistence pipeline.
//!
//! A bounded channel decouples request handling from storage latency: the
//! service does a non-blocking enqueue and the worker pool writes rows at its
//! own pace. A full channel means the store cannot keep up, and the service
//! answers `ServerOverloaded` instead of buffering unboundedly. Insert
//! failures are logged and the message is dropped (at-most-once to the
//! store).

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use chat_core::ChatRequest;
use chat_db::{MessageStore, NewMessage};

/// Persistence channel capacity.
pub const PERSIST_QUEUE_CAPACITY: usize = 20_000;

/// Number of store writers.
pub const PERSIST_WORKERS: usize = 50;

/// Producer side of the persistence channel.
pub struct PersistQueue {
    tx: mpsc::Sender<ChatRequest>,
    capacity: usize,
}

/// Why an enqueue was refused.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("persistence queue full ({capacity})")]
    Full { capacity: usize },

    #[error("persistence queue closed")]
    Closed,
}

impl PersistQueue {
    /// Create the channel; hand the receiver to [`spawn_workers`].
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ChatRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }

    /// Non-blocking enqueue.
    pub fn try_enqueue(&self, req: ChatRequest) -> Result<(), PersistError> {
        self.tx.try_send(req).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PersistError::Full {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => PersistError::Closed,
        })
    }

    /// Requests currently waiting to be written.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }
}

/// Start `count` workers draining the channel into the store.
pub fn spawn_workers(
    count: usize,
    rx: mpsc::Receiver<ChatRequest>,
    store: Arc<dyn MessageStore>,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));

    (0..count)
        .map(|worker_id| {
            let rx = rx.clone();
            let store = store.clone();
            tokio::spawn(async move {
                worker_loop(worker_id, rx, store).await;
            })
        })
        .collect()
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<ChatRequest>>>,
    store: Arc<dyn MessageStore>,
) {
    loop {
        // Hold the lock only for the dequeue, not for the insert.
        let req = { rx.lock().await.recv().await };

        let Some(req) = req else {
            tracing::debug!(worker_id = worker_id, "Persistence worker stopping");
            break;
        };

        let row = NewMessage::from(&req);
        match store.insert(&row).await {
            Ok(record_id) => {
                tracing::trace!(
                    worker_id = worker_id,
                    record_id = record_id,
                    sender_id = row.sender_id,
                    "Message persisted"
                );
            }
            Err(e) => {
                tracing::warn!(
                    worker_id = worker_id,
                    sender_id = row.sender_id,
                    receiver_id = row.receiver_id,
                    error = %e,
                    "Persist failed, message dropped"
                );
            }
        }
    }
}
