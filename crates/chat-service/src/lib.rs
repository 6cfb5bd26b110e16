//! # chat-service
//!
//! The logical chat backend: consumes `ChatRequest`s from the bus, persists
//! them asynchronously, acknowledges the sender, and fans deliveries out to
//! recipients through the `broadcast` topic.

pub mod error;
pub mod persist;
pub mod server;
pub mod service;

pub use error::ServiceError;
pub use persist::{spawn_workers, PersistQueue, PERSIST_QUEUE_CAPACITY, PERSIST_WORKERS};
pub use service::ChatService;
