//! # chat-db
//!
//! PostgreSQL persistence: the connection pool and the single insert
//! contract of the `messages` table.

mod pool;
mod store;

pub use pool::{create_pool, PoolConfig};
pub use store::{MessageStore, NewMessage, PgMessageStore, StoreError, StoreResult};
