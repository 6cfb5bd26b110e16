//! Session state and the sharded registry.

mod registry;
mod session;

pub use registry::{RegistryError, SessionRegistry, SHARD_COUNT};
pub use session::{EnqueueError, Session, SessionState, OUTBOUND_QUEUE_CAPACITY};
