//! # chat-core
//!
//! Shared protocol layer for the game chat system: the binary wire envelope
//! exchanged with clients, the application payload schemas, and the topic
//! names used on the message bus.

pub mod error;
pub mod frame;
pub mod messages;
pub mod topics;

pub use error::ProtocolError;
pub use frame::{Frame, FrameFlags, FrameHeader, Route};
pub use messages::{BusMessage, ChatRequest, ChatResponse, MessageBase, MessageBroadcast, MessageType};
