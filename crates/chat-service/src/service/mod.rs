//! Chat request handling.

mod chat;

pub use chat::ChatService;
