//! Message store: one row append per chat message.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use chat_core::ChatRequest;

/// A message row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub game_id: String,
    pub sender_id: i32,
    pub receiver_id: i32,
    pub channel_id: Option<String>,
    pub content: String,
}

impl From<&ChatRequest> for NewMessage {
    fn from(req: &ChatRequest) -> Self {
        Self {
            game_id: req.base.game_id.clone(),
            sender_id: req.base.user_id,
            receiver_id: req.receiver_id,
            channel_id: req.channel_id.clone(),
            content: req.content.clone(),
        }
    }
}

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The persistence contract the worker pool writes through.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one message row, returning the authoritative record id.
    async fn insert(&self, message: &NewMessage) -> StoreResult<i64>;
}

/// PostgreSQL implementation of [`MessageStore`].
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    #[instrument(skip(self, message))]
    async fn insert(&self, message: &NewMessage) -> StoreResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO messages (game_id, sender_id, receiver_id, channel_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id
            "#,
        )
        .bind(&message.game_id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.channel_id)
        .bind(&message.content)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::{MessageBase, MessageType};

    #[test]
    fn new_message_from_request() {
        let req = ChatRequest {
            base: MessageBase {
                game_id: "mmo".to_string(),
                user_id: 1001,
                timestamp: 0,
                trace_id: String::new(),
                session_id: None,
            },
            receiver_id: 1002,
            channel_id: Some("general".to_string()),
            content: "hi".to_string(),
            msg_type: MessageType::Text,
        };

        let row = NewMessage::from(&req);
        assert_eq!(row.game_id, "mmo");
        assert_eq!(row.sender_id, 1001);
        assert_eq!(row.receiver_id, 1002);
        assert_eq!(row.channel_id.as_deref(), Some("general"));
        assert_eq!(row.content, "hi");
    }
}
