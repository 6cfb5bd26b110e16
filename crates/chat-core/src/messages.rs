//! Application payload schemas.
//!
//! These are the structured messages carried inside the frame payload and on
//! the bus. The gateway parses `ChatRequest` once (for `game_id` and the
//! bind); everything else treats payloads as opaque bytes.

use serde::{Deserialize, Serialize};

/// Common routing/identity fields present on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBase {
    /// Logical backend selector; required and non-empty.
    pub game_id: String,
    /// Sender user id; 0 means unidentified.
    pub user_id: i32,
    /// Client-side Unix timestamp (seconds).
    pub timestamp: i64,
    #[serde(default)]
    pub trace_id: String,
    /// Set by clients that want session-targeted responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Chat message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    #[default]
    Text,
    Emote,
    System,
}

/// Client → chat service request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub base: MessageBase,
    /// Recipient user id; 0 for messages without a direct recipient.
    pub receiver_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub content: String,
    #[serde(rename = "type", default)]
    pub msg_type: MessageType,
}

impl ChatRequest {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Service → sender acknowledgement.
///
/// `target_user_id` always equals the request's `base.user_id`: the ACK is
/// for the sender, whichever gateway currently holds them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub base: MessageBase,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Correlation id for this session; not the database record id.
    pub message_id: i64,
    pub timestamp: i64,
    pub target_user_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_session_id: Option<String>,
}

/// Service → recipient delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBroadcast {
    pub message_id: i64,
    pub sender_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub content: String,
    #[serde(rename = "type", default)]
    pub msg_type: MessageType,
    pub timestamp: i64,
    pub target_user_id: i32,
}

/// Envelope for the shared `broadcast` topic.
///
/// The topic mixes ACKs and deliveries; the tag makes the two variants
/// unambiguous without trying parsers in sequence. A decoded variant is only
/// routable when it names a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusMessage {
    Response(ChatResponse),
    Broadcast(MessageBroadcast),
}

impl BusMessage {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    #[must_use]
    pub fn target_user_id(&self) -> i32 {
        match self {
            Self::Response(r) => r.target_user_id,
            Self::Broadcast(b) => b.target_user_id,
        }
    }

    #[must_use]
    pub fn target_session_id(&self) -> Option<&str> {
        match self {
            Self::Response(r) => r.target_session_id.as_deref(),
            Self::Broadcast(_) => None,
        }
    }

    /// Whether this message can be routed at all.
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.target_user_id() > 0 || self.target_session_id().is_some_and(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(user_id: i32) -> MessageBase {
        MessageBase {
            game_id: "mmo".to_string(),
            user_id,
            timestamp: 1_700_000_000,
            trace_id: String::new(),
            session_id: None,
        }
    }

    #[test]
    fn chat_request_round_trip() {
        let req = ChatRequest {
            base: base(1001),
            receiver_id: 1002,
            channel_id: None,
            content: "hi".to_string(),
            msg_type: MessageType::Text,
        };

        let bytes = req.to_bytes().unwrap();
        assert_eq!(ChatRequest::from_bytes(&bytes).unwrap(), req);
    }

    #[test]
    fn message_type_wire_names() {
        let json = serde_json::to_string(&MessageType::Text).unwrap();
        assert_eq!(json, r#""TEXT""#);

        let parsed: MessageType = serde_json::from_str(r#""EMOTE""#).unwrap();
        assert_eq!(parsed, MessageType::Emote);
    }

    #[test]
    fn bus_message_variants_are_disjoint() {
        let ack = BusMessage::Response(ChatResponse {
            base: base(1001),
            success: true,
            error_message: None,
            message_id: 5,
            timestamp: 1_700_000_001,
            target_user_id: 1001,
            target_session_id: None,
        });
        let delivery = BusMessage::Broadcast(MessageBroadcast {
            message_id: 5,
            sender_id: 1001,
            sender_name: None,
            content: "hi".to_string(),
            msg_type: MessageType::Text,
            timestamp: 1_700_000_000,
            target_user_id: 1002,
        });

        let ack2 = BusMessage::decode(&ack.encode().unwrap()).unwrap();
        let delivery2 = BusMessage::decode(&delivery.encode().unwrap()).unwrap();

        assert_eq!(ack2, ack);
        assert_eq!(delivery2, delivery);
        assert_eq!(ack2.target_user_id(), 1001);
        assert_eq!(delivery2.target_user_id(), 1002);
    }

    #[test]
    fn session_target_beats_nothing_when_empty() {
        let mut resp = ChatResponse {
            base: base(1),
            success: true,
            error_message: None,
            message_id: 1,
            timestamp: 0,
            target_user_id: 0,
            target_session_id: Some(String::new()),
        };

        assert!(!BusMessage::Response(resp.clone()).has_target());

        resp.target_session_id = Some("s-1".to_string());
        assert!(BusMessage::Response(resp).has_target());
    }

    #[test]
    fn raw_request_bytes_are_not_a_bus_message() {
        let req = ChatRequest {
            base: base(7),
            receiver_id: 0,
            channel_id: None,
            content: "x".to_string(),
            msg_type: MessageType::Text,
        };

        assert!(BusMessage::decode(&req.to_bytes().unwrap()).is_err());
    }
}
