//! Wire protocol for the live chat connection.
//!
//! Frames are JSON text. Clients send [`InboundFrame`]s; the server relays
//! [`OutboundFrame`]s. Between the two sits [`ChatMessage`], the stamped,
//! server-side form of a message that is never mutated once created.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::constants::SYSTEM_SENDER;
use crate::error::ProtocolError;
use crate::types::{ChatId, UserId};

/// A message as submitted by a client.
///
/// Only the chat and the content are taken from the client. Any `sender`
/// or `timestamp` field in the JSON is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub chat_id: ChatId,
    #[serde(rename = "message")]
    pub content: String,
}

impl InboundFrame {
    /// Parse a client frame, refusing anything over `max_size` bytes.
    pub fn parse(data: &[u8], max_size: usize) -> Result<Self, ProtocolError> {
        if data.len() > max_size {
            return Err(ProtocolError::FrameTooLarge {
                size: data.len(),
                max: max_size,
            });
        }
        Ok(serde_json::from_slice(data)?)
    }
}

/// A message as relayed to a client.
///
/// `sender` is a display name or tag, never a raw user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub chat_id: ChatId,
    pub sender: String,
    #[serde(rename = "message")]
    pub content: String,
    pub timestamp: i64,
}

impl OutboundFrame {
    /// Server notice announcing a chat the recipient was added to.
    pub fn notice(chat_id: ChatId, content: impl Into<String>) -> Self {
        Self {
            chat_id,
            sender: SYSTEM_SENDER.to_string(),
            content: content.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

/// A chat message stamped with its authenticated sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    /// Unix seconds, taken from the server clock.
    pub timestamp: i64,
}

impl ChatMessage {
    /// Stamp a client frame with the connection's user and the current time.
    pub fn stamp(frame: InboundFrame, sender_id: UserId) -> Self {
        Self {
            chat_id: frame.chat_id,
            sender_id,
            content: frame.content,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Copy of this message as seen by a recipient, with the sender shown
    /// under `display`.
    pub fn render(&self, display: &str) -> OutboundFrame {
        OutboundFrame {
            chat_id: self.chat_id.clone(),
            sender: display.to_string(),
            content: self.content.clone(),
            timestamp: self.timestamp,
        }
    }
}
