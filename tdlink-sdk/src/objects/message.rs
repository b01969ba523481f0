//! Message objects.

use serde::{Deserialize, Serialize};

/// Failure reported by the engine, the reserved `error` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    /// Error code, HTTP-like.
    pub code: i32,
    /// Human-readable reason.
    #[serde(default)]
    pub message: String,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier. Temporary while the message is still being sent.
    pub id: i64,
    #[serde(default)]
    pub chat_id: i64,
    #[serde(default)]
    pub is_outgoing: bool,
    #[serde(default)]
    pub date: i64,
    /// Present only for outgoing messages that are not yet delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sending_state: Option<MessageSendingState>,
    pub content: MessageContent,
}

impl Message {
    /// Whether the engine still reports the message as pending.
    pub fn is_pending(&self) -> bool {
        matches!(self.sending_state, Some(MessageSendingState::Pending))
    }
}

/// Delivery state of an outgoing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum MessageSendingState {
    #[serde(rename = "messageSendingStatePending")]
    Pending,
    #[serde(rename = "messageSendingStateFailed")]
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<EngineError>,
    },
}

/// Text with formatting entities. Entities are not interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedText {
    pub text: String,
    #[serde(default)]
    pub entities: Vec<serde_json::Value>,
}

/// Content of a message.
///
/// Only the kinds the core needs to tell apart are modelled; every other
/// content decodes to [`MessageContent::Unsupported`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum MessageContent {
    #[serde(rename = "messageText")]
    Text { text: FormattedText },
    #[serde(rename = "messageDice")]
    Dice {
        emoji: String,
        #[serde(default)]
        value: i32,
    },
    #[serde(rename = "messagePhoto")]
    Photo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<FormattedText>,
    },
    #[serde(rename = "messageUnsupported", other)]
    Unsupported,
}

impl MessageContent {
    /// The `@type` string of the content.
    pub fn content_type(&self) -> &'static str {
        match self {
            MessageContent::Text { .. } => "messageText",
            MessageContent::Dice { .. } => "messageDice",
            MessageContent::Photo { .. } => "messagePhoto",
            MessageContent::Unsupported => "messageUnsupported",
        }
    }
}
