//! Unsolicited update objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{EngineError, Message};

/// A new message was received or sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateNewMessage {
    pub message: Message,
}

/// A pending outgoing message was delivered and got its final identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessageSendSucceeded {
    /// The message with its final identifier.
    pub message: Message,
    /// The temporary identifier the message had while pending.
    pub old_message_id: i64,
}

/// A pending outgoing message could not be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessageSendFailed {
    pub message: Message,
    pub old_message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EngineError>,
}

/// Messages were deleted from a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDeleteMessages {
    pub chat_id: i64,
    pub message_ids: Vec<i64>,
    #[serde(default)]
    pub is_permanent: bool,
    #[serde(default)]
    pub from_cache: bool,
}

/// The authorization state changed. The state itself is left opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateAuthorizationState {
    pub authorization_state: Value,
}

/// The connection state changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConnectionState {
    pub state: Value,
}

/// An engine option changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOption {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}
