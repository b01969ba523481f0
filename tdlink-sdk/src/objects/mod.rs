//! Objects decoded from engine messages.
//!
//! Decoding only discriminates on `@type`. A handful of objects the core
//! inspects are modelled as typed variants of [`Object`]; every other tag,
//! and any modelled tag whose fields do not fit the typed shape, decodes to
//! [`Object::Other`] with the payload kept as JSON. Only text that is not a
//! JSON object with a string `@type` fails to decode.

mod message;
mod update;

pub use message::{EngineError, FormattedText, Message, MessageContent, MessageSendingState};
pub use update::{
    UpdateAuthorizationState, UpdateConnectionState, UpdateDeleteMessages, UpdateMessageSendFailed,
    UpdateMessageSendSucceeded, UpdateNewMessage, UpdateOption,
};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::wire::TYPE_FIELD;

/// Errors produced while decoding a raw engine message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not valid JSON or does not match the requested shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload is not an object with a string `@type`.
    #[error("payload has no @type discriminator")]
    MissingType,

    /// The payload is of a different type than the one requested.
    #[error("expected {expected}, got {actual}")]
    UnexpectedType {
        expected: ObjectType,
        actual: ObjectType,
    },
}

/// The `@type` discriminator of an engine object.
///
/// Modelled types have their own variant; any other tag is carried as
/// [`ObjectType::Other`], so every type the engine emits can be filtered
/// on or buffered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ObjectType {
    Ok,
    Error,
    Message,
    UpdateNewMessage,
    UpdateMessageSendSucceeded,
    UpdateMessageSendFailed,
    UpdateDeleteMessages,
    UpdateAuthorizationState,
    UpdateConnectionState,
    UpdateOption,
    /// A tag without a typed model.
    Other(String),
}

impl ObjectType {
    /// Every type with a typed model.
    pub const MODELLED: [ObjectType; 10] = [
        ObjectType::Ok,
        ObjectType::Error,
        ObjectType::Message,
        ObjectType::UpdateNewMessage,
        ObjectType::UpdateMessageSendSucceeded,
        ObjectType::UpdateMessageSendFailed,
        ObjectType::UpdateDeleteMessages,
        ObjectType::UpdateAuthorizationState,
        ObjectType::UpdateConnectionState,
        ObjectType::UpdateOption,
    ];

    /// The `@type` string of this object.
    pub fn as_str(&self) -> &str {
        match self {
            ObjectType::Ok => "ok",
            ObjectType::Error => "error",
            ObjectType::Message => "message",
            ObjectType::UpdateNewMessage => "updateNewMessage",
            ObjectType::UpdateMessageSendSucceeded => "updateMessageSendSucceeded",
            ObjectType::UpdateMessageSendFailed => "updateMessageSendFailed",
            ObjectType::UpdateDeleteMessages => "updateDeleteMessages",
            ObjectType::UpdateAuthorizationState => "updateAuthorizationState",
            ObjectType::UpdateConnectionState => "updateConnectionState",
            ObjectType::UpdateOption => "updateOption",
            ObjectType::Other(tag) => tag,
        }
    }

    /// The type named by a `@type` string. Never fails: unmodelled tags
    /// become [`ObjectType::Other`].
    pub fn from_tag(tag: &str) -> Self {
        Self::MODELLED
            .into_iter()
            .find(|t| t.as_str() == tag)
            .unwrap_or_else(|| ObjectType::Other(tag.to_string()))
    }

    /// Whether this type has a typed model.
    pub fn is_modelled(&self) -> bool {
        !matches!(self, ObjectType::Other(_))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_tag(s))
    }
}

impl From<String> for ObjectType {
    fn from(tag: String) -> Self {
        match Self::from_tag(&tag) {
            ObjectType::Other(_) => ObjectType::Other(tag),
            modelled => modelled,
        }
    }
}

impl From<ObjectType> for String {
    fn from(ty: ObjectType) -> Self {
        match ty {
            ObjectType::Other(tag) => tag,
            modelled => modelled.as_str().to_string(),
        }
    }
}

/// A decoded engine object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Ok,
    Error(EngineError),
    Message(Message),
    UpdateNewMessage(UpdateNewMessage),
    UpdateMessageSendSucceeded(UpdateMessageSendSucceeded),
    UpdateMessageSendFailed(UpdateMessageSendFailed),
    UpdateDeleteMessages(UpdateDeleteMessages),
    UpdateAuthorizationState(UpdateAuthorizationState),
    UpdateConnectionState(UpdateConnectionState),
    UpdateOption(UpdateOption),
    /// Any object without a typed model, or a modelled one whose fields did
    /// not fit. `data` is the whole payload, `@type` included.
    Other { type_tag: String, data: Value },
}

impl Object {
    /// The discriminator of this object.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Ok => ObjectType::Ok,
            Object::Error(_) => ObjectType::Error,
            Object::Message(_) => ObjectType::Message,
            Object::UpdateNewMessage(_) => ObjectType::UpdateNewMessage,
            Object::UpdateMessageSendSucceeded(_) => ObjectType::UpdateMessageSendSucceeded,
            Object::UpdateMessageSendFailed(_) => ObjectType::UpdateMessageSendFailed,
            Object::UpdateDeleteMessages(_) => ObjectType::UpdateDeleteMessages,
            Object::UpdateAuthorizationState(_) => ObjectType::UpdateAuthorizationState,
            Object::UpdateConnectionState(_) => ObjectType::UpdateConnectionState,
            Object::UpdateOption(_) => ObjectType::UpdateOption,
            Object::Other { type_tag, .. } => ObjectType::from_tag(type_tag),
        }
    }

    /// Whether the payload was decoded into a typed variant.
    pub fn is_typed(&self) -> bool {
        !matches!(self, Object::Other { .. })
    }

    fn from_value(ty: ObjectType, value: Value) -> Self {
        fn typed<T: DeserializeOwned>(value: &Value, wrap: fn(T) -> Object) -> Option<Object> {
            T::deserialize(value).ok().map(wrap)
        }

        let object = match ty {
            ObjectType::Ok => Some(Object::Ok),
            ObjectType::Error => typed(&value, Object::Error),
            ObjectType::Message => typed(&value, Object::Message),
            ObjectType::UpdateNewMessage => typed(&value, Object::UpdateNewMessage),
            ObjectType::UpdateMessageSendSucceeded => {
                typed(&value, Object::UpdateMessageSendSucceeded)
            }
            ObjectType::UpdateMessageSendFailed => typed(&value, Object::UpdateMessageSendFailed),
            ObjectType::UpdateDeleteMessages => typed(&value, Object::UpdateDeleteMessages),
            ObjectType::UpdateAuthorizationState => {
                typed(&value, Object::UpdateAuthorizationState)
            }
            ObjectType::UpdateConnectionState => typed(&value, Object::UpdateConnectionState),
            ObjectType::UpdateOption => typed(&value, Object::UpdateOption),
            ObjectType::Other(_) => None,
        };

        object.unwrap_or_else(|| Object::Other {
            type_tag: ty.into(),
            data: value,
        })
    }
}

/// Decode a raw engine message.
///
/// Fails only when the text is not JSON or carries no string `@type`.
pub fn decode(raw: &str) -> Result<Object, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    let ty = value
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .map(ObjectType::from_tag)
        .ok_or(DecodeError::MissingType)?;
    Ok(Object::from_value(ty, value))
}

/// Objects that can be extracted from a decoded [`Object`].
pub trait FromObject: DeserializeOwned {
    /// The discriminator this type decodes from.
    const TYPE: ObjectType;

    /// Take the payload out of a matching typed object.
    fn from_object(object: Object) -> Option<Self>;

    /// Decode a raw engine message, requiring it to be of [`Self::TYPE`]
    /// and to fit the typed shape.
    fn decode(raw: &str) -> Result<Self, DecodeError> {
        let object = decode(raw)?;
        let actual = object.object_type();
        if actual != Self::TYPE {
            return Err(DecodeError::UnexpectedType {
                expected: Self::TYPE,
                actual,
            });
        }
        match Self::from_object(object) {
            Some(inner) => Ok(inner),
            // Right tag, wrong shape: report the field error.
            None => Ok(serde_json::from_str(raw)?),
        }
    }
}

macro_rules! impl_from_object {
    ($($variant:ident),* $(,)?) => {
        $(
            impl FromObject for $variant {
                const TYPE: ObjectType = ObjectType::$variant;

                fn from_object(object: Object) -> Option<Self> {
                    match object {
                        Object::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_from_object!(
    Message,
    UpdateNewMessage,
    UpdateMessageSendSucceeded,
    UpdateMessageSendFailed,
    UpdateDeleteMessages,
    UpdateAuthorizationState,
    UpdateConnectionState,
    UpdateOption,
);

impl FromObject for EngineError {
    const TYPE: ObjectType = ObjectType::Error;

    fn from_object(object: Object) -> Option<Self> {
        match object {
            Object::Error(inner) => Some(inner),
            _ => None,
        }
    }
}
