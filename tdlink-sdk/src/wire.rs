//! Wire envelopes exchanged with the engine.
//!
//! Every message on the channel is a single JSON object. The `@type` field
//! discriminates the payload and `@extra` carries the correlation id that
//! links a request to its response:
//!
//! ```json
//! {"@type":"getMe","@extra":"5c0b2e0e-..."}
//! {"@type":"user","@extra":"5c0b2e0e-...","id":42, ... }
//! {"@type":"updateOption","name":"version","value":{ ... }}
//! ```
//!
//! Unsolicited updates carry no `@extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::objects::DecodeError;

/// Name of the type discriminator field.
pub const TYPE_FIELD: &str = "@type";
/// Name of the correlation id field.
pub const EXTRA_FIELD: &str = "@extra";
/// Reserved response type for failed requests.
pub const ERROR_TYPE: &str = "error";

/// An outbound request.
///
/// The payload fields are flattened next to `@type` and `@extra` when the
/// request is serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Request type, e.g. `sendMessage`.
    #[serde(rename = "@type")]
    pub type_tag: String,
    /// Correlation id. Left empty by callers and assigned at send time.
    #[serde(rename = "@extra", default, skip_serializing_if = "String::is_empty")]
    pub extra: String,
    /// Remaining request fields.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Request {
    /// Create a request from a type tag and a payload that serializes to a
    /// JSON object (or to `null` for requests without fields).
    pub fn new(type_tag: impl Into<String>, payload: impl Serialize) -> Result<Self, serde_json::Error> {
        let mut data = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                    "request payload must be a JSON object, got {other}"
                )));
            }
        };
        data.remove(TYPE_FIELD);
        data.remove(EXTRA_FIELD);

        Ok(Self {
            type_tag: type_tag.into(),
            extra: String::new(),
            data,
        })
    }

    /// Create a request with no fields.
    pub fn empty(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            extra: String::new(),
            data: Map::new(),
        }
    }

    /// Serialize the request into the JSON text sent to the engine.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// An inbound message: either the response to a request or an update.
///
/// `data` is the complete raw JSON object as produced by the engine. It is
/// kept verbatim so that it can be decoded later, by any number of
/// consumers, into whatever shape they need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Value of the `@type` field.
    pub type_tag: String,
    /// Value of the `@extra` field, empty for unsolicited updates.
    pub extra: String,
    /// The raw JSON object.
    pub data: String,
}

impl Response {
    /// Read the envelope fields of a raw engine message.
    ///
    /// Only `@type` and `@extra` are inspected. A non-string `@extra` is
    /// kept in its JSON text form.
    pub fn parse(raw: impl Into<String>) -> Result<Self, DecodeError> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(rename = "@type")]
            type_tag: String,
            #[serde(rename = "@extra", default)]
            extra: Value,
        }

        let data = raw.into();
        let envelope: Envelope = serde_json::from_str(&data)?;
        let extra = match envelope.extra {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        };

        Ok(Self {
            type_tag: envelope.type_tag,
            extra,
            data,
        })
    }

    /// Whether the engine reported a failure for the request.
    pub fn is_error(&self) -> bool {
        self.type_tag == ERROR_TYPE
    }

    /// Whether this message answers a request.
    pub fn has_extra(&self) -> bool {
        !self.extra.is_empty()
    }
}
