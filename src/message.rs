//! Singer message decoding
//!
//! Decoding happens in two stages. [`decode_line`] parses one line of tap
//! output into a [`RawMessage`], checking only that it is a JSON object.
//! [`Message::from_raw`] then dispatches on the `type` discriminator and
//! decodes the fields that message type requires.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{Result, TargetError};

/// A parsed line of tap output that has not yet been typed
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage(Map<String, Value>);

impl RawMessage {
    /// The `type` discriminator, if present and a string
    pub fn message_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }
}

/// Parse one line of tap output
pub fn decode_line(line: &str) -> Result<RawMessage> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let value: Value = serde_json::from_str(line).map_err(|e| TargetError::Decode {
        line: line.to_string(),
        reason: e.to_string(),
    })?;

    match value {
        Value::Object(map) => Ok(RawMessage(map)),
        other => Err(TargetError::Decode {
            line: line.to_string(),
            reason: format!("found {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// SCHEMA message: declares (or replaces) the schema of a stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchemaMessage {
    pub stream: String,
    pub schema: Value,
    /// Required, but `null` stands for no key properties
    #[serde(deserialize_with = "nullable_names")]
    pub key_properties: Vec<String>,
    /// Informational only; anything but a list of names is dropped
    #[serde(default, deserialize_with = "lenient_names")]
    pub bookmark_properties: Option<Vec<String>>,
}

/// RECORD message: one row of data for a stream.
///
/// `version` and `time_extracted` may be present but are not read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordMessage {
    pub stream: String,
    pub record: Value,
}

fn nullable_names<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_names<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// STATE message: an opaque checkpoint to echo back when the run ends
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateMessage {
    pub value: Value,
}

/// A typed Singer message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Schema(SchemaMessage),
    Record(RecordMessage),
    State(StateMessage),
}

impl Message {
    pub const SCHEMA: &'static str = "SCHEMA";
    pub const RECORD: &'static str = "RECORD";
    pub const STATE: &'static str = "STATE";

    /// Discriminate on `type` and decode the fields required for it
    pub fn from_raw(raw: RawMessage) -> Result<Self> {
        let message_type = match raw.0.get("type") {
            Some(Value::String(t)) => t.clone(),
            Some(other) => {
                let message_type = other.to_string();
                return Err(TargetError::UnknownMessageType {
                    message_type,
                    message: Value::Object(raw.0).to_string(),
                });
            }
            None => {
                return Err(TargetError::MalformedMessage {
                    message_type: "untyped".to_string(),
                    reason: "missing field `type`".to_string(),
                })
            }
        };

        match message_type.as_str() {
            Self::SCHEMA => typed(raw, &message_type).map(Message::Schema),
            Self::RECORD => typed(raw, &message_type).map(Message::Record),
            Self::STATE => typed(raw, &message_type).map(Message::State),
            _ => Err(TargetError::UnknownMessageType {
                message_type,
                message: Value::Object(raw.0).to_string(),
            }),
        }
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Message::Schema(_) => Self::SCHEMA,
            Message::Record(_) => Self::RECORD,
            Message::State(_) => Self::STATE,
        }
    }
}

fn typed<T: DeserializeOwned>(raw: RawMessage, message_type: &str) -> Result<T> {
    serde_json::from_value(Value::Object(raw.0)).map_err(|e| TargetError::MalformedMessage {
        message_type: message_type.to_string(),
        reason: e.to_string(),
    })
}
