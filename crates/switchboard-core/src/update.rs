//! Normalized update and message records.
//!
//! Every connector translates its platform payloads into an [`Update`] and
//! consumes [`OutgoingMessage`]s. Both records have a fixed schema for the
//! fields every platform shares and a flattened `fields` map for anything
//! else; middleware mutates them in place as they travel through a chain.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Raised when a middleware asks a record for something it does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The field is absent.
    #[error("{record} has no field `{field}`")]
    Missing {
        /// Record kind (`update` or `message`).
        record: &'static str,
        /// Requested field name.
        field: String,
    },

    /// The field exists but has a different JSON type.
    #[error("{record}.{field} is not {expected}")]
    WrongType {
        /// Record kind (`update` or `message`).
        record: &'static str,
        /// Requested field name.
        field: String,
        /// Expected JSON type.
        expected: &'static str,
    },
}

/// A user or page identity on a platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Platform-specific identifier.
    pub id: String,
}

impl Participant {
    /// Creates a participant with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// The message part of an inbound update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Platform message id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    /// Plain text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Payload of a pressed quick reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_reply_payload: Option<String>,
}

/// A normalized inbound update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Who sent the update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Participant>,
    /// Who received the update (usually the bot itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Participant>,
    /// Platform timestamp in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Message content, when the update is a message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<IncomingMessage>,
    /// The untouched platform payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
    /// Additional platform or middleware-provided fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Update {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an update from a JSON value.
    ///
    /// Keys that are not part of the fixed schema land in [`Update::fields`].
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Sets the message text, creating the message part when absent.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.message.get_or_insert_with(IncomingMessage::default).text = Some(text.into());
        self
    }

    /// Sets the sender.
    pub fn with_sender(mut self, id: impl Into<String>) -> Self {
        self.sender = Some(Participant::new(id));
        self
    }

    /// Adds an extension field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns the message text, if any.
    pub fn text(&self) -> Option<&str> {
        self.message.as_ref().and_then(|m| m.text.as_deref())
    }

    /// Returns a mutable handle on the message text, creating it when absent.
    pub fn text_mut(&mut self) -> &mut String {
        self.message
            .get_or_insert_with(IncomingMessage::default)
            .text
            .get_or_insert_with(String::new)
    }

    /// Returns an extension field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Sets an extension field, returning the previous value.
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Returns an extension field or a [`FieldError::Missing`].
    pub fn require_field(&self, key: &str) -> Result<&Value, FieldError> {
        require(&self.fields, "update", key)
    }

    /// Returns an integer extension field.
    pub fn require_i64(&self, key: &str) -> Result<i64, FieldError> {
        require_i64(&self.fields, "update", key)
    }

    /// Returns the sender id, if known.
    pub fn sender_id(&self) -> Option<&str> {
        self.sender.as_ref().map(|p| p.id.as_str())
    }
}

/// A quick reply button offered with an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickReply {
    /// Button caption.
    pub title: String,
    /// Payload posted back when pressed.
    pub payload: String,
}

/// A media attachment referenced by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment kind (`image`, `audio`, `video`, `file`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Location of the media.
    pub url: String,
}

/// The content of an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutgoingBody {
    /// Plain text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Quick reply buttons.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<QuickReply>,
    /// Media attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

/// A normalized outbound message handed to a connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Who the message goes to.
    pub recipient: Participant,
    /// Message content; absent for pure sender actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<OutgoingBody>,
    /// Sender action such as `typing_on`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_action: Option<String>,
    /// Additional connector-specific fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OutgoingMessage {
    /// Creates a plain text message.
    pub fn text(recipient: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            recipient: Participant::new(recipient),
            message: Some(OutgoingBody {
                text: Some(text.into()),
                ..OutgoingBody::default()
            }),
            ..Self::default()
        }
    }

    /// Creates a sender action message (e.g. `typing_on`).
    pub fn sender_action(recipient: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            recipient: Participant::new(recipient),
            sender_action: Some(action.into()),
            ..Self::default()
        }
    }

    /// Appends a quick reply button.
    pub fn with_quick_reply(mut self, title: impl Into<String>, payload: impl Into<String>) -> Self {
        self.message
            .get_or_insert_with(OutgoingBody::default)
            .quick_replies
            .push(QuickReply {
                title: title.into(),
                payload: payload.into(),
            });
        self
    }

    /// Returns the message text, if any.
    pub fn text_content(&self) -> Option<&str> {
        self.message.as_ref().and_then(|m| m.text.as_deref())
    }

    /// Returns a mutable handle on the message text, creating it when absent.
    pub fn text_mut(&mut self) -> &mut String {
        self.message
            .get_or_insert_with(OutgoingBody::default)
            .text
            .get_or_insert_with(String::new)
    }

    /// Returns an extension field or a [`FieldError::Missing`].
    pub fn require_field(&self, key: &str) -> Result<&Value, FieldError> {
        require(&self.fields, "message", key)
    }
}

fn require<'a>(
    fields: &'a Map<String, Value>,
    record: &'static str,
    key: &str,
) -> Result<&'a Value, FieldError> {
    fields.get(key).ok_or_else(|| FieldError::Missing {
        record,
        field: key.to_string(),
    })
}

fn require_i64(
    fields: &Map<String, Value>,
    record: &'static str,
    key: &str,
) -> Result<i64, FieldError> {
    require(fields, record, key)?
        .as_i64()
        .ok_or_else(|| FieldError::WrongType {
            record,
            field: key.to_string(),
            expected: "an integer",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_keys_are_flattened_into_fields() {
        let update = Update::from_value(json!({ "number": 0, "sender": { "id": "u1" } })).unwrap();
        assert_eq!(update.sender_id(), Some("u1"));
        assert_eq!(update.require_i64("number").unwrap(), 0);
    }

    #[test]
    fn test_missing_field_names_the_field() {
        let update = Update::new();
        let err = update.require_field("blop").unwrap_err();
        assert_eq!(err.to_string(), "update has no field `blop`");
    }

    #[test]
    fn test_text_mut_creates_message() {
        let mut update = Update::new();
        update.text_mut().push_str("Hello");
        assert_eq!(update.text(), Some("Hello"));
    }

    #[test]
    fn test_outgoing_text_serialization() {
        let message = OutgoingMessage::text("u1", "hi").with_quick_reply("Yes", "YES");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["recipient"]["id"], "u1");
        assert_eq!(value["message"]["text"], "hi");
        assert_eq!(value["message"]["quick_replies"][0]["payload"], "YES");
        assert!(value.get("sender_action").is_none());
    }
}
