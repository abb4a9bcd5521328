//! Platform connectors.
//!
//! A [`Connector`] owns a platform's wire format. It turns webhook payloads
//! into normalized [`Update`]s and delivers [`OutgoingMessage`]s, returning
//! whatever receipt the platform answers with.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use crate::error::{TransportError, TransportResult};
use crate::update::{IncomingMessage, OutgoingMessage, Participant, Update};

/// Translates between a platform's wire format and normalized records.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Normalizes a webhook request body into zero or more updates.
    fn parse_updates(&self, payload: Value) -> TransportResult<Vec<Update>>;

    /// Delivers a message that made it through the outgoing chains.
    async fn send_raw(&self, message: &OutgoingMessage) -> TransportResult<Value>;
}

#[async_trait]
impl<C: Connector + ?Sized> Connector for Arc<C> {
    fn parse_updates(&self, payload: Value) -> TransportResult<Vec<Update>> {
        (**self).parse_updates(payload)
    }

    async fn send_raw(&self, message: &OutgoingMessage) -> TransportResult<Value> {
        (**self).send_raw(message).await
    }
}

/// An in-process connector.
///
/// Each request body is a JSON object (or an array of objects) carrying
/// `text`, `sender.id`, `recipient.id` and `timestamp`; `message.text` and
/// `message.mid` are accepted as well. Sent messages are recorded and can be
/// inspected with [`LoopbackConnector::sent`].
#[derive(Debug, Default)]
pub struct LoopbackConnector {
    sent: Mutex<Vec<OutgoingMessage>>,
    next_message_id: AtomicU64,
    fail_sends: AtomicBool,
}

impl LoopbackConnector {
    /// Creates a connector with no recorded messages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every message sent so far.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }

    /// Makes subsequent sends fail with [`TransportError::SendFailed`].
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    fn parse_object(object: &Map<String, Value>) -> Update {
        let nested = object.get("message").and_then(Value::as_object);
        let text = nested
            .and_then(|m| m.get("text"))
            .or_else(|| object.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let mid = nested
            .and_then(|m| m.get("mid"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = (text.is_some() || mid.is_some()).then(|| IncomingMessage {
            mid,
            text,
            quick_reply_payload: None,
        });

        Update {
            sender: participant(object.get("sender")),
            recipient: participant(object.get("recipient")),
            timestamp: object.get("timestamp").and_then(Value::as_i64),
            message,
            raw: Value::Object(object.clone()),
            fields: Map::new(),
        }
    }
}

fn participant(value: Option<&Value>) -> Option<Participant> {
    match value?.get("id")? {
        Value::String(id) => Some(Participant::new(id.clone())),
        Value::Number(id) => Some(Participant::new(id.to_string())),
        _ => None,
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    fn parse_updates(&self, payload: Value) -> TransportResult<Vec<Update>> {
        match payload {
            Value::Object(object) => Ok(vec![Self::parse_object(&object)]),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_object().map(Self::parse_object).ok_or_else(|| {
                        TransportError::InvalidPayload("expected an array of objects".into())
                    })
                })
                .collect(),
            _ => Err(TransportError::InvalidPayload(
                "expected an object or an array of objects".into(),
            )),
        }
    }

    async fn send_raw(&self, message: &OutgoingMessage) -> TransportResult<Value> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(TransportError::SendFailed(
                "loopback connector is set to fail".into(),
            ));
        }
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        self.sent.lock().push(message.clone());
        Ok(json!({
            "recipient_id": message.recipient.id,
            "message_id": format!("loopback.{id}"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_object() {
        let connector = LoopbackConnector::new();
        let updates = connector
            .parse_updates(json!({
                "text": "Hello",
                "sender": { "id": 42 },
                "recipient": { "id": "page" },
                "timestamp": 1_700_000_000_000_i64,
            }))
            .unwrap();
        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.text(), Some("Hello"));
        assert_eq!(update.sender_id(), Some("42"));
        assert_eq!(update.recipient.as_ref().map(|p| p.id.as_str()), Some("page"));
        assert_eq!(update.raw["text"], "Hello");
    }

    #[test]
    fn test_parse_array_and_reject_scalars() {
        let connector = LoopbackConnector::new();
        let updates = connector
            .parse_updates(json!([{ "text": "a" }, { "message": { "text": "b", "mid": "m1" } }]))
            .unwrap();
        assert_eq!(updates[1].text(), Some("b"));
        assert!(connector.parse_updates(json!("nope")).is_err());
        assert!(connector.parse_updates(json!([1])).is_err());
    }

    #[tokio::test]
    async fn test_send_records_messages() {
        let connector = LoopbackConnector::new();
        let receipt = connector
            .send_raw(&OutgoingMessage::text("u1", "hi"))
            .await
            .unwrap();
        assert_eq!(receipt["recipient_id"], "u1");
        assert_eq!(connector.sent().len(), 1);

        connector.set_fail_sends(true);
        assert!(connector.send_raw(&OutgoingMessage::text("u1", "x")).await.is_err());
    }
}
