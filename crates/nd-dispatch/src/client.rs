//! Client side of the envelope protocol
//!
//! Builds ack-style and reply-style envelopes, sends them through any
//! transport, and decodes replies into either the success JSON or the
//! `ErrorReply` the service answered with.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::codec::JsonCodec;
use crate::transport::{MessagePublisher, MessageRequester};
use crate::{DispatchError, ErrorReply, Result};

/// Reply-style request body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest<T> {
    pub correlation_id: String,
    pub params: Map<String, Value>,
    pub data: T,
}

impl<T> ReplyRequest<T> {
    /// New request with a random correlation id and no params
    pub fn new(data: T) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            params: Map::new(),
            data,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Ack-style message body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckRequest<T> {
    pub id: String,
    pub message_id: String,
    pub correlation_id: String,
    pub data: T,
}

impl<T> AckRequest<T> {
    /// New message with random message and correlation ids
    pub fn new(id: impl Into<String>, data: T) -> Self {
        Self {
            id: id.into(),
            message_id: Uuid::new_v4().to_string(),
            correlation_id: Uuid::new_v4().to_string(),
            data,
        }
    }
}

/// What a reply-style subscription answered
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    Success(Value),
    Error(ErrorReply),
}

impl ReplyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ReplyOutcome::Success(_))
    }

    pub fn into_result(self) -> std::result::Result<Value, ErrorReply> {
        match self {
            ReplyOutcome::Success(value) => Ok(value),
            ReplyOutcome::Error(reply) => Err(reply),
        }
    }
}

pub struct DispatchClient<T> {
    transport: Arc<T>,
    codec: JsonCodec,
    default_timeout: Duration,
}

impl<T> DispatchClient<T>
where
    T: MessagePublisher + MessageRequester,
{
    pub fn new(transport: Arc<T>, default_timeout: Duration) -> Self {
        Self {
            transport,
            codec: JsonCodec::new(),
            default_timeout,
        }
    }

    /// Fire-and-forget publish of any serializable body
    pub async fn publish_json<S: Serialize + ?Sized>(&self, subject: &str, body: &S) -> Result<()> {
        let payload = self.codec.encode(body)?;
        self.transport.publish(subject, payload).await
    }

    pub async fn request_json<S: Serialize + ?Sized>(&self, subject: &str, body: &S) -> Result<ReplyOutcome> {
        self.request_json_timeout(subject, body, self.default_timeout).await
    }

    pub async fn request_json_timeout<S: Serialize + ?Sized>(
        &self,
        subject: &str,
        body: &S,
        timeout: Duration,
    ) -> Result<ReplyOutcome> {
        let payload = self.codec.encode(body)?;
        debug!(subject, timeout_ms = timeout.as_millis() as u64, "Sending request");

        let reply = self.transport.request(subject, payload, timeout).await?;
        decode_reply(&reply)
    }
}

/// An object whose only key is `error` is an error reply; anything else is
/// the handler's response.
pub fn decode_reply(bytes: &[u8]) -> Result<ReplyOutcome> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| DispatchError::Transport(format!("Reply is not valid JSON: {}", e)))?;

    let is_error = value
        .as_object()
        .map(|obj| obj.len() == 1 && obj.contains_key("error"))
        .unwrap_or(false);

    if is_error {
        if let Ok(reply) = serde_json::from_value::<ErrorReply>(value.clone()) {
            return Ok(ReplyOutcome::Error(reply));
        }
    }
    Ok(ReplyOutcome::Success(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_decode_success_reply() {
        let outcome = decode_reply(br#"{"result":{"id":"1","name":"Tom","color":"grey"}}"#).unwrap();
        assert!(outcome.is_success());
        let value = outcome.into_result().unwrap();
        assert_eq!(value["result"]["name"], "Tom");
    }

    #[test]
    fn test_decode_error_reply() {
        let outcome =
            decode_reply(br#"{"error":{"name":"NotFoundError","message":"Couldn't find a cat with id: 5"}}"#).unwrap();
        match outcome {
            ReplyOutcome::Error(reply) => {
                assert_eq!(reply.kind(), Some(ErrorKind::NotFound));
                assert_eq!(reply.error.message, "Couldn't find a cat with id: 5");
            }
            other => panic!("expected error reply, got {:?}", other),
        }
    }

    #[test]
    fn test_error_key_alongside_other_fields_is_a_success() {
        let outcome = decode_reply(br#"{"error":"none","result":true}"#).unwrap();
        assert!(outcome.is_success());
    }

    #[test]
    fn test_invalid_reply_is_transport_error() {
        let err = decode_reply(b"not json").unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }

    #[test]
    fn test_request_bodies_use_wire_names() {
        let request = ReplyRequest::new(json!({"catId": 1}))
            .with_correlation_id("c-1")
            .with_param("userId", "123");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"correlationId": "c-1", "params": {"userId": "123"}, "data": {"catId": 1}})
        );

        let ack = AckRequest::new("entity-1", json!({"name": "Tom"}));
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value["id"], "entity-1");
        assert!(value["messageId"].is_string());
        assert!(value["correlationId"].is_string());
        assert_ne!(ack.message_id, ack.correlation_id);
    }
}
