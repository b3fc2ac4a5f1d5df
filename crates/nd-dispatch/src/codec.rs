//! Envelope Codec
//!
//! Turns raw message bytes into typed envelopes and serializes outgoing
//! acknowledgements, replies and error replies.
//!
//! Inbound layout:
//! - ack-style: `{"id", "messageId", "correlationId", "data": {...}}`
//! - reply-style: `{"correlationId", "params": {...}, "data": {...}}`
//!
//! Unknown top-level and payload fields are ignored. Missing metadata or
//! payload fields are always reported as `InvalidMessage`, never defaulted.
//! Numeric metadata ids are accepted and read as their decimal string.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{DispatchError, Result};

/// Echoed back verbatim on the ack subject after a successful ack-style dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub id: String,
    pub message_id: String,
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AckEnvelope<T> {
    pub acknowledgement: Acknowledgement,
    pub data: T,
}

impl<T> AckEnvelope<T> {
    pub fn correlation_id(&self) -> &str {
        &self.acknowledgement.correlation_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyMetadata {
    pub params: Map<String, Value>,
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyEnvelope<T> {
    pub metadata: ReplyMetadata,
    pub data: T,
}

impl<T> ReplyEnvelope<T> {
    pub fn correlation_id(&self) -> &str {
        &self.metadata.correlation_id
    }
}

// Wire shapes read straight from the payload. Every field is optional here so
// the codec can name the first missing one itself.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAckMessage {
    #[serde(default, deserialize_with = "string_or_number::deserialize_opt")]
    id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number::deserialize_opt")]
    message_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number::deserialize_opt")]
    correlation_id: Option<String>,
    data: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReplyMessage {
    params: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "string_or_number::deserialize_opt")]
    correlation_id: Option<String>,
    data: Option<Value>,
}

mod string_or_number {
    use serde::{Deserialize, Deserializer};
    use serde_json::Number;

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrNum {
            Str(String),
            Num(Number),
        }

        Ok(Option::<StringOrNum>::deserialize(deserializer)?.map(|value| match value {
            StringOrNum::Str(s) => s,
            StringOrNum::Num(n) => n.to_string(),
        }))
    }
}

/// JSON codec owned by the dispatcher and handed to every decode/encode call.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        JsonCodec
    }

    pub fn decode_ack<T: DeserializeOwned>(&self, subject: &str, bytes: &[u8]) -> Result<AckEnvelope<T>> {
        let raw: RawAckMessage = self.parse(subject, bytes)?;

        let acknowledgement = Acknowledgement {
            id: required("id", raw.id)?,
            message_id: required("messageId", raw.message_id)?,
            correlation_id: required("correlationId", raw.correlation_id)?,
        };
        let data = self.decode_data(raw.data)?;

        Ok(AckEnvelope { acknowledgement, data })
    }

    pub fn decode_reply<T: DeserializeOwned>(&self, subject: &str, bytes: &[u8]) -> Result<ReplyEnvelope<T>> {
        let raw: RawReplyMessage = self.parse(subject, bytes)?;

        let metadata = ReplyMetadata {
            params: required("params", raw.params)?,
            correlation_id: required("correlationId", raw.correlation_id)?,
        };
        let data = self.decode_data(raw.data)?;

        Ok(ReplyEnvelope { metadata, data })
    }

    /// Never fails for the acks, replies and error replies built in this crate.
    pub fn encode<S: Serialize + ?Sized>(&self, value: &S) -> Result<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(DispatchError::Encode)
    }

    fn parse<R: DeserializeOwned>(&self, subject: &str, bytes: &[u8]) -> Result<R> {
        if bytes.is_empty() {
            return Err(DispatchError::EmptyRequestData {
                subject: subject.to_string(),
            });
        }
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DispatchError::InvalidMessage(e.to_string()))?;
        if !value.is_object() {
            return Err(DispatchError::InvalidMessage("Message is not a JSON object".to_string()));
        }
        serde_json::from_value(value).map_err(|e| DispatchError::InvalidMessage(e.to_string()))
    }

    fn decode_data<T: DeserializeOwned>(&self, data: Option<Value>) -> Result<T> {
        let data = data.ok_or_else(|| {
            DispatchError::InvalidMessage("Message data is missing value for data".to_string())
        })?;

        serde_json::from_value(data).map_err(|e| {
            let detail = e.to_string();
            match missing_field(&detail) {
                Some(field) => {
                    DispatchError::InvalidMessage(format!("Message data is missing value for {}", field))
                }
                None => DispatchError::InvalidMessage(format!("Message data is invalid: {}", detail)),
            }
        })
    }
}

fn required<V>(field: &str, value: Option<V>) -> Result<V> {
    value.ok_or_else(|| DispatchError::InvalidMessage(format!("Message is missing value for {}", field)))
}

/// Extracts `name` from serde's "missing field `name`" message.
fn missing_field(detail: &str) -> Option<&str> {
    detail
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
}
