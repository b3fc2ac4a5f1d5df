use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error taxonomy shared with callers. The wire names are agreed with the
/// gateway and double as metrics status labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "BadRequestError")]
    BadRequest,
    #[serde(rename = "NotFoundError")]
    NotFound,
    #[serde(rename = "UnexpectedError")]
    Unexpected,
}

impl ErrorKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequestError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Unexpected => "UnexpectedError",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "BadRequestError" => Some(ErrorKind::BadRequest),
            "NotFoundError" => Some(ErrorKind::NotFound),
            "UnexpectedError" => Some(ErrorKind::Unexpected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Incoming subscription {subject} message has no data")]
    EmptyRequestData { subject: String },

    #[error("Incoming message is invalid: {0}")]
    InvalidMessage(String),

    /// Raised by handlers for client-caused problems the codec cannot see
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("No subscription registered for subject {0}")]
    UnknownSubject(String),

    #[error("Subject {0} is already registered")]
    DuplicateSubject(String),

    #[error("Message on reply subject {subject} has no reply-to address")]
    MissingReplyTo { subject: String },

    #[error("Failed to encode outgoing message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request to {subject} timed out after {timeout:?}")]
    RequestTimeout { subject: String, timeout: Duration },

    #[error("Handler panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl DispatchError {
    pub fn not_found(message: impl Into<String>) -> Self {
        DispatchError::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        DispatchError::BadRequest(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::EmptyRequestData { .. }
            | DispatchError::InvalidMessage(_)
            | DispatchError::BadRequest(_) => ErrorKind::BadRequest,
            DispatchError::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Unexpected,
        }
    }

    /// Innermost human-readable cause, used as `ErrorReply.message`.
    pub fn reply_message(&self) -> String {
        match self {
            DispatchError::Unexpected(e) => e.root_cause().to_string(),
            other => {
                let mut cause: &dyn std::error::Error = other;
                while let Some(source) = cause.source() {
                    cause = source;
                }
                cause.to_string()
            }
        }
    }
}

/// `{"error": {"name": ..., "message": ...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub name: String,
    pub message: String,
}

impl ErrorReply {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                name: kind.wire_name().to_string(),
                message: message.into(),
            },
        }
    }

    /// None for names outside the taxonomy
    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_wire_name(&self.error.name)
    }
}

impl From<&DispatchError> for ErrorReply {
    fn from(err: &DispatchError) -> Self {
        ErrorReply::new(err.kind(), err.reply_message())
    }
}
