//! Shared building blocks for the nats-dispatch workspace
//!
//! - `logging`: tracing subscriber bootstrap (text or JSON)
//! - `subject`: subject naming conventions (`<verb>.<service>.<resource>`)

pub mod logging;
pub mod subject;

pub use subject::{ack_subject, retry_subject, subject, ChannelVerb, DEFAULT_SERVICE_NAME};
