//! NATS JSON message dispatch
//!
//! This crate provides the service side of the envelope protocol:
//! - JsonCodec: envelope decoding and reply encoding
//! - Subscription: ack-style and reply-style subscriptions built from typed handlers
//! - SubscriptionRegistry: subject to subscription bindings under one queue group
//! - Dispatcher: per-message decode, handle, ack/reply and metrics
//! - DispatchError / ErrorReply: error taxonomy and its wire form
//! - DispatchMetrics: per-subject outcome counters and latency histograms
//! - Transports: an in-memory loopback bus and, with the `nats` feature, NATS
//! - DispatchClient: request/publish helpers for callers and tooling

pub mod client;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod subscription;
pub mod transport;

pub use client::{AckRequest, DispatchClient, ReplyOutcome, ReplyRequest};
pub use codec::{AckEnvelope, Acknowledgement, JsonCodec, ReplyEnvelope, ReplyMetadata};
pub use dispatcher::{DispatchOutcome, Dispatcher, InboundMessage};
pub use error::{DispatchError, ErrorBody, ErrorKind, ErrorReply};
pub use metrics::{DispatchMetrics, LatencySnapshot, TimerHandle};
pub use registry::SubscriptionRegistry;
pub use subscription::{AckHandler, ReplyHandler, Subscription, SubscriptionVariant};
pub use transport::{InMemoryBus, MessagePublisher, MessageRequester, PublishedMessage};
#[cfg(feature = "nats")]
pub use transport::{NatsConnectOptions, NatsTransport, ServeHandle};

pub type Result<T> = std::result::Result<T, DispatchError>;
