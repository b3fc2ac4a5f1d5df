//! Transport seams
//!
//! The dispatcher only needs to publish. Request/reply is used by clients.
//! `InMemoryBus` is a loopback implementation for tests and local tooling;
//! `NatsTransport` (feature `nats`) talks to a real NATS cluster.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::Result;

pub mod memory;
#[cfg(feature = "nats")]
pub mod nats;

pub use memory::{InMemoryBus, PublishedMessage};
#[cfg(feature = "nats")]
pub use nats::{NatsConnectOptions, NatsTransport, ServeHandle};

/// Fire-and-forget publish of a single message
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;
}

/// Request/reply round trip bounded by a timeout
#[async_trait]
pub trait MessageRequester: Send + Sync {
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes>;
}
