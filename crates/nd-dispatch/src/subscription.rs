//! Subscriptions and typed handlers
//!
//! A subscription is either ack-style or reply-style, fixed when it is built.
//! The handler's associated `Payload` type selects the payload decoder at
//! registration time; the dispatcher only sees the type-erased route.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, Span};

use nd_common::{ack_subject, retry_subject};

use crate::codec::{Acknowledgement, JsonCodec};
use crate::Result;

/// Handler for subscriptions that acknowledge on a dedicated subject.
/// Failures are terminal: they are logged and counted, never reported back.
#[async_trait]
pub trait AckHandler: Send + Sync + 'static {
    type Payload: DeserializeOwned + Send + 'static;

    async fn handle(&self, payload: Self::Payload) -> Result<()>;
}

/// Handler for subscriptions that always answer on the reply-to address.
#[async_trait]
pub trait ReplyHandler: Send + Sync + 'static {
    type Payload: DeserializeOwned + Send + 'static;
    type Response: Serialize + Send + 'static;

    async fn handle(&self, payload: Self::Payload) -> Result<Self::Response>;
}

#[async_trait]
pub(crate) trait AckRoute: Send + Sync {
    async fn dispatch(&self, codec: &JsonCodec, subject: &str, payload: &[u8]) -> Result<Acknowledgement>;
}

#[async_trait]
pub(crate) trait ReplyRoute: Send + Sync {
    async fn dispatch(&self, codec: &JsonCodec, subject: &str, payload: &[u8]) -> Result<Bytes>;
}

struct TypedAckRoute<H>(H);

#[async_trait]
impl<H: AckHandler> AckRoute for TypedAckRoute<H> {
    async fn dispatch(&self, codec: &JsonCodec, subject: &str, payload: &[u8]) -> Result<Acknowledgement> {
        let envelope = codec.decode_ack::<H::Payload>(subject, payload)?;
        Span::current().record("correlation_id", envelope.correlation_id());
        info!("Message received from subject: {}", subject);

        self.0.handle(envelope.data).await?;
        Ok(envelope.acknowledgement)
    }
}

struct TypedReplyRoute<H>(H);

#[async_trait]
impl<H: ReplyHandler> ReplyRoute for TypedReplyRoute<H> {
    async fn dispatch(&self, codec: &JsonCodec, subject: &str, payload: &[u8]) -> Result<Bytes> {
        let envelope = codec.decode_reply::<H::Payload>(subject, payload)?;
        Span::current().record("correlation_id", envelope.correlation_id());
        info!("Message received from subject: {}", subject);

        let response = self.0.handle(envelope.data).await?;
        codec.encode(&response)
    }
}

pub(crate) enum SubscriptionKind {
    Ack {
        ack_subject: String,
        retry_subject: String,
        route: Arc<dyn AckRoute>,
    },
    Reply {
        route: Arc<dyn ReplyRoute>,
    },
}

/// Which of the two handling modes a subscription uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionVariant {
    Ack,
    Reply,
}

pub struct Subscription {
    subject: String,
    kind: SubscriptionKind,
}

impl Subscription {
    /// Ack-style subscription using the `ack.<subject>` / `retry.<subject>` convention.
    pub fn ack<H: AckHandler>(subject: impl Into<String>, handler: H) -> Self {
        let subject = subject.into();
        let ack = ack_subject(&subject);
        let retry = retry_subject(&subject);
        Self::ack_with_subjects(subject, ack, retry, handler)
    }

    pub fn ack_with_subjects<H: AckHandler>(
        subject: impl Into<String>,
        ack_subject: impl Into<String>,
        retry_subject: impl Into<String>,
        handler: H,
    ) -> Self {
        Self {
            subject: subject.into(),
            kind: SubscriptionKind::Ack {
                ack_subject: ack_subject.into(),
                retry_subject: retry_subject.into(),
                route: Arc::new(TypedAckRoute(handler)),
            },
        }
    }

    pub fn reply<H: ReplyHandler>(subject: impl Into<String>, handler: H) -> Self {
        Self {
            subject: subject.into(),
            kind: SubscriptionKind::Reply {
                route: Arc::new(TypedReplyRoute(handler)),
            },
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn variant(&self) -> SubscriptionVariant {
        match self.kind {
            SubscriptionKind::Ack { .. } => SubscriptionVariant::Ack,
            SubscriptionKind::Reply { .. } => SubscriptionVariant::Reply,
        }
    }

    pub fn ack_subject(&self) -> Option<&str> {
        match &self.kind {
            SubscriptionKind::Ack { ack_subject, .. } => Some(ack_subject),
            SubscriptionKind::Reply { .. } => None,
        }
    }

    pub fn retry_subject(&self) -> Option<&str> {
        match &self.kind {
            SubscriptionKind::Ack { retry_subject, .. } => Some(retry_subject),
            SubscriptionKind::Reply { .. } => None,
        }
    }

    /// Subjects this subscription consumes: the primary one, plus the retry
    /// subject for ack-style subscriptions.
    pub fn listen_subjects(&self) -> Vec<&str> {
        let mut subjects = vec![self.subject.as_str()];
        if let Some(retry) = self.retry_subject() {
            subjects.push(retry);
        }
        subjects
    }

    pub(crate) fn kind(&self) -> &SubscriptionKind {
        &self.kind
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("variant", &self.variant())
            .field("ack_subject", &self.ack_subject())
            .field("retry_subject", &self.retry_subject())
            .finish()
    }
}
