//! Dispatcher Core
//!
//! Entry point for every inbound message. Looks up the subscription bound to
//! the subject, decodes and runs the handler, then publishes the ack, the
//! reply or the error reply. Each call records exactly one latency
//! observation and one outcome, whatever path it takes.

use bytes::Bytes;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, field, info, info_span, warn, Instrument};

use crate::codec::JsonCodec;
use crate::metrics::DispatchMetrics;
use crate::registry::SubscriptionRegistry;
use crate::subscription::{AckRoute, ReplyRoute, SubscriptionKind};
use crate::transport::MessagePublisher;
use crate::{DispatchError, ErrorKind, ErrorReply, Result};

/// A message as delivered by the transport
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub subject: String,
    pub reply_to: Option<String>,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            reply_to: None,
            payload: payload.into(),
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler succeeded and the ack or reply was published
    Handled,
    /// Something failed. `replied` tells whether an error reply went out.
    Failed { kind: ErrorKind, replied: bool },
    /// No subscription for the subject
    Unrouted,
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled)
    }
}

pub struct Dispatcher {
    registry: SubscriptionRegistry,
    codec: JsonCodec,
    publisher: Arc<dyn MessagePublisher>,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    pub fn new(registry: SubscriptionRegistry, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self {
            registry,
            codec: JsonCodec::new(),
            publisher,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    /// Share a metrics collector with other components
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    pub async fn on_message(&self, message: InboundMessage) -> DispatchOutcome {
        let span = info_span!(
            "nats_message",
            subject = %message.subject,
            correlation_id = field::Empty,
        );
        self.dispatch(message).instrument(span).await
    }

    async fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        let timer = self.metrics.start_timer(&message.subject);

        let Some(subscription) = self.registry.lookup(&message.subject) else {
            self.metrics.observe(timer);
            let err = DispatchError::UnknownSubject(message.subject.clone());
            self.metrics.record_failure(&message.subject, err.kind());
            warn!(error = %err, "Dropping unrouted message");
            return DispatchOutcome::Unrouted;
        };

        let (result, replied) = match subscription.kind() {
            SubscriptionKind::Ack { ack_subject, route, .. } => {
                (self.handle_ack(&message, route.as_ref(), ack_subject).await, false)
            }
            SubscriptionKind::Reply { route } => self.handle_reply(&message, route.as_ref()).await,
        };

        let elapsed = self.metrics.observe(timer);

        match result {
            Ok(()) => {
                self.metrics.record_success(&message.subject);
                info!(elapsed_ms = elapsed.as_millis() as u64, "Message handled");
                DispatchOutcome::Handled
            }
            Err(err) => {
                let kind = err.kind();
                self.metrics.record_failure(&message.subject, kind);
                error!(
                    error = %err,
                    kind = %kind,
                    payload = %String::from_utf8_lossy(&message.payload),
                    "Could not handle message from subject {}",
                    message.subject
                );
                DispatchOutcome::Failed { kind, replied }
            }
        }
    }

    async fn handle_ack(&self, message: &InboundMessage, route: &dyn AckRoute, ack_subject: &str) -> Result<()> {
        let acknowledgement =
            catch_panic(route.dispatch(&self.codec, &message.subject, &message.payload)).await?;

        let payload = self.codec.encode(&acknowledgement)?;
        self.publisher.publish(ack_subject, payload).await?;

        info!(ack_subject, message_id = %acknowledgement.message_id, "Message acknowledged");
        Ok(())
    }

    /// Returns the dispatch result and whether anything was published
    async fn handle_reply(&self, message: &InboundMessage, route: &dyn ReplyRoute) -> (Result<()>, bool) {
        let Some(reply_to) = message.reply_to.as_deref() else {
            let err = DispatchError::MissingReplyTo {
                subject: message.subject.clone(),
            };
            return (Err(err), false);
        };

        match catch_panic(route.dispatch(&self.codec, &message.subject, &message.payload)).await {
            Ok(response) => match self.publisher.publish(reply_to, response).await {
                Ok(()) => (Ok(()), true),
                Err(e) => (Err(e), false),
            },
            Err(err) => {
                let replied = self.publish_error_reply(reply_to, &err).await;
                (Err(err), replied)
            }
        }
    }

    async fn publish_error_reply(&self, reply_to: &str, err: &DispatchError) -> bool {
        let reply = ErrorReply::from(err);
        let payload = match self.codec.encode(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to encode error reply");
                return false;
            }
        };

        match self.publisher.publish(reply_to, payload).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, reply_to, "Failed to publish error reply");
                false
            }
        }
    }
}

/// Turns a handler panic into an `Unexpected` error for this message only
async fn catch_panic<T, F>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(DispatchError::Panic(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
