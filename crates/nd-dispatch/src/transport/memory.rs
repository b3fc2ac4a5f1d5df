//! In-memory loopback bus
//!
//! Records everything published, routes messages on registered subjects to
//! an attached dispatcher on a fresh task, and answers requests through
//! one-shot inboxes. Used by the test suites and by local tooling that wants
//! dispatch behaviour without a NATS server.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use super::{MessagePublisher, MessageRequester};
use crate::dispatcher::{DispatchOutcome, Dispatcher, InboundMessage};
use crate::{DispatchError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Bytes,
}

impl PublishedMessage {
    /// Payload parsed as JSON, `Value::Null` if it is not valid JSON
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.payload).unwrap_or(Value::Null)
    }
}

pub struct InMemoryBus {
    published: Mutex<Vec<PublishedMessage>>,
    inboxes: DashMap<String, oneshot::Sender<Bytes>>,
    dispatcher: RwLock<Weak<Dispatcher>>,
    in_flight: Mutex<Vec<JoinHandle<DispatchOutcome>>>,
}

impl InMemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
            inboxes: DashMap::new(),
            dispatcher: RwLock::new(Weak::new()),
            in_flight: Mutex::new(Vec::new()),
        })
    }

    /// Route inbound traffic to `dispatcher`. Only a weak reference is kept
    /// since the dispatcher itself publishes through this bus.
    pub fn attach(&self, dispatcher: &Arc<Dispatcher>) {
        *self.dispatcher.write() = Arc::downgrade(dispatcher);
    }

    /// Hand a message to the attached dispatcher on its own task. `None` if
    /// no dispatcher is attached or nothing is subscribed to the subject.
    pub fn deliver(&self, message: InboundMessage) -> Option<JoinHandle<DispatchOutcome>> {
        let dispatcher = self.dispatcher.read().upgrade()?;
        dispatcher.registry().lookup(&message.subject)?;

        Some(tokio::spawn(async move { dispatcher.on_message(message).await }))
    }

    /// Wait until every message routed by `publish` or `request` has been
    /// dispatched, including messages published by those dispatches.
    pub async fn settle(&self) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let handles = std::mem::take(&mut *self.in_flight.lock());
            if handles.is_empty() {
                return outcomes;
            }
            for handle in handles {
                if let Ok(outcome) = handle.await {
                    outcomes.push(outcome);
                }
            }
        }
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    pub fn published_to(&self, subject: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    fn route(&self, message: InboundMessage) {
        if let Some(handle) = self.deliver(message) {
            self.in_flight.lock().push(handle);
        }
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        debug!(subject, bytes = payload.len(), "Publishing to in-memory bus");
        self.published.lock().push(PublishedMessage {
            subject: subject.to_string(),
            payload: payload.clone(),
        });

        if let Some((_, inbox)) = self.inboxes.remove(subject) {
            // requester may have timed out already
            let _ = inbox.send(payload);
            return Ok(());
        }

        self.route(InboundMessage::new(subject, payload));
        Ok(())
    }
}

#[async_trait]
impl MessageRequester for InMemoryBus {
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        let inbox = format!("_INBOX.{}", Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();
        self.inboxes.insert(inbox.clone(), tx);

        self.route(InboundMessage::new(subject, payload).with_reply_to(inbox.clone()));

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(DispatchError::Transport(format!("Inbox {} closed without a reply", inbox))),
            Err(_) => {
                self.inboxes.remove(&inbox);
                Err(DispatchError::RequestTimeout {
                    subject: subject.to_string(),
                    timeout,
                })
            }
        }
    }
}
