//! Subscription Registry
//!
//! Maps every subject a process consumes to its subscription. Ack-style
//! subscriptions are reachable through both their primary and retry
//! subjects. All subjects share one queue group so a horizontally scaled
//! service consumes each message once.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::subscription::Subscription;
use crate::{DispatchError, Result};

pub struct SubscriptionRegistry {
    queue_group: String,
    routes: HashMap<String, Arc<Subscription>>,
    /// Listen subjects in registration order
    subjects: Vec<String>,
}

impl SubscriptionRegistry {
    pub fn new(queue_group: impl Into<String>) -> Self {
        Self {
            queue_group: queue_group.into(),
            routes: HashMap::new(),
            subjects: Vec::new(),
        }
    }

    /// Bind a subscription to its listen subjects. A subject can be bound at
    /// most once; nothing is registered if any of them is already taken.
    pub fn register(&mut self, subscription: Subscription) -> Result<()> {
        let listen: Vec<String> = subscription
            .listen_subjects()
            .into_iter()
            .map(str::to_string)
            .collect();

        for (i, subject) in listen.iter().enumerate() {
            if self.routes.contains_key(subject) || listen[..i].contains(subject) {
                return Err(DispatchError::DuplicateSubject(subject.clone()));
            }
        }

        info!(
            subject = %subscription.subject(),
            variant = ?subscription.variant(),
            queue_group = %self.queue_group,
            "Registering subscription"
        );

        let subscription = Arc::new(subscription);
        for subject in listen {
            self.routes.insert(subject.clone(), subscription.clone());
            self.subjects.push(subject);
        }
        Ok(())
    }

    pub fn lookup(&self, subject: &str) -> Option<&Arc<Subscription>> {
        self.routes.get(subject)
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }

    /// Every subject the transport must subscribe to
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.subjects.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}
