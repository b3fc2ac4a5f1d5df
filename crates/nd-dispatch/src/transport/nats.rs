//! NATS transport
//!
//! Queue-subscribes every registered subject, hands each inbound message to
//! the dispatcher on its own task, and publishes acks and replies back through
//! the same client. Shutdown drains the subscriptions and waits for in-flight
//! dispatches before returning.

use async_nats::{Client, ConnectOptions, Request, RequestErrorKind, Subscriber};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{MessagePublisher, MessageRequester};
use crate::dispatcher::{Dispatcher, InboundMessage};
use crate::{DispatchError, Result};

#[derive(Debug, Clone)]
pub struct NatsConnectOptions {
    /// `nats://host:port` URLs
    pub servers: Vec<String>,
    pub connection_name: String,
    /// `None` keeps reconnecting forever
    pub max_reconnects: Option<usize>,
}

impl NatsConnectOptions {
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            servers,
            connection_name: "nd-server".to_string(),
            max_reconnects: None,
        }
    }
}

#[derive(Clone)]
pub struct NatsTransport {
    client: Client,
}

impl NatsTransport {
    pub async fn connect(options: NatsConnectOptions) -> Result<Self> {
        if options.servers.is_empty() {
            return Err(DispatchError::Transport("No NATS servers configured".to_string()));
        }

        let servers = options.servers.join(",");
        info!(
            servers = %servers,
            connection_name = %options.connection_name,
            max_reconnects = ?options.max_reconnects,
            "Connecting to NATS"
        );

        let client = ConnectOptions::new()
            .name(&options.connection_name)
            .max_reconnects(options.max_reconnects)
            .connect(servers.as_str())
            .await
            .map_err(|e| DispatchError::Transport(format!("NATS connection failed: {}", e)))?;

        Ok(Self { client })
    }

    /// Subscribe every subject in the dispatcher's registry under its queue
    /// group and start consuming.
    pub async fn serve(&self, dispatcher: Arc<Dispatcher>) -> Result<ServeHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue_group = dispatcher.registry().queue_group().to_string();
        let mut listeners = JoinSet::new();

        for subject in dispatcher.registry().subjects() {
            let subscriber = self
                .client
                .queue_subscribe(subject.to_string(), queue_group.clone())
                .await
                .map_err(|e| DispatchError::Transport(format!("Failed to subscribe to {}: {}", subject, e)))?;

            info!(subject, queue_group = %queue_group, "Subscribed");
            listeners.spawn(listen(
                subject.to_string(),
                subscriber,
                dispatcher.clone(),
                shutdown_rx.clone(),
            ));
        }

        Ok(ServeHandle { shutdown_tx, listeners })
    }

    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| DispatchError::Transport(format!("NATS flush failed: {}", e)))
    }
}

#[async_trait]
impl MessagePublisher for NatsTransport {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| DispatchError::Transport(format!("Failed to publish to {}: {}", subject, e)))
    }
}

#[async_trait]
impl MessageRequester for NatsTransport {
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        let timed_out = || DispatchError::RequestTimeout {
            subject: subject.to_string(),
            timeout,
        };

        // overrides the client-wide request timeout (10s by default)
        let request = Request::new().payload(payload).timeout(Some(timeout));
        match self.client.send_request(subject.to_string(), request).await {
            Ok(message) => Ok(message.payload),
            Err(e) if e.kind() == RequestErrorKind::TimedOut => Err(timed_out()),
            Err(e) => Err(DispatchError::Transport(format!("Request to {} failed: {}", subject, e))),
        }
    }
}

/// Running subscriptions started by [`NatsTransport::serve`]
pub struct ServeHandle {
    shutdown_tx: watch::Sender<bool>,
    listeners: JoinSet<()>,
}

impl ServeHandle {
    /// Drain every subscription and wait for in-flight dispatches
    pub async fn shutdown(mut self) {
        info!("Draining NATS subscriptions");
        let _ = self.shutdown_tx.send(true);

        while let Some(joined) = self.listeners.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Subscription listener failed");
            }
        }
        info!("NATS subscriptions drained");
    }
}

async fn listen(
    subject: String,
    mut subscriber: Subscriber,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut in_flight = JoinSet::new();
    let mut draining = false;

    loop {
        tokio::select! {
            changed = shutdown.changed(), if !draining => {
                if changed.is_err() || *shutdown.borrow() {
                    draining = true;
                    debug!(subject = %subject, "Draining subscription");
                    if let Err(e) = subscriber.drain().await {
                        warn!(subject = %subject, error = %e, "Failed to drain subscription");
                        break;
                    }
                }
            }
            message = subscriber.next() => {
                let Some(message) = message else { break };
                let inbound = InboundMessage {
                    subject: message.subject.to_string(),
                    reply_to: message.reply.map(|reply| reply.to_string()),
                    payload: message.payload,
                };
                let dispatcher = dispatcher.clone();
                in_flight.spawn(async move { dispatcher.on_message(inbound).await });
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    error!(subject = %subject, error = %e, "Dispatch task failed");
                }
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(subject = %subject, error = %e, "Dispatch task failed");
        }
    }
    debug!(subject = %subject, "Subscription closed");
}
