//! # Outbound fan-in
//! All reconcilers hand rendered reviews to one bounded queue; a single sender
//! loop drains it and calls the delivery sink in arrival order.

pub mod render;
pub mod telegram;

use std::collections::HashSet;
use std::sync::Mutex;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::DeliveryError;
use crate::model::Destination;
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub target_id: String,
    pub destination: Destination,
    pub text: String,
}

/// The consumer side of the queue is gone.
#[derive(Debug, thiserror::Error)]
#[error("outbound queue closed")]
pub struct OutboxClosed;

/// Writer handle of the outbound queue, cloned into every reconciler.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<OutboundMessage>,
}

impl Outbox {
    /// Wait for queue space and enqueue. Success means the message is owned by
    /// the sender loop.
    pub async fn hand_off(&self, msg: OutboundMessage) -> Result<(), OutboxClosed> {
        self.tx.send(msg).await.map_err(|_| OutboxClosed)
    }
}

pub type OutboxReceiver = mpsc::Receiver<OutboundMessage>;

/// Bounded outbound queue. A zero capacity is bumped to one.
pub fn channel(capacity: usize) -> (Outbox, OutboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Outbox { tx }, rx)
}

#[async_trait::async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, destination: Destination, text: &str) -> Result<(), DeliveryError>;
    fn name(&self) -> &'static str;
}

/// Drain the queue until every [`Outbox`] is dropped.
///
/// A permanent rejection tears down every target bound to the destination;
/// a transient failure drops the message.
pub async fn run_sender<S>(mut rx: OutboxReceiver, sink: S, registry: Registry)
where
    S: DeliverySink,
{
    info!(sink = sink.name(), "outbound sender started");
    while let Some(msg) = rx.recv().await {
        match sink.deliver(msg.destination, &msg.text).await {
            Ok(()) => {
                counter!("relay_deliveries_total", "outcome" => "ok").increment(1);
                debug!(target_id = %msg.target_id, destination = %msg.destination, "delivered");
            }
            Err(DeliveryError::PermanentReject { destination, reason }) => {
                counter!("relay_deliveries_total", "outcome" => "rejected").increment(1);
                warn!(%destination, %reason, "destination rejected delivery, dropping its targets");
                if let Err(e) = registry.drop_destination(destination).await {
                    error!(%destination, error = %format!("{e:#}"), "dropping destination failed");
                }
            }
            Err(DeliveryError::Transient(reason)) => {
                counter!("relay_deliveries_total", "outcome" => "failed").increment(1);
                warn!(target_id = %msg.target_id, destination = %msg.destination, %reason, "delivery failed");
            }
        }
    }
    info!("outbound sender stopped");
}

/// Sink used when no bot token is configured: messages only go to the log.
pub struct LogSink;

#[async_trait::async_trait]
impl DeliverySink for LogSink {
    async fn deliver(&self, destination: Destination, text: &str) -> Result<(), DeliveryError> {
        info!(%destination, chars = text.chars().count(), "no sink configured, message logged only");
        debug!(%destination, text, "outbound message");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

// --- Test helper ---
/// In-process sink: records deliveries, rejects chosen destinations.
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<(Destination, String)>>,
    rejected: Mutex<HashSet<Destination>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&self, destination: Destination) {
        self.rejected
            .lock()
            .expect("sink mutex poisoned")
            .insert(destination);
    }

    pub fn texts(&self) -> Vec<String> {
        self.delivered
            .lock()
            .expect("sink mutex poisoned")
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, destination: Destination, text: &str) -> Result<(), DeliveryError> {
        if self
            .rejected
            .lock()
            .expect("sink mutex poisoned")
            .contains(&destination)
        {
            return Err(DeliveryError::PermanentReject {
                destination,
                reason: "Forbidden: bot was blocked by the user".into(),
            });
        }
        self.delivered
            .lock()
            .expect("sink mutex poisoned")
            .push((destination, text.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[async_trait::async_trait]
impl<S: DeliverySink + ?Sized> DeliverySink for std::sync::Arc<S> {
    async fn deliver(&self, destination: Destination, text: &str) -> Result<(), DeliveryError> {
        (**self).deliver(destination, text).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
