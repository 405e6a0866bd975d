//! Outbox: messages produced by a transition, released only after it commits.
//!
//! The orchestrator persists the outbox inside the saga document in the same
//! versioned save as the new state, flushes it once that save succeeds and
//! then clears it. If the save fails the outbox is dropped unsent. If flushing
//! fails the pending messages stay in the document and are flushed again when
//! the inbound event is redelivered.

use serde::{Deserialize, Serialize};

use crate::config::Endpoints;
use crate::error::TradingError;
use crate::messages::{PurchaseStatusUpdate, TradingCommand};
use crate::services::bus::MessageBus;
use crate::services::notifier::StatusNotifier;

/// A message waiting in the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum OutboundMessage {
    /// A command for a downstream service. Must be delivered.
    Command(TradingCommand),
    /// A status snapshot for the owning user. Best-effort.
    Notification(PurchaseStatusUpdate),
}

/// Counts from one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub commands_sent: usize,
    pub notifications_pushed: usize,
    pub notifications_failed: usize,
}

/// Ordered buffer of outbound messages for one saga.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbox {
    pending: Vec<OutboundMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, message: OutboundMessage) {
        self.pending.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = OutboundMessage>) {
        self.pending.extend(messages);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn messages(&self) -> &[OutboundMessage] {
        &self.pending
    }

    /// Drops everything without sending. Returns how many messages were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Sends every pending message in order.
    ///
    /// Commands go to the bus at the destination configured for their kind; a
    /// failed send stops the flush and leaves that command and everything after
    /// it pending. Notification failures are logged and skipped.
    pub async fn flush<B, N>(
        &mut self,
        bus: &B,
        notifier: &N,
        endpoints: &Endpoints,
    ) -> Result<FlushReport, TradingError>
    where
        B: MessageBus + ?Sized,
        N: StatusNotifier + ?Sized,
    {
        let mut report = FlushReport::default();
        let mut remaining = std::mem::take(&mut self.pending).into_iter();

        while let Some(message) = remaining.next() {
            match &message {
                OutboundMessage::Command(command) => {
                    let destination = endpoints.destination_for(command.kind());
                    if let Err(e) = bus.send(destination, command).await {
                        tracing::warn!(
                            correlation_id = %command.correlation_id(),
                            command = %command.kind(),
                            destination,
                            error = %e,
                            "outbox flush interrupted"
                        );
                        self.pending = std::iter::once(message).chain(remaining).collect();
                        return Err(e);
                    }
                    metrics::counter!("outbox_messages_sent_total", "kind" => command.kind().as_str())
                        .increment(1);
                    report.commands_sent += 1;
                }
                OutboundMessage::Notification(update) => match notifier.push(update).await {
                    Ok(()) => {
                        metrics::counter!("outbox_messages_sent_total", "kind" => "Notification")
                            .increment(1);
                        report.notifications_pushed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(
                            correlation_id = %update.correlation_id,
                            error = %e,
                            "status notification dropped"
                        );
                        report.notifications_failed += 1;
                    }
                },
            }
        }

        Ok(report)
    }
}
