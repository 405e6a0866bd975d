//! Ingress adapter: raw bus messages in, typed events out.
//!
//! Decodes each message by its type name, hands the event to an
//! [`EventHandler`] and applies the redelivery policy to failures. Permanent
//! failures and messages that exhaust the policy go to a dead-letter sink.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::error::{Result, TradingError};
use crate::messages::{EventKind, PurchaseEvent};
use crate::orchestrator::{EventHandler, Handled};
use crate::services::dead_letter::{DeadLetter, DeadLetterSink};

/// A message as it arrives from the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub message_id: Uuid,
    /// Wire name of the payload type, e.g. `Fault<DebitGil>`.
    pub message_type: String,
    pub body: serde_json::Value,
}

impl BusMessage {
    pub fn new(message_type: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            message_type: message_type.into(),
            body,
        }
    }

    /// Wraps a typed event the way a publisher would put it on the bus.
    pub fn from_event(event: &PurchaseEvent) -> Result<Self> {
        let body = match event {
            PurchaseEvent::PurchaseRequested(e) => serde_json::to_value(e)?,
            PurchaseEvent::InventoryItemsGranted(e) => serde_json::to_value(e)?,
            PurchaseEvent::GilDebited(e) => serde_json::to_value(e)?,
            PurchaseEvent::GrantItemsFaulted(f) => serde_json::to_value(f)?,
            PurchaseEvent::DebitGilFaulted(f) => serde_json::to_value(f)?,
        };
        Ok(Self::new(event.kind().as_str(), body))
    }
}

/// Decodes a bus message into the event its type name announces.
pub fn decode(message: &BusMessage) -> Result<PurchaseEvent> {
    let kind = EventKind::from_wire(&message.message_type)
        .ok_or_else(|| TradingError::UnknownMessageType(message.message_type.clone()))?;
    let body = message.body.clone();

    let event = match kind {
        EventKind::PurchaseRequested => PurchaseEvent::PurchaseRequested(serde_json::from_value(body)?),
        EventKind::InventoryItemsGranted => {
            PurchaseEvent::InventoryItemsGranted(serde_json::from_value(body)?)
        }
        EventKind::GilDebited => PurchaseEvent::GilDebited(serde_json::from_value(body)?),
        EventKind::GrantItemsFaulted => PurchaseEvent::GrantItemsFaulted(serde_json::from_value(body)?),
        EventKind::DebitGilFaulted => PurchaseEvent::DebitGilFaulted(serde_json::from_value(body)?),
    };
    Ok(event)
}

/// Final outcome of delivering one bus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Handled(Handled),
    DeadLettered { attempts: u32, error: String },
}

/// Dispatches bus messages to a handler under a redelivery policy.
pub struct Ingress<H: ?Sized, D> {
    handler: Arc<H>,
    dead_letters: D,
    policy: RetryPolicy,
}

impl<H, D> Ingress<H, D>
where
    H: EventHandler + ?Sized,
    D: DeadLetterSink,
{
    pub fn new(handler: Arc<H>, dead_letters: D, policy: RetryPolicy) -> Self {
        Self {
            handler,
            dead_letters,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn dead_letters(&self) -> &D {
        &self.dead_letters
    }

    /// Delivers one message, redelivering transient failures.
    ///
    /// The message is attempted at most `retry_limit + 1` times with
    /// `interval` between attempts. Permanent failures are dead-lettered on
    /// the attempt that produced them.
    #[tracing::instrument(
        skip(self, message),
        fields(message_id = %message.message_id, message_type = %message.message_type)
    )]
    pub async fn deliver(&self, message: BusMessage) -> Delivery {
        let event = match decode(&message) {
            Ok(event) => event,
            Err(e) => return self.give_up(message, e, 1).await,
        };

        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;
        loop {
            match self.handler.handle(event.clone()).await {
                Ok(handled) => return Delivery::Handled(handled),
                Err(e) if e.is_permanent() => return self.give_up(message, e, attempt).await,
                Err(e) if attempt >= max_attempts => {
                    tracing::error!(attempts = attempt, error = %e, "redelivery attempts exhausted");
                    return self.give_up(message, e, attempt).await;
                }
                Err(e) => {
                    metrics::counter!("ingress_redeliveries_total").increment(1);
                    tracing::warn!(
                        attempt,
                        correlation_id = %event.correlation_id(),
                        error = %e,
                        "handling failed, redelivering"
                    );
                    tokio::time::sleep(self.policy.interval).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn give_up(&self, message: BusMessage, error: TradingError, attempts: u32) -> Delivery {
        metrics::counter!("ingress_dead_letters_total").increment(1);
        tracing::error!(attempts, error = %error, "message dead-lettered");

        let error = error.to_string();
        self.dead_letters
            .dead_letter(DeadLetter {
                message,
                error: error.clone(),
                attempts,
                failed_at: Utc::now(),
            })
            .await;
        Delivery::DeadLettered { attempts, error }
    }
}
