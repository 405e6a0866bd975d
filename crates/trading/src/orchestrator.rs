//! Purchase orchestrator: load, transition, commit, then flush.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use common::CorrelationId;
use saga_store::{SagaDocument, SagaStore, Version};
use serde::{Deserialize, Serialize};

use crate::calculator::calculate_total;
use crate::config::TradingConfig;
use crate::error::{Result, TradingError};
use crate::machine::{self, Pricing, Rule};
use crate::messages::{GetPurchaseState, PurchaseEvent, PurchaseRequested};
use crate::outbox::Outbox;
use crate::record::{PurchaseSaga, SAGA_TYPE};
use crate::services::bus::MessageBus;
use crate::services::catalog::Catalog;
use crate::services::notifier::StatusNotifier;
use crate::state::SagaState;

/// What the saga document holds: the record plus anything not yet flushed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPurchase {
    saga: PurchaseSaga,
    #[serde(default)]
    outbox: Outbox,
}

/// Outcome of handling one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The event moved the saga between states.
    Transitioned { from: SagaState, to: SagaState },
    /// The event had no effect. `state` is None when no saga exists.
    Ignored { state: Option<SagaState> },
}

/// Anything that can consume a decoded purchase event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: PurchaseEvent) -> Result<Handled>;
}

/// Drives purchase sagas in response to bus events.
///
/// Each event is handled by loading the saga document, evaluating the pure
/// transition, saving the new record together with its outbox under the
/// loaded version, and only then sending the outbox. A version conflict
/// reloads the document and evaluates the event again.
pub struct PurchaseOrchestrator<S, C, B, N>
where
    S: SagaStore,
    C: Catalog,
    B: MessageBus,
    N: StatusNotifier,
{
    store: S,
    catalog: C,
    bus: B,
    notifier: N,
    config: TradingConfig,
}

impl<S, C, B, N> PurchaseOrchestrator<S, C, B, N>
where
    S: SagaStore,
    C: Catalog,
    B: MessageBus,
    N: StatusNotifier,
{
    /// Creates a new orchestrator.
    pub fn new(store: S, catalog: C, bus: B, notifier: N, config: TradingConfig) -> Self {
        Self {
            store,
            catalog,
            bus,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    /// Handles one inbound event, reapplying it after version conflicts.
    ///
    /// Returns [`TradingError::ConflictRetriesExhausted`] once the configured
    /// number of reloads has been spent.
    #[tracing::instrument(
        skip(self, event),
        fields(correlation_id = %event.correlation_id(), event = %event.kind())
    )]
    pub async fn handle_event(&self, event: &PurchaseEvent) -> Result<Handled> {
        metrics::counter!("purchase_events_total", "event" => event.kind().as_str()).increment(1);
        let start = Instant::now();

        let mut conflicts = 0u32;
        let outcome = loop {
            match self.try_handle(event, conflicts > 0).await {
                Err(TradingError::Store(e)) if e.is_version_conflict() => {
                    metrics::counter!("purchase_version_conflicts_total").increment(1);
                    conflicts += 1;
                    if conflicts > self.config.conflict_retry_limit {
                        tracing::error!(attempts = conflicts, "version conflicts exhausted");
                        break Err(TradingError::ConflictRetriesExhausted {
                            correlation_id: event.correlation_id(),
                            attempts: conflicts,
                        });
                    }
                    tracing::debug!(attempt = conflicts, "version conflict, reloading saga");
                }
                other => break other,
            }
        };

        metrics::histogram!("purchase_event_handling_seconds")
            .record(start.elapsed().as_secs_f64());
        outcome
    }

    /// Answers the status query. Never writes.
    #[tracing::instrument(skip(self, query), fields(correlation_id = %query.correlation_id))]
    pub async fn get_purchase_state(&self, query: GetPurchaseState) -> Result<Option<PurchaseSaga>> {
        Ok(self
            .load(query.correlation_id)
            .await?
            .map(|(stored, _)| stored.saga))
    }

    /// `reloaded` is set when an earlier attempt lost a version race. A pending
    /// outbox seen then was committed by the winner, which is still sending it.
    async fn try_handle(&self, event: &PurchaseEvent, reloaded: bool) -> Result<Handled> {
        let correlation_id = event.correlation_id();
        let (current, pending, expected) = match self.load(correlation_id).await? {
            Some((stored, version)) => (Some(stored.saga), stored.outbox, version),
            None => (None, Outbox::new(), Version::initial()),
        };

        let from = current
            .as_ref()
            .map(|s| s.current_state())
            .unwrap_or_default();
        let pricing = match (machine::rule_for(from, event.kind()), event) {
            (Rule::Start, PurchaseEvent::PurchaseRequested(request)) => self.price(request).await?,
            _ => Pricing::NotRequired,
        };

        let transition = machine::transition(current.as_ref(), event, pricing, Utc::now());

        let Some(saga) = transition.saga else {
            metrics::counter!("purchase_events_ignored_total", "event" => event.kind().as_str())
                .increment(1);
            let Some(saga) = current else {
                tracing::debug!("no saga for event, ignoring");
                return Ok(Handled::Ignored { state: None });
            };

            if let PurchaseEvent::PurchaseRequested(request) = event
                && !saga.matches_request(request)
            {
                tracing::warn!(
                    user_id = %request.user_id,
                    item_id = %request.item_id,
                    quantity = request.quantity,
                    "duplicate purchase request differs from the recorded one"
                );
            } else {
                tracing::debug!(state = %from, "event ignored");
            }

            if !pending.is_empty() {
                if reloaded {
                    tracing::debug!(
                        pending = pending.len(),
                        "outbox left to the handler that committed it"
                    );
                } else {
                    tracing::info!(pending = pending.len(), "flushing outbox left by an earlier attempt");
                    self.flush(StoredPurchase { saga, outbox: pending }, expected)
                        .await?;
                }
            }
            return Ok(Handled::Ignored { state: Some(from) });
        };

        let to = saga.current_state();
        let mut outbox = pending;
        outbox.extend(transition.effects);
        let mut stored = StoredPurchase { saga, outbox };
        let version = match self.save(&stored, expected).await {
            Ok(version) => version,
            Err(e) => {
                let dropped = stored.outbox.discard();
                tracing::debug!(dropped, "transition not committed, outbox discarded");
                return Err(e);
            }
        };

        metrics::counter!("purchase_transitions_total", "to" => to.as_str()).increment(1);
        match (transition.rule, to) {
            (Rule::DebitFaulted, _) => {
                metrics::counter!("purchase_compensations_total").increment(1);
                tracing::warn!(
                    error = stored.saga.error_message().unwrap_or_default(),
                    "gil debit failed, returning granted items"
                );
            }
            (_, SagaState::Faulted) => {
                tracing::warn!(
                    error = stored.saga.error_message().unwrap_or_default(),
                    "purchase faulted"
                );
            }
            _ => tracing::info!(%from, %to, "purchase advanced"),
        }

        self.flush(stored, version).await?;
        Ok(Handled::Transitioned { from, to })
    }

    async fn price(&self, request: &PurchaseRequested) -> Result<Pricing> {
        match calculate_total(&self.catalog, request.item_id, request.quantity).await {
            Ok(total) => Ok(Pricing::Calculated(total)),
            Err(e) if e.is_permanent() => {
                tracing::warn!(error = %e, "purchase cannot be priced");
                Ok(Pricing::Failed(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Sends the committed outbox, then records what is left of it.
    ///
    /// A conflict on the follow-up save means another handler already moved
    /// the saga on; the messages it carried were sent by this flush or will be
    /// sent by that handler. Any other failure to record the cleared outbox is
    /// returned, so the event is redelivered and clears it before a later
    /// transition can send the same messages again.
    async fn flush(&self, mut stored: StoredPurchase, version: Version) -> Result<()> {
        let before = stored.outbox.len();
        let result = stored
            .outbox
            .flush(&self.bus, &self.notifier, &self.config.endpoints)
            .await;

        let cleared = if stored.outbox.len() != before {
            match self.save(&stored, version).await {
                Ok(_) => Ok(()),
                Err(TradingError::Store(e)) if e.is_version_conflict() => {
                    tracing::debug!("saga moved on before the outbox was cleared");
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        pending = stored.outbox.len(),
                        "failed to clear flushed outbox"
                    );
                    Err(e)
                }
            }
        } else {
            Ok(())
        };

        result?;
        cleared
    }

    async fn load(&self, correlation_id: CorrelationId) -> Result<Option<(StoredPurchase, Version)>> {
        let Some(doc) = self.store.load(correlation_id).await? else {
            return Ok(None);
        };

        let mut stored: StoredPurchase = doc.decode()?;
        stored.saga.set_version(doc.version);
        Ok(Some((stored, doc.version)))
    }

    async fn save(&self, stored: &StoredPurchase, expected: Version) -> Result<Version> {
        let doc = SagaDocument::new(stored.saga.correlation_id(), SAGA_TYPE, stored)?;
        Ok(self.store.save(doc, expected).await?)
    }
}

#[async_trait]
impl<S, C, B, N> EventHandler for PurchaseOrchestrator<S, C, B, N>
where
    S: SagaStore,
    C: Catalog,
    B: MessageBus,
    N: StatusNotifier,
{
    async fn handle(&self, event: PurchaseEvent) -> Result<Handled> {
        self.handle_event(&event).await
    }
}
