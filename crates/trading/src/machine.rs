//! The purchase state machine.
//!
//! Transitions are looked up in a table keyed by (state, event kind) and
//! evaluated by [`transition`], a pure function returning the next record and
//! the messages to send. Nothing here touches the store, the bus or the clock;
//! the orchestrator applies effects only after the new record is persisted.

use chrono::{DateTime, Utc};
use common::Gil;

use crate::messages::{
    CommandKind, DebitGil, EventKind, Fault, GrantItems, PurchaseEvent, PurchaseRequested,
    SubtractItems, TradingCommand,
};
use crate::outbox::OutboundMessage;
use crate::record::PurchaseSaga;
use crate::state::SagaState;

/// What the saga does for a (state, event kind) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Record the request, price it and ask inventory to grant the items.
    Start,
    /// Items are in the user's inventory; debit the total.
    ItemsGranted,
    /// Inventory refused; nothing to compensate.
    GrantFaulted,
    /// Gil debited; the purchase is done.
    GilDebited,
    /// Debit refused after items were granted; take the items back.
    DebitFaulted,
    /// Duplicate, out-of-order or post-terminal event.
    Ignore,
}

/// Every effective transition. Pairs not listed are ignored.
pub const TRANSITIONS: &[(SagaState, EventKind, Rule)] = &[
    (SagaState::Initial, EventKind::PurchaseRequested, Rule::Start),
    (SagaState::Accepted, EventKind::InventoryItemsGranted, Rule::ItemsGranted),
    (SagaState::Accepted, EventKind::GrantItemsFaulted, Rule::GrantFaulted),
    (SagaState::ItemsGranted, EventKind::GilDebited, Rule::GilDebited),
    (SagaState::ItemsGranted, EventKind::DebitGilFaulted, Rule::DebitFaulted),
];

/// Looks up the rule for an event arriving in a state.
pub fn rule_for(state: SagaState, kind: EventKind) -> Rule {
    TRANSITIONS
        .iter()
        .find(|(s, k, _)| *s == state && *k == kind)
        .map(|(_, _, rule)| *rule)
        .unwrap_or(Rule::Ignore)
}

/// Outcome of the Total Calculator, supplied by the caller for [`Rule::Start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pricing {
    /// The event does not start a saga.
    NotRequired,
    Calculated(Gil),
    /// A permanent pricing failure, as human-readable text.
    Failed(String),
}

/// Result of evaluating one event against the current record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub rule: Rule,
    pub from: SagaState,
    /// The record to persist, or None when the event is ignored.
    pub saga: Option<PurchaseSaga>,
    pub effects: Vec<OutboundMessage>,
}

impl Transition {
    fn ignored(from: SagaState) -> Self {
        Self {
            rule: Rule::Ignore,
            from,
            saga: None,
            effects: Vec::new(),
        }
    }

    /// Returns true if the event changed the record.
    pub fn is_applied(&self) -> bool {
        self.saga.is_some()
    }

    /// Returns the state after the transition.
    pub fn to(&self) -> SagaState {
        self.saga
            .as_ref()
            .map(|s| s.current_state())
            .unwrap_or(self.from)
    }
}

/// Evaluates an event against the current record.
///
/// `current` is None when no saga exists for the event's correlation id.
pub fn transition(
    current: Option<&PurchaseSaga>,
    event: &PurchaseEvent,
    pricing: Pricing,
    now: DateTime<Utc>,
) -> Transition {
    let from = current.map(|s| s.current_state()).unwrap_or_default();
    let rule = rule_for(from, event.kind());

    let applied = match (rule, event, current) {
        (Rule::Start, PurchaseEvent::PurchaseRequested(request), None) => {
            start(request, pricing, now)
        }
        (Rule::ItemsGranted, PurchaseEvent::InventoryItemsGranted(_), Some(saga)) => {
            items_granted(saga.clone(), now)
        }
        (Rule::GrantFaulted, PurchaseEvent::GrantItemsFaulted(fault), Some(saga)) => {
            let mut saga = saga.clone();
            saga.fault(fault_reason(fault, CommandKind::GrantItems), now);
            let effects = vec![OutboundMessage::Notification(saga.status_update())];
            (saga, effects)
        }
        (Rule::GilDebited, PurchaseEvent::GilDebited(_), Some(saga)) => {
            let mut saga = saga.clone();
            saga.move_to(SagaState::Completed, now);
            let effects = vec![OutboundMessage::Notification(saga.status_update())];
            (saga, effects)
        }
        (Rule::DebitFaulted, PurchaseEvent::DebitGilFaulted(fault), Some(saga)) => {
            let mut saga = saga.clone();
            let compensation = TradingCommand::SubtractItems(SubtractItems {
                user_id: saga.user_id(),
                item_id: saga.item_id(),
                quantity: saga.quantity(),
                correlation_id: saga.correlation_id(),
            });
            saga.fault(fault_reason(fault, CommandKind::DebitGil), now);
            let effects = vec![
                OutboundMessage::Command(compensation),
                OutboundMessage::Notification(saga.status_update()),
            ];
            (saga, effects)
        }
        _ => return Transition::ignored(from),
    };

    let (saga, effects) = applied;
    Transition {
        rule,
        from,
        saga: Some(saga),
        effects,
    }
}

fn start(
    request: &PurchaseRequested,
    pricing: Pricing,
    now: DateTime<Utc>,
) -> (PurchaseSaga, Vec<OutboundMessage>) {
    let mut saga = PurchaseSaga::from_request(request, now);

    match pricing {
        Pricing::Calculated(total) => {
            saga.accept(total, now);
            let grant = TradingCommand::GrantItems(GrantItems {
                user_id: saga.user_id(),
                item_id: saga.item_id(),
                quantity: saga.quantity(),
                correlation_id: saga.correlation_id(),
            });
            (saga, vec![OutboundMessage::Command(grant)])
        }
        Pricing::Failed(reason) => {
            saga.fault(reason, now);
            let effects = vec![OutboundMessage::Notification(saga.status_update())];
            (saga, effects)
        }
        Pricing::NotRequired => {
            saga.fault("Purchase total was not calculated", now);
            let effects = vec![OutboundMessage::Notification(saga.status_update())];
            (saga, effects)
        }
    }
}

fn items_granted(mut saga: PurchaseSaga, now: DateTime<Utc>) -> (PurchaseSaga, Vec<OutboundMessage>) {
    let Some(total) = saga.purchase_total() else {
        saga.fault("Purchase total was not calculated", now);
        let effects = vec![OutboundMessage::Notification(saga.status_update())];
        return (saga, effects);
    };

    saga.move_to(SagaState::ItemsGranted, now);
    let debit = TradingCommand::DebitGil(DebitGil {
        user_id: saga.user_id(),
        gil: total,
        correlation_id: saga.correlation_id(),
    });
    let effects = vec![
        OutboundMessage::Command(debit),
        OutboundMessage::Notification(saga.status_update()),
    ];
    (saga, effects)
}

fn fault_reason<T>(fault: &Fault<T>, command: CommandKind) -> String {
    fault
        .first_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{command} faulted"))
}
