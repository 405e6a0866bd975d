//! Message contracts exchanged with the inventory and identity services.

use chrono::{DateTime, Utc};
use common::{CorrelationId, Gil, ItemId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::SagaState;

/// A user asked to buy `quantity` units of a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequested {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub correlation_id: CorrelationId,
}

/// The inventory service granted the purchased items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItemsGranted {
    pub correlation_id: CorrelationId,
}

/// The identity service debited the purchase total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GilDebited {
    pub correlation_id: CorrelationId,
}

/// Request for the current snapshot of a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPurchaseState {
    pub correlation_id: CorrelationId,
}

/// Command: add items to a user's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantItems {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub correlation_id: CorrelationId,
}

/// Command: remove gil from a user's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitGil {
    pub user_id: UserId,
    pub gil: Gil,
    pub correlation_id: CorrelationId,
}

/// Command: take previously granted items back out of a user's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtractItems {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub correlation_id: CorrelationId,
}

/// Exception details carried by a fault envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    pub exception_type: String,
    pub message: String,
}

impl ExceptionInfo {
    pub fn new(exception_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception_type: exception_type.into(),
            message: message.into(),
        }
    }
}

/// Generic failure envelope returned by a service that could not consume `T`.
///
/// Wraps the original message, so the owning saga is found through the
/// correlation id of the wrapped command rather than the envelope's own id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault<T> {
    pub fault_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub message: T,
    #[serde(default)]
    pub exceptions: Vec<ExceptionInfo>,
}

impl<T> Fault<T> {
    /// Wraps a message with the reasons it failed.
    pub fn new(message: T, reasons: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fault_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            message,
            exceptions: reasons
                .into_iter()
                .map(|reason| ExceptionInfo::new("Exception", reason))
                .collect(),
        }
    }

    /// Returns the first reported reason, if any.
    pub fn first_reason(&self) -> Option<&str> {
        self.exceptions.first().map(|e| e.message.as_str())
    }
}

/// Discriminant of an inbound domain event, used as the transition table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PurchaseRequested,
    InventoryItemsGranted,
    GilDebited,
    GrantItemsFaulted,
    DebitGilFaulted,
}

impl EventKind {
    /// Returns the wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PurchaseRequested => "PurchaseRequested",
            EventKind::InventoryItemsGranted => "InventoryItemsGranted",
            EventKind::GilDebited => "GilDebited",
            EventKind::GrantItemsFaulted => "Fault<GrantItems>",
            EventKind::DebitGilFaulted => "Fault<DebitGil>",
        }
    }

    /// Looks up an event kind by its wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "PurchaseRequested" => Some(EventKind::PurchaseRequested),
            "InventoryItemsGranted" => Some(EventKind::InventoryItemsGranted),
            "GilDebited" => Some(EventKind::GilDebited),
            "Fault<GrantItems>" => Some(EventKind::GrantItemsFaulted),
            "Fault<DebitGil>" => Some(EventKind::DebitGilFaulted),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inbound domain events consumed by the purchase saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PurchaseEvent {
    PurchaseRequested(PurchaseRequested),
    InventoryItemsGranted(InventoryItemsGranted),
    GilDebited(GilDebited),
    GrantItemsFaulted(Fault<GrantItems>),
    DebitGilFaulted(Fault<DebitGil>),
}

impl PurchaseEvent {
    /// Returns the correlation id of the saga this event belongs to.
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            PurchaseEvent::PurchaseRequested(e) => e.correlation_id,
            PurchaseEvent::InventoryItemsGranted(e) => e.correlation_id,
            PurchaseEvent::GilDebited(e) => e.correlation_id,
            PurchaseEvent::GrantItemsFaulted(f) => f.message.correlation_id,
            PurchaseEvent::DebitGilFaulted(f) => f.message.correlation_id,
        }
    }

    /// Returns the event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            PurchaseEvent::PurchaseRequested(_) => EventKind::PurchaseRequested,
            PurchaseEvent::InventoryItemsGranted(_) => EventKind::InventoryItemsGranted,
            PurchaseEvent::GilDebited(_) => EventKind::GilDebited,
            PurchaseEvent::GrantItemsFaulted(_) => EventKind::GrantItemsFaulted,
            PurchaseEvent::DebitGilFaulted(_) => EventKind::DebitGilFaulted,
        }
    }
}

/// Discriminant of an outbound command, used to resolve its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    GrantItems,
    DebitGil,
    SubtractItems,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::GrantItems => "GrantItems",
            CommandKind::DebitGil => "DebitGil",
            CommandKind::SubtractItems => "SubtractItems",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outbound commands produced by the purchase saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TradingCommand {
    GrantItems(GrantItems),
    DebitGil(DebitGil),
    SubtractItems(SubtractItems),
}

impl TradingCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            TradingCommand::GrantItems(_) => CommandKind::GrantItems,
            TradingCommand::DebitGil(_) => CommandKind::DebitGil,
            TradingCommand::SubtractItems(_) => CommandKind::SubtractItems,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            TradingCommand::GrantItems(c) => c.correlation_id,
            TradingCommand::DebitGil(c) => c.correlation_id,
            TradingCommand::SubtractItems(c) => c.correlation_id,
        }
    }
}

/// Snapshot pushed to the owning user's real-time channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseStatusUpdate {
    pub correlation_id: CorrelationId,
    /// Routing key of the per-user channel.
    pub user_id: UserId,
    pub current_state: SagaState,
    pub error_message: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant_items(correlation_id: CorrelationId) -> GrantItems {
        GrantItems {
            user_id: UserId::new(),
            item_id: ItemId::new(),
            quantity: 2,
            correlation_id,
        }
    }

    #[test]
    fn test_fault_correlates_through_wrapped_message() {
        let correlation_id = CorrelationId::new();
        let fault = Fault::new(grant_items(correlation_id), ["out of stock"]);
        let event = PurchaseEvent::GrantItemsFaulted(fault.clone());

        assert_ne!(fault.fault_id, correlation_id.as_uuid());
        assert_eq!(event.correlation_id(), correlation_id);
        assert_eq!(event.kind(), EventKind::GrantItemsFaulted);
    }

    #[test]
    fn test_fault_first_reason() {
        let fault = Fault::new(grant_items(CorrelationId::new()), ["out of stock", "later"]);
        assert_eq!(fault.first_reason(), Some("out of stock"));

        let empty = Fault::new(grant_items(CorrelationId::new()), Vec::<String>::new());
        assert_eq!(empty.first_reason(), None);
    }

    #[test]
    fn test_fault_without_exceptions_field_deserializes() {
        let correlation_id = CorrelationId::new();
        let json = serde_json::json!({
            "fault_id": Uuid::new_v4(),
            "timestamp": Utc::now(),
            "message": {
                "user_id": UserId::new(),
                "gil": "20",
                "correlation_id": correlation_id,
            }
        });

        let fault: Fault<DebitGil> = serde_json::from_value(json).unwrap();
        assert!(fault.exceptions.is_empty());
        assert_eq!(fault.message.correlation_id, correlation_id);
        assert_eq!(fault.message.gil, Gil::from_whole(20));
    }

    #[test]
    fn test_event_kind_wire_names() {
        for kind in [
            EventKind::PurchaseRequested,
            EventKind::InventoryItemsGranted,
            EventKind::GilDebited,
            EventKind::GrantItemsFaulted,
            EventKind::DebitGilFaulted,
        ] {
            assert_eq!(EventKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_wire("GetPurchaseState"), None);
    }

    #[test]
    fn test_command_kind_and_correlation() {
        let correlation_id = CorrelationId::new();
        let command = TradingCommand::DebitGil(DebitGil {
            user_id: UserId::new(),
            gil: Gil::from_whole(20),
            correlation_id,
        });

        assert_eq!(command.kind(), CommandKind::DebitGil);
        assert_eq!(command.correlation_id(), correlation_id);
        assert_eq!(command.kind().to_string(), "DebitGil");
    }
}
