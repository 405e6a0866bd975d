//! Trading error types.

use common::{CorrelationId, ItemId};
use saga_store::StoreError;
use thiserror::Error;

/// Errors that can occur while handling purchases.
#[derive(Debug, Error)]
pub enum TradingError {
    /// The catalog has no item with this id.
    #[error("Unknown item '{0}'")]
    UnknownItem(ItemId),

    /// A purchase asked for zero items.
    #[error("Quantity must be positive")]
    InvalidQuantity(u32),

    /// Unit price times quantity does not fit in a decimal.
    #[error("Purchase total overflows for item '{item_id}' x {quantity}")]
    TotalOverflow { item_id: ItemId, quantity: u32 },

    /// The catalog could not be reached.
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Saga store error.
    #[error("Saga store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An outbound command could not be handed to the bus.
    #[error("Message bus error: {0}")]
    Bus(String),

    /// A status notification could not be pushed.
    #[error("Notification error: {0}")]
    Notification(String),

    /// An inbound message carried a type this service does not consume.
    #[error("Unknown message type '{0}'")]
    UnknownMessageType(String),

    /// Every reload-and-reapply attempt lost the optimistic concurrency race.
    #[error("Gave up on saga {correlation_id} after {attempts} version conflicts")]
    ConflictRetriesExhausted {
        correlation_id: CorrelationId,
        attempts: u32,
    },
}

impl TradingError {
    /// Returns true if retrying cannot change the outcome.
    ///
    /// Permanent failures are exempt from the redelivery policy.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TradingError::UnknownItem(_)
                | TradingError::InvalidQuantity(_)
                | TradingError::TotalOverflow { .. }
                | TradingError::Serialization(_)
                | TradingError::UnknownMessageType(_)
        )
    }
}

/// Convenience type alias for trading results.
pub type Result<T> = std::result::Result<T, TradingError>;
