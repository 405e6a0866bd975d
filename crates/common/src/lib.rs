//! Shared identifiers and amounts for the trading service.

pub mod gil;
pub mod types;

pub use gil::Gil;
pub use types::{CorrelationId, ItemId, UserId};
