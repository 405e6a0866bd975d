//! Durable keyed storage for saga records.
//!
//! Every saga is stored as one JSON document per correlation id together with
//! a version token. Saves name the version they expect to replace and fail with
//! [`StoreError::VersionConflict`] when another writer got there first.

pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::CorrelationId;
pub use document::{SagaDocument, Version};
pub use error::{Result, StoreError};
pub use memory::InMemorySagaStore;
pub use postgres::PostgresSagaStore;
pub use store::{SagaStore, SagaStoreExt};
