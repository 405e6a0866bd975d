use async_trait::async_trait;

use crate::{CorrelationId, Result, SagaDocument, Version};

/// Core trait for saga store implementations.
///
/// A saga store keeps exactly one document per correlation id.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Loads the document for a correlation id.
    ///
    /// Returns None if no saga has been stored under that id.
    async fn load(&self, correlation_id: CorrelationId) -> Result<Option<SagaDocument>>;

    /// Saves a document, replacing the one stored at `expected_version`.
    ///
    /// `Version::initial()` means the document must not exist yet. Fails with
    /// `VersionConflict` if the stored version differs from `expected_version`.
    ///
    /// Returns the new version of the document.
    async fn save(&self, document: SagaDocument, expected_version: Version) -> Result<Version>;
}

/// Extension trait providing convenience methods for saga stores.
#[async_trait]
pub trait SagaStoreExt: SagaStore {
    /// Checks if a saga exists for the correlation id.
    async fn exists(&self, correlation_id: CorrelationId) -> Result<bool> {
        Ok(self.load(correlation_id).await?.is_some())
    }

    /// Returns the stored version, or `Version::initial()` if absent.
    async fn current_version(&self, correlation_id: CorrelationId) -> Result<Version> {
        Ok(self
            .load(correlation_id)
            .await?
            .map(|doc| doc.version)
            .unwrap_or_else(Version::initial))
    }
}

// Blanket implementation for all SagaStore implementations
impl<T: SagaStore + ?Sized> SagaStoreExt for T {}
