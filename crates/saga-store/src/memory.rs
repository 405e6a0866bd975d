use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{CorrelationId, Result, SagaDocument, StoreError, Version, store::SagaStore};

#[derive(Default)]
struct Faults {
    saves_before_failure: usize,
    failing_saves: usize,
    conflicting_saves: usize,
}

/// In-memory saga store implementation for testing.
///
/// This implementation keeps all documents in memory and provides
/// the same interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    documents: Arc<RwLock<HashMap<CorrelationId, SagaDocument>>>,
    faults: Arc<RwLock<Faults>>,
}

impl InMemorySagaStore {
    /// Creates a new empty in-memory saga store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sagas.
    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Clears all documents.
    pub async fn clear(&self) {
        self.documents.write().await.clear();
    }

    /// Makes the next `count` saves fail as if the database were unreachable.
    pub async fn fail_next_saves(&self, count: usize) {
        self.fail_saves_after(0, count).await;
    }

    /// Lets `successes` saves through, then fails the `count` after them.
    pub async fn fail_saves_after(&self, successes: usize, count: usize) {
        let mut faults = self.faults.write().await;
        faults.saves_before_failure = successes;
        faults.failing_saves = count;
    }

    /// Makes the next `count` saves lose an optimistic concurrency race.
    pub async fn conflict_next_saves(&self, count: usize) {
        self.faults.write().await.conflicting_saves = count;
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn load(&self, correlation_id: CorrelationId) -> Result<Option<SagaDocument>> {
        Ok(self.documents.read().await.get(&correlation_id).cloned())
    }

    async fn save(&self, mut document: SagaDocument, expected_version: Version) -> Result<Version> {
        let correlation_id = document.correlation_id;

        {
            let mut faults = self.faults.write().await;
            if faults.failing_saves > 0 {
                if faults.saves_before_failure > 0 {
                    faults.saves_before_failure -= 1;
                } else {
                    faults.failing_saves -= 1;
                    return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
                }
            }
            if faults.conflicting_saves > 0 {
                faults.conflicting_saves -= 1;
                return Err(StoreError::VersionConflict {
                    correlation_id,
                    expected: expected_version,
                    actual: expected_version.next(),
                });
            }
        }

        let mut documents = self.documents.write().await;

        let current_version = documents
            .get(&correlation_id)
            .map(|doc| doc.version)
            .unwrap_or(Version::initial());

        if current_version != expected_version {
            return Err(StoreError::VersionConflict {
                correlation_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        let new_version = current_version.next();
        document.version = new_version;
        document.updated_at = Utc::now();
        documents.insert(correlation_id, document);

        Ok(new_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SagaStoreExt;

    fn create_test_document(correlation_id: CorrelationId, step: &str) -> SagaDocument {
        SagaDocument::new(correlation_id, "TestSaga", &serde_json::json!({ "step": step }))
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_new_document() {
        let store = InMemorySagaStore::new();
        let id = CorrelationId::new();

        let version = store
            .save(create_test_document(id, "accepted"), Version::initial())
            .await
            .unwrap();

        assert_eq!(version, Version::first());
        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.version, Version::first());
        assert_eq!(loaded.data["step"], "accepted");
        assert_eq!(store.document_count().await, 1);
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let store = InMemorySagaStore::new();
        assert!(store.load(CorrelationId::new()).await.unwrap().is_none());
        assert!(!store.exists(CorrelationId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_with_expected_version() {
        let store = InMemorySagaStore::new();
        let id = CorrelationId::new();

        store
            .save(create_test_document(id, "accepted"), Version::initial())
            .await
            .unwrap();
        let version = store
            .save(create_test_document(id, "granted"), Version::first())
            .await
            .unwrap();

        assert_eq!(version, Version::new(2));
        assert_eq!(store.current_version(id).await.unwrap(), Version::new(2));
        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.data["step"], "granted");
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemorySagaStore::new();
        let id = CorrelationId::new();

        store
            .save(create_test_document(id, "accepted"), Version::initial())
            .await
            .unwrap();
        store
            .save(create_test_document(id, "granted"), Version::first())
            .await
            .unwrap();

        let result = store
            .save(create_test_document(id, "faulted"), Version::first())
            .await;

        match result {
            Err(StoreError::VersionConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, Version::first());
                assert_eq!(actual, Version::new(2));
            }
            other => panic!("Expected VersionConflict, got {other:?}"),
        }

        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.data["step"], "granted");
    }

    #[tokio::test]
    async fn test_creating_existing_document_conflicts() {
        let store = InMemorySagaStore::new();
        let id = CorrelationId::new();

        store
            .save(create_test_document(id, "accepted"), Version::initial())
            .await
            .unwrap();
        let result = store
            .save(create_test_document(id, "accepted"), Version::initial())
            .await;

        assert!(result.unwrap_err().is_version_conflict());
    }

    #[tokio::test]
    async fn test_concurrent_creates_have_one_winner() {
        let store = InMemorySagaStore::new();
        let id = CorrelationId::new();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save(
                        create_test_document(id, &format!("writer-{i}")),
                        Version::initial(),
                    )
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(store.current_version(id).await.unwrap(), Version::first());
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed() {
        let store = InMemorySagaStore::new();
        let id = CorrelationId::new();

        store.fail_next_saves(1).await;
        let err = store
            .save(create_test_document(id, "accepted"), Version::initial())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));

        store.conflict_next_saves(1).await;
        let err = store
            .save(create_test_document(id, "accepted"), Version::initial())
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());

        assert!(
            store
                .save(create_test_document(id, "accepted"), Version::initial())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_failure_after_successful_saves() {
        let store = InMemorySagaStore::new();
        let id = CorrelationId::new();
        store.fail_saves_after(1, 1).await;

        let version = store
            .save(create_test_document(id, "accepted"), Version::initial())
            .await
            .unwrap();
        let err = store
            .save(create_test_document(id, "granted"), version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.data["step"], "accepted");

        assert_eq!(
            store
                .save(create_test_document(id, "granted"), version)
                .await
                .unwrap(),
            Version::new(2)
        );
    }
}
