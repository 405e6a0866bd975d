//! Status notification trait and implementations.

use std::sync::Arc;

use async_trait::async_trait;
use common::UserId;
use tokio::sync::{RwLock, broadcast};

use crate::error::TradingError;
use crate::messages::PurchaseStatusUpdate;

/// Pushes purchase snapshots to the owning user's real-time channel.
///
/// Delivery is best-effort; the saga never depends on it.
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn push(&self, update: &PurchaseStatusUpdate) -> Result<(), TradingError>;
}

/// Fans updates out to every subscriber over a tokio broadcast channel.
///
/// Subscribers filter by [`PurchaseStatusUpdate::user_id`].
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<PurchaseStatusUpdate>,
}

impl BroadcastNotifier {
    /// Creates a notifier buffering up to `capacity` updates per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PurchaseStatusUpdate> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl StatusNotifier for BroadcastNotifier {
    async fn push(&self, update: &PurchaseStatusUpdate) -> Result<(), TradingError> {
        // No subscribers is not an error: nobody is watching.
        let receivers = self.sender.send(update.clone()).unwrap_or(0);
        tracing::trace!(correlation_id = %update.correlation_id, receivers, "status pushed");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    pushed: Vec<PurchaseStatusUpdate>,
    failing: bool,
}

/// In-memory notifier that records every update, for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatusNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryStatusNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every push fail while set.
    pub async fn set_failing(&self, failing: bool) {
        self.state.write().await.failing = failing;
    }

    /// Returns every update pushed so far.
    pub async fn pushed(&self) -> Vec<PurchaseStatusUpdate> {
        self.state.read().await.pushed.clone()
    }

    /// Returns the updates pushed to one user's channel.
    pub async fn pushed_to(&self, user_id: UserId) -> Vec<PurchaseStatusUpdate> {
        self.state
            .read()
            .await
            .pushed
            .iter()
            .filter(|u| u.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StatusNotifier for InMemoryStatusNotifier {
    async fn push(&self, update: &PurchaseStatusUpdate) -> Result<(), TradingError> {
        let mut state = self.state.write().await;
        if state.failing {
            return Err(TradingError::Notification(
                "real-time hub unavailable".to_string(),
            ));
        }
        state.pushed.push(update.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::CorrelationId;

    use super::*;
    use crate::state::SagaState;

    fn update(user_id: UserId) -> PurchaseStatusUpdate {
        PurchaseStatusUpdate {
            correlation_id: CorrelationId::new(),
            user_id,
            current_state: SagaState::Completed,
            error_message: None,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        let user = UserId::new();

        notifier.push(&update(user)).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.user_id, user);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::new(8);
        assert!(notifier.push(&update(UserId::new())).await.is_ok());
    }

    #[tokio::test]
    async fn test_in_memory_filters_by_user() {
        let notifier = InMemoryStatusNotifier::new();
        let alice = UserId::new();
        let bob = UserId::new();

        notifier.push(&update(alice)).await.unwrap();
        notifier.push(&update(bob)).await.unwrap();
        notifier.push(&update(alice)).await.unwrap();

        assert_eq!(notifier.pushed().await.len(), 3);
        assert_eq!(notifier.pushed_to(alice).await.len(), 2);
        assert_eq!(notifier.pushed_to(bob).await.len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_failure() {
        let notifier = InMemoryStatusNotifier::new();
        notifier.set_failing(true).await;
        assert!(notifier.push(&update(UserId::new())).await.is_err());
        assert!(notifier.pushed().await.is_empty());
    }
}
