//! Integration tests for message ingress, redelivery and the worker pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{CorrelationId, Gil, ItemId, UserId};
use saga_store::InMemorySagaStore;
use tokio::sync::mpsc;
use trading::{
    BusMessage, CatalogItem, CommandKind, Delivery, EventHandler, GetPurchaseState, Handled,
    InMemoryCatalog, InMemoryDeadLetters, InMemoryMessageBus, InMemoryStatusNotifier,
    InventoryItemsGranted, Ingress, PurchaseEvent, PurchaseOrchestrator, PurchaseRequested,
    RetryPolicy, SagaState, TradingConfig, TradingError, WorkerPool,
};

/// Fails the first `failures` calls with the error produced by `make_error`.
struct FlakyHandler {
    calls: AtomicU32,
    failures: u32,
    make_error: fn() -> TradingError,
}

impl FlakyHandler {
    fn new(failures: u32, make_error: fn() -> TradingError) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
            make_error,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for FlakyHandler {
    async fn handle(&self, _event: PurchaseEvent) -> trading::Result<Handled> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err((self.make_error)());
        }
        Ok(Handled::Ignored { state: None })
    }
}

fn bus_unavailable() -> TradingError {
    TradingError::Bus("connection reset".to_string())
}

fn unknown_item() -> TradingError {
    TradingError::UnknownItem(ItemId::new())
}

fn granted_message() -> BusMessage {
    BusMessage::from_event(&PurchaseEvent::InventoryItemsGranted(InventoryItemsGranted {
        correlation_id: CorrelationId::new(),
    }))
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_redelivered() {
    let handler = Arc::new(FlakyHandler::new(2, bus_unavailable));
    let dead_letters = InMemoryDeadLetters::new();
    let ingress = Ingress::new(
        Arc::clone(&handler),
        dead_letters.clone(),
        RetryPolicy::default(),
    );

    let delivery = ingress.deliver(granted_message()).await;

    assert_eq!(delivery, Delivery::Handled(Handled::Ignored { state: None }));
    assert_eq!(handler.calls(), 3);
    assert!(dead_letters.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_redelivery_is_dead_lettered() {
    let handler = Arc::new(FlakyHandler::new(u32::MAX, bus_unavailable));
    let dead_letters = InMemoryDeadLetters::new();
    let ingress = Ingress::new(
        Arc::clone(&handler),
        dead_letters.clone(),
        RetryPolicy::new(3, Duration::from_secs(5)),
    );
    let message = granted_message();

    let started = tokio::time::Instant::now();
    let delivery = ingress.deliver(message.clone()).await;

    assert!(matches!(delivery, Delivery::DeadLettered { attempts: 4, .. }));
    assert_eq!(handler.calls(), 4);
    assert!(started.elapsed() >= Duration::from_secs(15));

    let letters = dead_letters.letters().await;
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].message, message);
    assert_eq!(letters[0].attempts, 4);
    assert!(letters[0].error.contains("connection reset"));
}

#[tokio::test]
async fn test_permanent_failure_is_not_redelivered() {
    let handler = Arc::new(FlakyHandler::new(u32::MAX, unknown_item));
    let dead_letters = InMemoryDeadLetters::new();
    let ingress = Ingress::new(
        Arc::clone(&handler),
        dead_letters.clone(),
        RetryPolicy::new(3, Duration::from_secs(3600)),
    );

    let delivery = ingress.deliver(granted_message()).await;

    assert!(matches!(delivery, Delivery::DeadLettered { attempts: 1, .. }));
    assert_eq!(handler.calls(), 1);
    assert_eq!(dead_letters.len().await, 1);
}

#[tokio::test]
async fn test_unknown_message_type_is_dead_lettered_without_handling() {
    let handler = Arc::new(FlakyHandler::new(0, bus_unavailable));
    let dead_letters = InMemoryDeadLetters::new();
    let ingress = Ingress::new(Arc::clone(&handler), dead_letters.clone(), RetryPolicy::none());

    let delivery = ingress
        .deliver(BusMessage::new("OrderShipped", serde_json::json!({})))
        .await;

    let Delivery::DeadLettered { attempts, error } = delivery else {
        panic!("expected a dead letter");
    };
    assert_eq!(attempts, 1);
    assert_eq!(error, "Unknown message type 'OrderShipped'");
    assert_eq!(handler.calls(), 0);
}

// -- Through the orchestrator --

struct Service {
    orchestrator: Arc<
        PurchaseOrchestrator<
            InMemorySagaStore,
            InMemoryCatalog,
            InMemoryMessageBus,
            InMemoryStatusNotifier,
        >,
    >,
    store: InMemorySagaStore,
    bus: InMemoryMessageBus,
    item_id: ItemId,
}

impl Service {
    async fn new() -> Self {
        let store = InMemorySagaStore::new();
        let catalog = InMemoryCatalog::new();
        let bus = InMemoryMessageBus::new();
        let item_id = ItemId::new();
        catalog
            .add_item(CatalogItem::new(item_id, "Ether", "Restores MP", Gil::from_whole(15)))
            .await;

        let orchestrator = Arc::new(PurchaseOrchestrator::new(
            store.clone(),
            catalog,
            bus.clone(),
            InMemoryStatusNotifier::new(),
            TradingConfig::default(),
        ));

        Self {
            orchestrator,
            store,
            bus,
            item_id,
        }
    }

    fn request(&self, correlation_id: CorrelationId) -> BusMessage {
        BusMessage::from_event(&PurchaseEvent::PurchaseRequested(PurchaseRequested {
            user_id: UserId::new(),
            item_id: self.item_id,
            quantity: 1,
            correlation_id,
        }))
        .unwrap()
    }

    async fn state(&self, correlation_id: CorrelationId) -> Option<SagaState> {
        self.orchestrator
            .get_purchase_state(GetPurchaseState { correlation_id })
            .await
            .unwrap()
            .map(|s| s.current_state())
    }
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_recovers_on_redelivery() {
    let service = Service::new().await;
    let ingress = Ingress::new(
        Arc::clone(&service.orchestrator),
        InMemoryDeadLetters::new(),
        RetryPolicy::default(),
    );
    let id = CorrelationId::new();
    service.store.fail_next_saves(2).await;

    let delivery = ingress.deliver(service.request(id)).await;

    assert_eq!(
        delivery,
        Delivery::Handled(Handled::Transitioned {
            from: SagaState::Initial,
            to: SagaState::Accepted
        })
    );
    assert_eq!(service.bus.count_of(CommandKind::GrantItems).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_drains_channel() {
    let service = Service::new().await;
    let ingress = Arc::new(Ingress::new(
        Arc::clone(&service.orchestrator),
        InMemoryDeadLetters::new(),
        RetryPolicy::none(),
    ));
    let (sender, receiver) = mpsc::channel(64);
    let pool = WorkerPool::spawn(ingress, receiver, 4);
    assert_eq!(pool.len(), 4);

    let ids: Vec<CorrelationId> = (0..20).map(|_| CorrelationId::new()).collect();
    for id in &ids {
        sender.send(service.request(*id)).await.unwrap();
    }
    drop(sender);
    pool.join().await;

    assert_eq!(service.bus.count_of(CommandKind::GrantItems).await, 20);
    for id in ids {
        assert_eq!(service.state(id).await, Some(SagaState::Accepted));
    }
}
