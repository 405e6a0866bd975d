//! Purchase saga orchestration for the trading service.
//!
//! A user buys a quantity of a catalog item with gil. Granting the items and
//! debiting the gil are done by other services over the message bus; this
//! crate drives the saga that ties the two together:
//!
//! 1. `PurchaseRequested`: price the purchase and send `GrantItems`
//! 2. `InventoryItemsGranted`: send `DebitGil`
//! 3. `GilDebited`: complete
//!
//! A failed grant faults the saga. A failed debit faults it and sends the
//! compensating `SubtractItems`. Every transition is persisted under an
//! optimistic-concurrency version before any message leaves the outbox.

pub mod calculator;
pub mod config;
pub mod error;
pub mod ingress;
pub mod machine;
pub mod messages;
pub mod orchestrator;
pub mod outbox;
pub mod record;
pub mod services;
pub mod state;
pub mod worker;

pub use calculator::calculate_total;
pub use config::{Endpoints, RetryPolicy, TradingConfig};
pub use error::{Result, TradingError};
pub use ingress::{BusMessage, Delivery, Ingress};
pub use machine::{Pricing, Rule, Transition};
pub use messages::{
    CommandKind, DebitGil, EventKind, ExceptionInfo, Fault, GetPurchaseState, GilDebited,
    GrantItems, InventoryItemsGranted, PurchaseEvent, PurchaseRequested, PurchaseStatusUpdate,
    SubtractItems, TradingCommand,
};
pub use orchestrator::{EventHandler, Handled, PurchaseOrchestrator};
pub use outbox::{FlushReport, OutboundMessage, Outbox};
pub use record::{PurchaseSaga, SAGA_TYPE};
pub use services::{
    BalanceReader, BroadcastNotifier, Catalog, CatalogItem, DeadLetter, DeadLetterSink,
    InMemoryBalances, InMemoryCatalog, InMemoryDeadLetters, InMemoryInventory,
    InMemoryMessageBus, InMemoryStatusNotifier, InventoryEntry, InventoryReader, MessageBus,
    SentCommand, StatusNotifier, StoreItem, StoreSnapshot, StoreView,
};
pub use state::SagaState;
pub use worker::WorkerPool;
