//! External collaborator traits and in-memory implementations.

pub mod bus;
pub mod catalog;
pub mod dead_letter;
pub mod notifier;
pub mod store_view;

pub use bus::{InMemoryMessageBus, MessageBus, SentCommand};
pub use catalog::{Catalog, CatalogItem, InMemoryCatalog};
pub use dead_letter::{DeadLetter, DeadLetterSink, InMemoryDeadLetters};
pub use notifier::{BroadcastNotifier, InMemoryStatusNotifier, StatusNotifier};
pub use store_view::{
    BalanceReader, InMemoryBalances, InMemoryInventory, InventoryEntry, InventoryReader,
    StoreItem, StoreSnapshot, StoreView,
};
