//! Read-side view of the store: every catalog item with the user's holdings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Gil, ItemId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::TradingError;
use crate::services::catalog::Catalog;

/// Quantity of one catalog item a user owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub catalog_item_id: ItemId,
    pub quantity: u32,
}

/// Read access to users' inventories.
#[async_trait]
pub trait InventoryReader: Send + Sync {
    async fn items_for_user(&self, user_id: UserId) -> Result<Vec<InventoryEntry>, TradingError>;
}

/// Read access to users' gil balances.
#[async_trait]
pub trait BalanceReader: Send + Sync {
    /// Returns None for a user the identity store does not know.
    async fn gil_for_user(&self, user_id: UserId) -> Result<Option<Gil>, TradingError>;
}

/// One row of the store view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreItem {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub price: Gil,
    pub owned_quantity: u32,
}

/// The store as seen by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub items: Vec<StoreItem>,
    pub user_gil: Gil,
}

/// Joins the catalog with one user's inventory and balance.
pub struct StoreView<C, I, B>
where
    C: Catalog,
    I: InventoryReader,
    B: BalanceReader,
{
    catalog: C,
    inventory: I,
    balances: B,
}

impl<C, I, B> StoreView<C, I, B>
where
    C: Catalog,
    I: InventoryReader,
    B: BalanceReader,
{
    pub fn new(catalog: C, inventory: I, balances: B) -> Self {
        Self {
            catalog,
            inventory,
            balances,
        }
    }

    /// Builds the store view for a user.
    ///
    /// Items the user does not own show a quantity of 0; an unknown user has 0 gil.
    #[tracing::instrument(skip(self))]
    pub async fn snapshot(&self, user_id: UserId) -> Result<StoreSnapshot, TradingError> {
        let catalog_items = self.catalog.list_items().await?;
        let owned: HashMap<ItemId, u32> = self
            .inventory
            .items_for_user(user_id)
            .await?
            .into_iter()
            .map(|entry| (entry.catalog_item_id, entry.quantity))
            .collect();
        let user_gil = self
            .balances
            .gil_for_user(user_id)
            .await?
            .unwrap_or_else(Gil::zero);

        let items = catalog_items
            .into_iter()
            .map(|item| StoreItem {
                owned_quantity: owned.get(&item.id).copied().unwrap_or(0),
                id: item.id,
                name: item.name,
                description: item.description,
                price: item.price,
            })
            .collect();

        Ok(StoreSnapshot { items, user_gil })
    }
}

/// In-memory inventory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    entries: Arc<RwLock<HashMap<UserId, HashMap<ItemId, u32>>>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many units of an item a user owns.
    pub async fn set_quantity(&self, user_id: UserId, item_id: ItemId, quantity: u32) {
        self.entries
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(item_id, quantity);
    }
}

#[async_trait]
impl InventoryReader for InMemoryInventory {
    async fn items_for_user(&self, user_id: UserId) -> Result<Vec<InventoryEntry>, TradingError> {
        Ok(self
            .entries
            .read()
            .await
            .get(&user_id)
            .map(|items| {
                items
                    .iter()
                    .map(|(id, quantity)| InventoryEntry {
                        catalog_item_id: *id,
                        quantity: *quantity,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// In-memory identity store holding gil balances.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBalances {
    balances: Arc<RwLock<HashMap<UserId, Gil>>>,
}

impl InMemoryBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_gil(&self, user_id: UserId, gil: Gil) {
        self.balances.write().await.insert(user_id, gil);
    }
}

#[async_trait]
impl BalanceReader for InMemoryBalances {
    async fn gil_for_user(&self, user_id: UserId) -> Result<Option<Gil>, TradingError> {
        Ok(self.balances.read().await.get(&user_id).copied())
    }
}
