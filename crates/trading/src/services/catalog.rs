//! Catalog lookup trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Gil, ItemId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::TradingError;

/// An item that can be bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub price: Gil,
}

impl CatalogItem {
    pub fn new(
        id: ItemId,
        name: impl Into<String>,
        description: impl Into<String>,
        price: Gil,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            price,
        }
    }
}

/// Read access to the catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Looks up one item. Returns None if the catalog has no such item.
    async fn get_item(&self, item_id: ItemId) -> Result<Option<CatalogItem>, TradingError>;

    /// Lists every catalog item.
    async fn list_items(&self) -> Result<Vec<CatalogItem>, TradingError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    items: HashMap<ItemId, CatalogItem>,
    unavailable: bool,
}

/// In-memory catalog for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an item.
    pub async fn add_item(&self, item: CatalogItem) {
        self.state.write().await.items.insert(item.id, item);
    }

    /// Makes every lookup fail as if the catalog store were down.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_item(&self, item_id: ItemId) -> Result<Option<CatalogItem>, TradingError> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(TradingError::CatalogUnavailable(
                "catalog store unreachable".to_string(),
            ));
        }
        Ok(state.items.get(&item_id).cloned())
    }

    async fn list_items(&self) -> Result<Vec<CatalogItem>, TradingError> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(TradingError::CatalogUnavailable(
                "catalog store unreachable".to_string(),
            ));
        }
        let mut items: Vec<_> = state.items.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_and_list_items() {
        let catalog = InMemoryCatalog::new();
        let potion = CatalogItem::new(ItemId::new(), "Potion", "Restores HP", Gil::from_whole(5));
        let antidote =
            CatalogItem::new(ItemId::new(), "Antidote", "Cures poison", Gil::from_whole(7));
        catalog.add_item(potion.clone()).await;
        catalog.add_item(antidote.clone()).await;

        assert_eq!(catalog.get_item(potion.id).await.unwrap(), Some(potion.clone()));
        assert_eq!(catalog.get_item(ItemId::new()).await.unwrap(), None);
        assert_eq!(catalog.list_items().await.unwrap(), vec![antidote, potion]);
    }

    #[tokio::test]
    async fn test_unavailable_catalog_is_transient() {
        let catalog = InMemoryCatalog::new();
        catalog.set_unavailable(true).await;

        let err = catalog.get_item(ItemId::new()).await.unwrap_err();
        assert!(matches!(err, TradingError::CatalogUnavailable(_)));
        assert!(!err.is_permanent());
    }
}
