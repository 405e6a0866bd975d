//! Total Calculator: unit price times quantity.

use common::{Gil, ItemId};

use crate::error::TradingError;
use crate::services::catalog::Catalog;

/// Resolves a catalog item's unit price and multiplies it by the quantity.
///
/// Fails with [`TradingError::UnknownItem`] if the catalog has no such item.
/// Unknown items, zero quantities and overflow are permanent failures;
/// catalog outages surface as transient errors.
#[tracing::instrument(skip(catalog))]
pub async fn calculate_total<C: Catalog + ?Sized>(
    catalog: &C,
    item_id: ItemId,
    quantity: u32,
) -> Result<Gil, TradingError> {
    if quantity == 0 {
        return Err(TradingError::InvalidQuantity(quantity));
    }

    let item = catalog
        .get_item(item_id)
        .await?
        .ok_or(TradingError::UnknownItem(item_id))?;

    item.price
        .checked_times(quantity)
        .ok_or(TradingError::TotalOverflow { item_id, quantity })
}
