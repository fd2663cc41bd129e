//! # Collaborator Ports
//!
//! The market never owns money or player items. Trades go through these
//! traits so the host game can plug in its own economy and inventory.

use thiserror::Error;

use crate::fixed_point::Price;
use crate::item::CommodityId;
use crate::record::ItemRecord;

/// Identifier of a trading actor (player or NPC account).
pub type ActorId = u64;

/// Currency ledger.
pub trait Ledger {
    /// Takes `amount` from `account`. Returns false, changing nothing, if the
    /// balance is too low.
    fn withdraw(&mut self, account: ActorId, amount: Price) -> bool;

    /// Credits `amount` to `account`.
    fn deposit(&mut self, account: ActorId, amount: Price);

    /// Current balance of `account`.
    fn balance(&self, account: ActorId) -> Price;
}

/// Player item storage.
pub trait InventoryProvider {
    /// Units of `commodity` held by `actor`.
    fn count_held(&self, actor: ActorId, commodity: CommodityId) -> u32;

    /// Places up to `amount` units and returns how many were placed.
    fn add(&mut self, actor: ActorId, commodity: CommodityId, amount: u32) -> u32;

    /// Removes exactly `amount` units. Returns false, changing nothing, if
    /// the actor holds fewer.
    fn remove(&mut self, actor: ActorId, commodity: CommodityId, amount: u32) -> bool;
}

/// Failure reported by a [`MarketStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Sink for persisted market state.
pub trait MarketStore {
    /// Writes a full snapshot of every listed item.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the snapshot could not be written.
    fn save(&mut self, records: &[ItemRecord]) -> Result<(), StoreError>;
}

impl MarketStore for Vec<ItemRecord> {
    fn save(&mut self, records: &[ItemRecord]) -> Result<(), StoreError> {
        self.clear();
        self.extend_from_slice(records);
        Ok(())
    }
}
