//! # Persisted Item Records
//!
//! Flat, serde-friendly form of a [`MarketItem`] as written by a
//! [`MarketStore`](crate::ports::MarketStore). `stock_surplus` is derived on
//! save and ignored on load.

use serde::{Deserialize, Serialize};

use crate::fixed_point::{Fixed, Price};
use crate::item::{CategoryId, CommodityId, MarketItem, Millis, PriceHistory, MIN_REGEN_RATE};

/// One persisted market item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Display category.
    pub category: CategoryId,
    /// Commodity id.
    pub commodity: CommodityId,
    /// Shop display slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
    /// Equilibrium price.
    pub base_price: Price,
    /// Price of the next unit.
    pub current_price: Price,
    /// Per-unit price variation.
    #[serde(default)]
    pub price_variation: Fixed,
    /// Tax on sell proceeds.
    #[serde(default)]
    pub tax_rate: Fixed,
    /// Equilibrium stock.
    pub base_stock: u32,
    /// Stock on hand.
    pub current_stock: u32,
    /// Fraction of the base stock restored per step.
    #[serde(default = "default_regen_rate")]
    pub stock_regen_rate: Fixed,
    /// Pending regeneration time, if scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_update_time: Option<Millis>,
    /// Stock above equilibrium at save time.
    #[serde(default)]
    pub stock_surplus: u32,
    /// Time of the last trade.
    #[serde(default)]
    pub last_activity: Millis,
    /// Recent unit prices, newest first.
    #[serde(default)]
    pub price_history: Vec<Price>,
}

const fn default_regen_rate() -> Fixed {
    MIN_REGEN_RATE
}

impl From<&MarketItem> for ItemRecord {
    fn from(item: &MarketItem) -> Self {
        Self {
            category: item.category(),
            commodity: item.commodity(),
            slot: item.slot(),
            base_price: item.base_price(),
            current_price: item.current_price(),
            price_variation: item.price_variation(),
            tax_rate: item.tax_rate(),
            base_stock: item.base_stock(),
            current_stock: item.current_stock(),
            stock_regen_rate: item.stock_regen_rate(),
            next_update_time: item.next_update_time(),
            stock_surplus: item.stock_surplus(),
            last_activity: item.last_activity(),
            price_history: item.history().to_vec(),
        }
    }
}

impl From<ItemRecord> for MarketItem {
    fn from(record: ItemRecord) -> Self {
        let item = Self::new(
            record.category,
            record.commodity,
            record.base_price,
            record.base_stock,
        )
        .with_current_price(record.current_price)
        .with_variation(record.price_variation)
        .with_tax_rate(record.tax_rate)
        .with_current_stock(record.current_stock)
        .with_regen_rate(record.stock_regen_rate)
        .with_last_activity(record.last_activity)
        .with_history(PriceHistory::from_newest_first(record.price_history))
        .with_next_update_time(record.next_update_time);
        match record.slot {
            Some(slot) => item.with_slot(slot),
            None => item,
        }
    }
}
