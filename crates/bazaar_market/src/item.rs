//! # Market Items
//!
//! One `MarketItem` per tradable commodity. Fields are private: prices and
//! stock only change through trades, equilibrium changes and scheduler
//! ticks, all of which live in this crate.

use std::collections::VecDeque;

use crate::config::MarketConfig;
use crate::error::{MarketError, MarketResult};
use crate::fixed_point::{Fixed, Price};

/// Unique identifier for a tradable commodity.
pub type CommodityId = u32;

/// Category (shop tab) a commodity is listed under.
pub type CategoryId = u32;

/// Milliseconds since the Unix epoch, as supplied by the game loop.
pub type Millis = u64;

/// Number of past prices kept per item.
pub const PRICE_HISTORY_CAPACITY: usize = 10;

/// Lowest regeneration rate the scheduler will use (1% of base stock).
pub const MIN_REGEN_RATE: Fixed = Fixed::from_raw(10_000_000_000_000_000);

/// Past prices of an item, newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PriceHistory(VecDeque<Price>);

impl PriceHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self(VecDeque::with_capacity(PRICE_HISTORY_CAPACITY + 1))
    }

    /// Builds a history from prices ordered newest first, keeping at most
    /// `PRICE_HISTORY_CAPACITY` of them.
    #[must_use]
    pub fn from_newest_first(prices: impl IntoIterator<Item = Price>) -> Self {
        let mut history = Self::new();
        history
            .0
            .extend(prices.into_iter().take(PRICE_HISTORY_CAPACITY));
        history
    }

    /// Records a new price at the front, dropping the oldest beyond capacity.
    pub fn push(&mut self, price: Price) {
        self.0.push_front(price);
        self.0.truncate(PRICE_HISTORY_CAPACITY);
    }

    /// The most recent price.
    #[must_use]
    pub fn latest(&self) -> Option<Price> {
        self.0.front().copied()
    }

    /// Number of recorded prices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no price has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates newest first.
    pub fn iter(&self) -> impl Iterator<Item = Price> + '_ {
        self.0.iter().copied()
    }

    /// Copies the history into a vector, newest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Price> {
        self.0.iter().copied().collect()
    }
}

/// Price, stock and scheduling state of one commodity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarketItem {
    category: CategoryId,
    commodity: CommodityId,
    /// Menu slot, carried for the GUI only.
    slot: Option<u32>,
    base_price: Price,
    current_price: Price,
    price_variation: Fixed,
    tax_rate: Fixed,
    base_stock: u32,
    current_stock: u32,
    stock_regen_rate: Fixed,
    next_update_time: Option<Millis>,
    last_activity: Millis,
    history: PriceHistory,
}

impl MarketItem {
    /// Creates an item at equilibrium: current price and stock equal their
    /// base values, no variation, no tax, minimum regeneration rate.
    #[must_use]
    pub fn new(
        category: CategoryId,
        commodity: CommodityId,
        base_price: Price,
        base_stock: u32,
    ) -> Self {
        Self {
            category,
            commodity,
            slot: None,
            base_price,
            current_price: base_price,
            price_variation: Fixed::ZERO,
            tax_rate: Fixed::ZERO,
            base_stock,
            current_stock: base_stock,
            stock_regen_rate: MIN_REGEN_RATE,
            next_update_time: None,
            last_activity: 0,
            history: PriceHistory::new(),
        }
    }

    /// Sets the display slot.
    #[must_use]
    pub fn with_slot(mut self, slot: u32) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Sets the per-unit price variation.
    #[must_use]
    pub fn with_variation(mut self, variation: Fixed) -> Self {
        self.price_variation = variation;
        self
    }

    /// Sets the tax rate.
    #[must_use]
    pub fn with_tax_rate(mut self, tax_rate: Fixed) -> Self {
        self.tax_rate = tax_rate;
        self
    }

    /// Sets the stock regeneration rate.
    #[must_use]
    pub fn with_regen_rate(mut self, rate: Fixed) -> Self {
        self.stock_regen_rate = rate;
        self
    }

    /// Sets the current price.
    #[must_use]
    pub fn with_current_price(mut self, price: Price) -> Self {
        self.current_price = price;
        self
    }

    /// Sets the current stock.
    #[must_use]
    pub fn with_current_stock(mut self, stock: u32) -> Self {
        self.current_stock = stock;
        self
    }

    /// Sets the last activity timestamp.
    #[must_use]
    pub fn with_last_activity(mut self, at: Millis) -> Self {
        self.last_activity = at;
        self
    }

    /// Replaces the price history.
    #[must_use]
    pub fn with_history(mut self, history: PriceHistory) -> Self {
        self.history = history;
        self
    }

    /// Sets the persisted due time. The scheduler honours it on load.
    #[must_use]
    pub fn with_next_update_time(mut self, at: Option<Millis>) -> Self {
        self.next_update_time = at;
        self
    }

    /// Category id.
    #[inline]
    #[must_use]
    pub const fn category(&self) -> CategoryId {
        self.category
    }

    /// Commodity id.
    #[inline]
    #[must_use]
    pub const fn commodity(&self) -> CommodityId {
        self.commodity
    }

    /// Display slot.
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> Option<u32> {
        self.slot
    }

    /// Equilibrium price.
    #[inline]
    #[must_use]
    pub const fn base_price(&self) -> Price {
        self.base_price
    }

    /// Current unit price.
    #[inline]
    #[must_use]
    pub const fn current_price(&self) -> Price {
        self.current_price
    }

    /// Per-unit price variation.
    #[inline]
    #[must_use]
    pub const fn price_variation(&self) -> Fixed {
        self.price_variation
    }

    /// Tax rate.
    #[inline]
    #[must_use]
    pub const fn tax_rate(&self) -> Fixed {
        self.tax_rate
    }

    /// Equilibrium stock.
    #[inline]
    #[must_use]
    pub const fn base_stock(&self) -> u32 {
        self.base_stock
    }

    /// Current stock.
    #[inline]
    #[must_use]
    pub const fn current_stock(&self) -> u32 {
        self.current_stock
    }

    /// Configured regeneration rate (before the 1% minimum is applied).
    #[inline]
    #[must_use]
    pub const fn stock_regen_rate(&self) -> Fixed {
        self.stock_regen_rate
    }

    /// Regeneration rate the scheduler uses.
    #[must_use]
    pub fn effective_regen_rate(&self) -> Fixed {
        self.stock_regen_rate.max(MIN_REGEN_RATE)
    }

    /// Due time of the next regeneration step, while pending.
    #[inline]
    #[must_use]
    pub const fn next_update_time(&self) -> Option<Millis> {
        self.next_update_time
    }

    /// Time of the last trade.
    #[inline]
    #[must_use]
    pub const fn last_activity(&self) -> Millis {
        self.last_activity
    }

    /// Past prices, newest first.
    #[inline]
    #[must_use]
    pub const fn history(&self) -> &PriceHistory {
        &self.history
    }

    /// Returns true if stock equals the equilibrium.
    #[inline]
    #[must_use]
    pub const fn is_at_equilibrium(&self) -> bool {
        self.current_stock == self.base_stock
    }

    /// Stock held above equilibrium.
    #[inline]
    #[must_use]
    pub const fn stock_surplus(&self) -> u32 {
        self.current_stock.saturating_sub(self.base_stock)
    }

    /// Checks the item against the market invariants.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidItem` naming the violated invariant.
    pub fn validate(&self, config: &MarketConfig) -> MarketResult<()> {
        let invalid = |reason: String| MarketError::InvalidItem {
            commodity: self.commodity,
            reason,
        };
        if self.price_variation.is_negative() || self.price_variation >= Fixed::ONE {
            return Err(invalid(format!(
                "price variation {} outside [0, 1)",
                self.price_variation
            )));
        }
        if self.tax_rate.is_negative() || self.tax_rate > Fixed::ONE {
            return Err(invalid(format!("tax rate {} outside [0, 1]", self.tax_rate)));
        }
        if self.stock_regen_rate.is_negative() {
            return Err(invalid(format!(
                "negative stock regen rate {}",
                self.stock_regen_rate
            )));
        }
        if self.base_price < config.minimum_price {
            return Err(invalid(format!(
                "base price {} below minimum {}",
                self.base_price, config.minimum_price
            )));
        }
        if self.current_price < config.minimum_price {
            return Err(invalid(format!(
                "current price {} below minimum {}",
                self.current_price, config.minimum_price
            )));
        }
        let max_stock = config.max_stock(self.base_stock);
        if self.current_stock > max_stock {
            return Err(invalid(format!(
                "current stock {} above cap {max_stock}",
                self.current_stock
            )));
        }
        Ok(())
    }

    /// Applies the result of a trade.
    pub(crate) fn apply_trade(&mut self, new_price: Price, new_stock: u32, now: Millis) {
        self.record_price(new_price);
        self.current_stock = new_stock;
        self.last_activity = now;
    }

    /// Applies one regeneration step.
    pub(crate) fn apply_regen(&mut self, new_price: Price, new_stock: u32) {
        self.record_price(new_price);
        self.current_stock = new_stock;
    }

    /// Moves the equilibrium. `current_stock` must already fit the new cap.
    pub(crate) fn apply_equilibrium(&mut self, base_stock: u32, tax_rate: Fixed, current_stock: u32) {
        self.base_stock = base_stock;
        self.tax_rate = tax_rate;
        self.current_stock = current_stock;
    }

    pub(crate) fn set_next_update_time(&mut self, at: Option<Millis>) {
        self.next_update_time = at;
    }

    fn record_price(&mut self, price: Price) {
        self.current_price = price;
        self.history.push(price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fx(s: &str) -> Fixed {
        s.parse().unwrap()
    }

    #[test]
    fn test_new_item_is_at_equilibrium() {
        let item = MarketItem::new(1, 7, Price::from_minor(100), 2000);
        assert!(item.is_at_equilibrium());
        assert_eq!(item.current_price(), item.base_price());
        assert_eq!(item.next_update_time(), None);
        assert!(item.history().is_empty());
    }

    #[test]
    fn test_history_is_newest_first_and_bounded() {
        let mut history = PriceHistory::new();
        for minor in 1..=15 {
            history.push(Price::from_minor(minor));
        }
        assert_eq!(history.len(), PRICE_HISTORY_CAPACITY);
        assert_eq!(history.latest(), Some(Price::from_minor(15)));
        assert_eq!(history.to_vec().last(), Some(&Price::from_minor(6)));
    }

    #[test]
    fn test_history_from_long_list_is_truncated() {
        let history = PriceHistory::from_newest_first((0..20).map(Price::from_minor));
        assert_eq!(history.len(), PRICE_HISTORY_CAPACITY);
        assert_eq!(history.latest(), Some(Price::from_minor(0)));
    }

    #[test]
    fn test_apply_trade_records_price() {
        let mut item = MarketItem::new(1, 7, Price::from_minor(100), 2000);
        item.apply_trade(Price::from_minor(110), 1990, 42);
        assert_eq!(item.current_price(), Price::from_minor(110));
        assert_eq!(item.current_stock(), 1990);
        assert_eq!(item.last_activity(), 42);
        assert_eq!(item.history().latest(), Some(Price::from_minor(110)));
    }

    #[test]
    fn test_effective_regen_rate_has_floor() {
        let item = MarketItem::new(1, 7, Price::from_minor(100), 2000).with_regen_rate(fx("0.001"));
        assert_eq!(item.effective_regen_rate(), MIN_REGEN_RATE);
        let item = item.with_regen_rate(fx("0.05"));
        assert_eq!(item.effective_regen_rate(), fx("0.05"));
    }

    #[test]
    fn test_validate() {
        let config = MarketConfig::default();
        let item = MarketItem::new(1, 7, Price::from_minor(100), 2000);
        assert!(item.clone().with_variation(fx("0.99")).validate(&config).is_ok());
        assert!(item.clone().with_variation(Fixed::ONE).validate(&config).is_err());
        assert!(item.clone().with_tax_rate(fx("1.01")).validate(&config).is_err());
        assert!(item.clone().with_current_stock(4001).validate(&config).is_err());
        assert!(item.clone().with_current_stock(4000).validate(&config).is_ok());
        assert!(item.with_current_price(Price::ZERO).validate(&config).is_err());
    }

    #[test]
    fn test_stock_surplus() {
        let item = MarketItem::new(1, 7, Price::from_minor(100), 2000).with_current_stock(2300);
        assert_eq!(item.stock_surplus(), 300);
        assert_eq!(item.with_current_stock(100).stock_surplus(), 0);
    }
}
