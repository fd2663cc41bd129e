//! # Stock Scheduler
//!
//! **Only items away from equilibrium cost anything per tick.**
//!
//! Every item whose stock differs from its base stock sits in one indexed
//! priority queue keyed by commodity id and ordered by due time. Scheduling
//! an item that is already pending updates its key in place, so there is no
//! separate membership set to keep in sync.
//!
//! ## Regeneration step
//!
//! ```text
//! delta      = base - current
//! max_step   = round(base * max(regen_rate, 1%))
//! adjustment = sign(delta) * clamp(max_step, 1, |delta|)
//! new_stock  = clamp(current + adjustment, 0, max_stock)
//!
//! price     *= (1 - tax)   if stock rose
//! price     *= (1 + tax)   if stock fell
//! price      = base_price  if new_stock == base
//! ```
//!
//! An item is rescheduled one interval after the tick that processed it
//! until it reaches equilibrium.

use std::cmp::Reverse;
use std::collections::HashMap;

use priority_queue::PriorityQueue;

use crate::config::MarketConfig;
use crate::error::{MarketError, MarketResult};
use crate::fixed_point::{Fixed, Price};
use crate::item::{CommodityId, MarketItem, Millis};
use crate::notifier::{MarketEvent, UpdateNotifier};
use crate::pricing::PricingEngine;

/// Outcome of one regeneration step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegenStep {
    /// Stock after the step.
    pub stock: u32,
    /// Unit price after the step.
    pub price: Price,
}

/// Summary of a `process_due` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Items that took a regeneration step.
    pub processed: usize,
    /// Items that reached equilibrium and left the queue.
    pub settled: usize,
    /// Items whose step failed; they stay scheduled unchanged.
    pub failed: usize,
    /// Items still pending after the tick.
    pub pending: usize,
}

/// Due-time ordering key. Ties pop in ascending commodity order.
type DueKey = Reverse<(Millis, CommodityId)>;

/// Schedules and executes stock regeneration.
#[derive(Debug)]
pub struct StockScheduler {
    queue: PriorityQueue<CommodityId, DueKey>,
    interval_ms: u64,
    engine: PricingEngine,
    config: MarketConfig,
}

impl StockScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new(config: &MarketConfig) -> Self {
        Self {
            queue: PriorityQueue::new(),
            // Rescheduled entries must land strictly after the tick's `now`.
            interval_ms: config.update_interval_ms().max(1),
            engine: PricingEngine::new(config),
            config: config.clone(),
        }
    }

    /// Schedules `item` one interval after `now`, or unschedules it if it is
    /// at equilibrium.
    ///
    /// Returns true if the item is pending afterwards.
    pub fn mark_for_update(&mut self, item: &mut MarketItem, now: Millis) -> bool {
        if item.is_at_equilibrium() {
            if self.queue.remove(&item.commodity()).is_some() {
                tracing::debug!(commodity = item.commodity(), "left schedule at equilibrium");
            }
            item.set_next_update_time(None);
            return false;
        }
        self.schedule_at(item, now.saturating_add(self.interval_ms));
        true
    }

    /// Schedules a non-equilibrium item at an explicit due time.
    pub(crate) fn schedule_at(&mut self, item: &mut MarketItem, due: Millis) {
        let commodity = item.commodity();
        // Inserts, or updates the key of an entry already present.
        match self.queue.push(commodity, Reverse((due, commodity))) {
            Some(Reverse((previous, _))) => {
                tracing::debug!(commodity, previous, due, "rescheduled stock update");
            }
            None => tracing::debug!(commodity, due, "scheduled stock update"),
        }
        item.set_next_update_time(Some(due));
    }

    /// Runs every step due at `now`.
    ///
    /// Items processed here are rescheduled strictly after `now`, so each
    /// pending item steps at most once per call.
    pub fn process_due(
        &mut self,
        items: &mut HashMap<CommodityId, MarketItem>,
        now: Millis,
        notifier: &UpdateNotifier,
    ) -> TickReport {
        let mut report = TickReport::default();

        while self.next_due().is_some_and(|(_, due)| due <= now) {
            let Some((commodity, _)) = self.queue.pop() else {
                break;
            };

            let Some(item) = items.get_mut(&commodity) else {
                tracing::warn!(commodity, "dropping schedule entry for unlisted commodity");
                continue;
            };
            if item.is_at_equilibrium() {
                item.set_next_update_time(None);
                continue;
            }

            let max_stock = self.config.max_stock(item.base_stock());
            match regen_step(item, &self.engine, max_stock) {
                Ok(step) => {
                    item.apply_regen(step.price, step.stock);
                    report.processed += 1;

                    let reached_equilibrium = item.is_at_equilibrium();
                    if reached_equilibrium {
                        item.set_next_update_time(None);
                        report.settled += 1;
                    } else {
                        self.schedule_at(item, now.saturating_add(self.interval_ms));
                    }
                    tracing::debug!(
                        commodity,
                        stock = step.stock,
                        price = step.price.minor(),
                        reached_equilibrium,
                        "stock regenerated"
                    );
                    notifier.notify(&MarketEvent::Regenerated {
                        commodity,
                        price: step.price,
                        stock: step.stock,
                        reached_equilibrium,
                    });
                }
                Err(e) => {
                    tracing::error!(commodity, error = %e, "stock regeneration failed");
                    report.failed += 1;
                    self.schedule_at(item, now.saturating_add(self.interval_ms));
                }
            }
        }

        report.pending = self.queue.len();
        report
    }

    /// Returns true if the commodity is scheduled.
    #[must_use]
    pub fn is_pending(&self, commodity: CommodityId) -> bool {
        self.queue.get(&commodity).is_some()
    }

    /// Number of pending items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if every item is at equilibrium.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The earliest pending item and its due time.
    #[must_use]
    pub fn next_due(&self) -> Option<(CommodityId, Millis)> {
        self.queue
            .peek()
            .map(|(id, Reverse((due, _)))| (*id, *due))
    }

    /// Pending commodities in no particular order.
    pub fn pending(&self) -> impl Iterator<Item = CommodityId> + '_ {
        self.queue.iter().map(|(id, _)| *id)
    }
}

/// Computes one regeneration step for a pending item.
///
/// # Errors
///
/// Returns `MarketError::ArithmeticOverflow` if the stock step or the new
/// price is not representable.
pub fn regen_step(
    item: &MarketItem,
    engine: &PricingEngine,
    max_stock: u32,
) -> MarketResult<RegenStep> {
    let base = i64::from(item.base_stock());
    let current = i64::from(item.current_stock());
    let delta = base - current;

    let max_step = Fixed::from_int(base)
        .checked_mul(item.effective_regen_rate())
        .and_then(Fixed::round_to_int)
        .ok_or(MarketError::ArithmeticOverflow)?;
    let adjustment = delta.signum() * max_step.clamp(1, delta.abs().max(1));

    let new_stock = (current + adjustment).clamp(0, i64::from(max_stock));
    let new_stock = u32::try_from(new_stock).map_err(|_| MarketError::ArithmeticOverflow)?;

    let price = if new_stock == item.base_stock() {
        item.base_price()
    } else {
        let tax = item.tax_rate();
        let factor = if adjustment > 0 {
            Fixed::ONE.checked_sub(tax)
        } else {
            Fixed::ONE.checked_add(tax)
        }
        .ok_or(MarketError::ArithmeticOverflow)?;
        engine.scale_price(item.current_price(), factor)?
    };

    Ok(RegenStep {
        stock: new_stock,
        price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const INTERVAL_MS: u64 = 600_000;

    fn fx(s: &str) -> Fixed {
        s.parse().unwrap()
    }

    fn item(commodity: CommodityId, base: u32, current: u32) -> MarketItem {
        MarketItem::new(1, commodity, Price::from_minor(100), base)
            .with_current_stock(current)
            .with_regen_rate(fx("0.05"))
            .with_tax_rate(fx("0.1"))
    }

    fn setup(items: Vec<MarketItem>) -> (StockScheduler, HashMap<CommodityId, MarketItem>) {
        let scheduler = StockScheduler::new(&MarketConfig::default());
        let map = items.into_iter().map(|i| (i.commodity(), i)).collect();
        (scheduler, map)
    }

    fn mark(scheduler: &mut StockScheduler, items: &mut HashMap<CommodityId, MarketItem>, id: CommodityId, now: Millis) -> bool {
        scheduler.mark_for_update(items.get_mut(&id).unwrap(), now)
    }

    #[test]
    fn test_equilibrium_item_is_not_scheduled() {
        let (mut scheduler, mut items) = setup(vec![item(1, 2000, 2000)]);
        assert!(!mark(&mut scheduler, &mut items, 1, 0));
        assert!(!scheduler.is_pending(1));
        assert!(scheduler.is_empty());
        assert_eq!(items[&1].next_update_time(), None);
    }

    #[test]
    fn test_step_toward_equilibrium_from_below() {
        let (mut scheduler, mut items) = setup(vec![item(1, 2000, 1500)]);
        assert!(mark(&mut scheduler, &mut items, 1, 0));
        assert_eq!(items[&1].next_update_time(), Some(INTERVAL_MS));

        let notifier = UpdateNotifier::new();
        let report = scheduler.process_due(&mut items, INTERVAL_MS, &notifier);

        assert_eq!(report.processed, 1);
        let item = &items[&1];
        // round(2000 * 5%) = 100 units per step.
        assert_eq!(item.current_stock(), 1600);
        // Rising stock: price * (1 - 0.1).
        assert_eq!(item.current_price(), Price::from_minor(90));
        assert_eq!(item.history().latest(), Some(Price::from_minor(90)));
        assert_eq!(item.next_update_time(), Some(2 * INTERVAL_MS));
        assert!(scheduler.is_pending(1));
    }

    #[test]
    fn test_step_from_above_raises_price() {
        let (mut scheduler, mut items) = setup(vec![item(1, 2000, 2500)]);
        mark(&mut scheduler, &mut items, 1, 0);
        scheduler.process_due(&mut items, INTERVAL_MS, &UpdateNotifier::new());
        assert_eq!(items[&1].current_stock(), 2400);
        assert_eq!(items[&1].current_price(), Price::from_minor(110));
    }

    #[test]
    fn test_reaching_equilibrium_resets_price() {
        let start = item(1, 2000, 1950).with_current_price(Price::from_minor(375));
        let (mut scheduler, mut items) = setup(vec![start]);
        mark(&mut scheduler, &mut items, 1, 0);

        let report = scheduler.process_due(&mut items, INTERVAL_MS, &UpdateNotifier::new());

        assert_eq!(report.settled, 1);
        let item = &items[&1];
        // Step capped at the remaining 50 units, price back to base.
        assert_eq!(item.current_stock(), 2000);
        assert_eq!(item.current_price(), item.base_price());
        assert_eq!(item.next_update_time(), None);
        assert!(!scheduler.is_pending(1));
    }

    #[test]
    fn test_step_is_at_least_one_unit() {
        let tiny = item(1, 10, 4).with_regen_rate(fx("0.01"));
        let (mut scheduler, mut items) = setup(vec![tiny]);
        mark(&mut scheduler, &mut items, 1, 0);
        scheduler.process_due(&mut items, INTERVAL_MS, &UpdateNotifier::new());
        // round(10 * 1%) = 0, raised to one unit.
        assert_eq!(items[&1].current_stock(), 5);
    }

    #[test]
    fn test_regen_rate_floor_applies() {
        let slow = item(1, 1000, 0).with_regen_rate(Fixed::ZERO);
        let step = regen_step(&slow, &PricingEngine::new(&MarketConfig::default()), 2000).unwrap();
        assert_eq!(step.stock, 10);
    }

    #[test]
    fn test_not_due_items_wait() {
        let (mut scheduler, mut items) = setup(vec![item(1, 2000, 1500)]);
        mark(&mut scheduler, &mut items, 1, 0);
        let report = scheduler.process_due(&mut items, INTERVAL_MS - 1, &UpdateNotifier::new());
        assert_eq!(report.processed, 0);
        assert_eq!(report.pending, 1);
        assert_eq!(items[&1].current_stock(), 1500);
    }

    #[test]
    fn test_remark_moves_due_time_later() {
        let (mut scheduler, mut items) = setup(vec![item(1, 2000, 1500)]);
        mark(&mut scheduler, &mut items, 1, 0);
        mark(&mut scheduler, &mut items, 1, 100_000);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.next_due(), Some((1, INTERVAL_MS + 100_000)));

        let report = scheduler.process_due(&mut items, INTERVAL_MS + 50_000, &UpdateNotifier::new());
        assert_eq!(report.processed, 0);
    }

    #[test]
    fn test_ties_pop_in_commodity_order() {
        let (mut scheduler, mut items) = setup(vec![item(9, 100, 50), item(3, 100, 50)]);
        mark(&mut scheduler, &mut items, 9, 0);
        mark(&mut scheduler, &mut items, 3, 0);
        assert_eq!(scheduler.next_due(), Some((3, INTERVAL_MS)));
    }

    #[test]
    fn test_each_item_steps_once_per_call() {
        let (mut scheduler, mut items) = setup(vec![item(1, 2000, 0)]);
        mark(&mut scheduler, &mut items, 1, 0);
        // Far in the future: still a single step, rescheduled after `now`.
        let now = 100 * INTERVAL_MS;
        let report = scheduler.process_due(&mut items, now, &UpdateNotifier::new());
        assert_eq!(report.processed, 1);
        assert_eq!(items[&1].current_stock(), 100);
        assert_eq!(items[&1].next_update_time(), Some(now + INTERVAL_MS));
    }

    #[test]
    fn test_remark_at_equilibrium_unschedules() {
        let (mut scheduler, mut items) = setup(vec![item(1, 2000, 1500)]);
        mark(&mut scheduler, &mut items, 1, 0);
        let entry = items.get_mut(&1).unwrap();
        entry.apply_trade(Price::from_minor(100), 2000, 5);
        assert!(!scheduler.mark_for_update(entry, 5));
        assert!(scheduler.is_empty());
        assert_eq!(entry.next_update_time(), None);
    }

    #[test]
    fn test_price_floor_during_regen() {
        let cheap = item(1, 2000, 100)
            .with_current_price(Price::from_minor(1))
            .with_tax_rate(fx("0.5"));
        let step = regen_step(&cheap, &PricingEngine::new(&MarketConfig::default()), 4000).unwrap();
        assert_eq!(step.price, Price::from_minor(1));
    }

    #[test]
    fn test_schedule_stays_consistent_under_random_load() {
        let config = MarketConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
        let mut scheduler = StockScheduler::new(&config);
        let mut items: HashMap<CommodityId, MarketItem> = (0..40)
            .map(|id| {
                let base = rng.gen_range(0..500);
                let rate = Fixed::from_scaled(rng.gen_range(0..30), 2).unwrap();
                let item = MarketItem::new(1, id, Price::from_minor(100), base)
                    .with_regen_rate(rate)
                    .with_tax_rate(fx("0.02"));
                (id, item)
            })
            .collect();
        let notifier = UpdateNotifier::new();

        let mut now: Millis = 0;
        for _ in 0..400 {
            now += rng.gen_range(0..INTERVAL_MS);
            for _ in 0..rng.gen_range(0..4) {
                let id = rng.gen_range(0..40);
                let item = items.get_mut(&id).unwrap();
                let cap = config.max_stock(item.base_stock());
                let stock = rng.gen_range(0..=cap);
                item.apply_trade(item.current_price(), stock, now);
                scheduler.mark_for_update(item, now);
            }
            scheduler.process_due(&mut items, now, &notifier);

            for (id, item) in &items {
                let pending = scheduler.is_pending(*id);
                assert_eq!(pending, !item.is_at_equilibrium(), "membership of {id}");
                assert_eq!(pending, item.next_update_time().is_some(), "due time of {id}");
                if let Some(due) = item.next_update_time() {
                    assert!(due > now, "item {id} left due at {due} <= {now}");
                }
                assert!(item.current_stock() <= config.max_stock(item.base_stock()));
                assert!(item.history().len() <= crate::item::PRICE_HISTORY_CAPACITY);
            }
        }
    }
}
