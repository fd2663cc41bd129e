//! # Market
//!
//! Owns every listed item, the stock scheduler and the listener registry.
//! The market lives on the game-loop thread and every mutation takes
//! `&mut self`; other threads reach it through a [`CommandSender`].
//!
//! ## Trades
//!
//! Requests larger than what can be executed are clamped, in order:
//!
//! | side | clamp | reason |
//! |------|-------|--------|
//! | buy  | market stock | [`ClampReason::OutOfStock`] |
//! | buy  | buyer balance | [`ClampReason::InsufficientFunds`] |
//! | buy  | inventory space | [`ClampReason::InventoryFull`] |
//! | sell | units held | [`ClampReason::NotEnoughHeld`] |
//! | sell | stock cap headroom | [`ClampReason::StockCapacity`] |
//!
//! Shortages are reported through [`TradeOutcome`], not as errors.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{CommandQueue, CommandSender};
use crate::config::MarketConfig;
use crate::error::{MarketError, MarketResult};
use crate::fixed_point::{Fixed, Price};
use crate::item::{CommodityId, MarketItem, Millis};
use crate::notifier::{ListenerId, MarketEvent, MarketListener, UpdateNotifier};
use crate::ports::{ActorId, InventoryProvider, Ledger, MarketStore};
use crate::pricing::{PricingEngine, Side};
use crate::record::ItemRecord;
use crate::scheduler::{StockScheduler, TickReport};
use crate::tax::TaxAdjuster;

// =============================================================================
// Trade outcomes
// =============================================================================

/// Why a trade executed fewer units than requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClampReason {
    /// Zero units were requested.
    EmptyRequest,
    /// The market holds fewer units.
    OutOfStock,
    /// The buyer cannot pay for more.
    InsufficientFunds,
    /// The buyer's inventory has no room for more.
    InventoryFull,
    /// The seller holds fewer units.
    NotEnoughHeld,
    /// More units would push the stock above its cap.
    StockCapacity,
}

/// What an executed trade moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TradeReceipt {
    /// Traded commodity.
    pub commodity: CommodityId,
    /// Direction of the trade.
    pub side: Side,
    /// Units executed.
    pub units: u32,
    /// Cost (buy) or proceeds before tax (sell).
    pub gross: Price,
    /// Tax withheld from sell proceeds. Zero for buys.
    pub tax: Price,
    /// Amount withdrawn (buy) or deposited (sell).
    pub net: Price,
    /// Unit price after the trade.
    pub price_after: Price,
    /// Market stock after the trade.
    pub stock_after: u32,
}

/// Result of a trade request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TradeOutcome {
    /// Every requested unit was traded.
    Completed(TradeReceipt),
    /// Some units were traded.
    Partial {
        /// What was traded.
        receipt: TradeReceipt,
        /// Units originally requested.
        requested: u32,
        /// The clamp that limited the trade last.
        reason: ClampReason,
    },
    /// Nothing was traded and no state changed.
    Rejected {
        /// Units originally requested.
        requested: u32,
        /// Why nothing could be traded.
        reason: ClampReason,
    },
}

impl TradeOutcome {
    /// The receipt, unless the trade was rejected.
    #[must_use]
    pub const fn receipt(&self) -> Option<&TradeReceipt> {
        match self {
            Self::Completed(receipt) | Self::Partial { receipt, .. } => Some(receipt),
            Self::Rejected { .. } => None,
        }
    }

    /// Units actually traded.
    #[must_use]
    pub const fn executed(&self) -> u32 {
        match self.receipt() {
            Some(receipt) => receipt.units,
            None => 0,
        }
    }

    /// The clamp reason, if fewer units than requested were traded.
    #[must_use]
    pub const fn reason(&self) -> Option<ClampReason> {
        match self {
            Self::Completed(_) => None,
            Self::Partial { reason, .. } | Self::Rejected { reason, .. } => Some(*reason),
        }
    }

    /// Returns true if nothing was traded.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Price preview for a prospective trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quote {
    /// Cost (buy) or gross proceeds (sell).
    pub total: Price,
    /// Unit price after the trade.
    pub price_after: Price,
}

/// Executable amount after successive clamps.
struct Clamp {
    units: u32,
    reason: Option<ClampReason>,
}

impl Clamp {
    const fn new(requested: u32) -> Self {
        Self {
            units: requested,
            reason: None,
        }
    }

    fn limit(&mut self, max: u32, reason: ClampReason) {
        if max < self.units {
            self.units = max;
            self.reason = Some(reason);
        }
    }
}

// =============================================================================
// Market
// =============================================================================

/// The commodity market.
#[derive(Debug)]
pub struct Market {
    config: MarketConfig,
    engine: PricingEngine,
    items: HashMap<CommodityId, MarketItem>,
    scheduler: StockScheduler,
    notifier: Arc<UpdateNotifier>,
    commands: CommandQueue,
}

impl Market {
    /// Creates an empty market.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: MarketConfig) -> MarketResult<Self> {
        config.validate()?;
        Ok(Self {
            engine: PricingEngine::new(&config),
            items: HashMap::new(),
            scheduler: StockScheduler::new(&config),
            notifier: Arc::new(UpdateNotifier::new()),
            commands: CommandQueue::new(),
            config,
        })
    }

    /// Rebuilds a market from persisted records.
    ///
    /// A persisted due time is kept; items off equilibrium without one are
    /// scheduled one interval after `now`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration, an invalid record or a duplicate
    /// commodity.
    pub fn from_records(
        config: MarketConfig,
        records: impl IntoIterator<Item = ItemRecord>,
        now: Millis,
    ) -> MarketResult<Self> {
        let mut market = Self::new(config)?;
        for record in records {
            market.insert_item(MarketItem::from(record), now)?;
        }
        tracing::info!(
            items = market.items.len(),
            pending = market.scheduler.len(),
            "market restored"
        );
        Ok(market)
    }

    /// Lists a new item and schedules it if it is off equilibrium.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidItem` if the item violates an invariant
    /// and `MarketError::DuplicateCommodity` if the commodity is listed.
    pub fn insert_item(&mut self, mut item: MarketItem, now: Millis) -> MarketResult<()> {
        item.validate(&self.config)?;
        let commodity = item.commodity();
        if self.items.contains_key(&commodity) {
            return Err(MarketError::DuplicateCommodity(commodity));
        }

        match item.next_update_time() {
            Some(due) if !item.is_at_equilibrium() => self.scheduler.schedule_at(&mut item, due),
            _ => {
                self.scheduler.mark_for_update(&mut item, now);
            }
        }
        tracing::debug!(commodity, "item listed");
        self.items.insert(commodity, item);
        Ok(())
    }

    /// Snapshot of every item, ordered by commodity.
    #[must_use]
    pub fn records(&self) -> Vec<ItemRecord> {
        let mut records: Vec<ItemRecord> = self.items.values().map(ItemRecord::from).collect();
        records.sort_by_key(|record| record.commodity);
        records
    }

    /// Writes a snapshot to `store`. Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::Persistence` if the store fails. The market is
    /// unchanged either way.
    pub fn save(&self, store: &mut dyn MarketStore) -> MarketResult<usize> {
        let records = self.records();
        match store.save(&records) {
            Ok(()) => {
                tracing::debug!(items = records.len(), "market saved");
                Ok(records.len())
            }
            Err(e) => {
                tracing::error!(items = records.len(), error = %e, "failed to save market");
                Err(MarketError::Persistence(e.to_string()))
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Active configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Pricing engine built from the configuration.
    #[inline]
    #[must_use]
    pub const fn engine(&self) -> &PricingEngine {
        &self.engine
    }

    /// A listed item.
    #[must_use]
    pub fn item(&self, commodity: CommodityId) -> Option<&MarketItem> {
        self.items.get(&commodity)
    }

    /// All listed items in no particular order.
    pub fn items(&self) -> impl Iterator<Item = &MarketItem> + '_ {
        self.items.values()
    }

    /// Number of listed items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if the commodity is waiting for regeneration.
    #[must_use]
    pub fn is_pending(&self, commodity: CommodityId) -> bool {
        self.scheduler.is_pending(commodity)
    }

    /// Number of items waiting for regeneration.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Earliest pending item and its due time. Hosts can sleep until then.
    #[must_use]
    pub fn next_due(&self) -> Option<(CommodityId, Millis)> {
        self.scheduler.next_due()
    }

    /// Prices `units` units without trading.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::UnknownCommodity` for an unlisted commodity and
    /// `MarketError::ArithmeticOverflow` if the price is not representable.
    pub fn quote(&self, commodity: CommodityId, units: u32, side: Side) -> MarketResult<Quote> {
        let item = self.listed(commodity)?;
        Ok(Quote {
            total: self.engine.total_price(item, units, side)?,
            price_after: self.engine.last_price(item, units, side)?,
        })
    }

    // =========================================================================
    // Trading
    // =========================================================================

    /// Buys up to `requested` units for `actor`.
    ///
    /// Items are placed before payment. If the withdrawal fails they are
    /// taken back and the trade is rejected.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::UnknownCommodity` for an unlisted commodity and
    /// `MarketError::ArithmeticOverflow` if the price is not representable.
    pub fn perform_buy(
        &mut self,
        actor: ActorId,
        commodity: CommodityId,
        requested: u32,
        now: Millis,
        ledger: &mut dyn Ledger,
        inventory: &mut dyn InventoryProvider,
    ) -> MarketResult<TradeOutcome> {
        let item = self.listed(commodity)?;
        let mut clamp = Clamp::new(requested);
        clamp.limit(item.current_stock(), ClampReason::OutOfStock);
        if clamp.units > 0 {
            let budget = ledger.balance(actor);
            let affordable = self
                .engine
                .affordable_units(item, clamp.units, Side::Buy, budget)?;
            clamp.limit(affordable, ClampReason::InsufficientFunds);
        }
        if clamp.units == 0 {
            return Ok(Self::reject(actor, commodity, Side::Buy, requested, &clamp));
        }

        let placed = inventory.add(actor, commodity, clamp.units);
        clamp.limit(placed, ClampReason::InventoryFull);
        if clamp.units == 0 {
            return Ok(Self::reject(actor, commodity, Side::Buy, requested, &clamp));
        }
        let units = clamp.units;

        let priced = self
            .engine
            .total_price(item, units, Side::Buy)
            .and_then(|cost| Ok((cost, self.engine.last_price(item, units, Side::Buy)?)));
        let (cost, price_after) = match priced {
            Ok(priced) => priced,
            Err(e) => {
                Self::take_back(inventory, actor, commodity, units);
                return Err(e);
            }
        };
        if !ledger.withdraw(actor, cost) {
            Self::take_back(inventory, actor, commodity, units);
            clamp.limit(0, ClampReason::InsufficientFunds);
            return Ok(Self::reject(actor, commodity, Side::Buy, requested, &clamp));
        }

        let receipt = TradeReceipt {
            commodity,
            side: Side::Buy,
            units,
            gross: cost,
            tax: Price::ZERO,
            net: cost,
            price_after,
            stock_after: item.current_stock() - units,
        };
        Ok(self.commit(actor, receipt, requested, clamp.reason, now))
    }

    /// Sells up to `requested` units on behalf of `actor`. Tax is withheld
    /// from the proceeds.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::UnknownCommodity` for an unlisted commodity and
    /// `MarketError::ArithmeticOverflow` if the price is not representable.
    pub fn perform_sell(
        &mut self,
        actor: ActorId,
        commodity: CommodityId,
        requested: u32,
        now: Millis,
        ledger: &mut dyn Ledger,
        inventory: &mut dyn InventoryProvider,
    ) -> MarketResult<TradeOutcome> {
        let item = self.listed(commodity)?;
        let mut clamp = Clamp::new(requested);
        clamp.limit(inventory.count_held(actor, commodity), ClampReason::NotEnoughHeld);
        let headroom = self
            .config
            .max_stock(item.base_stock())
            .saturating_sub(item.current_stock());
        clamp.limit(headroom, ClampReason::StockCapacity);
        if clamp.units == 0 {
            return Ok(Self::reject(actor, commodity, Side::Sell, requested, &clamp));
        }
        let units = clamp.units;

        let gross = self.engine.total_price(item, units, Side::Sell)?;
        let tax = self.engine.portion(gross, item.tax_rate())?;
        let price_after = self.engine.last_price(item, units, Side::Sell)?;
        if !inventory.remove(actor, commodity, units) {
            clamp.limit(0, ClampReason::NotEnoughHeld);
            return Ok(Self::reject(actor, commodity, Side::Sell, requested, &clamp));
        }
        let net = gross.saturating_sub(tax);
        ledger.deposit(actor, net);

        let receipt = TradeReceipt {
            commodity,
            side: Side::Sell,
            units,
            gross,
            tax,
            net,
            price_after,
            stock_after: item.current_stock() + units,
        };
        Ok(self.commit(actor, receipt, requested, clamp.reason, now))
    }

    fn listed(&self, commodity: CommodityId) -> MarketResult<&MarketItem> {
        self.items
            .get(&commodity)
            .ok_or(MarketError::UnknownCommodity(commodity))
    }

    fn take_back(
        inventory: &mut dyn InventoryProvider,
        actor: ActorId,
        commodity: CommodityId,
        units: u32,
    ) {
        if !inventory.remove(actor, commodity, units) {
            tracing::error!(actor, commodity, units, "could not take back unpaid items");
        }
    }

    fn reject(
        actor: ActorId,
        commodity: CommodityId,
        side: Side,
        requested: u32,
        clamp: &Clamp,
    ) -> TradeOutcome {
        let reason = clamp.reason.unwrap_or(ClampReason::EmptyRequest);
        tracing::warn!(actor, commodity, ?side, requested, ?reason, "trade rejected");
        TradeOutcome::Rejected { requested, reason }
    }

    /// Applies an executed trade to the item and tells listeners.
    fn commit(
        &mut self,
        actor: ActorId,
        receipt: TradeReceipt,
        requested: u32,
        reason: Option<ClampReason>,
        now: Millis,
    ) -> TradeOutcome {
        let commodity = receipt.commodity;
        if let Some(item) = self.items.get_mut(&commodity) {
            item.apply_trade(receipt.price_after, receipt.stock_after, now);
            self.scheduler.mark_for_update(item, now);
        }

        let outcome = match reason {
            None => {
                tracing::info!(
                    actor,
                    commodity,
                    side = ?receipt.side,
                    units = receipt.units,
                    net = receipt.net.minor(),
                    price = receipt.price_after.minor(),
                    "trade executed"
                );
                TradeOutcome::Completed(receipt)
            }
            Some(reason) => {
                tracing::warn!(
                    actor,
                    commodity,
                    side = ?receipt.side,
                    requested,
                    units = receipt.units,
                    ?reason,
                    "trade clamped"
                );
                TradeOutcome::Partial {
                    receipt,
                    requested,
                    reason,
                }
            }
        };

        self.notifier.notify(&MarketEvent::Traded {
            commodity,
            side: receipt.side,
            units: receipt.units,
            price: receipt.price_after,
            stock: receipt.stock_after,
        });
        outcome
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Schedules the commodity one interval after `now`, or unschedules it
    /// at equilibrium. Returns true if it is pending afterwards.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::UnknownCommodity` for an unlisted commodity.
    pub fn mark_item_for_update(&mut self, commodity: CommodityId, now: Millis) -> MarketResult<bool> {
        let item = self
            .items
            .get_mut(&commodity)
            .ok_or(MarketError::UnknownCommodity(commodity))?;
        Ok(self.scheduler.mark_for_update(item, now))
    }

    /// Runs every regeneration step due at `now`.
    pub fn process_due(&mut self, now: Millis) -> TickReport {
        let report = self.scheduler.process_due(&mut self.items, now, &self.notifier);
        if report.processed > 0 || report.failed > 0 {
            tracing::debug!(
                processed = report.processed,
                settled = report.settled,
                failed = report.failed,
                pending = report.pending,
                "regeneration tick"
            );
        }
        report
    }

    // =========================================================================
    // Equilibrium
    // =========================================================================

    /// Moves the equilibrium stock to `base_stock` and rescales the tax.
    ///
    /// The current stock is clamped to the new cap. Returns the new tax rate.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::UnknownCommodity` for an unlisted commodity and
    /// `MarketError::ZeroEquilibrium` if the current base stock is zero.
    pub fn set_base_stock(
        &mut self,
        commodity: CommodityId,
        base_stock: u32,
        now: Millis,
    ) -> MarketResult<Fixed> {
        let item = self
            .items
            .get_mut(&commodity)
            .ok_or(MarketError::UnknownCommodity(commodity))?;
        let old_base = item.base_stock();
        let tax_rate = TaxAdjuster::rescale(commodity, item.tax_rate(), old_base, base_stock)?;
        let stock = item.current_stock().min(self.config.max_stock(base_stock));
        item.apply_equilibrium(base_stock, tax_rate, stock);

        // An item already waiting keeps its due time.
        if item.is_at_equilibrium() || !self.scheduler.is_pending(commodity) {
            self.scheduler.mark_for_update(item, now);
        }

        tracing::info!(
            commodity,
            old_base,
            base_stock,
            tax_rate = %tax_rate,
            "equilibrium changed"
        );
        self.notifier.notify(&MarketEvent::EquilibriumChanged {
            commodity,
            base_stock,
            tax_rate,
        });
        Ok(tax_rate)
    }

    /// Raises the equilibrium by the configured percentage (at least one
    /// unit). Returns the new base stock.
    ///
    /// # Errors
    ///
    /// Same as [`Market::set_base_stock`].
    pub fn grow_equilibrium(&mut self, commodity: CommodityId, now: Millis) -> MarketResult<u32> {
        let base = self.listed(commodity)?.base_stock();
        let target = base.saturating_add(self.equilibrium_step(base)?);
        self.set_base_stock(commodity, target, now)?;
        Ok(target)
    }

    /// Lowers the equilibrium by the configured percentage (at least one
    /// unit). Returns the new base stock.
    ///
    /// # Errors
    ///
    /// Same as [`Market::set_base_stock`].
    pub fn shrink_equilibrium(&mut self, commodity: CommodityId, now: Millis) -> MarketResult<u32> {
        let base = self.listed(commodity)?.base_stock();
        let target = base.saturating_sub(self.equilibrium_step(base)?);
        self.set_base_stock(commodity, target, now)?;
        Ok(target)
    }

    fn equilibrium_step(&self, base: u32) -> MarketResult<u32> {
        let step = Fixed::from_int(i64::from(base))
            .checked_mul(self.config.stock_increase_percentage)
            .and_then(Fixed::round_to_int)
            .ok_or(MarketError::ArithmeticOverflow)?;
        Ok(u32::try_from(step).unwrap_or(u32::MAX).max(1))
    }

    // =========================================================================
    // Listeners and commands
    // =========================================================================

    /// Subscribes to market events.
    pub fn register_listener(&self, listener: Arc<dyn MarketListener>) -> ListenerId {
        self.notifier.register(listener)
    }

    /// Unsubscribes a listener. Returns false if it was not registered.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.notifier.unregister(id)
    }

    /// Shared registry, for listeners that manage their own subscription.
    #[must_use]
    pub fn notifier(&self) -> Arc<UpdateNotifier> {
        Arc::clone(&self.notifier)
    }

    /// Producer handle for other threads.
    #[must_use]
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    /// Executes the commands queued so far, in FIFO order, and replies to
    /// each requester. Returns the number executed.
    ///
    /// Commands enqueued while draining wait for the next call.
    pub fn drain_commands(
        &mut self,
        now: Millis,
        ledger: &mut dyn Ledger,
        inventory: &mut dyn InventoryProvider,
    ) -> usize {
        let queued = self.commands.len();
        let mut executed = 0;
        for _ in 0..queued {
            let Some(command) = self.commands.try_next() else {
                break;
            };
            let (side, request) = command.into_parts();
            let outcome = match side {
                Side::Buy => self.perform_buy(
                    request.actor,
                    request.commodity,
                    request.units,
                    now,
                    ledger,
                    inventory,
                ),
                Side::Sell => self.perform_sell(
                    request.actor,
                    request.commodity,
                    request.units,
                    now,
                    ledger,
                    inventory,
                ),
            };
            if let Err(e) = &outcome {
                tracing::warn!(actor = request.actor, commodity = request.commodity, error = %e, "queued trade failed");
            }
            if let Some(reply) = request.reply {
                if reply.send(outcome).is_err() {
                    tracing::debug!(actor = request.actor, "trade requester went away");
                }
            }
            executed += 1;
        }
        executed
    }
}
