//! # Update Notifier
//!
//! Tells external collaborators (shop GUI refresh, price boards) that an
//! item's price or stock changed.
//!
//! Dispatch iterates over a snapshot of the listener list taken before the
//! first callback, and no lock is held while listeners run. A listener may
//! therefore unregister itself (or register others) from its callback; the
//! change takes effect from the next event.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::fixed_point::{Fixed, Price};
use crate::item::CommodityId;
use crate::pricing::Side;

/// A state change of one market item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarketEvent {
    /// A player trade was executed.
    Traded {
        /// Traded commodity.
        commodity: CommodityId,
        /// Direction of the trade.
        side: Side,
        /// Units executed.
        units: u32,
        /// Unit price after the trade.
        price: Price,
        /// Stock after the trade.
        stock: u32,
    },
    /// The scheduler moved the stock one step toward equilibrium.
    Regenerated {
        /// Regenerated commodity.
        commodity: CommodityId,
        /// Unit price after the step.
        price: Price,
        /// Stock after the step.
        stock: u32,
        /// True if the step reached the equilibrium.
        reached_equilibrium: bool,
    },
    /// The equilibrium stock was changed and the tax rescaled.
    EquilibriumChanged {
        /// Affected commodity.
        commodity: CommodityId,
        /// New base stock.
        base_stock: u32,
        /// New tax rate.
        tax_rate: Fixed,
    },
}

impl MarketEvent {
    /// The commodity this event is about.
    #[must_use]
    pub const fn commodity(&self) -> CommodityId {
        match self {
            Self::Traded { commodity, .. }
            | Self::Regenerated { commodity, .. }
            | Self::EquilibriumChanged { commodity, .. } => *commodity,
        }
    }
}

/// Receiver of market events.
pub trait MarketListener: Send + Sync {
    /// Called once per event, on the thread that owns the market.
    fn on_market_event(&self, event: &MarketEvent);
}

/// Handle returned by [`UpdateNotifier::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Listener registry with snapshot dispatch.
#[derive(Default)]
pub struct UpdateNotifier {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn MarketListener>)>>,
    next_id: AtomicU64,
}

impl UpdateNotifier {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener.
    pub fn register(&self, listener: Arc<dyn MarketListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns true if nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Dispatches `event` to every listener registered at call time.
    pub fn notify(&self, event: &MarketEvent) {
        let snapshot: Vec<Arc<dyn MarketListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener.on_market_event(event);
        }
    }
}

impl fmt::Debug for UpdateNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateNotifier")
            .field("listeners", &self.len())
            .finish_non_exhaustive()
    }
}
