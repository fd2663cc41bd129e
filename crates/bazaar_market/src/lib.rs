//! # BAZAAR Commodity Market
//!
//! Server-side commodity market for the BAZAAR game server.
//!
//! ## Design Principles
//!
//! 1. **Zero floating point** - Prices are integer minor units; intermediate
//!    math uses 18-decimal fixed point and rounds once, half-up
//! 2. **Geometric pricing** - Every unit of a trade moves the price by the
//!    item's variation, so large orders pay progressively more
//! 3. **Self-healing stock** - Items off equilibrium regenerate toward their
//!    base stock on a fixed interval
//! 4. **External configuration** - Market tuning lives in TOML files
//!
//! ## Thread Safety
//!
//! A [`Market`] is owned by the game-loop thread. Other threads enqueue
//! trades through a [`CommandSender`] and may register listeners at any time.
//!
//! ## Example
//!
//! ```rust
//! use bazaar_market::{
//!     InMemoryLedger, Market, MarketConfig, MarketItem, PlayerInventories, Price,
//! };
//!
//! let mut market = Market::new(MarketConfig::default())?;
//! market.insert_item(MarketItem::new(1, 42, Price::from_minor(100), 50), 0)?;
//!
//! let mut ledger = InMemoryLedger::new().with_balance(7, Price::from_minor(1_000));
//! let mut inventory = PlayerInventories::new();
//! let outcome = market.perform_buy(7, 42, 5, 0, &mut ledger, &mut inventory)?;
//! assert_eq!(outcome.executed(), 5);
//!
//! // Ten minutes later the stock starts to recover.
//! let report = market.process_due(600_000);
//! assert_eq!(report.processed, 1);
//! # Ok::<(), bazaar_market::MarketError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod command;
pub mod config;
pub mod error;
pub mod fixed_point;
pub mod inventory;
pub mod item;
pub mod ledger;
pub mod market;
pub mod notifier;
pub mod ports;
pub mod pricing;
pub mod record;
pub mod scheduler;
pub mod tax;

pub use command::{CommandSender, MarketCommand, Reply, TradeRequest};
pub use config::MarketConfig;
pub use error::{MarketError, MarketResult};
pub use fixed_point::{Fixed, Price};
pub use inventory::{PlayerInventories, SlotInventory};
pub use item::{CategoryId, CommodityId, MarketItem, Millis, PriceHistory};
pub use ledger::InMemoryLedger;
pub use market::{ClampReason, Market, Quote, TradeOutcome, TradeReceipt};
pub use notifier::{ListenerId, MarketEvent, MarketListener, UpdateNotifier};
pub use ports::{ActorId, InventoryProvider, Ledger, MarketStore, StoreError};
pub use pricing::{PricingEngine, Side};
pub use record::ItemRecord;
pub use scheduler::{StockScheduler, TickReport};
pub use tax::TaxAdjuster;
