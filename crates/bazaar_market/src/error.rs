//! # Market Error Types
//!
//! Errors are reserved for caller mistakes and arithmetic that leaves the
//! representable range. Shortages of stock, money, holdings or inventory
//! space are not errors: trades report them through `TradeOutcome`.

use thiserror::Error;

use crate::item::CommodityId;

/// Errors that can occur in the market engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// No item with this commodity id is listed.
    #[error("unknown commodity: {0}")]
    UnknownCommodity(CommodityId),

    /// An item with this commodity id is already listed.
    #[error("commodity already listed: {0}")]
    DuplicateCommodity(CommodityId),

    /// Item data violates a market invariant.
    #[error("invalid item {commodity}: {reason}")]
    InvalidItem {
        /// The offending commodity.
        commodity: CommodityId,
        /// What is wrong with it.
        reason: String,
    },

    /// Tax recompute with an equilibrium of zero.
    #[error("cannot rescale tax for commodity {0}: previous base stock is zero")]
    ZeroEquilibrium(CommodityId),

    /// Arithmetic overflow in fixed-point calculation.
    #[error("arithmetic overflow in price calculation")]
    ArithmeticOverflow,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The market that owned a command queue has been dropped.
    #[error("market is no longer accepting commands")]
    MarketClosed,

    /// Saving market state failed. In-memory state is unaffected.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// Result type for market operations.
pub type MarketResult<T> = Result<T, MarketError>;
