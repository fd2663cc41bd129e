//! # Tax Adjuster
//!
//! Rescales an item's tax rate when its equilibrium stock moves:
//!
//! ```text
//! new_tax = old_tax * (2 - new_base / old_base)
//! ```
//!
//! Growing the equilibrium lowers the tax, shrinking it raises the tax. The
//! result is clamped to `[0, 1]`; price and stock are left alone.

use crate::error::{MarketError, MarketResult};
use crate::fixed_point::Fixed;
use crate::item::CommodityId;

/// Stateless tax recompute for equilibrium changes.
pub struct TaxAdjuster;

impl TaxAdjuster {
    /// Computes the tax rate after the base stock moves from `old_base` to
    /// `new_base`.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::ZeroEquilibrium` if `old_base` is zero and
    /// `MarketError::ArithmeticOverflow` if the ratio is not representable.
    pub fn rescale(
        commodity: CommodityId,
        old_tax: Fixed,
        old_base: u32,
        new_base: u32,
    ) -> MarketResult<Fixed> {
        if old_base == 0 {
            return Err(MarketError::ZeroEquilibrium(commodity));
        }
        let ratio = Fixed::from_int(i64::from(new_base))
            .checked_div(Fixed::from_int(i64::from(old_base)))
            .ok_or(MarketError::ArithmeticOverflow)?;
        let rescaled = Fixed::from_int(2)
            .checked_sub(ratio)
            .and_then(|factor| old_tax.checked_mul(factor))
            .ok_or(MarketError::ArithmeticOverflow)?;
        Ok(rescaled.clamp(Fixed::ZERO, Fixed::ONE))
    }
}
