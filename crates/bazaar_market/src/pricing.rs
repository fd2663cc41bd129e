//! # Pricing Engine
//!
//! **Geometric-progression pricing for multi-unit trades**
//!
//! Every unit bought multiplies the unit price by `1 + v`, every unit sold by
//! `1 - v`, with `v` the item's price variation. A trade of `n` units costs
//! the sum of that series:
//!
//! ```text
//! m = 1 + v (buy) | 1 - v (sell)
//!
//! total(n) = p * n                       if m == 1
//!          = p * (m^n - 1) / (m - 1)     otherwise
//!
//! last(n)  = p * m^n                     (the item's price after the trade)
//! ```
//!
//! The closed form is evaluated in 18-decimal fixed point and rounded to the
//! market precision once, half-up, so the result does not depend on how
//! many units are summed or in which order.

use crate::config::MarketConfig;
use crate::error::{MarketError, MarketResult};
use crate::fixed_point::{Fixed, Price};
use crate::item::MarketItem;

/// Direction of a trade, seen from the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Player buys from the market; price rises per unit.
    Buy,
    /// Player sells to the market; price falls per unit.
    Sell,
}

/// Deterministic price calculator bound to the market precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricingEngine {
    decimals: u32,
    minimum_price: Price,
}

impl PricingEngine {
    /// Creates an engine using the precision and price floor of `config`.
    #[must_use]
    pub fn new(config: &MarketConfig) -> Self {
        Self {
            decimals: config.price_decimals,
            minimum_price: config.minimum_price,
        }
    }

    /// Decimal places of every price this engine produces.
    #[inline]
    #[must_use]
    pub const fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Price floor applied to unit prices.
    #[inline]
    #[must_use]
    pub const fn minimum_price(&self) -> Price {
        self.minimum_price
    }

    /// Per-unit multiplier for the given side.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidItem` if the variation is outside `[0, 1)`.
    pub fn multiplier(item: &MarketItem, side: Side) -> MarketResult<Fixed> {
        let variation = item.price_variation();
        if variation.is_negative() || variation >= Fixed::ONE {
            return Err(MarketError::InvalidItem {
                commodity: item.commodity(),
                reason: format!("price variation {variation} outside [0, 1)"),
            });
        }
        let multiplier = match side {
            Side::Buy => Fixed::ONE.checked_add(variation),
            Side::Sell => Fixed::ONE.checked_sub(variation),
        };
        multiplier.ok_or(MarketError::ArithmeticOverflow)
    }

    /// Total cost (buy) or gross proceeds (sell) of `units` units.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidItem` for a variation outside `[0, 1)` and
    /// `MarketError::ArithmeticOverflow` if the result is not representable.
    pub fn total_price(&self, item: &MarketItem, units: u32, side: Side) -> MarketResult<Price> {
        let multiplier = Self::multiplier(item, side)?;
        if units == 0 {
            return Ok(Price::ZERO);
        }
        if multiplier == Fixed::ONE {
            return item
                .current_price()
                .checked_mul_int(u64::from(units))
                .ok_or(MarketError::ArithmeticOverflow);
        }

        let price = self.to_fixed(item.current_price())?;
        let numerator = multiplier
            .checked_pow(units)
            .and_then(|grown| grown.checked_sub(Fixed::ONE))
            .ok_or(MarketError::ArithmeticOverflow)?;
        let denominator = multiplier
            .checked_sub(Fixed::ONE)
            .ok_or(MarketError::ArithmeticOverflow)?;

        price
            .checked_mul(numerator)
            .and_then(|scaled| scaled.checked_div(denominator))
            .and_then(|total| total.to_price(self.decimals))
            .ok_or(MarketError::ArithmeticOverflow)
    }

    /// Unit price after trading `units` units.
    ///
    /// Never below the minimum price; `units == 0` returns the current price.
    ///
    /// # Errors
    ///
    /// Same as [`PricingEngine::total_price`].
    pub fn last_price(&self, item: &MarketItem, units: u32, side: Side) -> MarketResult<Price> {
        let multiplier = Self::multiplier(item, side)?;
        if units == 0 {
            return Ok(item.current_price());
        }
        let factor = multiplier
            .checked_pow(units)
            .ok_or(MarketError::ArithmeticOverflow)?;
        self.scale_price(item.current_price(), factor)
    }

    /// Largest unit count up to `max_units` whose total fits in `budget`.
    ///
    /// Totals grow with the unit count, so a binary search over
    /// [`PricingEngine::total_price`] finds the bound. Counts whose total
    /// overflows are treated as unaffordable.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidItem` for a variation outside `[0, 1)`.
    pub fn affordable_units(
        &self,
        item: &MarketItem,
        max_units: u32,
        side: Side,
        budget: Price,
    ) -> MarketResult<u32> {
        let fits = |units: u32| match self.total_price(item, units, side) {
            Ok(total) => Ok(total <= budget),
            Err(MarketError::ArithmeticOverflow) => Ok(false),
            Err(e) => Err(e),
        };

        if fits(max_units)? {
            return Ok(max_units);
        }
        // fits(low) holds, fits(high) does not.
        let (mut low, mut high) = (0u32, max_units);
        while high - low > 1 {
            let mid = low + (high - low) / 2;
            if fits(mid)? {
                low = mid;
            } else {
                high = mid;
            }
        }
        Ok(low)
    }

    /// `amount * rate`, rounded half-up. Used for the tax share of proceeds.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::ArithmeticOverflow` if the result is not representable.
    pub fn portion(&self, amount: Price, rate: Fixed) -> MarketResult<Price> {
        self.to_fixed(amount)?
            .checked_mul(rate)
            .and_then(|value| value.to_price(self.decimals))
            .ok_or(MarketError::ArithmeticOverflow)
    }

    /// `price * factor`, rounded half-up and floored at the minimum price.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::ArithmeticOverflow` if the result is not representable.
    pub fn scale_price(&self, price: Price, factor: Fixed) -> MarketResult<Price> {
        let scaled = self
            .to_fixed(price)?
            .checked_mul(factor)
            .and_then(|value| value.to_price(self.decimals))
            .ok_or(MarketError::ArithmeticOverflow)?;
        Ok(scaled.max(self.minimum_price))
    }

    fn to_fixed(&self, price: Price) -> MarketResult<Fixed> {
        Fixed::from_price(price, self.decimals).ok_or(MarketError::ArithmeticOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fx(s: &str) -> Fixed {
        s.parse().unwrap()
    }

    fn engine() -> PricingEngine {
        PricingEngine::new(&MarketConfig::default())
    }

    fn item(price_minor: u64, variation: &str) -> MarketItem {
        MarketItem::new(1, 1, Price::from_minor(price_minor), 2000).with_variation(fx(variation))
    }

    #[test]
    fn test_buy_ten_units_at_one_percent() {
        let item = item(100, "0.01");
        let engine = engine();
        assert_eq!(PricingEngine::multiplier(&item, Side::Buy).unwrap(), fx("1.01"));
        // 1.00 * (1.01^10 - 1) / 0.01 = 10.4622...
        assert_eq!(engine.total_price(&item, 10, Side::Buy).unwrap(), Price::from_minor(1046));
        // 1.00 * 1.01^10 = 1.1046...
        assert_eq!(engine.last_price(&item, 10, Side::Buy).unwrap(), Price::from_minor(110));
    }

    #[test]
    fn test_sell_ten_units_at_one_percent() {
        let item = item(100, "0.01");
        let engine = engine();
        // 1.00 * (0.99^10 - 1) / -0.01 = 9.5617...
        assert_eq!(engine.total_price(&item, 10, Side::Sell).unwrap(), Price::from_minor(956));
        assert_eq!(engine.last_price(&item, 10, Side::Sell).unwrap(), Price::from_minor(90));
    }

    #[test]
    fn test_rounding_happens_once() {
        let item = item(250, "0.05");
        let engine = engine();
        // 2.50 + 2.625 + 2.75625 = 7.88125; per-unit rounding would give 7.89.
        assert_eq!(engine.total_price(&item, 3, Side::Buy).unwrap(), Price::from_minor(788));
        // 2.50 * 1.157625 = 2.8940625
        assert_eq!(engine.last_price(&item, 3, Side::Buy).unwrap(), Price::from_minor(289));
    }

    #[test]
    fn test_zero_units() {
        let item = item(1234, "0.03");
        let engine = engine();
        for side in [Side::Buy, Side::Sell] {
            assert_eq!(engine.total_price(&item, 0, side).unwrap(), Price::ZERO);
            assert_eq!(engine.last_price(&item, 0, side).unwrap(), item.current_price());
        }
    }

    #[test]
    fn test_zero_variation_is_linear() {
        let item = item(399, "0");
        let engine = engine();
        assert_eq!(engine.total_price(&item, 7, Side::Buy).unwrap(), Price::from_minor(2793));
        assert_eq!(engine.total_price(&item, 7, Side::Sell).unwrap(), Price::from_minor(2793));
        assert_eq!(engine.last_price(&item, 7, Side::Sell).unwrap(), Price::from_minor(399));
    }

    #[test]
    fn test_invalid_variation_is_rejected() {
        let item = item(100, "1");
        let result = engine().total_price(&item, 1, Side::Sell);
        assert!(matches!(result, Err(MarketError::InvalidItem { .. })));
    }

    #[test]
    fn test_last_price_respects_floor() {
        let item = item(100, "0.9");
        // 1.00 * 0.1^5 is far below one minor unit.
        assert_eq!(engine().last_price(&item, 5, Side::Sell).unwrap(), Price::from_minor(1));
    }

    #[test]
    fn test_overflow_is_reported() {
        let item = item(100, "0.1");
        let result = engine().total_price(&item, 1000, Side::Buy);
        assert_eq!(result, Err(MarketError::ArithmeticOverflow));
    }

    #[test]
    fn test_closed_form_matches_iterative_sum() {
        let engine = engine();
        let mut compared = 0;
        for variation_bp in (0..=1000).step_by(100) {
            let variation = Fixed::from_scaled(variation_bp, 4).unwrap();
            for side in [Side::Buy, Side::Sell] {
                for units in (0..=1000u32).step_by(37) {
                    let item = MarketItem::new(1, 1, Price::from_minor(100), 2000)
                        .with_variation(variation);
                    let Ok(closed) = engine.total_price(&item, units, side) else {
                        continue;
                    };

                    let multiplier = PricingEngine::multiplier(&item, side).unwrap();
                    let mut unit = Fixed::from_price(item.current_price(), 2).unwrap();
                    let mut sum = Fixed::ZERO;
                    for _ in 0..units {
                        sum = sum.checked_add(unit).unwrap();
                        unit = unit.checked_mul(multiplier).unwrap();
                    }
                    let iterative = sum.to_price(2).unwrap().minor();

                    let tolerance = 1 + closed.minor() / 1_000_000_000;
                    assert!(
                        closed.minor().abs_diff(iterative) <= tolerance,
                        "v={variation} n={units} {side:?}: closed {closed:?} vs iterative {iterative}"
                    );
                    compared += 1;
                }
            }
        }
        assert!(compared > 400, "only {compared} cases were representable");
    }

    #[test]
    fn test_affordable_units() {
        let item = item(100, "0.01");
        let engine = engine();
        // 10 units cost 10.46, 11 units cost 11.56.
        assert_eq!(
            engine.affordable_units(&item, 50, Side::Buy, Price::from_minor(1100)).unwrap(),
            10
        );
        assert_eq!(
            engine.affordable_units(&item, 5, Side::Buy, Price::from_minor(1100)).unwrap(),
            5
        );
        assert_eq!(
            engine.affordable_units(&item, 50, Side::Buy, Price::from_minor(99)).unwrap(),
            0
        );
    }

    #[test]
    fn test_portion_and_scale() {
        let engine = engine();
        assert_eq!(engine.portion(Price::from_minor(1000), fx("0.15")).unwrap(), Price::from_minor(150));
        assert_eq!(engine.portion(Price::from_minor(5), fx("0.1")).unwrap(), Price::from_minor(1));
        assert_eq!(
            engine.scale_price(Price::from_minor(200), fx("0.95")).unwrap(),
            Price::from_minor(190)
        );
        assert_eq!(engine.scale_price(Price::from_minor(1), fx("0.5")).unwrap(), Price::from_minor(1));
    }
}
