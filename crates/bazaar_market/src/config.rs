//! # Market Configuration
//!
//! Loaded once at startup from an external TOML file. Missing keys fall back
//! to the defaults below; unknown keys are rejected so typos do not silently
//! keep a default.
//!
//! ```toml
//! stock_update_interval_minutes = 10
//! max_stock_overflow_multiplier = 2.0
//! price_decimals = 2
//! stock_increase_percentage = 0.05
//! minimum_price = 1
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::fixed_point::{Fixed, Price};

/// Upper bound for `price_decimals`.
///
/// Keeps a `Price` in `u64` minor units comfortably above any in-game amount.
pub const MAX_PRICE_DECIMALS: u32 = 8;

/// Milliseconds per configured interval minute.
const MILLIS_PER_MINUTE: u64 = 60_000;

/// Market-wide tuning values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketConfig {
    /// Delay between two regeneration steps of the same item.
    pub stock_update_interval_minutes: u32,
    /// Stock may rise up to `base_stock * multiplier` through player sales.
    pub max_stock_overflow_multiplier: Fixed,
    /// Decimal places of every `Price` in the market.
    pub price_decimals: u32,
    /// Fraction of the base stock added or removed by an equilibrium upgrade.
    pub stock_increase_percentage: Fixed,
    /// Price floor in minor units.
    pub minimum_price: Price,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            stock_update_interval_minutes: 10,
            max_stock_overflow_multiplier: Fixed::from_int(2),
            price_decimals: 2,
            stock_increase_percentage: Fixed::from_scaled(5, 2).unwrap_or(Fixed::ZERO),
            minimum_price: Price::from_minor(1),
        }
    }
}

impl MarketConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidConfig` on parse errors or rule violations.
    pub fn from_toml_str(source: &str) -> MarketResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| MarketError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidConfig` if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> MarketResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            MarketError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks every rule of the configuration.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidConfig` naming the first violated rule.
    pub fn validate(&self) -> MarketResult<()> {
        if self.stock_update_interval_minutes == 0 {
            return Err(MarketError::InvalidConfig(
                "stock_update_interval_minutes must be at least 1".into(),
            ));
        }
        if self.max_stock_overflow_multiplier < Fixed::ONE {
            return Err(MarketError::InvalidConfig(format!(
                "max_stock_overflow_multiplier must be >= 1, got {}",
                self.max_stock_overflow_multiplier
            )));
        }
        if self.price_decimals > MAX_PRICE_DECIMALS {
            return Err(MarketError::InvalidConfig(format!(
                "price_decimals must be <= {MAX_PRICE_DECIMALS}, got {}",
                self.price_decimals
            )));
        }
        if self.stock_increase_percentage <= Fixed::ZERO
            || self.stock_increase_percentage > Fixed::ONE
        {
            return Err(MarketError::InvalidConfig(format!(
                "stock_increase_percentage must be in (0, 1], got {}",
                self.stock_increase_percentage
            )));
        }
        if self.minimum_price.is_zero() {
            return Err(MarketError::InvalidConfig(
                "minimum_price must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Regeneration interval in milliseconds.
    #[inline]
    #[must_use]
    pub fn update_interval_ms(&self) -> u64 {
        u64::from(self.stock_update_interval_minutes) * MILLIS_PER_MINUTE
    }

    /// Highest stock an item with `base_stock` may hold, rounded down.
    #[must_use]
    pub fn max_stock(&self, base_stock: u32) -> u32 {
        Fixed::from_int(i64::from(base_stock))
            .checked_mul(self.max_stock_overflow_multiplier)
            .and_then(Fixed::floor_to_int)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MarketConfig::default();
        assert_eq!(config.stock_update_interval_minutes, 10);
        assert_eq!(config.max_stock_overflow_multiplier, Fixed::from_int(2));
        assert_eq!(config.price_decimals, 2);
        assert_eq!(config.stock_increase_percentage.to_string(), "0.05");
        assert!(config.validate().is_ok());
        assert_eq!(config.update_interval_ms(), 600_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MarketConfig::from_toml_str(
            "stock_update_interval_minutes = 3\nmax_stock_overflow_multiplier = 1.5\n",
        )
        .unwrap();
        assert_eq!(config.stock_update_interval_minutes, 3);
        assert_eq!(config.max_stock_overflow_multiplier.to_string(), "1.5");
        assert_eq!(config.price_decimals, 2);
        assert_eq!(config.update_interval_ms(), 180_000);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let result = MarketConfig::from_toml_str("stock_update_interval_minutes = 0");
        assert!(matches!(result, Err(MarketError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_unknown_key() {
        let result = MarketConfig::from_toml_str("stock_update_intervall = 5");
        assert!(matches!(result, Err(MarketError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_multiplier_below_one() {
        let result = MarketConfig::from_toml_str("max_stock_overflow_multiplier = 0.5");
        assert!(matches!(result, Err(MarketError::InvalidConfig(_))));
    }

    #[test]
    fn test_max_stock() {
        let mut config = MarketConfig::default();
        assert_eq!(config.max_stock(2000), 4000);
        config.max_stock_overflow_multiplier = "1.25".parse().unwrap();
        assert_eq!(config.max_stock(3), 3);
        assert_eq!(config.max_stock(0), 0);
    }

    #[test]
    fn test_load_missing_file() {
        let result = MarketConfig::load("/definitely/not/here/market.toml");
        assert!(matches!(result, Err(MarketError::InvalidConfig(_))));
    }
}
