//! # Fixed-Point Arithmetic
//!
//! **NO FLOATING POINT IN PRICES OR RATES**
//!
//! Two representations cover the whole market:
//!
//! - `Fixed`: i128 with 18 decimals - rates, multipliers and every
//!   intermediate value of the pricing math
//! - `Price`: u64 minor units at the market's configured precision
//!   (2 decimals by default, so `Price::from_minor(100)` is 1.00)
//!
//! ## Rounding
//!
//! `Fixed` multiplication and division round the 19th decimal half-up.
//! Conversion back to `Price` rounds half-up to the configured precision,
//! and the pricing engine performs that conversion once per result.
//!
//! ## Why Fixed-Point?
//!
//! - Deterministic: Same calculation = same result on all hardware
//! - Config values such as `0.05` are parsed from their decimal text and are
//!   exact, never the nearest binary float
//! - Auditable: a price in the history can be recomputed from the inputs

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of decimal places carried by `Fixed`.
pub const DECIMAL_PLACES: u32 = 18;

/// The multiplier for 18 decimal places.
const SCALE: u128 = 10u128.pow(DECIMAL_PLACES);

// =============================================================================
// Fixed - 18 decimals, signed
// =============================================================================

/// Signed fixed-point decimal number with 18 decimal places.
///
/// Internally stores value * 10^18 as an i128.
///
/// # Range
///
/// Roughly ±170,141,183,460,469,231,731. Every operation that can leave the
/// range is `checked_*` and returns `None` instead of wrapping.
///
/// # Example
///
/// ```rust
/// use bazaar_market::Fixed;
///
/// let rate: Fixed = "0.01".parse().unwrap();
/// let multiplier = Fixed::ONE.checked_add(rate).unwrap();
/// assert_eq!(multiplier.to_string(), "1.01");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Fixed(i128);

impl Fixed {
    /// Zero value.
    pub const ZERO: Self = Self(0);

    /// One unit (1.000...000 with 18 zeros).
    #[allow(clippy::cast_possible_wrap)]
    pub const ONE: Self = Self(SCALE as i128);

    /// Creates from a whole number.
    #[inline]
    #[must_use]
    pub const fn from_int(whole: i64) -> Self {
        Self(whole as i128 * SCALE as i128)
    }

    /// Creates from the raw internal representation.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    /// Returns the raw internal representation.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> i128 {
        self.0
    }

    /// Creates `value / 10^decimals`, e.g. `from_scaled(5, 2)` is 0.05.
    ///
    /// Returns `None` if `decimals` exceeds 18.
    #[must_use]
    pub fn from_scaled(value: i64, decimals: u32) -> Option<Self> {
        scale_factor(decimals)
            .and_then(|factor| i128::from(value).checked_mul(factor))
            .map(Self)
    }

    /// Converts a price in minor units at `decimals` precision.
    #[must_use]
    pub fn from_price(price: Price, decimals: u32) -> Option<Self> {
        scale_factor(decimals)
            .and_then(|factor| i128::from(price.minor()).checked_mul(factor))
            .map(Self)
    }

    /// Rounds half-up to `decimals` places and returns the result as a
    /// price in minor units.
    ///
    /// Returns `None` for negative values or values beyond `u64` minor units.
    #[must_use]
    pub fn to_price(self, decimals: u32) -> Option<Price> {
        if self.0 < 0 {
            return None;
        }
        let minor = self.round_scaled(decimals)?;
        u64::try_from(minor).ok().map(Price::from_minor)
    }

    /// Rounds half-up (away from zero on ties) to a whole number.
    #[must_use]
    pub fn round_to_int(self) -> Option<i64> {
        self.round_scaled(0).and_then(|v| i64::try_from(v).ok())
    }

    /// Rounds toward negative infinity to a whole number.
    #[must_use]
    pub fn floor_to_int(self) -> Option<i64> {
        #[allow(clippy::cast_possible_wrap)]
        let whole = self.0.div_euclid(SCALE as i128);
        i64::try_from(whole).ok()
    }

    /// Returns the value as a count of `10^-decimals` units, rounded half-up.
    fn round_scaled(self, decimals: u32) -> Option<i128> {
        let divisor = scale_factor(decimals)?.unsigned_abs();
        let magnitude = self.0.unsigned_abs();
        let mut units = magnitude / divisor;
        let remainder = magnitude % divisor;
        if remainder >= divisor - remainder {
            units += 1;
        }
        let units = i128::try_from(units).ok()?;
        Some(if self.0 < 0 { -units } else { units })
    }

    /// Returns true if zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns true if strictly below zero.
    #[inline]
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Absolute value. Returns `None` only for the most negative raw value.
    #[inline]
    #[must_use]
    pub const fn checked_abs(self) -> Option<Self> {
        match self.0.checked_abs() {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked addition.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction.
    #[inline]
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked multiplication, rounding the 19th decimal half-up.
    #[must_use]
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        let magnitude = mul_scaled(self.0.unsigned_abs(), rhs.0.unsigned_abs())?;
        with_sign(magnitude, (self.0 < 0) != (rhs.0 < 0))
    }

    /// Checked division, rounding the 19th decimal half-up.
    ///
    /// Returns `None` when `rhs` is zero.
    #[must_use]
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        let magnitude = div_scaled(self.0.unsigned_abs(), rhs.0.unsigned_abs())?;
        with_sign(magnitude, (self.0 < 0) != (rhs.0 < 0))
    }

    /// Checked multiplication by a whole number (exact).
    #[inline]
    #[must_use]
    pub fn checked_mul_int(self, rhs: i64) -> Option<Self> {
        self.0.checked_mul(i128::from(rhs)).map(Self)
    }

    /// Raises to a non-negative integer power by repeated squaring.
    ///
    /// Each intermediate product is rounded at the 18th decimal, so the
    /// relative error stays in the order of `exp * 10^-18`.
    #[must_use]
    pub fn checked_pow(self, mut exp: u32) -> Option<Self> {
        let mut base = self;
        let mut acc = Self::ONE;
        while exp > 0 {
            if exp & 1 == 1 {
                acc = acc.checked_mul(base)?;
            }
            exp >>= 1;
            if exp > 0 {
                base = base.checked_mul(base)?;
            }
        }
        Some(acc)
    }
}

/// `10^(18 - decimals)` as the raw factor for a value with `decimals` places.
fn scale_factor(decimals: u32) -> Option<i128> {
    DECIMAL_PLACES
        .checked_sub(decimals)
        .map(|shift| 10i128.pow(shift))
}

fn with_sign(magnitude: u128, negative: bool) -> Option<Fixed> {
    let value = i128::try_from(magnitude).ok()?;
    Some(Fixed(if negative { -value } else { value }))
}

/// `a * b / SCALE` for raw magnitudes without a 256-bit intermediate.
///
/// Splitting both operands at `SCALE` keeps every partial product in range
/// unless the result itself overflows.
fn mul_scaled(a: u128, b: u128) -> Option<u128> {
    let (a_hi, a_lo) = (a / SCALE, a % SCALE);
    let (b_hi, b_lo) = (b / SCALE, b % SCALE);

    let high = a_hi.checked_mul(b_hi)?.checked_mul(SCALE)?;
    let cross = a_hi.checked_mul(b_lo)?.checked_add(a_lo.checked_mul(b_hi)?)?;
    // Both below 10^18, so the product is below 10^36.
    let low = (a_lo * b_lo + SCALE / 2) / SCALE;

    high.checked_add(cross)?.checked_add(low)
}

/// `a * SCALE / b` for raw magnitudes by long division over the decimals.
fn div_scaled(a: u128, b: u128) -> Option<u128> {
    if b == 0 {
        return None;
    }
    let mut result = (a / b).checked_mul(SCALE)?;
    let mut remainder = a % b;
    let mut fraction: u128 = 0;
    for _ in 0..DECIMAL_PLACES {
        remainder = remainder.checked_mul(10)?;
        fraction = fraction * 10 + remainder / b;
        remainder %= b;
    }
    result = result.checked_add(fraction)?;
    if remainder >= b - remainder {
        result = result.checked_add(1)?;
    }
    Some(result)
}

/// Error returned when parsing a `Fixed` from text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid fixed-point literal: {0:?}")]
pub struct ParseFixedError(String);

impl FromStr for Fixed {
    type Err = ParseFixedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseFixedError(s.to_string());
        let text = s.trim();
        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(err());
        }
        if fraction.len() > DECIMAL_PLACES as usize {
            return Err(err());
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err());
        }

        let whole_value: i128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| err())?
        };
        let mut fraction_value: i128 = if fraction.is_empty() {
            0
        } else {
            fraction.parse().map_err(|_| err())?
        };
        // The fraction is at most 18 digits, so the padding factor fits.
        #[allow(clippy::cast_possible_truncation)]
        let pad = DECIMAL_PLACES - fraction.len() as u32;
        fraction_value *= 10i128.pow(pad);

        #[allow(clippy::cast_possible_wrap)]
        let raw = whole_value
            .checked_mul(SCALE as i128)
            .and_then(|v| v.checked_add(fraction_value))
            .ok_or_else(err)?;
        Ok(Self(if negative { -raw } else { raw }))
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({self})")
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.0.unsigned_abs();
        let sign = if self.0 < 0 { "-" } else { "" };
        let whole = magnitude / SCALE;
        let fraction = magnitude % SCALE;
        if fraction == 0 {
            return write!(f, "{sign}{whole}");
        }
        let digits = format!("{fraction:018}");
        write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl Serialize for Fixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fixed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FixedVisitor)
    }
}

struct FixedVisitor;

impl<'de> Visitor<'de> for FixedVisitor {
    type Value = Fixed;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal number or decimal string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Fixed, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Fixed, E> {
        Ok(Fixed::from_int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Fixed, E> {
        i64::try_from(v)
            .map(Fixed::from_int)
            .map_err(|_| E::custom("integer out of range"))
    }

    // The shortest round-trip text of the float is parsed as a decimal, so
    // `0.05` in a TOML file becomes exactly 0.05.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Fixed, E> {
        self.visit_str(&v.to_string())
    }
}

// =============================================================================
// Price - minor units
// =============================================================================

/// A price or an amount of currency in minor units.
///
/// The number of decimals is a market-wide setting
/// (`MarketConfig::price_decimals`), so a `Price` is only meaningful together
/// with that precision.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Price(u64);

impl Price {
    /// Zero value.
    pub const ZERO: Self = Self(0);

    /// Creates a price from minor units.
    #[inline]
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Returns the minor units.
    #[inline]
    #[must_use]
    pub const fn minor(self) -> u64 {
        self.0
    }

    /// Returns true if zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction.
    #[inline]
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Saturating subtraction.
    #[inline]
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Checked multiplication by a unit count.
    #[inline]
    #[must_use]
    pub const fn checked_mul_int(self, rhs: u64) -> Option<Self> {
        match self.0.checked_mul(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Formats with the given number of decimals, e.g. `10.46`.
    #[must_use]
    pub fn format(self, decimals: u32) -> String {
        if decimals == 0 {
            return self.0.to_string();
        }
        let divisor = 10u64.pow(decimals);
        format!(
            "{}.{:0width$}",
            self.0 / divisor,
            self.0 % divisor,
            width = decimals as usize
        )
    }
}

impl fmt::Debug for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Price({})", self.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
