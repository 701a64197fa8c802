// ============================================================================
// Fixed-Point Decimal
// Exact fixed-point arithmetic with compile-time precision
// ============================================================================

use super::errors::{NumericError, NumericResult};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Neg;
use std::str::FromStr;

/// Fixed-point decimal number with compile-time precision.
///
/// Internally stores `value × 10^DECIMALS` as an i64, so two values with the
/// same `DECIMALS` compare and add exactly.
///
/// # Value Range
/// With DECIMALS=9 (default):
/// - Maximum: +9,223,372,036.854775807
/// - Precision: 0.000000001
///
/// # Example
/// ```
/// use matching_core::numeric::Price;
///
/// let price: Price = "100.25".parse().unwrap();
/// let qty = Price::from_integer(4).unwrap();
/// assert_eq!(price.checked_mul(qty).unwrap(), Price::from_integer(401).unwrap());
/// ```
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct FixedDecimal<const DECIMALS: u8 = 9>(i64);

/// Compute 10^n at compile time
const fn pow10(n: u8) -> i64 {
    let mut result: i64 = 1;
    let mut i = 0;
    while i < n {
        result *= 10;
        i += 1;
    }
    result
}

impl<const D: u8> FixedDecimal<D> {
    /// The scale factor (10^DECIMALS)
    pub const SCALE: i64 = pow10(D);

    const HALF_SCALE: i64 = pow10(D) / 2;

    pub const ZERO: Self = Self(0);

    pub const ONE: Self = Self(pow10(D));

    pub const MAX: Self = Self(i64::MAX);

    // ========================================================================
    // Construction
    // ========================================================================

    /// Create from the raw scaled representation.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Create from an integer value.
    ///
    /// # Errors
    /// Returns `Overflow` if the value is too large to represent.
    #[inline]
    pub fn from_integer(value: i64) -> NumericResult<Self> {
        value
            .checked_mul(Self::SCALE)
            .map(Self)
            .ok_or(NumericError::Overflow)
    }

    /// Create from integer and fractional parts.
    ///
    /// `fraction` is expressed in units of 10^-DECIMALS and must be below
    /// `SCALE`; it carries the sign of `integer`.
    #[inline]
    pub fn from_parts(integer: i64, fraction: u64) -> NumericResult<Self> {
        if fraction >= Self::SCALE as u64 {
            return Err(NumericError::InvalidInput);
        }

        let int_scaled = integer
            .checked_mul(Self::SCALE)
            .ok_or(NumericError::Overflow)?;

        let frac_signed = if integer < 0 {
            -(fraction as i64)
        } else {
            fraction as i64
        };

        int_scaled
            .checked_add(frac_signed)
            .map(Self)
            .ok_or(NumericError::Overflow)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub const fn raw_value(self) -> i64 {
        self.0
    }

    /// Integer part, truncated toward zero.
    #[inline]
    pub const fn integer_part(self) -> i64 {
        self.0 / Self::SCALE
    }

    #[inline]
    pub const fn fractional_part(self) -> u64 {
        (self.0 % Self::SCALE).unsigned_abs()
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// True when `self` is an exact multiple of `step` (tick and lot checks).
    ///
    /// A non-positive step never constrains anything.
    #[inline]
    pub const fn is_multiple_of(self, step: Self) -> bool {
        step.0 <= 0 || self.0 % step.0 == 0
    }

    // ========================================================================
    // Arithmetic Operations
    // ========================================================================

    #[inline]
    pub fn checked_add(self, rhs: Self) -> NumericResult<Self> {
        self.0.checked_add(rhs.0).map(Self).ok_or(if rhs.0 > 0 {
            NumericError::Overflow
        } else {
            NumericError::Underflow
        })
    }

    #[inline]
    pub fn checked_sub(self, rhs: Self) -> NumericResult<Self> {
        self.0.checked_sub(rhs.0).map(Self).ok_or(if rhs.0 < 0 {
            NumericError::Overflow
        } else {
            NumericError::Underflow
        })
    }

    /// Subtraction clamped at zero.
    ///
    /// Used for quantity bookkeeping where the subtrahend is bounded by the
    /// minuend (a fill never exceeds what is left).
    #[inline]
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0).max(0))
    }

    /// Checked multiplication with round half-up.
    ///
    /// Uses an i128 intermediate, then rounds and scales back to i64.
    #[inline]
    pub fn checked_mul(self, rhs: Self) -> NumericResult<Self> {
        let scale = Self::SCALE as i128;
        let half_scale = Self::HALF_SCALE as i128;
        let product = (self.0 as i128) * (rhs.0 as i128);

        let rounded = if product >= 0 {
            product + half_scale
        } else {
            product - half_scale
        };

        Self::narrow(rounded / scale)
    }

    /// Divide by an integer, rounding half away from zero.
    #[inline]
    pub fn checked_div_int(self, rhs: i64) -> NumericResult<Self> {
        if rhs == 0 {
            return Err(NumericError::DivisionByZero);
        }
        let num = self.0 as i128;
        let den = rhs as i128;
        let quotient = num / den;
        let remainder = num % den;
        let adjust = if remainder.abs() * 2 >= den.abs() {
            if (num < 0) != (den < 0) {
                -1
            } else {
                1
            }
        } else {
            0
        };
        Self::narrow(quotient + adjust)
    }

    fn narrow(value: i128) -> NumericResult<Self> {
        if value > i64::MAX as i128 {
            Err(NumericError::Overflow)
        } else if value < i64::MIN as i128 {
            Err(NumericError::Underflow)
        } else {
            Ok(Self(value as i64))
        }
    }
}

// ============================================================================
// Trait Implementations
// ============================================================================

impl<const D: u8> Default for FixedDecimal<D> {
    #[inline]
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const D: u8> PartialEq for FixedDecimal<D> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<const D: u8> Eq for FixedDecimal<D> {}

impl<const D: u8> PartialOrd for FixedDecimal<D> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const D: u8> Ord for FixedDecimal<D> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<const D: u8> Hash for FixedDecimal<D> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<const D: u8> Neg for FixedDecimal<D> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl<const D: u8> std::iter::Sum for FixedDecimal<D> {
    /// Saturates at `MAX`; book-level aggregates stay far below it.
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.fold(0i64, |acc, x| acc.saturating_add(x.0)))
    }
}

// ============================================================================
// Display and Debug
// ============================================================================

impl<const D: u8> fmt::Debug for FixedDecimal<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedDecimal<{}>({})", D, self)
    }
}

impl<const D: u8> fmt::Display for FixedDecimal<D> {
    /// Trailing fractional zeros are dropped: `100.5`, `100`, `-0.25`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int_part = self.integer_part();
        let frac_part = self.fractional_part();
        let sign = if self.0 < 0 && int_part == 0 { "-" } else { "" };

        if D == 0 || frac_part == 0 {
            return write!(f, "{}{}", sign, int_part);
        }

        let digits = format!("{:0>width$}", frac_part, width = D as usize);
        write!(f, "{}{}.{}", sign, int_part, digits.trim_end_matches('0'))
    }
}

// ============================================================================
// Conversion from rust_decimal (for API boundaries)
// ============================================================================

impl<const D: u8> FixedDecimal<D> {
    /// Convert from `rust_decimal::Decimal` without losing digits.
    ///
    /// # Errors
    /// - `PrecisionLoss` if `d` has more fractional digits than `DECIMALS`
    /// - `Overflow` if the value is too large
    pub fn from_decimal(d: rust_decimal::Decimal) -> NumericResult<Self> {
        use rust_decimal::prelude::ToPrimitive;

        let scaled = d
            .checked_mul(rust_decimal::Decimal::from(Self::SCALE))
            .ok_or(NumericError::Overflow)?;

        if !scaled.fract().is_zero() {
            return Err(NumericError::PrecisionLoss);
        }

        scaled.to_i64().map(Self).ok_or(NumericError::Overflow)
    }

    /// Convert to `rust_decimal::Decimal` (exact).
    pub fn to_decimal(self) -> rust_decimal::Decimal {
        rust_decimal::Decimal::from_i128_with_scale(self.0 as i128, D as u32).normalize()
    }
}

// ============================================================================
// String Parsing
// ============================================================================

impl<const D: u8> FromStr for FixedDecimal<D> {
    type Err = NumericError;

    /// Parse a plain decimal string such as `"101"`, `"0.5"` or `"-12.25"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (is_negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let (int_str, frac_str) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        if int_str.is_empty() && frac_str.is_empty() {
            return Err(NumericError::InvalidInput);
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_str) || !all_digits(frac_str) {
            return Err(NumericError::InvalidInput);
        }
        if frac_str.len() > D as usize {
            return Err(NumericError::PrecisionLoss);
        }

        let int_val: i64 = if int_str.is_empty() {
            0
        } else {
            int_str.parse().map_err(|_| NumericError::Overflow)?
        };

        let frac_val: u64 = if frac_str.is_empty() {
            0
        } else {
            format!("{:0<width$}", frac_str, width = D as usize)
                .parse()
                .map_err(|_| NumericError::InvalidInput)?
        };

        let magnitude = Self::from_parts(int_val, frac_val)?;
        Ok(if is_negative { -magnitude } else { magnitude })
    }
}

#[cfg(feature = "serde")]
impl<const D: u8> serde::Serialize for FixedDecimal<D> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de, const D: u8> serde::Deserialize<'de> for FixedDecimal<D> {
    fn deserialize<De: serde::Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Type Aliases for Common Use Cases
// ============================================================================

/// Price with 9 decimal places
pub type Price = FixedDecimal<9>;

/// Quantity with 9 decimal places
pub type Quantity = FixedDecimal<9>;
