//! Numeric module providing exact rational arithmetic for ledger quantities
//!
//! Every amount and value in the engine is a `Numeric`: an exact BigRational
//! with no implicit denominator. Rounding only happens when a caller converts
//! to a commodity fraction (SCU) with an explicit [`RoundMode`].

use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest number of decimal places rendered before falling back to `num/denom`
pub const MAX_DECIMAL_PLACES: u32 = 18;

/// Errors that can occur during numeric operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Zero denominator")]
    ZeroDenominator,
    #[error("Cannot parse numeric from string: {0}")]
    ParseError(String),
    #[error("Invalid fraction {0}: must be positive")]
    InvalidFraction(i64),
    #[error("Rounding required to reach fraction {0}")]
    RoundingRequired(i64),
}

/// Result type for numeric operations
pub type NumericResult<T> = Result<T, NumericError>;

/// How to round when converting to a fixed denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundMode {
    /// Towards negative infinity
    Floor,
    /// Towards positive infinity
    Ceiling,
    /// Towards zero
    Truncate,
    /// Nearest, halves away from zero
    HalfUp,
    /// Refuse to round; the value must already be representable
    Never,
}

/// An exact rational quantity
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Numeric(BigRational);

impl Numeric {
    /// The additive identity
    pub fn zero() -> Self {
        Self(BigRational::zero())
    }

    /// Create a numeric from an integer
    pub fn from_i64(value: i64) -> Self {
        Self(BigRational::from_integer(BigInt::from(value)))
    }

    /// Create a numeric from a numerator and denominator
    pub fn new(num: i64, denom: i64) -> NumericResult<Self> {
        if denom == 0 {
            return Err(NumericError::ZeroDenominator);
        }
        Ok(Self(BigRational::new(BigInt::from(num), BigInt::from(denom))))
    }

    /// Wrap an existing rational
    pub fn from_rational(rational: BigRational) -> Self {
        Self(rational)
    }

    /// Create a numeric from a rust_decimal::Decimal
    pub fn from_decimal(decimal: Decimal) -> Self {
        let numerator = BigInt::from(decimal.mantissa());
        let denominator = BigInt::from(10u64).pow(decimal.scale());
        Self(BigRational::new(numerator, denominator))
    }

    /// Parse `"12.34"`, `"-7"` or `"1234/100"`
    pub fn parse(value_str: &str) -> NumericResult<Self> {
        let trimmed = value_str.trim();
        if let Some((num, denom)) = trimmed.split_once('/') {
            let num = num
                .trim()
                .parse::<BigInt>()
                .map_err(|e| NumericError::ParseError(format!("{}: {}", trimmed, e)))?;
            let denom = denom
                .trim()
                .parse::<BigInt>()
                .map_err(|e| NumericError::ParseError(format!("{}: {}", trimmed, e)))?;
            if denom.is_zero() {
                return Err(NumericError::ZeroDenominator);
            }
            return Ok(Self(BigRational::new(num, denom)));
        }

        let decimal = trimmed
            .parse::<Decimal>()
            .map_err(|e| NumericError::ParseError(format!("{}: {}", trimmed, e)))?;
        Ok(Self::from_decimal(decimal))
    }

    /// Check if this numeric is exactly zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check if this numeric is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    /// Check if this numeric is strictly negative
    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Returns -1, 0, or 1
    pub fn sign(&self) -> i32 {
        if self.0.is_zero() {
            0
        } else if self.0.is_positive() {
            1
        } else {
            -1
        }
    }

    /// True when both values are non-zero and share a sign
    pub fn same_sign(&self, other: &Numeric) -> bool {
        let sign = self.sign();
        sign != 0 && sign == other.sign()
    }

    /// Absolute value
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Negate this numeric (in-place)
    pub fn in_place_negate(&mut self) {
        self.0 = -&self.0;
    }

    /// Get the negated version of this numeric
    pub fn negated(&self) -> Self {
        Self(-&self.0)
    }

    /// Divide, failing on a zero divisor
    pub fn checked_div(&self, other: &Numeric) -> NumericResult<Numeric> {
        if other.is_zero() {
            return Err(NumericError::DivisionByZero);
        }
        Ok(Self(&self.0 / &other.0))
    }

    /// The reduced numerator
    pub fn numer(&self) -> &BigInt {
        self.0.numer()
    }

    /// The reduced denominator
    pub fn denom(&self) -> &BigInt {
        self.0.denom()
    }

    /// Borrow the underlying rational
    pub fn as_rational(&self) -> &BigRational {
        &self.0
    }

    /// Approximate as a float, for display and heuristics only
    pub fn to_f64(&self) -> f64 {
        let num = self.0.numer().to_f64().unwrap_or(0.0);
        let denom = self.0.denom().to_f64().unwrap_or(1.0);
        num / denom
    }

    /// True when the value is a whole multiple of `1/fraction`
    pub fn fits_fraction(&self, fraction: i64) -> bool {
        if fraction <= 0 {
            return false;
        }
        let scaled = &self.0 * BigRational::from_integer(BigInt::from(fraction));
        scaled.is_integer()
    }

    /// Round to a multiple of `1/fraction`
    ///
    /// `fraction` is a commodity's smallest currency unit count (100 for
    /// cents). `RoundMode::Never` fails if the value does not already fit.
    pub fn convert(&self, fraction: i64, mode: RoundMode) -> NumericResult<Numeric> {
        if fraction <= 0 {
            return Err(NumericError::InvalidFraction(fraction));
        }
        let scale = BigRational::from_integer(BigInt::from(fraction));
        let scaled = &self.0 * &scale;
        if scaled.is_integer() {
            return Ok(self.clone());
        }

        let rounded = match mode {
            RoundMode::Floor => scaled.floor(),
            RoundMode::Ceiling => scaled.ceil(),
            RoundMode::Truncate => scaled.trunc(),
            // BigRational::round rounds half away from zero
            RoundMode::HalfUp => scaled.round(),
            RoundMode::Never => return Err(NumericError::RoundingRequired(fraction)),
        };
        Ok(Self(rounded / scale))
    }

    /// Round half-up to `1/fraction`, leaving the value untouched for a bad fraction
    pub fn rounded_to(&self, fraction: i64) -> Numeric {
        self.convert(fraction, RoundMode::HalfUp)
            .unwrap_or_else(|_| self.clone())
    }

    /// Number of decimal places needed to print this value exactly, if any
    fn decimal_places(&self) -> Option<u32> {
        let denom = self.0.denom();
        if denom.is_one() {
            return Some(0);
        }
        let ten = BigInt::from(10);
        let mut power = BigInt::one();
        for places in 1..=MAX_DECIMAL_PLACES {
            power *= &ten;
            if (&power % denom).is_zero() {
                return Some(places);
            }
        }
        None
    }
}

impl Default for Numeric {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decimal_places() {
            Some(0) => write!(f, "{}", self.0.numer()),
            Some(places) => {
                let scale = BigInt::from(10).pow(places);
                let scaled = (self.0.numer() * &scale) / self.0.denom();
                let digits = scaled.abs().to_string();
                let width = places as usize + 1;
                let padded = format!("{:0>width$}", digits, width = width);
                let (int_part, frac_part) = padded.split_at(padded.len() - places as usize);
                let sign = if self.0.is_negative() { "-" } else { "" };
                write!(f, "{}{}.{}", sign, int_part, frac_part)
            }
            None => write!(f, "{}/{}", self.0.numer(), self.0.denom()),
        }
    }
}

impl fmt::Debug for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Numeric({})", self)
    }
}

impl FromStr for Numeric {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<i64> for Numeric {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl From<i32> for Numeric {
    fn from(value: i32) -> Self {
        Self::from_i64(value as i64)
    }
}

impl From<BigRational> for Numeric {
    fn from(value: BigRational) -> Self {
        Self(value)
    }
}

impl From<Decimal> for Numeric {
    fn from(value: Decimal) -> Self {
        Self::from_decimal(value)
    }
}

impl Serialize for Numeric {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Always the exact form so nothing is lost through a round-trip
        serializer.serialize_str(&format!("{}/{}", self.0.numer(), self.0.denom()))
    }
}

impl<'de> Deserialize<'de> for Numeric {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Numeric::parse(&text).map_err(serde::de::Error::custom)
    }
}

impl Add for Numeric {
    type Output = Numeric;

    fn add(self, other: Numeric) -> Numeric {
        Numeric(self.0 + other.0)
    }
}

impl Add<&Numeric> for Numeric {
    type Output = Numeric;

    fn add(self, other: &Numeric) -> Numeric {
        Numeric(self.0 + &other.0)
    }
}

impl Add<Numeric> for &Numeric {
    type Output = Numeric;

    fn add(self, other: Numeric) -> Numeric {
        Numeric(&self.0 + other.0)
    }
}

impl Add<&Numeric> for &Numeric {
    type Output = Numeric;

    fn add(self, other: &Numeric) -> Numeric {
        Numeric(&self.0 + &other.0)
    }
}

impl AddAssign<&Numeric> for Numeric {
    fn add_assign(&mut self, other: &Numeric) {
        self.0 += &other.0;
    }
}

impl AddAssign for Numeric {
    fn add_assign(&mut self, other: Numeric) {
        self.0 += other.0;
    }
}

impl Sub for Numeric {
    type Output = Numeric;

    fn sub(self, other: Numeric) -> Numeric {
        Numeric(self.0 - other.0)
    }
}

impl Sub<&Numeric> for Numeric {
    type Output = Numeric;

    fn sub(self, other: &Numeric) -> Numeric {
        Numeric(self.0 - &other.0)
    }
}

impl Sub<Numeric> for &Numeric {
    type Output = Numeric;

    fn sub(self, other: Numeric) -> Numeric {
        Numeric(&self.0 - other.0)
    }
}

impl Sub<&Numeric> for &Numeric {
    type Output = Numeric;

    fn sub(self, other: &Numeric) -> Numeric {
        Numeric(&self.0 - &other.0)
    }
}

impl SubAssign<&Numeric> for Numeric {
    fn sub_assign(&mut self, other: &Numeric) {
        self.0 -= &other.0;
    }
}

impl SubAssign for Numeric {
    fn sub_assign(&mut self, other: Numeric) {
        self.0 -= other.0;
    }
}

impl Mul for Numeric {
    type Output = Numeric;

    fn mul(self, other: Numeric) -> Numeric {
        Numeric(self.0 * other.0)
    }
}

impl Mul<&Numeric> for Numeric {
    type Output = Numeric;

    fn mul(self, other: &Numeric) -> Numeric {
        Numeric(self.0 * &other.0)
    }
}

impl Mul<Numeric> for &Numeric {
    type Output = Numeric;

    fn mul(self, other: Numeric) -> Numeric {
        Numeric(&self.0 * other.0)
    }
}

impl Mul<&Numeric> for &Numeric {
    type Output = Numeric;

    fn mul(self, other: &Numeric) -> Numeric {
        Numeric(&self.0 * &other.0)
    }
}

impl Neg for Numeric {
    type Output = Numeric;

    fn neg(self) -> Numeric {
        Numeric(-self.0)
    }
}

impl Neg for &Numeric {
    type Output = Numeric;

    fn neg(self) -> Numeric {
        self.negated()
    }
}

impl Sum for Numeric {
    fn sum<I: Iterator<Item = Numeric>>(iter: I) -> Numeric {
        iter.fold(Numeric::zero(), |acc, n| acc + n)
    }
}

impl<'a> Sum<&'a Numeric> for Numeric {
    fn sum<I: Iterator<Item = &'a Numeric>>(iter: I) -> Numeric {
        iter.fold(Numeric::zero(), |acc, n| acc + n)
    }
}

/// Compare two numerics by absolute magnitude
pub fn cmp_abs(a: &Numeric, b: &Numeric) -> Ordering {
    a.0.abs().cmp(&b.0.abs())
}
