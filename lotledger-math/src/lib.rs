//! Exact arithmetic and commodity types for lotledger
//!
//! This crate provides the exact rational arithmetic used for every amount
//! and value in the ledger, the commodity identities those amounts are
//! denominated in, and a multi-commodity balance for subtree totals.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod balance;
pub mod commodity;
pub mod numeric;

// Re-export main types
pub use balance::Balance;
pub use commodity::{Commodity, CommodityTable, CURRENCY_NAMESPACE, DEFAULT_FRACTION};
pub use numeric::{cmp_abs, Numeric, NumericError, NumericResult, RoundMode};

// Re-export for convenience
pub use num_bigint::BigInt;
pub use num_rational::BigRational;
pub use rust_decimal::Decimal;
