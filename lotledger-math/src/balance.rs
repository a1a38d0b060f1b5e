//! Balance module providing a multi-commodity sum
//!
//! Account trees mix commodities (a brokerage parent holding cash and several
//! securities), so subtree totals are kept per commodity rather than
//! collapsed into one number.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{AddAssign, Neg};

use serde::{Deserialize, Serialize};

use crate::commodity::Commodity;
use crate::numeric::Numeric;

/// Amounts of several commodities, keyed by commodity unique name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    amounts: BTreeMap<String, (Commodity, Numeric)>,
}

impl Balance {
    /// Create a new empty balance
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a balance holding one amount
    pub fn from_amount(commodity: &Commodity, amount: Numeric) -> Self {
        let mut balance = Self::new();
        balance.add(commodity, &amount);
        balance
    }

    /// Add an amount of a commodity; zero entries are dropped
    pub fn add(&mut self, commodity: &Commodity, amount: &Numeric) {
        let key = commodity.unique_name();
        let entry = self
            .amounts
            .entry(key.clone())
            .or_insert_with(|| (commodity.clone(), Numeric::zero()));
        entry.1 += amount;
        if entry.1.is_zero() {
            self.amounts.remove(&key);
        }
    }

    /// Subtract an amount of a commodity
    pub fn subtract(&mut self, commodity: &Commodity, amount: &Numeric) {
        self.add(commodity, &amount.negated());
    }

    /// The amount held in one commodity (zero when absent)
    pub fn get(&self, commodity: &Commodity) -> Numeric {
        self.amounts
            .get(&commodity.unique_name())
            .map(|(_, amount)| amount.clone())
            .unwrap_or_default()
    }

    /// True when every commodity nets to zero
    pub fn is_zero(&self) -> bool {
        self.amounts.is_empty()
    }

    /// Number of commodities with a non-zero amount
    pub fn commodity_count(&self) -> usize {
        self.amounts.len()
    }

    /// Iterate over the non-zero amounts
    pub fn amounts(&self) -> impl Iterator<Item = (&Commodity, &Numeric)> {
        self.amounts.values().map(|(c, a)| (c, a))
    }

    /// Get the negated version of this balance
    pub fn negated(&self) -> Balance {
        let amounts = self
            .amounts
            .iter()
            .map(|(k, (c, a))| (k.clone(), (c.clone(), a.negated())))
            .collect();
        Balance { amounts }
    }
}

impl AddAssign<&Balance> for Balance {
    fn add_assign(&mut self, other: &Balance) {
        for (commodity, amount) in other.amounts() {
            self.add(commodity, amount);
        }
    }
}

impl Neg for Balance {
    type Output = Balance;

    fn neg(self) -> Balance {
        self.negated()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.amounts.is_empty() {
            return write!(f, "0");
        }
        let mut first = true;
        for (commodity, amount) in self.amounts() {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{} {}", amount, commodity.mnemonic())?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_commodities() {
        let usd = Commodity::currency("USD", 100);
        let aapl = Commodity::new("NASDAQ", "AAPL", "Apple", 1);

        let mut balance = Balance::new();
        balance.add(&usd, &Numeric::from_i64(100));
        balance.add(&aapl, &Numeric::from_i64(5));
        balance.add(&usd, &Numeric::from_i64(-40));

        assert_eq!(balance.commodity_count(), 2);
        assert_eq!(balance.get(&usd), Numeric::from_i64(60));
        assert_eq!(balance.get(&aapl), Numeric::from_i64(5));
    }

    #[test]
    fn test_zero_entries_dropped() {
        let usd = Commodity::currency("USD", 100);
        let mut balance = Balance::from_amount(&usd, Numeric::from_i64(10));
        balance.subtract(&usd, &Numeric::from_i64(10));
        assert!(balance.is_zero());
        assert_eq!(balance.to_string(), "0");
    }

    #[test]
    fn test_add_assign_and_negate() {
        let usd = Commodity::currency("USD", 100);
        let mut a = Balance::from_amount(&usd, Numeric::from_i64(3));
        let b = Balance::from_amount(&usd, Numeric::from_i64(4));
        a += &b;
        assert_eq!(a.get(&usd), Numeric::from_i64(7));
        assert_eq!((-a).get(&usd), Numeric::from_i64(-7));
    }
}
