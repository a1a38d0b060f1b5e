//! Commodity module providing currency and security identities
//!
//! A commodity is identified by its namespace and mnemonic (`CURRENCY::USD`,
//! `NASDAQ::AAPL`). Its fraction is the smallest unit count used when
//! rounding amounts held in that commodity.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace used for ISO 4217 currencies
pub const CURRENCY_NAMESPACE: &str = "CURRENCY";

/// Default fraction for commodities that do not specify one
pub const DEFAULT_FRACTION: i64 = 100;

/// A currency, security or other tradeable item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commodity {
    namespace: String,
    mnemonic: String,
    fullname: String,
    fraction: i64,
}

impl Commodity {
    /// Create a new commodity
    pub fn new(
        namespace: impl Into<String>,
        mnemonic: impl Into<String>,
        fullname: impl Into<String>,
        fraction: i64,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            mnemonic: mnemonic.into(),
            fullname: fullname.into(),
            fraction: if fraction > 0 { fraction } else { DEFAULT_FRACTION },
        }
    }

    /// Create an ISO currency
    pub fn currency(mnemonic: impl Into<String>, fraction: i64) -> Self {
        let mnemonic = mnemonic.into();
        Self::new(CURRENCY_NAMESPACE, mnemonic.clone(), mnemonic, fraction)
    }

    /// The namespace, e.g. `CURRENCY` or an exchange name
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The ticker or ISO code
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// Human readable name
    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Smallest unit count (100 for cents)
    pub fn fraction(&self) -> i64 {
        self.fraction
    }

    /// `namespace::mnemonic`
    pub fn unique_name(&self) -> String {
        format!("{}::{}", self.namespace, self.mnemonic)
    }

    /// True for ISO currencies
    pub fn is_currency(&self) -> bool {
        self.namespace == CURRENCY_NAMESPACE
    }

    /// Two commodities are equivalent when namespace and mnemonic match
    pub fn equiv(&self, other: &Commodity) -> bool {
        self.namespace == other.namespace && self.mnemonic == other.mnemonic
    }
}

impl PartialEq for Commodity {
    fn eq(&self, other: &Self) -> bool {
        self.equiv(other)
    }
}

impl Eq for Commodity {}

impl std::hash::Hash for Commodity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.mnemonic.hash(state);
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)
    }
}

/// Registry of the commodities known to a book
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommodityTable {
    commodities: BTreeMap<String, Commodity>,
}

impl CommodityTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// A table seeded with a handful of common currencies
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.insert(Commodity::new(CURRENCY_NAMESPACE, "USD", "US Dollar", 100));
        table.insert(Commodity::new(CURRENCY_NAMESPACE, "EUR", "Euro", 100));
        table.insert(Commodity::new(CURRENCY_NAMESPACE, "GBP", "British Pound", 100));
        table.insert(Commodity::new(CURRENCY_NAMESPACE, "JPY", "Japanese Yen", 1));
        table
    }

    /// Insert or replace a commodity, returning the stored copy
    pub fn insert(&mut self, commodity: Commodity) -> Commodity {
        self.commodities
            .insert(commodity.unique_name(), commodity.clone());
        commodity
    }

    /// Look up by namespace and mnemonic
    pub fn lookup(&self, namespace: &str, mnemonic: &str) -> Option<&Commodity> {
        self.commodities.get(&format!("{}::{}", namespace, mnemonic))
    }

    /// Look up an ISO currency
    pub fn lookup_currency(&self, mnemonic: &str) -> Option<&Commodity> {
        self.lookup(CURRENCY_NAMESPACE, mnemonic)
    }

    /// Number of commodities
    pub fn len(&self) -> usize {
        self.commodities.len()
    }

    /// True when no commodity is registered
    pub fn is_empty(&self) -> bool {
        self.commodities.is_empty()
    }

    /// Iterate in unique-name order
    pub fn iter(&self) -> impl Iterator<Item = &Commodity> {
        self.commodities.values()
    }
}
