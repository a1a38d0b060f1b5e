//! Globally unique identifiers for engine entities
//!
//! Every book, account, split, transaction, lot and business object carries a
//! 128-bit [`Guid`]. GUIDs are drawn from the operating system's entropy
//! source and printed as 32 lowercase hex digits. The typed wrappers
//! ([`AccountId`], [`SplitId`], ...) keep entity kinds apart at compile time
//! while sharing the same identity space.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Length of the printed form
pub const GUID_ENCODING_LENGTH: usize = 32;

/// Errors from parsing a GUID string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuidError {
    /// Wrong number of characters
    #[error("GUID must be 32 hex digits, got {0} characters")]
    BadLength(usize),
    /// A character outside `[0-9a-fA-F]`
    #[error("invalid hex digit {0:?} in GUID")]
    BadDigit(char),
}

/// A 16-byte globally unique identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid([u8; 16]);

impl Guid {
    /// Generate a fresh random GUID
    pub fn new() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    /// The all-zero GUID, used as "no entity"
    pub const fn null() -> Self {
        Self([0; 16])
    }

    /// Build from raw bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// True for the all-zero GUID
    pub fn is_null(&self) -> bool {
        self.0 == [0; 16]
    }

    /// Parse 32 hex digits (either case)
    pub fn parse(text: &str) -> Result<Self, GuidError> {
        let text = text.trim();
        if text.len() != GUID_ENCODING_LENGTH {
            return Err(GuidError::BadLength(text.chars().count()));
        }
        let mut bytes = [0u8; 16];
        let digits: Vec<char> = text.chars().collect();
        for (i, pair) in digits.chunks(2).enumerate() {
            let hi = pair[0].to_digit(16).ok_or(GuidError::BadDigit(pair[0]))?;
            let lo = pair[1].to_digit(16).ok_or(GuidError::BadDigit(pair[1]))?;
            bytes[i] = (hi * 16 + lo) as u8;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

impl FromStr for Guid {
    type Err = GuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Guid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Guid::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Entity kind tag carried alongside a GUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdType {
    /// A book
    Book,
    /// An account
    Account,
    /// A transaction
    Trans,
    /// A split
    Split,
    /// A lot
    Lot,
    /// A customer
    Customer,
    /// A vendor
    Vendor,
    /// An employee
    Employee,
    /// A job
    Job,
    /// A tax table
    TaxTable,
    /// An invoice line item
    Entry,
    /// An invoice, bill or expense voucher
    Invoice,
}

impl IdType {
    /// The registered type name
    pub fn as_str(&self) -> &'static str {
        match self {
            IdType::Book => "Book",
            IdType::Account => "Account",
            IdType::Trans => "Trans",
            IdType::Split => "Split",
            IdType::Lot => "Lot",
            IdType::Customer => "gncCustomer",
            IdType::Vendor => "gncVendor",
            IdType::Employee => "gncEmployee",
            IdType::Job => "gncJob",
            IdType::TaxTable => "gncTaxTable",
            IdType::Entry => "gncEntry",
            IdType::Invoice => "gncInvoice",
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by the typed id wrappers
pub trait EntityId: Copy + Eq + std::hash::Hash + fmt::Debug {
    /// The kind of entity this id names
    const ID_TYPE: IdType;

    /// Wrap a GUID
    fn from_guid(guid: Guid) -> Self;

    /// The wrapped GUID
    fn guid(&self) -> Guid;
}

macro_rules! typed_id {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Guid);

        impl $name {
            /// Generate a fresh id
            pub fn new() -> Self {
                Self(Guid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl EntityId for $name {
            const ID_TYPE: IdType = $kind;

            fn from_guid(guid: Guid) -> Self {
                Self(guid)
            }

            fn guid(&self) -> Guid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

typed_id!(
    /// Identifies an account
    AccountId,
    IdType::Account
);
typed_id!(
    /// Identifies a split
    SplitId,
    IdType::Split
);
typed_id!(
    /// Identifies a transaction
    TransId,
    IdType::Trans
);
typed_id!(
    /// Identifies a lot
    LotId,
    IdType::Lot
);
typed_id!(
    /// Identifies a customer
    CustomerId,
    IdType::Customer
);
typed_id!(
    /// Identifies a vendor
    VendorId,
    IdType::Vendor
);
typed_id!(
    /// Identifies an employee
    EmployeeId,
    IdType::Employee
);
typed_id!(
    /// Identifies a job
    JobId,
    IdType::Job
);
typed_id!(
    /// Identifies a tax table
    TaxTableId,
    IdType::TaxTable
);
typed_id!(
    /// Identifies an invoice line item
    EntryId,
    IdType::Entry
);
typed_id!(
    /// Identifies an invoice
    InvoiceId,
    IdType::Invoice
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_format_and_parse() {
        let guid = Guid::new();
        let text = guid.to_string();
        assert_eq!(text.len(), GUID_ENCODING_LENGTH);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(Guid::parse(&text).unwrap(), guid);
        assert_eq!(Guid::parse(&text.to_uppercase()).unwrap(), guid);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Guid::parse("abc"), Err(GuidError::BadLength(3)));
        let bad = "g".repeat(GUID_ENCODING_LENGTH);
        assert_eq!(Guid::parse(&bad), Err(GuidError::BadDigit('g')));
    }

    #[test]
    fn test_null() {
        assert!(Guid::null().is_null());
        assert_eq!(Guid::null().to_string(), "0".repeat(32));
        assert!(!Guid::new().is_null());
    }

    #[test]
    fn test_no_repeats_in_session() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(Guid::new()));
        }
    }

    #[test]
    fn test_typed_ids_share_guid_space() {
        let account = AccountId::new();
        let as_lot = LotId::from_guid(account.guid());
        assert_eq!(as_lot.guid(), account.guid());
        assert_eq!(AccountId::ID_TYPE, IdType::Account);
    }

    #[test]
    fn test_serde_as_string() {
        let guid = Guid::from_bytes([0xab; 16]);
        let json = serde_json::to_string(&guid).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(16)));
        let id: SplitId = serde_json::from_str(&json).unwrap();
        assert_eq!(id.guid(), guid);
    }
}
