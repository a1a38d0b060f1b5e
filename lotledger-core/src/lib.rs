//! Core engine for lotledger
//!
//! This crate provides the double-entry ledger (accounts, transactions and
//! their splits), lot tracking with pluggable accounting policies, realized
//! capital gains, the scrubbers that repair a book, and the business layer
//! that posts invoices and applies payments.
//!
//! Everything lives in a [`Book`]; entities refer to one another by typed
//! GUID ids and are changed through methods on the book.

#![warn(clippy::all)]
#![warn(missing_docs)]

/// Module for globally unique entity identifiers
pub mod guid;

/// Module for hierarchical key/value slots
pub mod kvp;

/// Module for entity instances and per-kind collections
pub mod instance;

/// Module for change notifications
pub mod event;

/// Module for the book arena
pub mod book;

/// Module for the account tree and balances
pub mod account;

/// Module for splits
pub mod split;

/// Module for transactions and their edit brackets
pub mod transaction;

/// Module for lots
pub mod lot;

/// Module for lot accounting policies
pub mod policy;

/// Module for lot assignment and realized gains
pub mod cap_gains;

/// Module for imbalance and orphan repair
pub mod scrub;

/// Module for lot repair
pub mod scrub_lots;

/// Module for customers, vendors, invoices and payments
pub mod business;

/// Module for saving and loading books
pub mod backend;

/// Module for engine errors
pub mod error;

pub use account::{Account, AccountType};
pub use backend::{Backend, JsonFileBackend};
pub use book::{Book, BookOptions};
pub use cap_gains::LotAssignment;
pub use error::{EngineError, EngineResult};
pub use event::{Event, EventKind, HandlerId};
pub use guid::{
    AccountId, CustomerId, EmployeeId, EntityId, EntryId, Guid, IdType, InvoiceId, JobId, LotId,
    SplitId, TaxTableId, TransId, VendorId,
};
pub use kvp::{KvpFrame, KvpValue};
pub use lot::Lot;
pub use policy::{Policy, PolicyKind};
pub use split::{Reconcile, Split};
pub use transaction::{Transaction, TxnType};

pub use lotledger_math::{Balance, Commodity, CommodityTable, Numeric, NumericError, RoundMode};
