//! Error types for the ledger engine
//!
//! Misuse of the engine API (unknown entities, cross-account lot insertion,
//! edits to read-only transactions, double posting) surfaces as an
//! [`EngineError`]. Repair passes do not fail; they log and carry on.

use thiserror::Error;

use crate::guid::{Guid, IdType};
use lotledger_math::NumericError;

/// Errors raised by book operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// No entity of the given kind carries this GUID
    #[error("no {kind} with guid {guid}")]
    NotFound {
        /// Entity kind looked up
        kind: IdType,
        /// GUID looked up
        guid: Guid,
    },

    /// Attaching an account would create a cycle
    #[error("account {child} cannot be placed under {parent}: would create a cycle")]
    AccountCycle {
        /// Proposed parent
        parent: Guid,
        /// Account being moved
        child: Guid,
    },

    /// Account type cannot live under the parent's type
    #[error("a {child} account cannot be a child of a {parent} account")]
    IncompatibleAccountType {
        /// Parent type name
        parent: &'static str,
        /// Child type name
        child: &'static str,
    },

    /// A split from one account was offered to a lot of another
    #[error("split {split} belongs to a different account than lot {lot}")]
    LotAccountMismatch {
        /// The split
        split: Guid,
        /// The lot
        lot: Guid,
    },

    /// The transaction is marked read-only
    #[error("transaction {guid} is read-only: {reason}")]
    ReadOnly {
        /// The transaction
        guid: Guid,
        /// Why it is read-only
        reason: String,
    },

    /// The transaction is not open for editing
    #[error("transaction {0} is not open for editing")]
    NotEditing(Guid),

    /// The invoice has already been posted
    #[error("invoice {0} is already posted")]
    AlreadyPosted(String),

    /// The invoice has not been posted
    #[error("invoice {0} is not posted")]
    NotPosted(String),

    /// An argument was rejected
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Arithmetic failure
    #[error(transparent)]
    Numeric(#[from] NumericError),

    /// Backend I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Shorthand for [`EngineError::NotFound`]
    pub fn not_found(kind: IdType, guid: Guid) -> Self {
        EngineError::NotFound { kind, guid }
    }
}
