//! Command-line front end for lotledger books
//!
//! Argument parsing, layered configuration, and the command handlers
//! behind the `lotledger` binary.

#![warn(missing_docs)]

pub mod cli;
pub mod completion;
pub mod dispatch;
pub mod session;

pub use cli::Cli;
pub use dispatch::{scrub_tree, Dispatcher, ScrubReport};
pub use session::Session;
