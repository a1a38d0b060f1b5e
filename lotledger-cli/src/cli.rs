//! Command-line interface definitions using Clap

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// lotledger - inspect, check and repair lot-tracking ledgers
#[derive(Parser, Debug)]
#[command(name = "lotledger")]
#[command(version, about = "Inspect, check and repair lot-tracking ledgers", long_about = None)]
pub struct Cli {
    /// Book file to operate on
    #[arg(short = 'f', long = "file", global = true)]
    pub file: Option<String>,

    /// Initialization file to use
    #[arg(short = 'i', long = "init-file", global = true)]
    pub init_file: Option<String>,

    /// Lot policy (fifo or lifo) applied to accounts before scrubbing
    #[arg(long = "policy", global = true)]
    pub policy: Option<String>,

    /// Ignore environment variables and init files
    #[arg(long = "args-only", global = true)]
    pub args_only: bool,

    /// Disable color output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the account tree with balances
    #[command(name = "accounts", aliases = &["acc"])]
    Accounts(AccountsArgs),

    /// Show the lots of an account
    #[command(name = "lots")]
    Lots(LotsArgs),

    /// Repair imbalances, orphans and lots, then save
    #[command(name = "scrub")]
    Scrub(ScrubArgs),

    /// Verify that transactions and closed lots balance
    #[command(name = "check")]
    Check,

    /// Show invoices, bills and expense vouchers
    #[command(name = "invoices")]
    Invoices(InvoicesArgs),

    /// Print fresh GUIDs
    #[command(name = "guid")]
    Guid(GuidArgs),

    /// Generate shell completion scripts
    #[command(name = "completions")]
    Completions(CompletionArgs),
}

impl Command {
    /// True for commands that do not read a book
    pub fn is_precommand(&self) -> bool {
        matches!(self, Command::Guid(_) | Command::Completions(_))
    }
}

/// Arguments for the accounts command
#[derive(Args, Debug)]
pub struct AccountsArgs {
    /// Only show accounts whose full name matches this regular expression
    pub pattern: Option<String>,

    /// Hide accounts with a zero balance
    #[arg(long = "no-empty", short = 'E')]
    pub no_empty: bool,
}

/// Arguments for the lots command
#[derive(Args, Debug)]
pub struct LotsArgs {
    /// Full name of the account, e.g. Assets:Brokerage:ACME
    pub account: String,

    /// Only show open lots
    #[arg(long = "open")]
    pub open: bool,
}

/// Arguments for the scrub command
#[derive(Args, Debug)]
pub struct ScrubArgs {
    /// Scrub only this account and its children
    #[arg(long = "account", short = 'a')]
    pub account: Option<String>,

    /// Report what would change without saving
    #[arg(long = "dry-run", short = 'n')]
    pub dry_run: bool,
}

/// Arguments for the invoices command
#[derive(Args, Debug)]
pub struct InvoicesArgs {
    /// Only show posted invoices that are not yet paid
    #[arg(long = "unpaid")]
    pub unpaid: bool,
}

/// Arguments for the guid command
#[derive(Args, Debug)]
pub struct GuidArgs {
    /// How many to print
    #[arg(default_value_t = 1)]
    pub count: usize,
}

/// Arguments for the completions command
#[derive(Args, Debug)]
pub struct CompletionArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script into this directory instead of stdout
    #[arg(long = "output-dir", short = 'o')]
    pub output_dir: Option<String>,
}
