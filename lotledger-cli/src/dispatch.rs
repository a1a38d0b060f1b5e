//! Command dispatch and handlers
//!
//! Every handler returns the process exit code; errors bubble up as
//! `anyhow` errors with context.

use anyhow::{Context, Result};
use clap::CommandFactory;
use colored::Colorize;
use log::{debug, info};
use lotledger_core::{AccountId, Backend, Book, Guid, JsonFileBackend, LotId, SplitId};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

use crate::cli::{
    AccountsArgs, Cli, Command, CompletionArgs, GuidArgs, InvoicesArgs, LotsArgs, ScrubArgs,
};
use crate::completion;
use crate::session::Session;

/// What a scrub pass changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrubReport {
    /// Orphaned splits given an account
    pub orphans: usize,
    /// Transactions balanced into an imbalance account
    pub imbalanced: usize,
    /// Splits created, removed, or moved between lots
    pub lot_changes: usize,
}

impl ScrubReport {
    /// Total number of changes
    pub fn total(&self) -> usize {
        self.orphans + self.imbalanced + self.lot_changes
    }
}

/// Main command dispatcher
pub struct Dispatcher {
    session: Session,
}

impl Dispatcher {
    /// Create a new dispatcher with the given session
    pub fn new(session: Session) -> Self {
        if !session.use_color {
            colored::control::set_override(false);
        }
        Self { session }
    }

    /// Execute the command specified in the CLI arguments
    pub fn execute(&mut self, cli: &Cli) -> Result<i32> {
        if cli.command.is_precommand() {
            return self.execute_precommand(&cli.command);
        }

        let backend = JsonFileBackend::new(self.session.require_book_file()?);
        let mut book = backend
            .load()
            .with_context(|| format!("Failed to load book {}", backend.path().display()))?;
        info!("loaded {}", backend.path().display());

        match &cli.command {
            Command::Accounts(args) => self.execute_accounts_command(&book, args),
            Command::Lots(args) => self.execute_lots_command(&book, args),
            Command::Scrub(args) => self.execute_scrub_command(&mut book, &backend, args),
            Command::Check => self.execute_check_command(&mut book),
            Command::Invoices(args) => self.execute_invoices_command(&book, args),
            Command::Guid(_) | Command::Completions(_) => {
                unreachable!("pre-commands are handled before loading")
            }
        }
    }

    fn execute_precommand(&mut self, command: &Command) -> Result<i32> {
        match command {
            Command::Guid(args) => self.execute_guid_command(args),
            Command::Completions(args) => self.execute_completion_command(args),
            _ => Err(anyhow::anyhow!("Command needs a book")),
        }
    }

    fn execute_accounts_command(&self, book: &Book, args: &AccountsArgs) -> Result<i32> {
        let pattern = args
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("Invalid account pattern")?;

        let root = book.root_account();
        for acc in book.account_descendants(root)? {
            let full_name = book.account_full_name(acc)?;
            if pattern.as_ref().is_some_and(|re| !re.is_match(&full_name)) {
                continue;
            }
            let account = book.account(acc)?;
            let balance = book.account_tree_balance(acc)?;
            if args.no_empty && balance.is_zero() {
                continue;
            }
            let indent = "  ".repeat(book.account_depth(acc)?.saturating_sub(1));
            let name = if pattern.is_some() {
                full_name
            } else {
                account.name().to_string()
            };
            let amount = if balance.is_zero() {
                "0".to_string()
            } else {
                balance.to_string().replace('\n', ", ")
            };
            let amount = if balance.amounts().any(|(_, n)| n.is_negative()) {
                amount.red()
            } else {
                amount.normal()
            };
            println!("{:>20}  {}{}", amount, indent, name.blue());
        }
        Ok(0)
    }

    fn find_account(&self, book: &Book, name: &str) -> Result<AccountId> {
        book.lookup_account_by_full_name(name)
            .with_context(|| format!("No account named {}", name))
    }

    fn execute_lots_command(&self, book: &Book, args: &LotsArgs) -> Result<i32> {
        let acc = self.find_account(book, &args.account)?;
        let commodity = book
            .account(acc)?
            .commodity()
            .map(|c| c.mnemonic().to_string())
            .unwrap_or_default();

        for &lot_id in book.account(acc)?.lots() {
            let closed = book.lot_is_closed(lot_id)?;
            if args.open && closed {
                continue;
            }
            let lot = book.lot(lot_id)?;
            let state = if closed { "closed".dimmed() } else { "open".green() };
            let mut line = format!(
                "{:<24} {:>14} {:<6} {:>8} {:>3} splits",
                lot.title().unwrap_or(""),
                book.lot_balance(lot_id)?.to_string(),
                commodity,
                state,
                lot.count_splits()
            );
            if let Some(invoice) = book.invoice_from_lot(lot_id) {
                let invoice = book.invoice(invoice)?;
                line.push_str(&format!("  invoice {}", invoice.business_id()));
            } else if let Some(owner) = book.owner_from_lot(lot_id) {
                line.push_str(&format!("  owner {}", book.owner_name(owner)?));
            }
            println!("{}", line);
        }
        Ok(0)
    }

    fn execute_scrub_command(
        &mut self,
        book: &mut Book,
        backend: &JsonFileBackend,
        args: &ScrubArgs,
    ) -> Result<i32> {
        let top = match &args.account {
            Some(name) => self.find_account(book, name)?,
            None => book.root_account(),
        };
        if let Some(policy) = self.session.policy {
            for acc in std::iter::once(top).chain(book.account_descendants(top)?) {
                if book.account(acc)?.policy() != policy {
                    debug!("using {} for {}", policy, book.account_full_name(acc)?);
                    book.account_set_policy(acc, policy)?;
                }
            }
        }

        let report = scrub_tree(book, top)?;
        let verb = if args.dry_run { "would change" } else { "changed" };
        println!(
            "Scrub {} {} splits ({} orphans, {} imbalanced transactions, {} lot changes)",
            verb,
            report.total(),
            report.orphans,
            report.imbalanced,
            report.lot_changes
        );

        if args.dry_run {
            println!("{}", "Dry run: book not saved".yellow());
        } else if book.is_dirty() {
            backend
                .save(book)
                .with_context(|| format!("Failed to save book {}", backend.path().display()))?;
            if self.session.verbose_enabled {
                eprintln!("Saved {}", backend.path().display());
            }
        }
        Ok(0)
    }

    fn execute_check_command(&self, book: &mut Book) -> Result<i32> {
        let mut problems = 0usize;

        let transactions: Vec<_> = book.transactions().map(|t| t.id()).collect();
        for trans in transactions {
            let imbalance = book.trans_imbalance(trans)?;
            if !imbalance.is_zero() {
                problems += 1;
                let t = book.transaction(trans)?;
                println!(
                    "{} transaction {} \"{}\" is off by {}",
                    "unbalanced:".red().bold(),
                    trans,
                    t.description(),
                    imbalance
                );
            }
        }

        let lots: Vec<LotId> = book.all_lots().map(|l| l.id()).collect();
        for lot in lots {
            if !book.lot_scrub_double_balance(lot)? {
                problems += 1;
                println!(
                    "{} lot {} \"{}\" is closed but its value does not net to zero",
                    "unbalanced:".red().bold(),
                    lot,
                    book.lot(lot)?.title().unwrap_or("")
                );
            }
        }

        if problems == 0 {
            println!("{}", "Book is consistent".green());
            Ok(0)
        } else {
            println!("{} problem(s) found", problems);
            Ok(1)
        }
    }

    fn execute_invoices_command(&self, book: &Book, args: &InvoicesArgs) -> Result<i32> {
        for invoice in book.invoices() {
            let id = invoice.id();
            let paid = book.invoice_is_paid(id)?;
            if args.unpaid && (!invoice.is_posted() || paid) {
                continue;
            }
            let state = match (invoice.is_posted(), paid) {
                (false, _) => "draft".dimmed(),
                (true, false) => "posted".yellow(),
                (true, true) => "paid".green(),
            };
            let totals = book.invoice_totals(id)?;
            println!(
                "{:<8} {:<8} {:<24} {:>12} {:<4} {}",
                invoice.business_id(),
                book.invoice_type(id)?,
                book.owner_name(invoice.owner())?,
                totals.total.to_string(),
                invoice.currency().mnemonic(),
                state
            );
        }
        Ok(0)
    }

    fn execute_guid_command(&self, args: &GuidArgs) -> Result<i32> {
        for _ in 0..args.count {
            println!("{}", Guid::new());
        }
        Ok(0)
    }

    fn execute_completion_command(&self, args: &CompletionArgs) -> Result<i32> {
        let mut cmd = Cli::command();
        if let Some(ref output_dir) = args.output_dir {
            let output_path = Path::new(output_dir);
            std::fs::create_dir_all(output_path)
                .with_context(|| format!("Failed to create output directory: {}", output_dir))?;
            completion::save_completions(args.shell, &mut cmd, output_path)?;
        } else {
            completion::generate_completion(args.shell, &mut cmd);
        }
        Ok(0)
    }
}

fn lot_assignments(book: &Book) -> HashMap<SplitId, Option<LotId>> {
    book.all_splits().map(|s| (s.id(), s.lot())).collect()
}

/// Run every scrubber over `top` and its descendants
pub fn scrub_tree(book: &mut Book, top: AccountId) -> Result<ScrubReport> {
    let before = lot_assignments(book);

    let orphans = book.account_tree_scrub_orphans(top)?;
    let imbalanced = book.account_tree_scrub_imbalance(top)?;
    book.account_tree_scrub_lots(top)?;

    let after = lot_assignments(book);
    let moved = after
        .iter()
        .filter(|&(split, lot)| before.get(split) != Some(lot))
        .count();
    let removed = before.keys().filter(|s| !after.contains_key(*s)).count();
    Ok(ScrubReport {
        orphans,
        imbalanced,
        lot_changes: moved + removed,
    })
}
