//! The book: owner of every entity in one ledger
//!
//! A [`Book`] is an arena. Accounts, transactions, splits, lots and the
//! business objects live in per-kind [`Collection`]s and refer to one another
//! by typed id. All mutating operations are methods on the book, so the
//! cross-entity bookkeeping (split lists, lot membership, balance caches)
//! happens in one place.

use log::{debug, info};
use lotledger_math::{Commodity, CommodityTable};
use serde::{Deserialize, Serialize};

use crate::account::{Account, AccountType};
use crate::business::{Customer, Employee, Entry, Invoice, Job, TaxTable, Vendor};
use crate::error::EngineResult;
use crate::event::{EventBus, EventKind, HandlerId, Event};
use crate::guid::{AccountId, Guid, IdType};
use crate::instance::{Collection, Instance};
use crate::kvp::KvpValue;
use crate::lot::Lot;
use crate::policy::PolicyKind;
use crate::split::Split;
use crate::transaction::Transaction;

/// Per-book settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookOptions {
    /// Separator between account names in full names
    pub separator: char,
    /// Lot policy given to newly created accounts
    pub default_policy: PolicyKind,
    /// Zero-padded width of generated business ids
    pub id_width: usize,
}

impl Default for BookOptions {
    fn default() -> Self {
        Self {
            separator: ':',
            default_policy: PolicyKind::Fifo,
            id_width: 6,
        }
    }
}

/// A complete ledger
#[derive(Debug, Serialize, Deserialize)]
pub struct Book {
    pub(crate) inst: Instance,
    #[serde(default)]
    pub(crate) options: BookOptions,
    pub(crate) commodities: CommodityTable,
    pub(crate) root: AccountId,
    pub(crate) accounts: Collection<Account>,
    pub(crate) transactions: Collection<Transaction>,
    pub(crate) splits: Collection<Split>,
    pub(crate) lots: Collection<Lot>,
    #[serde(default)]
    pub(crate) customers: Collection<Customer>,
    #[serde(default)]
    pub(crate) vendors: Collection<Vendor>,
    #[serde(default)]
    pub(crate) employees: Collection<Employee>,
    #[serde(default)]
    pub(crate) jobs: Collection<Job>,
    #[serde(default)]
    pub(crate) tax_tables: Collection<TaxTable>,
    #[serde(default)]
    pub(crate) entries: Collection<Entry>,
    #[serde(default)]
    pub(crate) invoices: Collection<Invoice>,
    #[serde(skip)]
    pub(crate) events: EventBus,
    #[serde(skip)]
    shutting_down: bool,
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

impl Book {
    /// Create an empty book with a root account and the default currencies
    pub fn new() -> Self {
        Self::with_options(BookOptions::default())
    }

    /// Create an empty book with custom settings
    pub fn with_options(options: BookOptions) -> Self {
        let root = Account::new(AccountType::Root, "Root Account", options.default_policy);
        let root_id = root.id();
        let mut accounts = Collection::new();
        accounts.insert(root);
        Self {
            inst: Instance::new(Guid::new()),
            options,
            commodities: CommodityTable::with_defaults(),
            root: root_id,
            accounts,
            transactions: Collection::new(),
            splits: Collection::new(),
            lots: Collection::new(),
            customers: Collection::new(),
            vendors: Collection::new(),
            employees: Collection::new(),
            jobs: Collection::new(),
            tax_tables: Collection::new(),
            entries: Collection::new(),
            invoices: Collection::new(),
            events: EventBus::new(),
            shutting_down: false,
        }
    }

    /// Book GUID
    pub fn guid(&self) -> Guid {
        self.inst.guid()
    }

    /// Book-level slots
    pub fn instance(&self) -> &Instance {
        &self.inst
    }

    /// Settings
    pub fn options(&self) -> &BookOptions {
        &self.options
    }

    /// Known commodities
    pub fn commodities(&self) -> &CommodityTable {
        &self.commodities
    }

    /// Mutable commodity table
    pub fn commodities_mut(&mut self) -> &mut CommodityTable {
        &mut self.commodities
    }

    /// The root of the account tree
    pub fn root_account(&self) -> AccountId {
        self.root
    }

    /// True while [`Book::close`] is tearing the book down
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Register a change handler
    pub fn subscribe<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&Event) + 'static,
    {
        self.events.register(handler)
    }

    /// Remove a change handler
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        self.events.unregister(id)
    }

    /// Access the event bus, e.g. to suspend delivery during bulk work
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub(crate) fn emit(&mut self, kind: EventKind, id_type: IdType, guid: Guid) {
        self.events.emit(kind, id_type, guid);
    }

    /// Next zero-padded id for a business object type
    pub fn next_id(&mut self, id_type: IdType) -> String {
        let path = format!("counters/{}", id_type.as_str());
        let next = self.inst.slots().get_i64(&path).unwrap_or(0) + 1;
        self.inst.slots_mut().set_path(&path, KvpValue::Int64(next));
        format!("{:0width$}", next, width = self.options.id_width)
    }

    /// Find `<prefix>-<MNEMONIC>` anywhere under the root, or create it at top level
    pub fn get_or_make_account(
        &mut self,
        prefix: &str,
        currency: &Commodity,
        account_type: AccountType,
    ) -> EngineResult<AccountId> {
        let name = format!("{}-{}", prefix, currency.mnemonic());
        if let Some(found) = self.lookup_account_by_name(self.root, &name) {
            return Ok(found);
        }
        info!("creating account {}", name);
        self.add_account(self.root, account_type, &name, currency)
    }

    /// Re-sort every account and recompute all running balances
    pub fn refresh_caches(&mut self) -> EngineResult<()> {
        for account in self.accounts.iter_mut() {
            account.inst.reset_edit_level();
            account.sort_dirty = true;
            account.balance_dirty = true;
        }
        for id in self.accounts.ids() {
            self.account_bring_up_to_date(id)?;
        }
        for lot in self.lots.iter() {
            lot.closed.set(None);
        }
        Ok(())
    }

    /// True when anything changed since the last [`Book::mark_clean`]
    pub fn is_dirty(&self) -> bool {
        self.inst.is_dirty()
            || self.accounts.is_dirty()
            || self.transactions.is_dirty()
            || self.splits.is_dirty()
            || self.lots.is_dirty()
            || self.customers.is_dirty()
            || self.vendors.is_dirty()
            || self.employees.is_dirty()
            || self.jobs.is_dirty()
            || self.tax_tables.is_dirty()
            || self.entries.is_dirty()
            || self.invoices.is_dirty()
    }

    /// Clear every dirty flag, e.g. after a save
    pub fn mark_clean(&mut self) {
        self.inst.mark_clean();
        self.accounts.mark_clean();
        self.transactions.mark_clean();
        self.splits.mark_clean();
        self.lots.mark_clean();
        self.customers.mark_clean();
        self.vendors.mark_clean();
        self.employees.mark_clean();
        self.jobs.mark_clean();
        self.tax_tables.mark_clean();
        self.entries.mark_clean();
        self.invoices.mark_clean();
    }

    /// Tear the book down without per-entity bookkeeping
    pub fn close(&mut self) {
        debug!("closing book {}", self.guid());
        self.shutting_down = true;
        self.emit(EventKind::DESTROY, IdType::Book, self.guid());
        self.invoices.clear();
        self.entries.clear();
        self.tax_tables.clear();
        self.jobs.clear();
        self.employees.clear();
        self.vendors.clear();
        self.customers.clear();
        self.lots.clear();
        self.splits.clear();
        self.transactions.clear();
        self.accounts.clear();
    }

    /// Number of transactions
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Number of splits
    pub fn split_count(&self) -> usize {
        self.splits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_new_book_has_root() {
        let book = Book::new();
        let root = book.account(book.root_account()).unwrap();
        assert_eq!(root.account_type(), AccountType::Root);
        assert_eq!(root.name(), "Root Account");
        assert!(book.commodities().lookup_currency("USD").is_some());
    }

    #[test]
    fn test_next_id_counts_per_type() {
        let mut book = Book::new();
        assert_eq!(book.next_id(IdType::Customer), "000001");
        assert_eq!(book.next_id(IdType::Customer), "000002");
        assert_eq!(book.next_id(IdType::Invoice), "000001");
    }

    #[test]
    fn test_get_or_make_account_reuses() {
        let mut book = Book::new();
        let usd = Commodity::currency("USD", 100);
        let a = book.get_or_make_account("Imbalance", &usd, AccountType::Bank).unwrap();
        let b = book.get_or_make_account("Imbalance", &usd, AccountType::Bank).unwrap();
        assert_eq!(a, b);
        assert_eq!(book.account_full_name(a).unwrap(), "Imbalance-USD");
    }

    #[test]
    fn test_events_reach_subscribers() {
        let mut book = Book::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        book.subscribe(move |e| sink.borrow_mut().push(e.kind));
        book.create_account(AccountType::Bank, "Cash");
        assert!(seen.borrow().contains(&EventKind::CREATE));
    }

    #[test]
    fn test_dirty_and_clean() {
        let mut book = Book::new();
        assert!(book.is_dirty());
        book.mark_clean();
        assert!(!book.is_dirty());
        book.create_account(AccountType::Asset, "Stuff");
        assert!(book.is_dirty());
    }

    #[test]
    fn test_close_empties_book() {
        let mut book = Book::new();
        book.create_account(AccountType::Asset, "Stuff");
        book.close();
        assert!(book.is_shutting_down());
        assert_eq!(book.accounts().count(), 0);
    }
}
