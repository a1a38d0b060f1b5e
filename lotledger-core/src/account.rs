//! Hierarchical account tree and the running-balance engine
//!
//! Accounts form a typed tree under the book's root account. Each account
//! holds its splits sorted by [`Book::split_order`], the lots drawn from
//! those splits, and cached running balances. Balances are recomputed lazily:
//! edits mark the account dirty and the outermost commit walks the sorted
//! split list once, leaving a per-split balance snapshot behind for
//! point-in-time queries.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use log::{debug, trace, warn};
use lotledger_math::{Balance, Commodity, Numeric, DEFAULT_FRACTION};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::{EngineError, EngineResult};
use crate::event::EventKind;
use crate::guid::{AccountId, EntityId, Guid, IdType, LotId, SplitId};
use crate::instance::{impl_entity, Instance};
use crate::kvp::KvpValue;
use crate::policy::PolicyKind;
use crate::split::Reconcile;

/// Slot prefix holding the per-currency gains account
const GAINS_ACCOUNT_PATH: &str = "lot-mgmt/gains-act";

/// Account type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Bank account
    Bank,
    /// Cash on hand
    Cash,
    /// Generic asset
    Asset,
    /// Credit card
    Credit,
    /// Generic liability
    Liability,
    /// Stock holdings
    Stock,
    /// Mutual fund holdings
    Mutual,
    /// Foreign currency holdings
    Currency,
    /// Income
    Income,
    /// Expense
    Expense,
    /// Equity
    Equity,
    /// Accounts receivable
    Receivable,
    /// Accounts payable
    Payable,
    /// The invisible top of the tree
    Root,
    /// Trading accounts
    Trading,
}

impl AccountType {
    /// All account types
    pub const ALL: [AccountType; 15] = [
        AccountType::Bank,
        AccountType::Cash,
        AccountType::Asset,
        AccountType::Credit,
        AccountType::Liability,
        AccountType::Stock,
        AccountType::Mutual,
        AccountType::Currency,
        AccountType::Income,
        AccountType::Expense,
        AccountType::Equity,
        AccountType::Receivable,
        AccountType::Payable,
        AccountType::Root,
        AccountType::Trading,
    ];

    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Bank => "BANK",
            AccountType::Cash => "CASH",
            AccountType::Asset => "ASSET",
            AccountType::Credit => "CREDIT",
            AccountType::Liability => "LIABILITY",
            AccountType::Stock => "STOCK",
            AccountType::Mutual => "MUTUAL",
            AccountType::Currency => "CURRENCY",
            AccountType::Income => "INCOME",
            AccountType::Expense => "EXPENSE",
            AccountType::Equity => "EQUITY",
            AccountType::Receivable => "RECEIVABLE",
            AccountType::Payable => "PAYABLE",
            AccountType::Root => "ROOT",
            AccountType::Trading => "TRADING",
        }
    }

    fn is_asset_or_liability(&self) -> bool {
        matches!(
            self,
            AccountType::Bank
                | AccountType::Cash
                | AccountType::Asset
                | AccountType::Credit
                | AccountType::Liability
                | AccountType::Stock
                | AccountType::Mutual
                | AccountType::Currency
                | AccountType::Receivable
                | AccountType::Payable
        )
    }

    /// True when an account of this type may sit under a `parent` account
    pub fn compatible_with_parent(&self, parent: AccountType) -> bool {
        if parent == AccountType::Root {
            return *self != AccountType::Root;
        }
        match self {
            t if t.is_asset_or_liability() => parent.is_asset_or_liability(),
            AccountType::Income | AccountType::Expense => {
                matches!(parent, AccountType::Income | AccountType::Expense)
            }
            AccountType::Equity => parent == AccountType::Equity,
            AccountType::Trading => parent == AccountType::Trading,
            _ => false,
        }
    }

    /// True for types whose commodity has a market price
    pub fn is_priced(&self) -> bool {
        matches!(
            self,
            AccountType::Stock | AccountType::Mutual | AccountType::Currency
        )
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        AccountType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| EngineError::InvalidArgument(format!("unknown account type '{}'", s)))
    }
}

/// A node in the account tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub(crate) inst: Instance,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) notes: String,
    pub(crate) account_type: AccountType,
    pub(crate) commodity: Option<Commodity>,
    pub(crate) commodity_scu: i64,
    #[serde(default)]
    pub(crate) non_std_scu: bool,
    pub(crate) parent: Option<AccountId>,
    pub(crate) children: Vec<AccountId>,
    pub(crate) splits: Vec<SplitId>,
    pub(crate) lots: Vec<LotId>,
    pub(crate) policy: PolicyKind,
    #[serde(default)]
    pub(crate) placeholder: bool,
    #[serde(default)]
    pub(crate) hidden: bool,
    #[serde(default)]
    pub(crate) starting_balance: Numeric,
    #[serde(default)]
    pub(crate) starting_cleared_balance: Numeric,
    #[serde(default)]
    pub(crate) starting_reconciled_balance: Numeric,
    #[serde(skip)]
    pub(crate) balance: Numeric,
    #[serde(skip)]
    pub(crate) cleared_balance: Numeric,
    #[serde(skip)]
    pub(crate) reconciled_balance: Numeric,
    #[serde(skip)]
    pub(crate) balance_dirty: bool,
    #[serde(skip)]
    pub(crate) sort_dirty: bool,
}

impl_entity!(Account, AccountId);

impl Account {
    pub(crate) fn new(account_type: AccountType, name: impl Into<String>, policy: PolicyKind) -> Self {
        Self {
            inst: Instance::new(Guid::new()),
            name: name.into(),
            code: String::new(),
            description: String::new(),
            notes: String::new(),
            account_type,
            commodity: None,
            commodity_scu: 0,
            non_std_scu: false,
            parent: None,
            children: Vec::new(),
            splits: Vec::new(),
            lots: Vec::new(),
            policy,
            placeholder: false,
            hidden: false,
            starting_balance: Numeric::zero(),
            starting_cleared_balance: Numeric::zero(),
            starting_reconciled_balance: Numeric::zero(),
            balance: Numeric::zero(),
            cleared_balance: Numeric::zero(),
            reconciled_balance: Numeric::zero(),
            balance_dirty: false,
            sort_dirty: false,
        }
    }

    /// Account id
    pub fn id(&self) -> AccountId {
        AccountId::from_guid(self.inst.guid())
    }

    /// Shared instance state (slots, edit level)
    pub fn instance(&self) -> &Instance {
        &self.inst
    }

    /// Leaf name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Account code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Free-form notes
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Account type
    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    /// Commodity held, if set
    pub fn commodity(&self) -> Option<&Commodity> {
        self.commodity.as_ref()
    }

    /// Smallest commodity unit count used for amounts
    pub fn commodity_scu(&self) -> i64 {
        if self.commodity_scu > 0 {
            self.commodity_scu
        } else {
            self.commodity
                .as_ref()
                .map(Commodity::fraction)
                .unwrap_or(DEFAULT_FRACTION)
        }
    }

    /// True when the SCU was set explicitly rather than taken from the commodity
    pub fn non_std_scu(&self) -> bool {
        self.non_std_scu
    }

    /// Parent account (`None` for the root or a detached account)
    pub fn parent(&self) -> Option<AccountId> {
        self.parent
    }

    /// Direct children in insertion order
    pub fn children(&self) -> &[AccountId] {
        &self.children
    }

    /// Splits in [`Book::split_order`]
    pub fn splits(&self) -> &[SplitId] {
        &self.splits
    }

    /// Lots of this account
    pub fn lots(&self) -> &[LotId] {
        &self.lots
    }

    /// Lot assignment policy
    pub fn policy(&self) -> PolicyKind {
        self.policy
    }

    /// True for grouping accounts that should not hold splits
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// True when hidden from default views
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Running balance after the last split
    pub fn balance(&self) -> &Numeric {
        &self.balance
    }

    /// Balance of splits not in state `n`
    pub fn cleared_balance(&self) -> &Numeric {
        &self.cleared_balance
    }

    /// Balance of reconciled and frozen splits
    pub fn reconciled_balance(&self) -> &Numeric {
        &self.reconciled_balance
    }

    /// Opening balance carried in from before the first split
    pub fn starting_balance(&self) -> &Numeric {
        &self.starting_balance
    }

    /// Opening cleared balance
    pub fn starting_cleared_balance(&self) -> &Numeric {
        &self.starting_cleared_balance
    }

    /// Opening reconciled balance
    pub fn starting_reconciled_balance(&self) -> &Numeric {
        &self.starting_reconciled_balance
    }
}

impl Book {
    /// Look up an account
    pub fn account(&self, id: AccountId) -> EngineResult<&Account> {
        self.accounts.require(id)
    }

    pub(crate) fn account_mut(&mut self, id: AccountId) -> EngineResult<&mut Account> {
        self.accounts.require_mut(id)
    }

    /// Every account, root included, in creation order
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    /// Create a detached account using the book's default lot policy
    pub fn create_account(&mut self, account_type: AccountType, name: &str) -> AccountId {
        let account = Account::new(account_type, name, self.options().default_policy);
        let id = account.id();
        self.accounts.insert(account);
        self.emit(EventKind::CREATE, IdType::Account, id.guid());
        id
    }

    /// Create an account holding `commodity` and attach it under `parent`
    pub fn add_account(
        &mut self,
        parent: AccountId,
        account_type: AccountType,
        name: &str,
        commodity: &Commodity,
    ) -> EngineResult<AccountId> {
        let id = self.create_account(account_type, name);
        self.account_set_commodity(id, commodity)?;
        if let Err(err) = self.account_append_child(parent, id) {
            self.accounts.remove(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Open an edit bracket on an account
    pub fn account_begin_edit(&mut self, id: AccountId) -> EngineResult<()> {
        self.account_mut(id)?.inst.begin_edit();
        Ok(())
    }

    /// Close an edit bracket; the outermost commit sorts, recomputes or frees
    pub fn account_commit_edit(&mut self, id: AccountId) -> EngineResult<()> {
        let account = self.account_mut(id)?;
        if !account.inst.commit_edit() {
            return Ok(());
        }
        if account.inst.is_destroying() {
            return self.free_account(id);
        }
        self.account_bring_up_to_date(id)?;
        self.emit(EventKind::MODIFY, IdType::Account, id.guid());
        Ok(())
    }

    /// Destroy an account with its children, splits and lots
    pub fn account_destroy(&mut self, id: AccountId) -> EngineResult<()> {
        self.account_begin_edit(id)?;
        self.account_mut(id)?.inst.set_destroying();
        self.account_commit_edit(id)
    }

    fn free_account(&mut self, id: AccountId) -> EngineResult<()> {
        debug!("freeing account {}", id);
        self.account_mut(id)?.inst.begin_edit();
        let (children, splits, lots, parent) = {
            let account = self.account(id)?;
            (
                account.children.clone(),
                account.splits.clone(),
                account.lots.clone(),
                account.parent,
            )
        };

        if let Some(parent) = parent {
            if let Some(p) = self.accounts.get_mut(parent) {
                p.children.retain(|c| *c != id);
            }
            self.account_mut(id)?.parent = None;
        }

        for child in children {
            self.account_destroy(child)?;
        }

        if !self.is_shutting_down() {
            for split in splits {
                let Some(trans) = self.splits.get(split).map(|s| s.parent) else {
                    continue;
                };
                self.trans_begin_edit(trans)?;
                if let Err(err) = self.split_destroy(split) {
                    warn!("leaving split {} orphaned: {}", split, err);
                    if let Some(s) = self.splits.get_mut(split) {
                        s.account = None;
                    }
                }
                self.trans_commit_edit(trans)?;
            }
            for lot in lots {
                if self.lots.contains(lot) {
                    self.lot_destroy(lot)?;
                }
            }
        }

        self.accounts.remove(id);
        self.emit(EventKind::DESTROY, IdType::Account, id.guid());
        Ok(())
    }

    /// Sort and recompute an account that is not being edited
    pub(crate) fn account_bring_up_to_date(&mut self, id: AccountId) -> EngineResult<()> {
        let Some(account) = self.accounts.get(id) else {
            return Ok(());
        };
        if account.inst.is_editing() || account.inst.is_destroying() {
            return Ok(());
        }
        if account.sort_dirty {
            self.sort_account_splits(id)?;
        }
        self.recompute_balance(id)
    }

    fn edit_account<F>(&mut self, id: AccountId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Account),
    {
        self.account_begin_edit(id)?;
        let account = self.account_mut(id)?;
        apply(account);
        account.inst.set_dirty();
        self.account_commit_edit(id)
    }

    /// Attach `child` under `parent`, detaching it from any previous parent
    pub fn account_append_child(&mut self, parent: AccountId, child: AccountId) -> EngineResult<()> {
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == child {
                return Err(EngineError::AccountCycle {
                    parent: parent.guid(),
                    child: child.guid(),
                });
            }
            cursor = self.account(current)?.parent;
        }

        let parent_type = self.account(parent)?.account_type;
        let child_type = self.account(child)?.account_type;
        if !child_type.compatible_with_parent(parent_type) {
            return Err(EngineError::IncompatibleAccountType {
                parent: parent_type.as_str(),
                child: child_type.as_str(),
            });
        }

        let old_parent = self.account(child)?.parent;
        if old_parent == Some(parent) {
            return Ok(());
        }
        if let Some(old_parent) = old_parent {
            self.account_remove_child(old_parent, child)?;
        }

        self.account_begin_edit(parent)?;
        self.account_begin_edit(child)?;
        {
            let p = self.account_mut(parent)?;
            p.children.push(child);
            p.inst.set_dirty();
        }
        {
            let c = self.account_mut(child)?;
            c.parent = Some(parent);
            c.inst.set_dirty();
        }
        self.account_commit_edit(child)?;
        self.account_commit_edit(parent)?;
        self.emit(EventKind::ADD, IdType::Account, child.guid());
        Ok(())
    }

    /// Detach `child` from `parent`; the child stays in the book
    pub fn account_remove_child(&mut self, parent: AccountId, child: AccountId) -> EngineResult<()> {
        if self.account(child)?.parent != Some(parent) {
            return Err(EngineError::InvalidArgument(format!(
                "account {} is not a child of {}",
                child, parent
            )));
        }
        self.emit(EventKind::REMOVE, IdType::Account, child.guid());
        self.edit_account(parent, |p| p.children.retain(|c| *c != child))?;
        self.edit_account(child, |c| c.parent = None)
    }

    /// Rename an account
    pub fn account_set_name(&mut self, id: AccountId, name: &str) -> EngineResult<()> {
        self.edit_account(id, |a| a.name = name.to_string())
    }

    /// Set the account code
    pub fn account_set_code(&mut self, id: AccountId, code: &str) -> EngineResult<()> {
        self.edit_account(id, |a| a.code = code.to_string())
    }

    /// Set the description
    pub fn account_set_description(&mut self, id: AccountId, description: &str) -> EngineResult<()> {
        self.edit_account(id, |a| a.description = description.to_string())
    }

    /// Set the notes
    pub fn account_set_notes(&mut self, id: AccountId, notes: &str) -> EngineResult<()> {
        self.edit_account(id, |a| a.notes = notes.to_string())
    }

    /// Change the account type
    pub fn account_set_type(&mut self, id: AccountId, account_type: AccountType) -> EngineResult<()> {
        self.edit_account(id, |a| {
            a.account_type = account_type;
            a.balance_dirty = true;
        })
    }

    /// Set the commodity; the SCU follows it unless set explicitly
    pub fn account_set_commodity(&mut self, id: AccountId, commodity: &Commodity) -> EngineResult<()> {
        self.edit_account(id, |a| {
            if !a.non_std_scu {
                a.commodity_scu = commodity.fraction();
            }
            a.commodity = Some(commodity.clone());
            a.balance_dirty = true;
        })
    }

    /// Override the smallest commodity unit
    pub fn account_set_commodity_scu(&mut self, id: AccountId, scu: i64) -> EngineResult<()> {
        if scu <= 0 {
            return Err(EngineError::InvalidArgument(format!("invalid SCU {}", scu)));
        }
        self.edit_account(id, |a| {
            a.non_std_scu = a.commodity.as_ref().map_or(true, |c| c.fraction() != scu);
            a.commodity_scu = scu;
        })
    }

    /// Set the placeholder flag
    pub fn account_set_placeholder(&mut self, id: AccountId, placeholder: bool) -> EngineResult<()> {
        self.edit_account(id, |a| a.placeholder = placeholder)
    }

    /// Set the hidden flag
    pub fn account_set_hidden(&mut self, id: AccountId, hidden: bool) -> EngineResult<()> {
        self.edit_account(id, |a| a.hidden = hidden)
    }

    /// Choose the lot assignment policy
    pub fn account_set_policy(&mut self, id: AccountId, policy: PolicyKind) -> EngineResult<()> {
        self.edit_account(id, |a| a.policy = policy)
    }

    /// Set the opening balances the running balances start from
    pub fn account_set_starting_balances(
        &mut self,
        id: AccountId,
        balance: Numeric,
        cleared: Numeric,
        reconciled: Numeric,
    ) -> EngineResult<()> {
        self.edit_account(id, |a| {
            a.starting_balance = balance;
            a.starting_cleared_balance = cleared;
            a.starting_reconciled_balance = reconciled;
            a.balance_dirty = true;
        })
    }

    /// All accounts below `id`, depth-first, parents before children
    pub fn account_descendants(&self, id: AccountId) -> EngineResult<Vec<AccountId>> {
        let mut out = Vec::new();
        let mut stack: Vec<AccountId> = self.account(id)?.children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(account) = self.accounts.get(current) {
                stack.extend(account.children.iter().rev().copied());
            }
        }
        Ok(out)
    }

    /// Visit every account below `id`
    pub fn account_foreach_descendant<F>(&self, id: AccountId, mut visit: F) -> EngineResult<()>
    where
        F: FnMut(&Account),
    {
        for descendant in self.account_descendants(id)? {
            visit(self.account(descendant)?);
        }
        Ok(())
    }

    /// Number of ancestors below the root (top-level accounts have depth 1)
    pub fn account_depth(&self, id: AccountId) -> EngineResult<usize> {
        let mut depth = 0;
        let mut account = self.account(id)?;
        while let Some(parent) = account.parent {
            if account.account_type == AccountType::Root {
                break;
            }
            depth += 1;
            account = self.account(parent)?;
        }
        Ok(depth)
    }

    /// Names from the top-level ancestor down, joined by the book separator
    pub fn account_full_name(&self, id: AccountId) -> EngineResult<String> {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let account = self.account(current)?;
            if account.account_type == AccountType::Root && account.parent.is_none() {
                break;
            }
            names.push(account.name.as_str());
            cursor = account.parent;
        }
        names.reverse();
        Ok(names.join(&self.options().separator.to_string()))
    }

    /// Find a descendant by leaf name: direct children first, then deeper
    pub fn lookup_account_by_name(&self, parent: AccountId, name: &str) -> Option<AccountId> {
        let account = self.accounts.get(parent)?;
        if let Some(found) = account
            .children
            .iter()
            .find(|c| self.accounts.get(**c).is_some_and(|a| a.name == name))
        {
            return Some(*found);
        }
        account
            .children
            .iter()
            .find_map(|c| self.lookup_account_by_name(*c, name))
    }

    /// Find an account by its separator-joined full name
    pub fn lookup_account_by_full_name(&self, full_name: &str) -> Option<AccountId> {
        let mut current = self.root_account();
        for part in full_name.split(self.options().separator) {
            let account = self.accounts.get(current)?;
            current = *account
                .children
                .iter()
                .find(|c| self.accounts.get(**c).is_some_and(|a| a.name == part))?;
        }
        Some(current)
    }

    /// Insert a split into an account, moving it out of its previous account
    pub(crate) fn account_insert_split(&mut self, acc: AccountId, split: SplitId) -> EngineResult<()> {
        let old = self.split(split)?.account;
        if old == Some(acc) {
            return Ok(());
        }
        if let Some(old) = old {
            if self.accounts.contains(old) {
                self.account_remove_split(old, split)?;
            }
        }

        self.account_begin_edit(acc)?;
        let account = self.account(acc)?;
        let sorted = account.inst.edit_level() == 1;
        let position = if sorted {
            account
                .splits
                .partition_point(|s| self.split_order(*s, split) == Ordering::Less)
        } else {
            account.splits.len()
        };
        {
            let account = self.account_mut(acc)?;
            account.splits.insert(position, split);
            if !sorted {
                account.sort_dirty = true;
            }
            account.balance_dirty = true;
        }

        let lot = {
            let s = self.split_mut(split)?;
            s.account = Some(acc);
            s.inst.set_dirty();
            s.lot
        };
        if let Some(lot) = lot {
            if self.lot(lot)?.account.is_none() {
                self.account_insert_lot(acc, lot)?;
            }
        }

        self.account_commit_edit(acc)
    }

    /// Remove a split from an account and from that account's lot
    pub(crate) fn account_remove_split(&mut self, acc: AccountId, split: SplitId) -> EngineResult<()> {
        self.account_begin_edit(acc)?;
        {
            let account = self.account_mut(acc)?;
            let before = account.splits.len();
            account.splits.retain(|s| *s != split);
            if account.splits.len() == before {
                warn!("account {} lost track of split {}", acc, split);
            }
            account.balance_dirty = true;
        }

        let lot = self.split(split)?.lot;
        if let Some(lot) = lot {
            if self.lot(lot)?.account == Some(acc) {
                self.lot_remove_split(lot, split)?;
            }
        }
        if let Ok(s) = self.split_mut(split) {
            s.account = None;
        }
        self.account_commit_edit(acc)
    }

    fn sort_account_splits(&mut self, id: AccountId) -> EngineResult<()> {
        let mut splits = std::mem::take(&mut self.account_mut(id)?.splits);
        splits.sort_by(|a, b| self.split_order(*a, *b));
        let account = self.account_mut(id)?;
        account.splits = splits;
        account.sort_dirty = false;
        Ok(())
    }

    /// Recompute running balances if dirty and not being edited
    pub(crate) fn recompute_balance(&mut self, id: AccountId) -> EngineResult<()> {
        let account = self.account(id)?;
        if account.inst.is_editing()
            || !account.balance_dirty
            || account.inst.is_destroying()
            || self.is_shutting_down()
        {
            return Ok(());
        }
        trace!("recomputing balance of {}", account.name);

        let mut balance = account.starting_balance.clone();
        let mut cleared = account.starting_cleared_balance.clone();
        let mut reconciled = account.starting_reconciled_balance.clone();
        let split_ids = account.splits.clone();

        for sid in split_ids {
            let Some(split) = self.splits.get_mut(sid) else {
                continue;
            };
            balance += &split.amount;
            if split.reconcile != Reconcile::New {
                cleared += &split.amount;
            }
            if matches!(split.reconcile, Reconcile::Reconciled | Reconcile::Frozen) {
                reconciled += &split.amount;
            }
            split.balance = balance.clone();
            split.cleared_balance = cleared.clone();
            split.reconciled_balance = reconciled.clone();
        }

        let account = self.account_mut(id)?;
        account.balance = balance;
        account.cleared_balance = cleared;
        account.reconciled_balance = reconciled;
        account.balance_dirty = false;
        Ok(())
    }

    /// Balance of splits posted strictly before `date`
    pub fn account_balance_as_of_date(&self, id: AccountId, date: DateTime<Utc>) -> EngineResult<Numeric> {
        let account = self.account(id)?;
        let first_after = account.splits.iter().position(|s| {
            self.split_transaction(*s)
                .map(|t| t.date_posted >= date)
                .unwrap_or(false)
        });
        Ok(match first_after {
            Some(0) => Numeric::zero(),
            Some(i) => self.split(account.splits[i - 1])?.balance.clone(),
            None => account.balance.clone(),
        })
    }

    /// Balance as of the end of today
    pub fn account_present_balance(&self, id: AccountId) -> EngineResult<Numeric> {
        self.account_present_balance_at(id, end_of_today())
    }

    /// Balance after the last split posted at or before `now`
    pub fn account_present_balance_at(&self, id: AccountId, now: DateTime<Utc>) -> EngineResult<Numeric> {
        let account = self.account(id)?;
        for sid in account.splits.iter().rev() {
            if self.split_transaction(*sid)?.date_posted <= now {
                return Ok(self.split(*sid)?.balance.clone());
            }
        }
        Ok(Numeric::zero())
    }

    /// Lowest running balance from the last split back to today
    pub fn account_projected_minimum_balance(&self, id: AccountId) -> EngineResult<Numeric> {
        self.account_projected_minimum_balance_at(id, end_of_today())
    }

    /// Lowest running balance from the last split back to the first one
    /// posted at or before `now`
    pub fn account_projected_minimum_balance_at(
        &self,
        id: AccountId,
        now: DateTime<Utc>,
    ) -> EngineResult<Numeric> {
        let account = self.account(id)?;
        let mut lowest: Option<Numeric> = None;
        for sid in account.splits.iter().rev() {
            let balance = &self.split(*sid)?.balance;
            if lowest.as_ref().map_or(true, |low| balance < low) {
                lowest = Some(balance.clone());
            }
            if self.split_transaction(*sid)?.date_posted <= now {
                break;
            }
        }
        Ok(lowest.unwrap_or_default())
    }

    /// Balance of an account and all its descendants, per commodity
    pub fn account_tree_balance(&self, id: AccountId) -> EngineResult<Balance> {
        let mut total = Balance::new();
        for acc in std::iter::once(id).chain(self.account_descendants(id)?) {
            let account = self.account(acc)?;
            if let Some(commodity) = &account.commodity {
                total.add(commodity, &account.balance);
            }
        }
        Ok(total)
    }

    /// Move a lot into an account, out of any previous account
    pub fn account_insert_lot(&mut self, acc: AccountId, lot: LotId) -> EngineResult<()> {
        let old = self.lot(lot)?.account;
        if old == Some(acc) {
            return Ok(());
        }
        self.account(acc)?;
        if let Some(old) = old {
            if let Some(old_account) = self.accounts.get_mut(old) {
                old_account.lots.retain(|l| *l != lot);
            }
        }
        self.account_mut(acc)?.lots.push(lot);
        self.lot_mut(lot)?.account = Some(acc);
        self.emit(EventKind::ADD, IdType::Lot, lot.guid());
        self.emit(EventKind::MODIFY, IdType::Account, acc.guid());
        Ok(())
    }

    /// Remove a lot from an account's lot list
    pub fn account_remove_lot(&mut self, acc: AccountId, lot: LotId) -> EngineResult<()> {
        self.account_mut(acc)?.lots.retain(|l| *l != lot);
        self.emit(EventKind::REMOVE, IdType::Lot, lot.guid());
        self.emit(EventKind::MODIFY, IdType::Account, acc.guid());
        Ok(())
    }

    /// Open lots of an account, optionally filtered and sorted
    pub fn account_find_open_lots(
        &self,
        acc: AccountId,
        matcher: Option<&dyn Fn(&Book, LotId) -> bool>,
        sort: Option<&dyn Fn(&Book, LotId, LotId) -> Ordering>,
    ) -> EngineResult<Vec<LotId>> {
        let mut lots: Vec<LotId> = Vec::new();
        for lot in &self.account(acc)?.lots {
            if self.lot_is_closed(*lot)? {
                continue;
            }
            if let Some(matcher) = matcher {
                if !matcher(self, *lot) {
                    continue;
                }
            }
            lots.push(*lot);
        }
        if let Some(sort) = sort {
            lots.sort_by(|a, b| sort(self, *a, *b));
        }
        Ok(lots)
    }

    /// True when the account is priced or holds splits in a foreign currency
    pub fn account_has_trades(&self, acc: AccountId) -> EngineResult<bool> {
        let account = self.account(acc)?;
        if account.account_type.is_priced() {
            return Ok(true);
        }
        for sid in &account.splits {
            let trans = self.split_transaction(*sid)?;
            if account.commodity.as_ref() != Some(&trans.currency) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Move every lot and split of `from` into `to`
    pub fn account_move_all_splits(&mut self, from: AccountId, to: AccountId) -> EngineResult<()> {
        if from == to {
            return Ok(());
        }
        self.account(to)?;
        let (splits, lots) = {
            let account = self.account(from)?;
            (account.splits.clone(), account.lots.clone())
        };
        if splits.is_empty() {
            return Ok(());
        }
        debug!("moving {} splits from {} to {}", splits.len(), from, to);

        self.account_begin_edit(from)?;
        self.account_begin_edit(to)?;
        for lot in lots {
            self.account_insert_lot(to, lot)?;
        }
        for split in splits {
            let trans = self.split(split)?.parent;
            self.trans_begin_edit(trans)?;
            self.account_insert_split(to, split)?;
            self.trans_commit_edit(trans)?;
        }
        self.account_commit_edit(from)?;
        self.account_commit_edit(to)
    }

    /// Record the account that realized gains in `currency` post to
    pub fn account_set_gains_account(
        &mut self,
        acc: AccountId,
        currency: &Commodity,
        gains: AccountId,
    ) -> EngineResult<()> {
        let path = format!("{}/{}", GAINS_ACCOUNT_PATH, currency.unique_name());
        self.edit_account(acc, |a| {
            a.inst.slots_mut().set_path(&path, KvpValue::Guid(gains.guid()))
        })
    }

    /// The gains account for `currency`, creating `Orphaned Gains-XXX` if unset
    pub fn account_gains_account(&mut self, acc: AccountId, currency: &Commodity) -> EngineResult<AccountId> {
        let path = format!("{}/{}", GAINS_ACCOUNT_PATH, currency.unique_name());
        if let Some(guid) = self.account(acc)?.inst.slots().get_guid(&path) {
            let gains = AccountId::from_guid(guid);
            if self.accounts.contains(gains) {
                return Ok(gains);
            }
            warn!("gains account {} of {} no longer exists", gains, acc);
        }
        let gains = self.get_or_make_account("Orphaned Gains", currency, AccountType::Income)?;
        self.account_set_gains_account(acc, currency, gains)?;
        Ok(gains)
    }
}

fn end_of_today() -> DateTime<Utc> {
    let today = Utc::now().date_naive();
    today
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc() + Duration::days(1) - Duration::seconds(1))
        .unwrap_or_else(Utc::now)
}
