//! Transactions: balanced groups of splits
//!
//! A transaction is edited inside a begin/commit bracket. The outermost
//! begin snapshots the transaction and its splits so the edit can be rolled
//! back. The outermost commit either frees a transaction marked for
//! destruction (or left without splits) or scrubs any value imbalance into
//! an `Imbalance-<CUR>` account, then refreshes every account it touched.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use lotledger_math::{Commodity, Numeric};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::{EngineError, EngineResult};
use crate::event::EventKind;
use crate::guid::{AccountId, EntityId, Guid, IdType, SplitId, TransId};
use crate::instance::{impl_entity, Instance};
use crate::kvp::KvpValue;
use crate::split::{GainsStatus, Split};

/// Slot holding free-form transaction notes
pub const TRANS_NOTES: &str = "notes";
/// Slot holding the reason a transaction was voided
pub const VOID_REASON: &str = "void-reason";
/// Slot holding when a transaction was voided
pub const VOID_TIME: &str = "void-time";
/// Slot holding the notes a voided transaction had
pub const VOID_FORMER_NOTES: &str = "void-former-notes";
/// Read-only reason set on voided transactions
pub const VOIDED_READ_ONLY: &str = "Transaction Voided";

/// What created a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TxnType {
    /// Ordinary entry
    #[default]
    None,
    /// Posting of an invoice, bill or voucher
    Invoice,
    /// Payment against an owner's lots
    Payment,
}

#[derive(Debug, Clone)]
struct TransSnapshot {
    trans: Transaction,
    splits: Vec<Split>,
}

/// A balanced group of splits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub(crate) inst: Instance,
    pub(crate) currency: Commodity,
    #[serde(default)]
    pub(crate) num: String,
    #[serde(default)]
    pub(crate) description: String,
    pub(crate) date_posted: DateTime<Utc>,
    pub(crate) date_entered: DateTime<Utc>,
    #[serde(default)]
    pub(crate) date_due: Option<DateTime<Utc>>,
    pub(crate) splits: Vec<SplitId>,
    #[serde(default)]
    pub(crate) txn_type: TxnType,
    #[serde(default)]
    pub(crate) read_only: Option<String>,
    #[serde(skip)]
    orig: Option<Box<TransSnapshot>>,
}

impl_entity!(Transaction, TransId);

impl Transaction {
    /// Transaction id
    pub fn id(&self) -> TransId {
        TransId::from_guid(self.inst.guid())
    }

    /// Shared instance state
    pub fn instance(&self) -> &Instance {
        &self.inst
    }

    /// Currency all split values are expressed in
    pub fn currency(&self) -> &Commodity {
        &self.currency
    }

    /// Check or reference number
    pub fn num(&self) -> &str {
        &self.num
    }

    /// Description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Effective date
    pub fn date_posted(&self) -> DateTime<Utc> {
        self.date_posted
    }

    /// When the transaction was recorded
    pub fn date_entered(&self) -> DateTime<Utc> {
        self.date_entered
    }

    /// Due date, for invoice postings
    pub fn date_due(&self) -> Option<DateTime<Utc>> {
        self.date_due
    }

    /// Splits in insertion order
    pub fn splits(&self) -> &[SplitId] {
        &self.splits
    }

    /// What created the transaction
    pub fn txn_type(&self) -> TxnType {
        self.txn_type
    }

    /// Why the transaction may not be destroyed, if it is read-only
    pub fn read_only(&self) -> Option<&str> {
        self.read_only.as_deref()
    }

    /// Free-form notes
    pub fn notes(&self) -> Option<&str> {
        self.inst.slots().get_string(TRANS_NOTES)
    }

    /// True once voided
    pub fn is_void(&self) -> bool {
        self.inst.slots().get_string(VOID_REASON).is_some()
    }

    /// Reason given when voiding
    pub fn void_reason(&self) -> Option<&str> {
        self.inst.slots().get_string(VOID_REASON)
    }

    /// When the transaction was voided
    pub fn void_time(&self) -> Option<DateTime<Utc>> {
        self.inst.slots().get_timestamp(VOID_TIME)
    }
}

impl Book {
    /// Look up a transaction
    pub fn transaction(&self, id: TransId) -> EngineResult<&Transaction> {
        self.transactions.require(id)
    }

    pub(crate) fn transaction_mut(&mut self, id: TransId) -> EngineResult<&mut Transaction> {
        self.transactions.require_mut(id)
    }

    /// Every transaction in creation order
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    /// Create an empty transaction
    pub fn create_transaction(
        &mut self,
        currency: &Commodity,
        date_posted: DateTime<Utc>,
        description: &str,
    ) -> EngineResult<TransId> {
        let trans = Transaction {
            inst: Instance::new(Guid::new()),
            currency: currency.clone(),
            num: String::new(),
            description: description.to_string(),
            date_posted,
            date_entered: Utc::now(),
            date_due: None,
            splits: Vec::new(),
            txn_type: TxnType::None,
            read_only: None,
            orig: None,
        };
        let id = trans.id();
        self.transactions.insert(trans);
        self.emit(EventKind::CREATE, IdType::Trans, id.guid());
        Ok(id)
    }

    /// Create a transaction from `(account, amount, value)` legs in one bracket
    pub fn record_transaction(
        &mut self,
        currency: &Commodity,
        date_posted: DateTime<Utc>,
        description: &str,
        legs: &[(AccountId, Numeric, Numeric)],
    ) -> EngineResult<TransId> {
        let id = self.create_transaction(currency, date_posted, description)?;
        self.trans_begin_edit(id)?;
        for (acc, amount, value) in legs {
            if let Err(err) = self.create_split(id, *acc, amount.clone(), value.clone()) {
                self.trans_rollback_edit(id)?;
                self.trans_destroy(id)?;
                return Err(err);
            }
        }
        self.trans_commit_edit(id)?;
        Ok(id)
    }

    /// Open an edit bracket; the outermost begin snapshots for rollback
    pub fn trans_begin_edit(&mut self, id: TransId) -> EngineResult<()> {
        let trans = self.transaction_mut(id)?;
        if !trans.inst.begin_edit() || self.is_shutting_down() {
            return Ok(());
        }
        let trans = self.transaction(id)?;
        let mut copy = trans.clone();
        copy.orig = None;
        let splits = trans
            .splits
            .iter()
            .filter_map(|s| self.splits.get(*s).cloned())
            .collect();
        self.transaction_mut(id)?.orig = Some(Box::new(TransSnapshot { trans: copy, splits }));
        Ok(())
    }

    /// Close an edit bracket
    ///
    /// The outermost commit frees a destroyed or empty transaction;
    /// otherwise it balances the transaction and refreshes its accounts.
    pub fn trans_commit_edit(&mut self, id: TransId) -> EngineResult<()> {
        let trans = self.transaction_mut(id)?;
        match trans.inst.edit_level() {
            level if level <= 0 => {
                warn!("commit of transaction {} outside an edit bracket", id);
                trans.inst.reset_edit_level();
                return Err(EngineError::NotEditing(id.guid()));
            }
            1 => {}
            _ => {
                trans.inst.commit_edit();
                return Ok(());
            }
        }

        if !trans.inst.is_destroying() && trans.splits.is_empty() && !self.is_shutting_down() {
            debug!("transaction {} has no splits; destroying it", id);
            self.transaction_mut(id)?.inst.set_destroying();
        }

        let touched = self.trans_touched_accounts(id)?;
        if self.transaction(id)?.inst.is_destroying() {
            self.free_transaction(id)?;
        } else {
            if !self.is_shutting_down() {
                self.trans_scrub_imbalance(id, None)?;
            }
            let trans = self.transaction_mut(id)?;
            trans.inst.commit_edit();
            trans.orig = None;
            self.emit(EventKind::MODIFY, IdType::Trans, id.guid());
        }

        for acc in touched {
            self.account_bring_up_to_date(acc)?;
        }
        Ok(())
    }

    fn trans_touched_accounts(&self, id: TransId) -> EngineResult<Vec<AccountId>> {
        let trans = self.transaction(id)?;
        let current = trans
            .splits
            .iter()
            .filter_map(|s| self.splits.get(*s).and_then(|s| s.account));
        let original = trans
            .orig
            .iter()
            .flat_map(|o| o.splits.iter().filter_map(|s| s.account));
        let mut touched: Vec<AccountId> = Vec::new();
        for acc in current.chain(original) {
            if !touched.contains(&acc) {
                touched.push(acc);
            }
        }
        for acc in &touched {
            if let Some(account) = self.accounts.get(*acc) {
                trace!("transaction {} touched {}", id, account.name);
            }
        }
        Ok(touched)
    }

    fn free_transaction(&mut self, id: TransId) -> EngineResult<()> {
        debug!("freeing transaction {}", id);
        let splits = self.transaction(id)?.splits.clone();
        for split in splits {
            if self.splits.contains(split) {
                self.split_destroy(split)?;
            }
        }
        self.transactions.remove(id);
        self.emit(EventKind::DESTROY, IdType::Trans, id.guid());
        Ok(())
    }

    /// Abandon the outermost edit bracket, restoring the snapshot taken at its begin
    pub fn trans_rollback_edit(&mut self, id: TransId) -> EngineResult<()> {
        let trans = self.transaction_mut(id)?;
        if !trans.inst.is_editing() {
            return Err(EngineError::NotEditing(id.guid()));
        }
        if trans.inst.edit_level() > 1 {
            trans.inst.commit_edit();
            return Ok(());
        }
        let Some(snapshot) = trans.orig.take() else {
            trans.inst.commit_edit();
            return Ok(());
        };
        debug!("rolling back transaction {}", id);
        let touched = self.trans_touched_accounts(id)?;

        for split in self.transaction(id)?.splits.clone() {
            self.detach_split(split)?;
            self.splits.remove(split);
        }

        let TransSnapshot { trans: original, splits } = *snapshot;
        for mut split in splits {
            let sid = split.id();
            let account = split.account.take();
            let lot = split.lot.take();
            let gains = split.gains;
            self.splits.insert(split);
            if let Some(acc) = account.filter(|a| self.accounts.contains(*a)) {
                self.account_insert_split(acc, sid)?;
            }
            if let Some(lot) = lot.filter(|l| self.lots.contains(*l)) {
                if self.split(sid)?.lot != Some(lot) {
                    self.lot_add_split(lot, sid)?;
                }
            }
            self.split_mut(sid)?.gains = gains;
        }

        let trans = self.transaction_mut(id)?;
        *trans = original;
        trans.inst.reset_edit_level();
        for acc in touched {
            self.account_bring_up_to_date(acc)?;
        }
        self.emit(EventKind::MODIFY, IdType::Trans, id.guid());
        Ok(())
    }

    fn detach_split(&mut self, split: SplitId) -> EngineResult<()> {
        let Some(account) = self.splits.get(split).map(|s| s.account) else {
            return Ok(());
        };
        if let Some(acc) = account.filter(|a| self.accounts.contains(*a)) {
            self.account_remove_split(acc, split)?;
        }
        if let Some(lot) = self.split(split)?.lot.filter(|l| self.lots.contains(*l)) {
            self.lot_remove_split(lot, split)?;
        }
        Ok(())
    }

    /// Destroy a transaction and its splits; refused when read-only
    pub fn trans_destroy(&mut self, id: TransId) -> EngineResult<()> {
        let trans = self.transaction(id)?;
        if let Some(reason) = &trans.read_only {
            if !self.is_shutting_down() {
                return Err(EngineError::ReadOnly {
                    guid: id.guid(),
                    reason: reason.clone(),
                });
            }
        }
        self.trans_begin_edit(id)?;
        self.transaction_mut(id)?.inst.set_destroying();
        self.trans_commit_edit(id)
    }

    fn edit_transaction<F>(&mut self, id: TransId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Transaction),
    {
        self.trans_begin_edit(id)?;
        let trans = self.transaction_mut(id)?;
        apply(trans);
        trans.inst.set_dirty();
        self.trans_commit_edit(id)
    }

    /// Change the transaction currency
    pub fn trans_set_currency(&mut self, id: TransId, currency: &Commodity) -> EngineResult<()> {
        self.edit_transaction(id, |t| t.currency = currency.clone())
    }

    /// Set the check or reference number
    pub fn trans_set_num(&mut self, id: TransId, num: &str) -> EngineResult<()> {
        self.edit_transaction(id, |t| t.num = num.to_string())
    }

    /// Set the description
    pub fn trans_set_description(&mut self, id: TransId, description: &str) -> EngineResult<()> {
        self.edit_transaction(id, |t| t.description = description.to_string())
    }

    /// Set the posted date; the splits' accounts are re-sorted
    pub fn trans_set_date_posted(&mut self, id: TransId, date: DateTime<Utc>) -> EngineResult<()> {
        self.trans_begin_edit(id)?;
        let splits = {
            let trans = self.transaction_mut(id)?;
            trans.date_posted = date;
            trans.inst.set_dirty();
            trans.splits.clone()
        };
        for split in splits {
            if let Some(s) = self.splits.get_mut(split) {
                s.gains |= GainsStatus::DATE_DIRTY;
            }
            self.mark_split(split)?;
        }
        self.trans_commit_edit(id)
    }

    /// Set the entered date
    pub fn trans_set_date_entered(&mut self, id: TransId, date: DateTime<Utc>) -> EngineResult<()> {
        self.edit_transaction(id, |t| t.date_entered = date)
    }

    /// Set the due date
    pub fn trans_set_date_due(&mut self, id: TransId, date: DateTime<Utc>) -> EngineResult<()> {
        self.edit_transaction(id, |t| t.date_due = Some(date))
    }

    /// Set the notes
    pub fn trans_set_notes(&mut self, id: TransId, notes: &str) -> EngineResult<()> {
        self.edit_transaction(id, |t| t.inst.slots_mut().set_string(TRANS_NOTES, notes))
    }

    /// Set what created the transaction
    pub fn trans_set_txn_type(&mut self, id: TransId, txn_type: TxnType) -> EngineResult<()> {
        self.edit_transaction(id, |t| t.txn_type = txn_type)
    }

    /// Mark the transaction read-only with a reason
    pub fn trans_set_read_only(&mut self, id: TransId, reason: &str) -> EngineResult<()> {
        self.edit_transaction(id, |t| t.read_only = Some(reason.to_string()))
    }

    /// Make the transaction editable again
    pub fn trans_clear_read_only(&mut self, id: TransId) -> EngineResult<()> {
        self.edit_transaction(id, |t| t.read_only = None)
    }

    /// Move a split into this transaction, out of its previous one
    pub fn trans_append_split(&mut self, id: TransId, split: SplitId) -> EngineResult<()> {
        let old = self.split(split)?.parent;
        if old == id {
            return Ok(());
        }
        self.transaction(id)?;
        self.trans_begin_edit(old)?;
        self.trans_begin_edit(id)?;
        if let Some(t) = self.transactions.get_mut(old) {
            t.splits.retain(|s| *s != split);
            t.inst.set_dirty();
        }
        {
            let t = self.transaction_mut(id)?;
            t.splits.push(split);
            t.inst.set_dirty();
        }
        {
            let s = self.split_mut(split)?;
            s.parent = id;
            s.gains |= GainsStatus::DATE_DIRTY;
            s.inst.set_dirty();
        }
        self.mark_split(split)?;
        self.trans_commit_edit(id)?;
        self.trans_commit_edit(old)
    }

    /// Sum of split values; zero when balanced
    pub fn trans_imbalance(&self, id: TransId) -> EngineResult<Numeric> {
        Ok(self
            .transaction(id)?
            .splits
            .iter()
            .filter_map(|s| self.splits.get(*s))
            .map(|s| &s.value)
            .sum())
    }

    /// True when split values sum to zero
    pub fn trans_is_balanced(&self, id: TransId) -> EngineResult<bool> {
        Ok(self.trans_imbalance(id)?.is_zero())
    }

    /// First split of the transaction posting to `acc`
    pub fn trans_find_split_by_account(&self, id: TransId, acc: AccountId) -> EngineResult<Option<SplitId>> {
        Ok(self
            .transaction(id)?
            .splits
            .iter()
            .copied()
            .find(|s| self.splits.get(*s).is_some_and(|s| s.account == Some(acc))))
    }

    /// Void: zero every split, keep the former figures, make it read-only
    pub fn trans_void(&mut self, id: TransId, reason: &str) -> EngineResult<()> {
        if let Some(read_only) = &self.transaction(id)?.read_only {
            return Err(EngineError::ReadOnly {
                guid: id.guid(),
                reason: read_only.clone(),
            });
        }
        self.trans_begin_edit(id)?;
        let splits = {
            let trans = self.transaction_mut(id)?;
            let slots = trans.inst.slots_mut();
            if let Some(notes) = slots.get_path(TRANS_NOTES).cloned() {
                slots.set_path(VOID_FORMER_NOTES, notes);
            }
            slots.set_string(TRANS_NOTES, "Voided transaction");
            slots.set_string(VOID_REASON, reason);
            slots.set_path(VOID_TIME, KvpValue::Timestamp(Utc::now()));
            trans.splits.clone()
        };
        for split in splits {
            self.split_void(split)?;
        }
        self.transaction_mut(id)?.read_only = Some(VOIDED_READ_ONLY.to_string());
        self.trans_commit_edit(id)
    }

    /// Undo [`Book::trans_void`]
    pub fn trans_unvoid(&mut self, id: TransId) -> EngineResult<()> {
        if !self.transaction(id)?.is_void() {
            return Ok(());
        }
        self.trans_begin_edit(id)?;
        let splits = {
            let trans = self.transaction_mut(id)?;
            let slots = trans.inst.slots_mut();
            match slots.remove_path(VOID_FORMER_NOTES) {
                Some(notes) => slots.set_path(TRANS_NOTES, notes),
                None => {
                    slots.remove_path(TRANS_NOTES);
                }
            }
            slots.remove_path(VOID_REASON);
            slots.remove_path(VOID_TIME);
            trans.read_only = None;
            trans.splits.clone()
        };
        for split in splits {
            self.split_unvoid(split)?;
        }
        self.trans_commit_edit(id)
    }

    /// Canonical transaction ordering: posted date, number, entered date,
    /// description, GUID
    pub fn trans_order(&self, a: TransId, b: TransId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let (Some(ta), Some(tb)) = (self.transactions.get(a), self.transactions.get(b)) else {
            return Ordering::Equal;
        };
        ta.date_posted
            .cmp(&tb.date_posted)
            .then_with(|| compare_nums(&ta.num, &tb.num))
            .then_with(|| ta.date_entered.cmp(&tb.date_entered))
            .then_with(|| ta.description.cmp(&tb.description))
            .then_with(|| ta.inst.guid().cmp(&tb.inst.guid()))
    }
}

fn compare_nums(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use chrono::TimeZone;

    fn setup() -> (Book, AccountId, AccountId, Commodity) {
        let mut book = Book::new();
        let usd = Commodity::currency("USD", 100);
        let root = book.root_account();
        let bank = book.add_account(root, AccountType::Bank, "Bank", &usd).unwrap();
        let expense = book.add_account(root, AccountType::Expense, "Rent", &usd).unwrap();
        (book, bank, expense, usd)
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, 0, 0, 0).unwrap()
    }

    fn pay(book: &mut Book, bank: AccountId, expense: AccountId, usd: &Commodity, amt: i64) -> TransId {
        let n = Numeric::from_i64(amt);
        book.record_transaction(usd, day(1), "rent", &[(bank, -&n, -&n), (expense, n.clone(), n)])
            .unwrap()
    }

    #[test]
    fn test_commit_scrubs_imbalance() {
        let (mut book, bank, _, usd) = setup();
        let trans = book.create_transaction(&usd, day(1), "lonely").unwrap();
        book.create_split(trans, bank, Numeric::from_i64(9), Numeric::from_i64(9)).unwrap();

        assert!(book.trans_is_balanced(trans).unwrap());
        assert_eq!(book.transaction(trans).unwrap().splits().len(), 2);
        let imbalance = book.lookup_account_by_name(book.root_account(), "Imbalance-USD").unwrap();
        assert_eq!(book.account(imbalance).unwrap().balance(), &Numeric::from_i64(-9));
    }

    #[test]
    fn test_empty_transaction_destroyed_on_commit() {
        let (mut book, _, _, usd) = setup();
        let trans = book.create_transaction(&usd, day(1), "empty").unwrap();
        book.trans_begin_edit(trans).unwrap();
        book.trans_commit_edit(trans).unwrap();
        assert!(book.transaction(trans).is_err());
    }

    #[test]
    fn test_commit_without_begin_is_error() {
        let (mut book, bank, expense, usd) = setup();
        let trans = pay(&mut book, bank, expense, &usd, 5);
        assert!(matches!(
            book.trans_commit_edit(trans),
            Err(EngineError::NotEditing(_))
        ));
    }

    #[test]
    fn test_rollback_restores_splits() {
        let (mut book, bank, expense, usd) = setup();
        let trans = pay(&mut book, bank, expense, &usd, 5);
        let split = book.trans_find_split_by_account(trans, expense).unwrap().unwrap();

        book.trans_begin_edit(trans).unwrap();
        book.trans_set_description(trans, "changed").unwrap();
        book.split_set_value(split, Numeric::from_i64(50)).unwrap();
        book.split_destroy(book.trans_find_split_by_account(trans, bank).unwrap().unwrap())
            .unwrap();
        book.trans_rollback_edit(trans).unwrap();

        let t = book.transaction(trans).unwrap();
        assert_eq!(t.description(), "rent");
        assert_eq!(t.splits().len(), 2);
        assert_eq!(book.split(split).unwrap().value(), &Numeric::from_i64(5));
        assert_eq!(book.account(bank).unwrap().balance(), &Numeric::from_i64(-5));
        assert_eq!(book.account(bank).unwrap().splits().len(), 1);
    }

    #[test]
    fn test_read_only_refuses_destroy() {
        let (mut book, bank, expense, usd) = setup();
        let trans = pay(&mut book, bank, expense, &usd, 5);
        book.trans_set_read_only(trans, "posted").unwrap();
        assert!(matches!(book.trans_destroy(trans), Err(EngineError::ReadOnly { .. })));
        book.trans_clear_read_only(trans).unwrap();
        book.trans_destroy(trans).unwrap();
        assert!(book.transaction(trans).is_err());
        assert!(book.account(bank).unwrap().balance().is_zero());
    }

    #[test]
    fn test_void_and_unvoid() {
        let (mut book, bank, expense, usd) = setup();
        let trans = pay(&mut book, bank, expense, &usd, 12);
        book.trans_set_notes(trans, "monthly").unwrap();
        book.trans_void(trans, "duplicate").unwrap();

        let t = book.transaction(trans).unwrap();
        assert!(t.is_void());
        assert_eq!(t.void_reason(), Some("duplicate"));
        assert_eq!(t.read_only(), Some(VOIDED_READ_ONLY));
        assert!(book.account(bank).unwrap().balance().is_zero());
        let split = book.trans_find_split_by_account(trans, bank).unwrap().unwrap();
        assert_eq!(book.split_void_former_amount(split).unwrap(), Numeric::from_i64(-12));

        book.trans_unvoid(trans).unwrap();
        let t = book.transaction(trans).unwrap();
        assert!(!t.is_void());
        assert_eq!(t.notes(), Some("monthly"));
        assert_eq!(book.account(bank).unwrap().balance(), &Numeric::from_i64(-12));
    }

    #[test]
    fn test_order_by_date_then_num() {
        let (mut book, bank, expense, usd) = setup();
        let a = pay(&mut book, bank, expense, &usd, 1);
        let b = pay(&mut book, bank, expense, &usd, 2);
        book.trans_set_num(a, "10").unwrap();
        book.trans_set_num(b, "9").unwrap();
        assert_eq!(book.trans_order(b, a), Ordering::Less);

        book.trans_set_date_posted(b, day(2)).unwrap();
        assert_eq!(book.trans_order(a, b), Ordering::Less);
        let first = book.account(bank).unwrap().splits()[0];
        assert_eq!(book.split(first).unwrap().transaction(), a);
    }

    #[test]
    fn test_append_split_moves_between_transactions() {
        let (mut book, bank, expense, usd) = setup();
        let a = pay(&mut book, bank, expense, &usd, 3);
        let b = pay(&mut book, bank, expense, &usd, 4);
        let moving = book.trans_find_split_by_account(a, expense).unwrap().unwrap();

        book.trans_begin_edit(a).unwrap();
        book.trans_begin_edit(b).unwrap();
        book.trans_append_split(b, moving).unwrap();
        let leftover = book.trans_find_split_by_account(b, expense).unwrap().unwrap();
        book.split_destroy(leftover).unwrap();
        book.trans_commit_edit(b).unwrap();
        book.trans_commit_edit(a).unwrap();

        assert_eq!(book.split(moving).unwrap().transaction(), b);
        assert!(book.trans_is_balanced(a).unwrap());
        assert!(book.trans_is_balanced(b).unwrap());
    }
}
