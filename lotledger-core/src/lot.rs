//! Lots: groups of splits in one account that open and close a position
//!
//! A lot collects the buy and sell splits of one holding (or the invoice and
//! payment splits of one receivable). It is closed when its amounts sum to
//! zero. The closed flag is cached and invalidated whenever a member split
//! changes.

use std::cell::Cell;

use chrono::{DateTime, Utc};
use log::trace;
use lotledger_math::Numeric;
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::{EngineError, EngineResult};
use crate::event::EventKind;
use crate::guid::{AccountId, EntityId, Guid, IdType, LotId, SplitId};
use crate::instance::{impl_entity, Instance};
use crate::kvp::KvpValue;
use crate::split::GainsStatus;

const LOT_TITLE: &str = "title";
const LOT_NOTES: &str = "notes";
const NEXT_LOT_ID: &str = "lot-mgmt/next-id";

/// A group of splits from one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub(crate) inst: Instance,
    pub(crate) account: Option<AccountId>,
    pub(crate) splits: Vec<SplitId>,
    #[serde(skip)]
    pub(crate) closed: Cell<Option<bool>>,
}

impl_entity!(Lot, LotId);

impl Lot {
    /// Lot id
    pub fn id(&self) -> LotId {
        LotId::from_guid(self.inst.guid())
    }

    /// Shared instance state
    pub fn instance(&self) -> &Instance {
        &self.inst
    }

    /// Account the lot belongs to, once it holds a split
    pub fn account(&self) -> Option<AccountId> {
        self.account
    }

    /// Member splits in the order they were added
    pub fn splits(&self) -> &[SplitId] {
        &self.splits
    }

    /// Number of member splits
    pub fn count_splits(&self) -> usize {
        self.splits.len()
    }

    /// Title, if set
    pub fn title(&self) -> Option<&str> {
        self.inst.slots().get_string(LOT_TITLE)
    }

    /// Notes, if set
    pub fn notes(&self) -> Option<&str> {
        self.inst.slots().get_string(LOT_NOTES)
    }
}

impl Book {
    /// Look up a lot
    pub fn lot(&self, id: LotId) -> EngineResult<&Lot> {
        self.lots.require(id)
    }

    pub(crate) fn lot_mut(&mut self, id: LotId) -> EngineResult<&mut Lot> {
        self.lots.require_mut(id)
    }

    /// Every lot in creation order
    pub fn all_lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    /// Create an empty lot; it joins an account with its first split
    pub fn create_lot(&mut self) -> LotId {
        let lot = Lot {
            inst: Instance::new(Guid::new()),
            account: None,
            splits: Vec::new(),
            closed: Cell::new(None),
        };
        let id = lot.id();
        self.lots.insert(lot);
        self.emit(EventKind::CREATE, IdType::Lot, id.guid());
        id
    }

    /// Create a lot titled from the account's `Lot N` counter
    pub fn lot_make_default(&mut self, acc: AccountId) -> EngineResult<LotId> {
        let lot = self.create_lot();
        self.account_begin_edit(acc)?;
        let next = {
            let slots = self.account_mut(acc)?.inst.slots_mut();
            let next = slots.get_i64(NEXT_LOT_ID).unwrap_or(0);
            slots.set_path(NEXT_LOT_ID, KvpValue::Int64(next + 1));
            next
        };
        self.account_commit_edit(acc)?;
        self.lot_set_title(lot, &format!("Lot {}", next))?;
        Ok(lot)
    }

    /// Set the title
    pub fn lot_set_title(&mut self, id: LotId, title: &str) -> EngineResult<()> {
        self.lot_mut(id)?.inst.slots_mut().set_string(LOT_TITLE, title);
        Ok(())
    }

    /// Set the notes
    pub fn lot_set_notes(&mut self, id: LotId, notes: &str) -> EngineResult<()> {
        self.lot_mut(id)?.inst.slots_mut().set_string(LOT_NOTES, notes);
        Ok(())
    }

    /// Sum of member amounts; refreshes the closed cache
    pub fn lot_balance(&self, id: LotId) -> EngineResult<Numeric> {
        let lot = self.lot(id)?;
        if lot.splits.is_empty() {
            lot.closed.set(Some(false));
            return Ok(Numeric::zero());
        }
        let balance: Numeric = lot
            .splits
            .iter()
            .filter_map(|s| self.splits.get(*s))
            .map(|s| &s.amount)
            .sum();
        lot.closed.set(Some(balance.is_zero()));
        Ok(balance)
    }

    /// Sum of member values
    pub fn lot_value(&self, id: LotId) -> EngineResult<Numeric> {
        Ok(self
            .lot(id)?
            .splits
            .iter()
            .filter_map(|s| self.splits.get(*s))
            .map(|s| &s.value)
            .sum())
    }

    /// True when the lot holds splits summing to zero
    pub fn lot_is_closed(&self, id: LotId) -> EngineResult<bool> {
        let lot = self.lot(id)?;
        match lot.closed.get() {
            Some(closed) => Ok(closed),
            None => Ok(!lot.splits.is_empty() && self.lot_balance(id)?.is_zero()),
        }
    }

    /// Amount and value of the lot's splits that sort before `split`
    ///
    /// A gains split is placed where its source split sorts. Other splits
    /// of the same transaction count as earlier.
    pub fn lot_balance_before(&self, id: LotId, split: SplitId) -> EngineResult<(Numeric, Numeric)> {
        let lot = self.lot(id)?;
        let target = self.split(split)?.gains_source.unwrap_or(split);
        let tb = self.split(target)?.parent;

        let mut amount = Numeric::zero();
        let mut value = Numeric::zero();
        for sid in &lot.splits {
            let Some(s) = self.splits.get(*sid) else {
                continue;
            };
            let source = s.gains_source.unwrap_or(*sid);
            let Some(ta) = self.splits.get(source).map(|src| src.parent) else {
                continue;
            };
            if (ta == tb && source != target) || self.trans_order(ta, tb).is_lt() {
                amount += &s.amount;
                value += &s.value;
            }
        }
        Ok((amount, value))
    }

    /// Add a split to a lot, moving it out of any previous lot
    ///
    /// A lot without an account adopts the split's account. Splits from a
    /// different account are rejected.
    pub fn lot_add_split(&mut self, id: LotId, split: SplitId) -> EngineResult<()> {
        let acc = self.split(split)?.account.ok_or_else(|| {
            EngineError::InvalidArgument(format!("split {} has no account", split))
        })?;
        match self.lot(id)?.account {
            None => self.account_insert_lot(acc, id)?,
            Some(lot_acc) if lot_acc != acc => {
                return Err(EngineError::LotAccountMismatch {
                    split: split.guid(),
                    lot: id.guid(),
                })
            }
            Some(_) => {}
        }

        let previous = self.split(split)?.lot;
        if previous == Some(id) {
            return Ok(());
        }
        if let Some(previous) = previous.filter(|l| self.lots.contains(*l)) {
            self.lot_remove_split(previous, split)?;
        }
        trace!("adding split {} to lot {}", split, id);

        {
            let s = self.split_mut(split)?;
            s.lot = Some(id);
            s.gains |= GainsStatus::LOT_DIRTY;
            s.inst.set_dirty();
        }
        let lot = self.lot_mut(id)?;
        lot.splits.push(split);
        lot.closed.set(None);
        lot.inst.set_dirty();
        self.emit(EventKind::MODIFY, IdType::Lot, id.guid());
        self.emit(EventKind::ITEM_ADDED, IdType::Lot, id.guid());
        Ok(())
    }

    /// Remove a split from a lot; an emptied lot leaves its account
    pub fn lot_remove_split(&mut self, id: LotId, split: SplitId) -> EngineResult<()> {
        let (now_empty, account) = {
            let lot = self.lot_mut(id)?;
            lot.splits.retain(|s| *s != split);
            lot.closed.set(None);
            lot.inst.set_dirty();
            (lot.splits.is_empty(), lot.account)
        };
        if let Some(s) = self.splits.get_mut(split) {
            if s.lot == Some(id) {
                s.lot = None;
                s.gains |= GainsStatus::LOT_DIRTY;
            }
        }
        if now_empty {
            if let Some(acc) = account.filter(|a| self.accounts.contains(*a)) {
                self.account_remove_lot(acc, id)?;
            }
            self.lot_mut(id)?.account = None;
        }
        self.emit(EventKind::MODIFY, IdType::Lot, id.guid());
        self.emit(EventKind::ITEM_REMOVED, IdType::Lot, id.guid());
        Ok(())
    }

    /// Destroy a lot; its splits stay in their accounts, lot-less
    pub fn lot_destroy(&mut self, id: LotId) -> EngineResult<()> {
        self.emit(EventKind::DESTROY, IdType::Lot, id.guid());
        let lot = self.lots.remove(id).ok_or_else(|| {
            EngineError::not_found(IdType::Lot, id.guid())
        })?;
        for split in lot.splits {
            if let Some(s) = self.splits.get_mut(split) {
                s.lot = None;
            }
        }
        if let Some(acc) = lot.account.and_then(|a| self.accounts.get_mut(a)) {
            acc.lots.retain(|l| *l != id);
        }
        Ok(())
    }

    fn lot_extreme_split(&self, id: LotId, later: bool) -> EngineResult<Option<SplitId>> {
        let mut best: Option<(DateTime<Utc>, SplitId)> = None;
        for sid in &self.lot(id)?.splits {
            let Ok(trans) = self.split_transaction(*sid) else {
                continue;
            };
            let date = trans.date_posted;
            let better = match best {
                None => true,
                Some((current, _)) if later => date > current,
                Some((current, _)) => date < current,
            };
            if better {
                best = Some((date, *sid));
            }
        }
        Ok(best.map(|(_, s)| s))
    }

    /// Member split with the earliest posted date (first one on ties)
    pub fn lot_earliest_split(&self, id: LotId) -> EngineResult<Option<SplitId>> {
        self.lot_extreme_split(id, false)
    }

    /// Member split with the latest posted date (first one on ties)
    pub fn lot_latest_split(&self, id: LotId) -> EngineResult<Option<SplitId>> {
        self.lot_extreme_split(id, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::guid::TransId;
    use chrono::TimeZone;
    use lotledger_math::Commodity;

    struct Fixture {
        book: Book,
        stock: AccountId,
        cash: AccountId,
        usd: Commodity,
    }

    fn fixture() -> Fixture {
        let mut book = Book::new();
        let usd = Commodity::currency("USD", 100);
        let acme = Commodity::new("NYSE", "ACME", "Acme Corp", 1);
        let root = book.root_account();
        let stock = book.add_account(root, AccountType::Stock, "ACME", &acme).unwrap();
        let cash = book.add_account(root, AccountType::Bank, "Cash", &usd).unwrap();
        Fixture { book, stock, cash, usd }
    }

    fn trade(f: &mut Fixture, day: u32, shares: i64, cost: i64) -> (TransId, SplitId) {
        let date = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        let trans = f
            .book
            .record_transaction(
                &f.usd,
                date,
                "trade",
                &[
                    (f.stock, Numeric::from_i64(shares), Numeric::from_i64(cost)),
                    (f.cash, Numeric::from_i64(-cost), Numeric::from_i64(-cost)),
                ],
            )
            .unwrap();
        let split = f.book.trans_find_split_by_account(trans, f.stock).unwrap().unwrap();
        (trans, split)
    }

    #[test]
    fn test_default_titles_count_up() {
        let mut f = fixture();
        let a = f.book.lot_make_default(f.stock).unwrap();
        let b = f.book.lot_make_default(f.stock).unwrap();
        assert_eq!(f.book.lot(a).unwrap().title(), Some("Lot 0"));
        assert_eq!(f.book.lot(b).unwrap().title(), Some("Lot 1"));
    }

    #[test]
    fn test_add_split_adopts_account_and_closes() {
        let mut f = fixture();
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let (_, sell) = trade(&mut f, 2, -10, -1200);
        let lot = f.book.create_lot();

        f.book.lot_add_split(lot, buy).unwrap();
        assert_eq!(f.book.lot(lot).unwrap().account(), Some(f.stock));
        assert_eq!(f.book.account(f.stock).unwrap().lots(), &[lot]);
        assert!(!f.book.lot_is_closed(lot).unwrap());

        f.book.lot_add_split(lot, sell).unwrap();
        f.book.lot_add_split(lot, sell).unwrap();
        assert_eq!(f.book.lot(lot).unwrap().count_splits(), 2);
        assert!(f.book.lot_is_closed(lot).unwrap());
        assert_eq!(f.book.lot_value(lot).unwrap(), Numeric::from_i64(-200));
        assert_eq!(f.book.lot_earliest_split(lot).unwrap(), Some(buy));
        assert_eq!(f.book.lot_latest_split(lot).unwrap(), Some(sell));
    }

    #[test]
    fn test_rejects_foreign_split() {
        let mut f = fixture();
        let (trans, buy) = trade(&mut f, 1, 10, 1000);
        let cash_split = f.book.trans_find_split_by_account(trans, f.cash).unwrap().unwrap();
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        assert!(matches!(
            f.book.lot_add_split(lot, cash_split),
            Err(EngineError::LotAccountMismatch { .. })
        ));
    }

    #[test]
    fn test_emptied_lot_leaves_account() {
        let mut f = fixture();
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        f.book.lot_remove_split(lot, buy).unwrap();
        assert_eq!(f.book.lot(lot).unwrap().account(), None);
        assert!(f.book.account(f.stock).unwrap().lots().is_empty());
        assert_eq!(f.book.split(buy).unwrap().lot(), None);
    }

    #[test]
    fn test_moving_split_between_lots() {
        let mut f = fixture();
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let first = f.book.create_lot();
        let second = f.book.create_lot();
        f.book.lot_add_split(first, buy).unwrap();
        f.book.lot_add_split(second, buy).unwrap();
        assert!(f.book.lot(first).unwrap().splits().is_empty());
        assert_eq!(f.book.split(buy).unwrap().lot(), Some(second));
    }

    #[test]
    fn test_balance_before() {
        let mut f = fixture();
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let (_, sell) = trade(&mut f, 3, -4, -600);
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        f.book.lot_add_split(lot, sell).unwrap();

        let (amt, val) = f.book.lot_balance_before(lot, sell).unwrap();
        assert_eq!(amt, Numeric::from_i64(10));
        assert_eq!(val, Numeric::from_i64(1000));
        let (amt, _) = f.book.lot_balance_before(lot, buy).unwrap();
        assert!(amt.is_zero());
    }

    #[test]
    fn test_destroy_lot_frees_splits() {
        let mut f = fixture();
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        f.book.lot_destroy(lot).unwrap();
        assert!(f.book.lot(lot).is_err());
        assert_eq!(f.book.split(buy).unwrap().lot(), None);
        assert!(f.book.account(f.stock).unwrap().lots().is_empty());
    }
}
