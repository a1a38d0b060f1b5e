//! Lot assignment and realized capital gains
//!
//! Splits in a trading account are placed into lots by the account's
//! [`Policy`](crate::policy::Policy). A split that would overfill a lot is
//! broken in two; the halves carry `lot-split` bags naming each other so
//! they can be merged back later.
//!
//! Once a lot holds both an opening split and reducing splits, each
//! reducing split realizes a gain: the difference between its share of the
//! lot's cost basis and the value it was sold for. The gain is recorded in
//! a separate two-split transaction. One split sits in the lot with a zero
//! amount so the lot's values net to zero once closed; the other books the
//! gain to the gains account.

use chrono::Utc;
use log::{debug, error, trace, warn};
use lotledger_math::{cmp_abs, Numeric};

use crate::book::Book;
use crate::error::EngineResult;
use crate::guid::{AccountId, EntityId, LotId, SplitId};
use crate::kvp::{KvpFrame, KvpValue};
use crate::split::{GainsStatus, LOT_SPLIT};

/// Description and memo of realized-gains transactions
pub const GAINS_DESCRIPTION: &str = "Realized Gain/Loss";

/// Outcome of offering a split to a lot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotAssignment {
    /// Nothing of the split is left to place (a zero-amount split is left out)
    Assigned,
    /// The split was broken; the returned split holds the remainder
    Remainder(SplitId),
    /// The lot is closed and took nothing
    Rejected,
}

impl Book {
    /// Offer a split to a lot, breaking it if it would overfill the lot
    pub fn split_assign_to_lot(&mut self, split: SplitId, lot: LotId) -> EngineResult<LotAssignment> {
        let (amount, value, in_lot, trans) = {
            let s = self.split(split)?;
            (s.amount.clone(), s.value.clone(), s.lot.is_some(), s.parent)
        };
        if in_lot {
            return Ok(LotAssignment::Assigned);
        }
        if amount.is_zero() {
            if !self.transaction(trans)?.is_void() {
                warn!("split {} has zero amount; not assigning it to a lot", split);
            }
            return Ok(LotAssignment::Assigned);
        }

        let balance = self.lot_balance(lot)?;
        if self.lot_is_closed(lot)? {
            return Ok(LotAssignment::Rejected);
        }

        if balance.is_zero() {
            self.lot_add_split(lot, split)?;
            return Ok(LotAssignment::Assigned);
        }

        if balance.is_positive() == amount.is_positive() {
            warn!("split {} enlarges lot {} instead of reducing it", split, lot);
            self.lot_add_split(lot, split)?;
            return Ok(LotAssignment::Assigned);
        }

        if cmp_abs(&amount, &balance).is_le() {
            self.lot_add_split(lot, split)?;
            return Ok(LotAssignment::Assigned);
        }

        let fraction = self.transaction(trans)?.currency.fraction();
        let amt_a = balance.negated();
        let amt_b = &amount - &amt_a;
        let val_a = (&amt_a.checked_div(&amount)? * &value).rounded_to(fraction);
        let val_b = &value - &val_a;
        debug!(
            "breaking split {} into {} + {} (values {} + {})",
            split, amt_a, amt_b, val_a, val_b
        );

        let acc = self.split(split)?.account;
        let Some(acc) = acc else {
            return Ok(LotAssignment::Rejected);
        };
        self.account_begin_edit(acc)?;
        self.trans_begin_edit(trans)?;
        let result = self.break_split(split, lot, acc, (amt_a, val_a), (amt_b, val_b));
        self.trans_commit_edit(trans)?;
        self.account_commit_edit(acc)?;
        result.map(LotAssignment::Remainder)
    }

    fn break_split(
        &mut self,
        split: SplitId,
        lot: LotId,
        acc: AccountId,
        (amt_a, val_a): (Numeric, Numeric),
        (amt_b, val_b): (Numeric, Numeric),
    ) -> EngineResult<SplitId> {
        self.split_set_amount(split, amt_a)?;
        self.split_set_value(split, val_a)?;
        self.lot_add_split(lot, split)?;

        let trans = self.split(split)?.parent;
        let remainder = self.create_split(trans, acc, amt_b, val_b)?;
        let (memo, action, reconcile, reconciled_at) = {
            let s = self.split(split)?;
            (s.memo.clone(), s.action.clone(), s.reconcile, s.date_reconciled)
        };
        {
            let r = self.split_mut(remainder)?;
            r.memo = memo;
            r.action = action;
            r.reconcile = reconcile;
            r.date_reconciled = reconciled_at;
        }

        let now = Utc::now();
        for (owner, peer) in [(split, remainder), (remainder, split)] {
            let mut entry = KvpFrame::new();
            entry.set_path("date", KvpValue::Timestamp(now));
            entry.set_path("peer_guid", KvpValue::Guid(peer.guid()));
            let s = self.split_mut(owner)?;
            s.inst.slots_mut().bag_add(LOT_SPLIT, entry);
            s.inst.set_dirty();
        }
        self.mark_split(remainder)?;
        Ok(remainder)
    }

    /// Place a lot-less split into lots, following the account policy
    ///
    /// Returns true when the split had to be broken up.
    pub fn split_assign(&mut self, split: SplitId) -> EngineResult<bool> {
        let s = self.split(split)?;
        if s.lot.is_some() || s.amount.is_zero() {
            return Ok(false);
        }
        let Some(acc) = s.account else {
            return Ok(false);
        };
        if !self.account_has_trades(acc)? {
            return Ok(false);
        }
        let policy = self.account(acc)?.policy.policy();

        self.account_begin_edit(acc)?;
        let mut broken = false;
        let mut current = Some(split);
        while let Some(sid) = current {
            if let Some(s) = self.splits.get_mut(sid) {
                s.gains |= GainsStatus::VALU_DIRTY;
            }
            let lot = match policy.get_lot(self, sid)? {
                Some(lot) => lot,
                None => {
                    let lot = self.lot_make_default(acc)?;
                    trace!("opened new lot {} for split {}", lot, sid);
                    lot
                }
            };
            current = match self.split_assign_to_lot(sid, lot)? {
                LotAssignment::Assigned => None,
                LotAssignment::Remainder(rest) => {
                    broken = true;
                    Some(rest)
                }
                LotAssignment::Rejected => {
                    error!("policy offered closed lot {} for split {}", lot, sid);
                    None
                }
            };
        }
        self.account_commit_edit(acc)?;
        Ok(broken)
    }

    /// Record the realized gain of a reducing split in its lot
    ///
    /// `gains_account` overrides the account's configured gains account
    /// when its commodity matches the transaction currency.
    pub fn split_compute_cap_gains(
        &mut self,
        split: SplitId,
        gains_account: Option<AccountId>,
    ) -> EngineResult<()> {
        let Some(lot) = self.split(split)?.lot else {
            return Ok(());
        };
        let Some(lot_acc) = self.lot(lot)?.account else {
            return Ok(());
        };
        let policy = self.account(lot_acc)?.policy.policy();
        let currency = self.split_transaction(split)?.currency.clone();
        let Some(split_acc) = self.split(split)?.account else {
            return Ok(());
        };
        if self.account(split_acc)?.commodity.as_ref() == Some(&currency) {
            trace!("currency transfer; no gains for split {}", split);
            return Ok(());
        }
        if policy.is_opening_split(self, lot, split)? {
            return Ok(());
        }
        if self.split(split)?.split_type() == "stock-split" {
            return Ok(());
        }

        let mut split = split;
        if self.split(split)?.gains.contains(GainsStatus::GAINS) {
            match self.split(split)?.gains_source {
                Some(source) if self.splits.contains(source) => split = source,
                _ => {
                    warn!("gains split {} has lost its source", split);
                    return Ok(());
                }
            }
        }

        let lot_splits = self.lot(lot)?.splits.clone();
        for sid in lot_splits {
            if policy.is_opening_split(self, lot, sid)?
                && self.split(sid)?.gains.contains(GainsStatus::VALU_DIRTY)
            {
                self.split_mut(split)?.gains |= GainsStatus::VALU_DIRTY;
                break;
            }
        }

        let s = self.split(split)?;
        let gains_split_dirty = s
            .gains_split
            .and_then(|g| self.splits.get(g))
            .map(|g| g.gains.intersects(GainsStatus::A_VDIRTY));
        if !s.gains.intersects(GainsStatus::A_VDIRTY) && gains_split_dirty == Some(false) {
            return Ok(());
        }
        if s.amount.is_zero() {
            return Ok(());
        }
        let amount = s.amount.clone();
        let value = s.value.clone();

        let (lot_amount, lot_value) = self.lot_balance_before(lot, split)?;
        let Some(opening) = policy.get_lot_opening(self, lot)? else {
            return Ok(());
        };
        if !currency.equiv(&opening.currency) {
            warn!(
                "lot {} opened in {} but split {} is in {}; gains not computed",
                lot, opening.currency, split, currency
            );
            return Ok(());
        }
        if cmp_abs(&amount, &lot_amount).is_gt() {
            error!(
                "malformed lot {} (too thin): balance before {} but split amount {}",
                lot, lot_amount, amount
            );
            return Ok(());
        }
        if (lot_amount.is_negative() || amount.is_positive())
            && (lot_amount.is_positive() || amount.is_negative())
        {
            error!(
                "malformed lot {} (too fat): balance before {} and split amount {}",
                lot, lot_amount, amount
            );
            return Ok(());
        }

        let basis = (amount.checked_div(&lot_amount)? * &lot_value).rounded_to(currency.fraction());
        let gains = &basis - &value;
        trace!("split {} realizes {}", split, gains);

        let existing = self
            .split(split)?
            .gains_split
            .filter(|g| self.splits.contains(*g));

        if gains.is_zero() {
            if let Some(lot_split) = existing {
                let gains_trans = self.split(lot_split)?.parent;
                debug!("gain of split {} is now zero; dropping {}", split, gains_trans);
                self.trans_destroy(gains_trans)?;
            }
            let s = self.split_mut(split)?;
            s.gains_split = None;
            s.gains = GainsStatus::empty();
            return Ok(());
        }
        let negated = gains.negated();
        let date = self.split_transaction(split)?.date_posted;

        let (trans, lot_split, gain_split) = match existing {
            None => {
                let usable = match gains_account {
                    Some(g) => self.account(g)?.commodity.as_ref().is_some_and(|c| c.equiv(&currency)),
                    None => false,
                };
                let gain_acc = match gains_account {
                    Some(g) if usable => g,
                    _ => self.account_gains_account(lot_acc, &currency)?,
                };
                let trans = self.create_transaction(&currency, date, GAINS_DESCRIPTION)?;
                self.trans_begin_edit(trans)?;
                let lot_split = self.create_split(trans, lot_acc, Numeric::zero(), gains.clone())?;
                let gain_split = self.create_split(trans, gain_acc, negated.clone(), negated.clone())?;
                self.split_set_memo(lot_split, GAINS_DESCRIPTION)?;
                self.split_set_memo(gain_split, GAINS_DESCRIPTION)?;
                (trans, lot_split, gain_split)
            }
            Some(lot_split) => {
                let trans = self.split(lot_split)?.parent;
                let Some(gain_split) = self.split_other_split(lot_split)? else {
                    return Ok(());
                };
                let ls = self.split(lot_split)?;
                let gs = self.split(gain_split)?;
                if ls.value == gains
                    && ls.amount.is_zero()
                    && gs.value == negated
                    && gs.amount == negated
                    && ls.gains_source == Some(split)
                    && ls.lot == Some(lot)
                {
                    self.split_mut(split)?.gains = GainsStatus::empty();
                    return Ok(());
                }
                self.trans_begin_edit(trans)?;
                if !self.transaction(trans)?.currency.equiv(&currency) {
                    warn!("resetting currency of gains transaction {}", trans);
                    self.trans_set_currency(trans, &currency)?;
                }
                (trans, lot_split, gain_split)
            }
        };

        self.trans_set_date_posted(trans, date)?;
        self.trans_set_date_entered(trans, Utc::now())?;
        self.split_set_amount(lot_split, Numeric::zero())?;
        self.split_set_value(lot_split, gains)?;
        self.split_set_amount(gain_split, negated.clone())?;
        self.split_set_value(gain_split, negated)?;

        self.split_mut(split)?.gains = GainsStatus::empty();
        self.split_mut(split)?.gains_split = Some(lot_split);
        for gains_leg in [lot_split, gain_split] {
            let g = self.split_mut(gains_leg)?;
            g.gains = GainsStatus::GAINS;
            g.gains_source = Some(split);
        }
        if self.split(lot_split)?.lot != Some(lot) {
            self.lot_add_split(lot, lot_split)?;
            self.split_mut(lot_split)?.gains = GainsStatus::GAINS;
        }
        self.trans_commit_edit(trans)
    }

    /// Recompute gains for every split of a lot
    ///
    /// A changed opening split dirties every split in the lot first.
    pub fn lot_compute_cap_gains(&mut self, lot: LotId, gains_account: Option<AccountId>) -> EngineResult<()> {
        let policy = self.lot_policy(lot)?;
        let splits = self.lot(lot)?.splits.clone();
        let mut opening_dirty = false;
        for sid in &splits {
            if policy.is_opening_split(self, lot, *sid)? {
                let s = self.split_mut(*sid)?;
                if s.gains.contains(GainsStatus::VALU_DIRTY) {
                    opening_dirty = true;
                    s.gains.remove(GainsStatus::VALU_DIRTY);
                }
            }
        }
        if opening_dirty {
            for sid in &splits {
                self.split_mut(*sid)?.gains |= GainsStatus::VALU_DIRTY;
            }
        }
        for sid in splits {
            if self.splits.contains(sid) {
                self.split_compute_cap_gains(sid, gains_account)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::guid::TransId;
    use chrono::{DateTime, TimeZone};
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

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, d, 0, 0, 0).unwrap()
    }

    fn trade(f: &mut Fixture, d: u32, shares: i64, cost: i64) -> (TransId, SplitId) {
        let trans = f
            .book
            .record_transaction(
                &f.usd,
                day(d),
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
    fn test_assign_breaks_oversized_split() {
        let mut f = fixture();
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let (sell_trans, sell) = trade(&mut f, 2, -15, -1800);
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();

        let outcome = f.book.split_assign_to_lot(sell, lot).unwrap();
        let LotAssignment::Remainder(rest) = outcome else {
            panic!("expected a remainder, got {:?}", outcome);
        };
        assert_eq!(f.book.split(sell).unwrap().amount(), &Numeric::from_i64(-10));
        assert_eq!(f.book.split(sell).unwrap().value(), &Numeric::from_i64(-1200));
        assert_eq!(f.book.split(rest).unwrap().amount(), &Numeric::from_i64(-5));
        assert_eq!(f.book.split(rest).unwrap().value(), &Numeric::from_i64(-600));
        assert!(f.book.lot_is_closed(lot).unwrap());
        assert!(f.book.trans_is_balanced(sell_trans).unwrap());
        assert!(f.book.split(sell).unwrap().is_lot_split());
        assert!(f.book.split(rest).unwrap().is_lot_split());
        assert_eq!(f.book.split_other_split(sell).unwrap(), f.book.trans_find_split_by_account(sell_trans, f.cash).unwrap());
    }

    #[test]
    fn test_closed_lot_rejects() {
        let mut f = fixture();
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let (_, sell) = trade(&mut f, 2, -10, -900);
        let (_, extra) = trade(&mut f, 3, -1, -90);
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        f.book.lot_add_split(lot, sell).unwrap();
        assert_eq!(f.book.split_assign_to_lot(extra, lot).unwrap(), LotAssignment::Rejected);
    }

    #[test]
    fn test_split_assign_opens_lots() {
        let mut f = fixture();
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let (_, sell) = trade(&mut f, 2, -15, -1800);

        assert!(!f.book.split_assign(buy).unwrap());
        assert!(f.book.split_assign(sell).unwrap());

        let lots = f.book.account(f.stock).unwrap().lots().to_vec();
        assert_eq!(lots.len(), 2);
        assert!(f.book.lot_is_closed(lots[0]).unwrap());
        assert_eq!(f.book.lot_balance(lots[1]).unwrap(), Numeric::from_i64(-5));
    }

    #[test]
    fn test_gains_realized_and_double_balanced() {
        let mut f = fixture();
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let (_, sell_a) = trade(&mut f, 2, -5, -600);
        let (_, sell_b) = trade(&mut f, 3, -5, -700);
        let lot = f.book.create_lot();
        for s in [buy, sell_a, sell_b] {
            f.book.lot_add_split(lot, s).unwrap();
        }

        f.book.lot_compute_cap_gains(lot, None).unwrap();

        let gains_a = f.book.split(sell_a).unwrap().gains_split().unwrap();
        let gains_b = f.book.split(sell_b).unwrap().gains_split().unwrap();
        assert_eq!(f.book.split(gains_a).unwrap().value(), &Numeric::from_i64(100));
        assert_eq!(f.book.split(gains_b).unwrap().value(), &Numeric::from_i64(200));
        assert_eq!(f.book.split(gains_a).unwrap().gains_source(), Some(sell_a));
        assert!(f.book.lot_is_closed(lot).unwrap());
        assert!(f.book.lot_value(lot).unwrap().is_zero());

        let gains_acc = f
            .book
            .lookup_account_by_name(f.book.root_account(), "Orphaned Gains-USD")
            .unwrap();
        assert_eq!(f.book.account(gains_acc).unwrap().balance(), &Numeric::from_i64(-300));
        assert_eq!(f.book.split_cap_gains(sell_b).unwrap(), Numeric::from_i64(200));
    }

    #[test]
    fn test_gains_update_in_place() {
        let mut f = fixture();
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let (_, sell) = trade(&mut f, 2, -10, -1500);
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        f.book.lot_add_split(lot, sell).unwrap();
        f.book.lot_compute_cap_gains(lot, None).unwrap();
        let gains = f.book.split(sell).unwrap().gains_split().unwrap();
        let transactions = f.book.transaction_count();

        let sell_trans = f.book.split(sell).unwrap().transaction();
        f.book.trans_begin_edit(sell_trans).unwrap();
        f.book.split_set_value(sell, Numeric::from_i64(-1200)).unwrap();
        let cash_split = f.book.trans_find_split_by_account(sell_trans, f.cash).unwrap().unwrap();
        f.book.split_set_value(cash_split, Numeric::from_i64(1200)).unwrap();
        f.book.split_set_amount(cash_split, Numeric::from_i64(1200)).unwrap();
        f.book.trans_commit_edit(sell_trans).unwrap();
        f.book.lot_compute_cap_gains(lot, None).unwrap();

        assert_eq!(f.book.split(sell).unwrap().gains_split(), Some(gains));
        assert_eq!(f.book.split(gains).unwrap().value(), &Numeric::from_i64(200));
        assert_eq!(f.book.transaction_count(), transactions);
    }

    #[test]
    fn test_zero_gain_drops_gains_transaction() {
        let mut f = fixture();
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let (sell_trans, sell) = trade(&mut f, 2, -10, -1100);
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        f.book.lot_add_split(lot, sell).unwrap();
        f.book.lot_compute_cap_gains(lot, None).unwrap();
        let gains = f.book.split(sell).unwrap().gains_split().unwrap();
        let gains_trans = f.book.split(gains).unwrap().transaction();

        f.book.trans_begin_edit(sell_trans).unwrap();
        f.book.split_set_value(sell, Numeric::from_i64(-1000)).unwrap();
        let cash_split = f.book.trans_find_split_by_account(sell_trans, f.cash).unwrap().unwrap();
        f.book.split_set_value(cash_split, Numeric::from_i64(1000)).unwrap();
        f.book.split_set_amount(cash_split, Numeric::from_i64(1000)).unwrap();
        f.book.trans_commit_edit(sell_trans).unwrap();
        f.book.split_compute_cap_gains(sell, None).unwrap();

        assert!(f.book.transaction(gains_trans).is_err());
        assert_eq!(f.book.split(sell).unwrap().gains_split(), None);
        assert_eq!(f.book.lot(lot).unwrap().count_splits(), 2);
    }

    #[test]
    fn test_no_gains_in_currency_lots() {
        let mut f = fixture();
        let usd = f.usd.clone();
        let root = f.book.root_account();
        let ar = f.book.add_account(root, AccountType::Receivable, "AR", &usd).unwrap();
        let income = f.book.add_account(root, AccountType::Income, "Sales", &usd).unwrap();
        let n = Numeric::from_i64(50);
        let t1 = f.book.record_transaction(&usd, day(1), "inv", &[(ar, n.clone(), n.clone()), (income, -&n, -&n)]).unwrap();
        let t2 = f.book.record_transaction(&usd, day(2), "pay", &[(ar, -&n, -&n), (f.cash, n.clone(), n.clone())]).unwrap();
        let a = f.book.trans_find_split_by_account(t1, ar).unwrap().unwrap();
        let b = f.book.trans_find_split_by_account(t2, ar).unwrap().unwrap();
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, a).unwrap();
        f.book.lot_add_split(lot, b).unwrap();
        f.book.lot_compute_cap_gains(lot, None).unwrap();
        assert_eq!(f.book.split(b).unwrap().gains_split(), None);
    }

    #[test]
    fn test_no_gains_when_sold_in_other_currency() {
        let mut f = fixture();
        let eur = Commodity::currency("EUR", 100);
        let (_, buy) = trade(&mut f, 1, 10, 1000);
        let sell_trans = f
            .book
            .record_transaction(
                &eur,
                day(2),
                "sell in euros",
                &[
                    (f.stock, Numeric::from_i64(-5), Numeric::from_i64(-600)),
                    (f.cash, Numeric::from_i64(650), Numeric::from_i64(600)),
                ],
            )
            .unwrap();
        let sell = f.book.trans_find_split_by_account(sell_trans, f.stock).unwrap().unwrap();
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        f.book.lot_add_split(lot, sell).unwrap();
        let transactions = f.book.transaction_count();
        let splits = f.book.split_count();

        f.book.split_compute_cap_gains(sell, None).unwrap();

        assert_eq!(f.book.split(sell).unwrap().gains_split(), None);
        assert_eq!(f.book.split(sell).unwrap().lot(), Some(lot));
        assert_eq!(f.book.transaction_count(), transactions);
        assert_eq!(f.book.split_count(), splits);
        assert_eq!(f.book.lot(lot).unwrap().count_splits(), 2);
    }
}
