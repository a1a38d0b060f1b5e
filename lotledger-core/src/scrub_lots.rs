//! Lot repair: assignment, refilling and sub-split merging
//!
//! These passes bring a trading account back to a state where every split
//! sits in a lot chosen by the account policy, no lot holds more than its
//! opening split allows, fragments of one split that ended up in the same
//! lot are merged, and every closed lot nets to zero value once its
//! realized gains are recorded.
//!
//! All passes are idempotent: scrubbing an already scrubbed account moves
//! nothing.

use log::{debug, error, trace, warn};
use lotledger_math::Numeric;

use crate::book::Book;
use crate::cap_gains::LotAssignment;
use crate::error::EngineResult;
use crate::guid::{AccountId, EntityId, LotId, SplitId, TransId};
use crate::kvp::KvpValue;
use crate::policy::Policy;
use crate::split::{GainsStatus, Reconcile, LOT_SPLIT};

const PEER_GUID: &str = "peer_guid";

impl Book {
    /// Place every lot-less split of an account into lots
    pub fn account_assign_lots(&mut self, acc: AccountId) -> EngineResult<()> {
        self.account_begin_edit(acc)?;
        let result = self.assign_lots_inner(acc);
        self.account_commit_edit(acc)?;
        result
    }

    fn assign_lots_inner(&mut self, acc: AccountId) -> EngineResult<()> {
        'restart: loop {
            let splits = self.account(acc)?.splits.clone();
            for sid in splits {
                let Some(split) = self.splits.get(sid) else {
                    continue;
                };
                if split.lot.is_some() {
                    continue;
                }
                if split.amount.is_zero() && self.transaction(split.parent)?.is_void() {
                    continue;
                }
                if self.split_assign(sid)? {
                    continue 'restart;
                }
            }
            return Ok(());
        }
    }

    /// Pull unassigned splits into an open lot until it closes
    pub fn lot_fill(&mut self, lot: LotId) -> EngineResult<()> {
        if self.lot_is_closed(lot)? {
            return Ok(());
        }
        let Some(acc) = self.lot(lot)?.account else {
            return Ok(());
        };
        let policy = self.account(acc)?.policy.policy();
        let Some(split) = policy.get_split(self, lot)? else {
            return Ok(());
        };
        {
            let s = self.split(split)?;
            if s.amount.is_zero() && self.transaction(s.parent)?.is_void() {
                return Ok(());
            }
        }

        self.account_begin_edit(acc)?;
        let result = self.fill_from(lot, split, policy);
        self.account_commit_edit(acc)?;
        result
    }

    fn fill_from(&mut self, lot: LotId, mut split: SplitId, policy: &dyn Policy) -> EngineResult<()> {
        loop {
            if self.split_assign_to_lot(split, lot)? == LotAssignment::Rejected {
                error!("lot {} refused split {} while filling", lot, split);
                return Ok(());
            }
            if self.lot_is_closed(lot)? {
                return Ok(());
            }
            match policy.get_split(self, lot)? {
                Some(next) => split = next,
                None => return Ok(()),
            }
        }
    }

    /// Recompute the gains of a lot and check a closed lot nets to zero value
    ///
    /// Returns false when the lot is closed but its values do not cancel.
    /// A lot whose splits span more than one transaction currency is never
    /// flagged; its values cannot be netted, so it always reports true.
    pub fn lot_scrub_double_balance(&mut self, lot: LotId) -> EngineResult<bool> {
        for sid in self.lot(lot)?.splits.clone() {
            if self.splits.contains(sid) {
                self.split_compute_cap_gains(sid, None)?;
            }
        }
        if !self.lot_is_closed(lot)? {
            return Ok(true);
        }

        let mut currency = None;
        let mut value = Numeric::zero();
        for sid in &self.lot(lot)?.splits {
            let s = self.split(*sid)?;
            let trans_currency = &self.transaction(s.parent)?.currency;
            match currency {
                None => currency = Some(trans_currency.clone()),
                Some(ref c) if !c.equiv(trans_currency) => {
                    warn!("lot {} mixes {} and {}; not checking its value", lot, c, trans_currency);
                    return Ok(true);
                }
                Some(_) => {}
            }
            value += &s.value;
        }
        if value.is_zero() {
            return Ok(true);
        }

        error!("closed lot {} does not balance: value left over {}", lot, value);
        for sid in &self.lot(lot)?.splits {
            let s = self.split(*sid)?;
            error!(
                "  split {} amount {} value {} gains {:?} memo {:?}",
                sid, s.amount, s.value, s.gains, s.memo
            );
        }
        Ok(false)
    }

    /// Reprice the other fragments of a broken split to this fragment's price
    ///
    /// Fragments whose value moves by less than `1 / max_mult` or whose
    /// amount is below `max_amt_scu` units of the account SCU are left alone.
    pub fn scrub_sub_split_price(&mut self, split: SplitId, max_mult: i64, max_amt_scu: i64) -> EngineResult<()> {
        let s = self.split(split)?;
        if !s.is_lot_split() || s.amount.is_zero() {
            return Ok(());
        }
        let (src_amt, src_val, acc, trans) = (s.amount.clone(), s.value.clone(), s.account, s.parent);
        let fraction = self.transaction(trans)?.currency.fraction();

        for other in self.transaction(trans)?.splits.clone() {
            if other == split {
                continue;
            }
            let Some(o) = self.splits.get(other) else {
                continue;
            };
            if o.account != acc || !o.is_lot_split() {
                continue;
            }
            let dst_amt = o.amount.clone();
            let target = (dst_amt.checked_div(&src_amt)? * &src_val).rounded_to(fraction);
            let delta = (&target - &o.value).abs();
            if &delta * &Numeric::from_i64(max_mult) < Numeric::from_i64(1) {
                continue;
            }
            let scu = match acc {
                Some(a) => self.account(a)?.commodity_scu(),
                None => fraction,
            };
            if &dst_amt.abs() * &Numeric::from_i64(scu) < Numeric::from_i64(max_amt_scu) {
                continue;
            }
            debug!("repricing fragment {} to value {}", other, target);
            self.trans_begin_edit(trans)?;
            let result = self.split_set_value(other, target);
            self.trans_commit_edit(trans)?;
            result?;
        }
        Ok(())
    }

    fn unlink_fragments(&mut self, keep: SplitId, gone: SplitId) -> EngineResult<()> {
        let keep_guid = keep.guid();
        let gone_guid = gone.guid();

        let slots = self.split_mut(keep)?.inst.slots_mut();
        if let Some(index) = slots.bag_find_by_guid(LOT_SPLIT, PEER_GUID, gone_guid) {
            slots.bag_remove_frame(LOT_SPLIT, index);
        }
        let gone_slots = self.split_mut(gone)?.inst.slots_mut();
        if let Some(index) = gone_slots.bag_find_by_guid(LOT_SPLIT, PEER_GUID, keep_guid) {
            gone_slots.bag_remove_frame(LOT_SPLIT, index);
        }
        let inherited = self.split(gone)?.inst.slots().clone();
        self.split_mut(keep)?.inst.slots_mut().bag_merge(LOT_SPLIT, &inherited);

        // Fragments that named the merged split now name the survivor
        let trans = self.split(keep)?.parent;
        for sid in self.transaction(trans)?.splits.clone() {
            if sid == keep || sid == gone {
                continue;
            }
            let Some(s) = self.splits.get_mut(sid) else {
                continue;
            };
            let slots = s.inst.slots_mut();
            if let Some(index) = slots.bag_find_by_guid(LOT_SPLIT, PEER_GUID, gone_guid) {
                if let Some(mut frame) = slots.bag_remove_frame(LOT_SPLIT, index) {
                    frame.set_path(PEER_GUID, KvpValue::Guid(keep_guid));
                    slots.bag_add(LOT_SPLIT, frame);
                }
            }
        }
        Ok(())
    }

    fn merge_fragments(&mut self, keep: SplitId, gone: SplitId) -> EngineResult<()> {
        let acc = self.split(gone)?.account;
        let trans = self.split(keep)?.parent;
        if let Some(acc) = acc {
            self.account_begin_edit(acc)?;
        }
        self.trans_begin_edit(trans)?;
        let result = self.merge_fragments_inner(keep, gone);
        self.trans_commit_edit(trans)?;
        if let Some(acc) = acc {
            self.account_commit_edit(acc)?;
        }
        result
    }

    fn merge_fragments_inner(&mut self, keep: SplitId, gone: SplitId) -> EngineResult<()> {
        trace!("merging fragment {} into {}", gone, keep);
        self.unlink_fragments(keep, gone)?;

        let (amount, value, gains_split) = {
            let k = self.split(keep)?;
            let g = self.split(gone)?;
            (&k.amount + &g.amount, &k.value + &g.value, g.gains_split)
        };
        self.split_set_amount(keep, amount)?;
        self.split_set_value(keep, value)?;
        self.split_set_reconcile(keep, Reconcile::New)?;

        if let Some(gains) = gains_split {
            let gains_trans = self
                .splits
                .get(gains)
                .filter(|g| g.gains.contains(GainsStatus::GAINS))
                .map(|g| g.parent);
            if let Some(gains_trans) = gains_trans {
                self.trans_destroy(gains_trans)?;
            }
        }
        self.split_destroy(gone)
    }

    /// Merge the fragments of a broken split that share its transaction and lot
    ///
    /// Returns true when anything was merged.
    pub fn scrub_merge_sub_splits(&mut self, split: SplitId) -> EngineResult<bool> {
        if !self.split(split)?.is_lot_split() {
            return Ok(false);
        }
        let (trans, lot) = {
            let s = self.split(split)?;
            (s.parent, s.lot)
        };

        let mut merged = false;
        'restart: loop {
            for sid in self.transaction(trans)?.splits.clone() {
                if sid == split {
                    continue;
                }
                let Some(s) = self.splits.get(sid) else {
                    continue;
                };
                if s.lot != lot || s.inst.is_destroying() {
                    continue;
                }
                let is_peer = self
                    .split(split)?
                    .inst
                    .slots()
                    .bag_find_by_guid(LOT_SPLIT, PEER_GUID, sid.guid())
                    .is_some();
                if !is_peer {
                    continue;
                }
                self.merge_fragments(split, sid)?;
                merged = true;
                continue 'restart;
            }
            break;
        }

        if merged && self.split(split)?.amount.is_zero() {
            let t = self.transaction(trans)?;
            warn!(
                "merging fragments left split {} with zero amount (transaction {:?} posted {})",
                split, t.description, t.date_posted
            );
        }
        Ok(merged)
    }

    /// Merge sub-split fragments within one transaction
    pub fn scrub_merge_trans_sub_splits(&mut self, trans: TransId) -> EngineResult<bool> {
        let mut merged = false;
        'restart: loop {
            for sid in self.transaction(trans)?.splits.clone() {
                if self.splits.contains(sid) && self.scrub_merge_sub_splits(sid)? {
                    merged = true;
                    continue 'restart;
                }
            }
            return Ok(merged);
        }
    }

    /// Merge sub-split fragments within one lot
    pub fn scrub_merge_lot_sub_splits(&mut self, lot: LotId) -> EngineResult<bool> {
        let mut merged = false;
        'restart: loop {
            for sid in self.lot(lot)?.splits.clone() {
                if self.splits.contains(sid) && self.scrub_merge_sub_splits(sid)? {
                    merged = true;
                    continue 'restart;
                }
            }
            return Ok(merged);
        }
    }

    fn lot_gains_possible(&self, lot: LotId) -> EngineResult<bool> {
        let l = self.lot(lot)?;
        let (Some(acc), Some(first)) = (l.account, l.splits.first()) else {
            return Ok(false);
        };
        let currency = &self.split_transaction(*first)?.currency;
        Ok(self.account(acc)?.commodity.as_ref() != Some(currency))
    }

    /// Repair one lot
    ///
    /// A lot whose balance has crossed to the other side of its opening
    /// split loses every other split and is refilled from the account.
    /// Gains are then recomputed where the lot's commodity is not its
    /// currency. Returns true when fragments were merged.
    pub fn scrub_lot(&mut self, lot: LotId) -> EngineResult<bool> {
        let Some(acc) = self.lot(lot)?.account else {
            return Ok(false);
        };
        trace!("scrubbing lot {} ({:?})", lot, self.lot(lot)?.title());
        self.account_begin_edit(acc)?;
        let result = self.scrub_lot_inner(lot);
        self.account_commit_edit(acc)?;
        result
    }

    fn scrub_lot_inner(&mut self, lot: LotId) -> EngineResult<bool> {
        let policy = self.lot_policy(lot)?;
        self.scrub_merge_lot_sub_splits(lot)?;

        let mut merged = false;
        let balance = self.lot_balance(lot)?;
        if !balance.is_zero() {
            let opening_positive = policy
                .get_lot_opening(self, lot)?
                .is_some_and(|o| o.amount.is_positive());
            if opening_positive != balance.is_positive() {
                debug!("lot {} is overfull; evicting its reducing splits", lot);
                'rethin: loop {
                    for sid in self.lot(lot)?.splits.clone() {
                        if policy.is_opening_split(self, lot, sid)? {
                            continue;
                        }
                        self.lot_remove_split(lot, sid)?;
                        continue 'rethin;
                    }
                    break;
                }
            }
            if self.lots.contains(lot) {
                self.lot_fill(lot)?;
                merged = self.scrub_merge_lot_sub_splits(lot)?;
            }
        }

        if self.lots.contains(lot) && self.lot_gains_possible(lot)? {
            self.lot_compute_cap_gains(lot, None)?;
            self.lot_scrub_double_balance(lot)?;
        }
        Ok(merged)
    }

    /// Assign lots and scrub every lot of a trading account
    pub fn account_scrub_lots(&mut self, acc: AccountId) -> EngineResult<()> {
        if !self.account_has_trades(acc)? {
            return Ok(());
        }
        debug!("scrubbing lots of {}", self.account(acc)?.name);
        self.account_begin_edit(acc)?;
        let result = self.scrub_lots_inner(acc);
        self.account_commit_edit(acc)?;
        result
    }

    fn scrub_lots_inner(&mut self, acc: AccountId) -> EngineResult<()> {
        self.account_assign_lots(acc)?;
        for lot in self.account(acc)?.lots.clone() {
            if self.lots.get(lot).is_some_and(|l| l.account == Some(acc)) {
                self.scrub_lot(lot)?;
            }
        }
        Ok(())
    }

    /// Scrub lots of every trading account below and including `acc`
    pub fn account_tree_scrub_lots(&mut self, acc: AccountId) -> EngineResult<()> {
        for descendant in self.account_descendants(acc)? {
            if self.account_has_trades(descendant)? {
                self.account_scrub_lots(descendant)?;
            }
        }
        self.account_scrub_lots(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::policy::PolicyKind;
    use chrono::{DateTime, TimeZone, Utc};
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
        Utc.with_ymd_and_hms(2023, 9, d, 0, 0, 0).unwrap()
    }

    fn trade(f: &mut Fixture, d: u32, shares: i64, cost: i64) -> SplitId {
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
        f.book.trans_find_split_by_account(trans, f.stock).unwrap().unwrap()
    }

    fn lot_balances(f: &Fixture) -> Vec<Numeric> {
        f.book
            .account(f.stock)
            .unwrap()
            .lots()
            .iter()
            .map(|l| f.book.lot_balance(*l).unwrap())
            .collect()
    }

    #[test]
    fn test_fifo_assignment() {
        let mut f = fixture();
        trade(&mut f, 1, 10, 1000);
        trade(&mut f, 2, 5, 600);
        trade(&mut f, 3, -12, -1800);

        f.book.account_assign_lots(f.stock).unwrap();
        assert_eq!(lot_balances(&f), vec![Numeric::zero(), Numeric::from_i64(3)]);
        assert!(f.book.account(f.stock).unwrap().splits().iter().all(|s| f.book.split(*s).unwrap().lot().is_some()));
    }

    #[test]
    fn test_lifo_assignment() {
        let mut f = fixture();
        f.book.account_set_policy(f.stock, PolicyKind::Lifo).unwrap();
        trade(&mut f, 1, 10, 1000);
        trade(&mut f, 2, 5, 600);
        trade(&mut f, 3, -12, -1800);

        f.book.account_assign_lots(f.stock).unwrap();
        assert_eq!(lot_balances(&f), vec![Numeric::from_i64(3), Numeric::zero()]);
    }

    #[test]
    fn test_scrub_lots_records_gains_once() {
        let mut f = fixture();
        trade(&mut f, 1, 10, 1000);
        let first_sale = trade(&mut f, 2, -4, -600);
        let second_sale = trade(&mut f, 3, -6, -540);

        f.book.account_scrub_lots(f.stock).unwrap();
        let lot = f.book.split(first_sale).unwrap().lot().unwrap();
        assert!(f.book.lot_is_closed(lot).unwrap());
        assert!(f.book.lot_value(lot).unwrap().is_zero());
        assert_eq!(f.book.split_cap_gains(first_sale).unwrap(), Numeric::from_i64(200));
        assert_eq!(f.book.split_cap_gains(second_sale).unwrap(), Numeric::from_i64(-60));

        let counts = (f.book.transaction_count(), f.book.split_count(), f.book.all_lots().count());
        f.book.account_scrub_lots(f.stock).unwrap();
        assert_eq!(counts, (f.book.transaction_count(), f.book.split_count(), f.book.all_lots().count()));
        assert!(f.book.lot_scrub_double_balance(lot).unwrap());
    }

    #[test]
    fn test_overfull_lot_is_rethinned() {
        let mut f = fixture();
        let buy = trade(&mut f, 1, 10, 1000);
        let sale = trade(&mut f, 2, -15, -1800);
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        f.book.lot_add_split(lot, sale).unwrap();
        assert_eq!(f.book.lot_balance(lot).unwrap(), Numeric::from_i64(-5));

        f.book.scrub_lot(lot).unwrap();
        assert!(f.book.lot_is_closed(lot).unwrap());
        assert_eq!(f.book.split(sale).unwrap().amount(), &Numeric::from_i64(-10));

        f.book.account_scrub_lots(f.stock).unwrap();
        let open: Vec<Numeric> = lot_balances(&f).into_iter().filter(|b| !b.is_zero()).collect();
        assert_eq!(open, vec![Numeric::from_i64(-5)]);
    }

    #[test]
    fn test_fragments_in_one_lot_are_merged() {
        let mut f = fixture();
        let buy = trade(&mut f, 1, 10, 1000);
        let sale = trade(&mut f, 2, -15, -1800);
        let trans = f.book.split(sale).unwrap().transaction();
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        let LotAssignment::Remainder(rest) = f.book.split_assign_to_lot(sale, lot).unwrap() else {
            panic!("sale should have been broken");
        };
        f.book.lot_add_split(lot, rest).unwrap();

        assert!(f.book.scrub_merge_sub_splits(sale).unwrap());
        assert!(f.book.split(rest).is_err());
        let merged = f.book.split(sale).unwrap();
        assert_eq!(merged.amount(), &Numeric::from_i64(-15));
        assert_eq!(merged.value(), &Numeric::from_i64(-1800));
        assert!(!merged.is_lot_split());
        assert_eq!(f.book.transaction(trans).unwrap().splits().len(), 2);
        assert!(!f.book.scrub_merge_trans_sub_splits(trans).unwrap());
    }

    #[test]
    fn test_sub_split_price_sync() {
        let mut f = fixture();
        let buy = trade(&mut f, 1, 10, 1000);
        let sale = trade(&mut f, 2, -15, -1800);
        let trans = f.book.split(sale).unwrap().transaction();
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        let LotAssignment::Remainder(rest) = f.book.split_assign_to_lot(sale, lot).unwrap() else {
            panic!("sale should have been broken");
        };

        f.book.split_mut(rest).unwrap().value = Numeric::new(-60050, 100).unwrap();
        f.book.scrub_sub_split_price(sale, 1, 0).unwrap();
        assert_eq!(f.book.split(rest).unwrap().value(), &Numeric::new(-60050, 100).unwrap());

        f.book.split_mut(rest).unwrap().value = Numeric::from_i64(-700);
        f.book.scrub_sub_split_price(sale, 1, 0).unwrap();
        assert_eq!(f.book.split(rest).unwrap().value(), &Numeric::from_i64(-600));
        assert!(f.book.trans_is_balanced(trans).unwrap());
    }

    #[test]
    fn test_double_balance_detects_damage() {
        let mut f = fixture();
        let buy = trade(&mut f, 1, 10, 1000);
        let sale = trade(&mut f, 2, -10, -1000);
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        f.book.lot_add_split(lot, sale).unwrap();
        assert!(f.book.lot_scrub_double_balance(lot).unwrap());

        let other = f.book.create_lot();
        let buy = trade(&mut f, 3, 10, 1000);
        let sale = trade(&mut f, 4, -10, -1200);
        f.book.lot_add_split(other, buy).unwrap();
        f.book.lot_add_split(other, sale).unwrap();
        f.book
            .split_mut(sale)
            .unwrap()
            .inst
            .slots_mut()
            .set_path(crate::split::SPLIT_TYPE, KvpValue::String("stock-split".into()));
        assert!(!f.book.lot_scrub_double_balance(other).unwrap());
        assert_eq!(f.book.lot_value(other).unwrap(), Numeric::from_i64(-200));
    }

    #[test]
    fn test_mixed_currency_lot_is_not_flagged() {
        let mut f = fixture();
        let eur = Commodity::currency("EUR", 100);
        let buy = trade(&mut f, 1, 10, 1000);
        let sell_trans = f
            .book
            .record_transaction(
                &eur,
                day(2),
                "sell in euros",
                &[
                    (f.stock, Numeric::from_i64(-10), Numeric::from_i64(-1300)),
                    (f.cash, Numeric::from_i64(1400), Numeric::from_i64(1300)),
                ],
            )
            .unwrap();
        let sell = f.book.trans_find_split_by_account(sell_trans, f.stock).unwrap().unwrap();
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, buy).unwrap();
        f.book.lot_add_split(lot, sell).unwrap();

        assert!(f.book.lot_is_closed(lot).unwrap());
        assert!(f.book.lot_scrub_double_balance(lot).unwrap());
        assert_eq!(f.book.split(sell).unwrap().gains_split(), None);
    }
}
