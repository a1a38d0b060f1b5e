//! Lot assignment policies
//!
//! A policy decides which open lot a new split should reduce and which
//! unassigned split should next fill a lot. FIFO works from the oldest lot
//! and split forward; LIFO from the newest backward.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use lotledger_math::{Commodity, Numeric};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::{EngineError, EngineResult};
use crate::guid::{AccountId, LotId, SplitId};

/// Amount, value and currency of the split that opened a lot
#[derive(Debug, Clone, PartialEq)]
pub struct LotOpening {
    /// Opening amount
    pub amount: Numeric,
    /// Opening value
    pub value: Numeric,
    /// Currency of the opening transaction
    pub currency: Commodity,
}

/// A lot assignment strategy
pub trait Policy: Sync {
    /// Short name
    fn name(&self) -> &'static str;

    /// The open lot `split` should be placed into, if any
    fn get_lot(&self, book: &Book, split: SplitId) -> EngineResult<Option<LotId>>;

    /// The next unassigned split of the lot's account that would reduce the lot
    fn get_split(&self, book: &Book, lot: LotId) -> EngineResult<Option<SplitId>>;

    /// The figures of the split that opened the lot
    fn get_lot_opening(&self, book: &Book, lot: LotId) -> EngineResult<Option<LotOpening>>;

    /// True when `split` is the split that opened the lot
    fn is_opening_split(&self, book: &Book, lot: LotId, split: SplitId) -> EngineResult<bool>;
}

/// First in, first out
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoPolicy;

/// Last in, first out
#[derive(Debug, Clone, Copy, Default)]
pub struct LifoPolicy;

static FIFO: FifoPolicy = FifoPolicy;
static LIFO: LifoPolicy = LifoPolicy;

/// The policy stored on an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// [`FifoPolicy`]
    #[default]
    Fifo,
    /// [`LifoPolicy`]
    Lifo,
}

impl PolicyKind {
    /// The strategy implementing this kind
    pub fn policy(&self) -> &'static dyn Policy {
        match self {
            PolicyKind::Fifo => &FIFO,
            PolicyKind::Lifo => &LIFO,
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.policy().name())
    }
}

impl FromStr for PolicyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(PolicyKind::Fifo),
            "lifo" => Ok(PolicyKind::Lifo),
            other => Err(EngineError::InvalidArgument(format!("unknown lot policy '{}'", other))),
        }
    }
}

fn opening_split(book: &Book, lot: LotId, latest: bool) -> EngineResult<Option<SplitId>> {
    if latest {
        book.lot_latest_split(lot)
    } else {
        book.lot_earliest_split(lot)
    }
}

fn lot_opening(book: &Book, lot: LotId, latest: bool) -> EngineResult<Option<LotOpening>> {
    let Some(split) = opening_split(book, lot, latest)? else {
        return Ok(None);
    };
    let s = book.split(split)?;
    Ok(Some(LotOpening {
        amount: s.amount.clone(),
        value: s.value.clone(),
        currency: book.split_transaction(split)?.currency.clone(),
    }))
}

/// Walk the lot account's splits in one direction for the first
/// unassigned split of the opposite sign to the lot balance
///
/// Only splits that sort after the lot's earliest split in the account
/// are candidates, so a same-day split ordered before the opener never
/// fills the lot.
fn direction_get_split(book: &Book, lot: LotId, reverse: bool) -> EngineResult<Option<SplitId>> {
    let Some(acc) = book.lot(lot)?.account else {
        return Ok(None);
    };
    let balance = book.lot_balance(lot)?;
    if book.lot_is_closed(lot)? {
        return Ok(None);
    }
    let want_positive = balance.is_negative();

    let Some(first) = book.lot(lot)?.splits.first().copied() else {
        return Ok(None);
    };
    let currency = book.split_transaction(first)?.currency.clone();
    let Some(earliest) = book.lot_earliest_split(lot)? else {
        return Ok(None);
    };

    let splits = book.account(acc)?.splits();
    let ordered: Box<dyn Iterator<Item = &SplitId>> = if reverse {
        Box::new(splits.iter().rev())
    } else {
        Box::new(splits.iter())
    };
    for sid in ordered {
        let split = book.split(*sid)?;
        if split.lot.is_some() {
            continue;
        }
        if book.split_order(*sid, earliest).is_lt() {
            if reverse {
                return Ok(None);
            }
            continue;
        }
        let trans = book.transaction(split.parent)?;
        if !currency.equiv(&trans.currency) {
            continue;
        }
        if split.amount.is_zero() {
            continue;
        }
        if want_positive == split.amount.is_positive() {
            return Ok(Some(*sid));
        }
    }
    Ok(None)
}

impl Policy for FifoPolicy {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn get_lot(&self, book: &Book, split: SplitId) -> EngineResult<Option<LotId>> {
        let s = book.split(split)?;
        let Some(acc) = s.account else {
            return Ok(None);
        };
        let currency = book.split_transaction(split)?.currency.clone();
        book.account_find_earliest_open_lot(acc, &s.amount, Some(&currency))
    }

    fn get_split(&self, book: &Book, lot: LotId) -> EngineResult<Option<SplitId>> {
        direction_get_split(book, lot, false)
    }

    fn get_lot_opening(&self, book: &Book, lot: LotId) -> EngineResult<Option<LotOpening>> {
        lot_opening(book, lot, false)
    }

    fn is_opening_split(&self, book: &Book, lot: LotId, split: SplitId) -> EngineResult<bool> {
        Ok(opening_split(book, lot, false)? == Some(split))
    }
}

impl Policy for LifoPolicy {
    fn name(&self) -> &'static str {
        "lifo"
    }

    fn get_lot(&self, book: &Book, split: SplitId) -> EngineResult<Option<LotId>> {
        let s = book.split(split)?;
        let Some(acc) = s.account else {
            return Ok(None);
        };
        let currency = book.split_transaction(split)?.currency.clone();
        book.account_find_latest_open_lot(acc, &s.amount, Some(&currency))
    }

    fn get_split(&self, book: &Book, lot: LotId) -> EngineResult<Option<SplitId>> {
        direction_get_split(book, lot, true)
    }

    fn get_lot_opening(&self, book: &Book, lot: LotId) -> EngineResult<Option<LotOpening>> {
        lot_opening(book, lot, true)
    }

    fn is_opening_split(&self, book: &Book, lot: LotId, split: SplitId) -> EngineResult<bool> {
        Ok(opening_split(book, lot, true)? == Some(split))
    }
}

impl Book {
    /// The policy of the account a lot belongs to (FIFO for detached lots)
    pub fn lot_policy(&self, lot: LotId) -> EngineResult<&'static dyn Policy> {
        Ok(match self.lot(lot)?.account {
            Some(acc) => self.account(acc)?.policy.policy(),
            None => PolicyKind::default().policy(),
        })
    }

    fn find_open_lot(
        &self,
        acc: AccountId,
        sign: &Numeric,
        currency: Option<&Commodity>,
        latest: bool,
    ) -> EngineResult<Option<LotId>> {
        // A reducing split wants a lot opened on the other side
        let want_negative_opening = sign.is_positive();
        let mut best: Option<(DateTime<Utc>, LotId)> = None;

        for lot in &self.account(acc)?.lots {
            if self.lot_is_closed(*lot)? {
                continue;
            }
            let Some(opening) = self.lot_earliest_split(*lot)? else {
                continue;
            };
            let s = self.split(opening)?;
            let matches_side = if want_negative_opening {
                s.amount.is_negative()
            } else {
                s.amount.is_positive()
            };
            if !matches_side {
                continue;
            }
            let opening_positive = s.amount.is_positive();
            let balance = self.lot_balance(*lot)?;
            let balance_positive = if balance.is_zero() {
                opening_positive
            } else {
                balance.is_positive()
            };
            if opening_positive != balance_positive {
                continue;
            }
            let trans = self.transaction(s.parent)?;
            if currency.is_some_and(|c| !c.equiv(&trans.currency)) {
                continue;
            }
            let better = match best {
                None => true,
                Some((date, _)) if latest => trans.date_posted > date,
                Some((date, _)) => trans.date_posted < date,
            };
            if better {
                best = Some((trans.date_posted, *lot));
            }
        }
        Ok(best.map(|(_, lot)| lot))
    }

    /// Oldest open lot that a split of sign `sign` would reduce
    pub fn account_find_earliest_open_lot(
        &self,
        acc: AccountId,
        sign: &Numeric,
        currency: Option<&Commodity>,
    ) -> EngineResult<Option<LotId>> {
        self.find_open_lot(acc, sign, currency, false)
    }

    /// Newest open lot that a split of sign `sign` would reduce
    pub fn account_find_latest_open_lot(
        &self,
        acc: AccountId,
        sign: &Numeric,
        currency: Option<&Commodity>,
    ) -> EngineResult<Option<LotId>> {
        self.find_open_lot(acc, sign, currency, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use chrono::TimeZone;

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

    fn trade(f: &mut Fixture, day: u32, shares: i64, cost: i64) -> SplitId {
        let date = Utc.with_ymd_and_hms(2024, 2, day, 0, 0, 0).unwrap();
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
        f.book.trans_find_split_by_account(trans, f.stock).unwrap().unwrap()
    }

    fn lot_with(f: &mut Fixture, split: SplitId) -> LotId {
        let lot = f.book.create_lot();
        f.book.lot_add_split(lot, split).unwrap();
        lot
    }

    #[test]
    fn test_policy_names_parse() {
        assert_eq!("FIFO".parse::<PolicyKind>().unwrap(), PolicyKind::Fifo);
        assert_eq!("lifo".parse::<PolicyKind>().unwrap(), PolicyKind::Lifo);
        assert!("hifo".parse::<PolicyKind>().is_err());
        assert_eq!(PolicyKind::default().to_string(), "fifo");
    }

    #[test]
    fn test_fifo_and_lifo_pick_lots() {
        let mut f = fixture();
        let early = trade(&mut f, 1, 10, 100);
        let late = trade(&mut f, 5, 10, 150);
        let sell = trade(&mut f, 9, -5, -90);
        let early_lot = lot_with(&mut f, early);
        let late_lot = lot_with(&mut f, late);

        assert_eq!(FifoPolicy.get_lot(&f.book, sell).unwrap(), Some(early_lot));
        assert_eq!(LifoPolicy.get_lot(&f.book, sell).unwrap(), Some(late_lot));
        assert_eq!(FifoPolicy.get_lot(&f.book, late).unwrap(), None);
    }

    #[test]
    fn test_get_split_directions() {
        let mut f = fixture();
        let buy = trade(&mut f, 1, 10, 100);
        let _before = trade(&mut f, 2, 3, 30);
        let sell_a = trade(&mut f, 3, -4, -60);
        let sell_b = trade(&mut f, 4, -4, -70);
        let lot = lot_with(&mut f, buy);

        assert_eq!(FifoPolicy.get_split(&f.book, lot).unwrap(), Some(sell_a));
        assert_eq!(LifoPolicy.get_split(&f.book, lot).unwrap(), Some(sell_b));
        assert!(FifoPolicy.is_opening_split(&f.book, lot, buy).unwrap());

        let opening = FifoPolicy.get_lot_opening(&f.book, lot).unwrap().unwrap();
        assert_eq!(opening.amount, Numeric::from_i64(10));
        assert_eq!(opening.value, Numeric::from_i64(100));
        assert_eq!(opening.currency, f.usd);
    }

    #[test]
    fn test_get_split_skips_earlier_splits() {
        let mut f = fixture();
        let _old_sell = trade(&mut f, 1, -2, -20);
        let buy = trade(&mut f, 2, 10, 100);
        let lot = lot_with(&mut f, buy);
        assert_eq!(FifoPolicy.get_split(&f.book, lot).unwrap(), None);
        assert_eq!(LifoPolicy.get_split(&f.book, lot).unwrap(), None);
    }

    fn renumber(f: &mut Fixture, split: SplitId, num: &str) {
        let trans = f.book.split(split).unwrap().transaction();
        let date = f.book.transaction(trans).unwrap().date_posted();
        f.book.trans_begin_edit(trans).unwrap();
        f.book.trans_set_num(trans, num).unwrap();
        f.book.trans_set_date_posted(trans, date).unwrap();
        f.book.trans_commit_edit(trans).unwrap();
    }

    #[test]
    fn test_same_day_split_before_opener_is_skipped() {
        let mut f = fixture();
        let same_day_sell = trade(&mut f, 3, -2, -20);
        let buy = trade(&mut f, 3, 10, 100);
        let later_sell = trade(&mut f, 5, -4, -60);
        renumber(&mut f, same_day_sell, "1");
        renumber(&mut f, buy, "2");
        assert_eq!(f.book.account(f.stock).unwrap().splits()[0], same_day_sell);
        let lot = lot_with(&mut f, buy);

        assert_eq!(FifoPolicy.get_split(&f.book, lot).unwrap(), Some(later_sell));
        assert_eq!(LifoPolicy.get_split(&f.book, lot).unwrap(), Some(later_sell));
    }

    #[test]
    fn test_closed_lot_offers_nothing() {
        let mut f = fixture();
        let buy = trade(&mut f, 1, 10, 100);
        let sell = trade(&mut f, 2, -10, -120);
        let lot = lot_with(&mut f, buy);
        f.book.lot_add_split(lot, sell).unwrap();
        let extra = trade(&mut f, 3, -1, -12);
        assert_eq!(FifoPolicy.get_split(&f.book, lot).unwrap(), None);
        assert_eq!(FifoPolicy.get_lot(&f.book, extra).unwrap(), None);
    }
}
