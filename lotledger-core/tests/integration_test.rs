//! Integration tests for lotledger-core

use chrono::{DateTime, TimeZone, Utc};
use lotledger_core::{
    AccountId, AccountType, Backend, Book, Commodity, JsonFileBackend, Numeric, PolicyKind,
};
use proptest::prelude::*;

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(i64::from(d))
}

struct Portfolio {
    book: Book,
    usd: Commodity,
    stock: AccountId,
    cash: AccountId,
}

impl Portfolio {
    fn new(policy: PolicyKind) -> Self {
        let mut book = Book::new();
        let usd = Commodity::currency("USD", 100);
        let acme = Commodity::new("NYSE", "ACME", "Acme Corp", 1);
        let root = book.root_account();
        let brokerage = book
            .add_account(root, AccountType::Asset, "Brokerage", &usd)
            .unwrap();
        let stock = book
            .add_account(brokerage, AccountType::Stock, "ACME", &acme)
            .unwrap();
        let cash = book
            .add_account(brokerage, AccountType::Bank, "Cash", &usd)
            .unwrap();
        book.account_set_policy(stock, policy).unwrap();
        Self { book, usd, stock, cash }
    }

    fn trade(&mut self, d: u32, shares: i64, cost: i64) {
        self.book
            .record_transaction(
                &self.usd,
                day(d),
                if shares > 0 { "buy" } else { "sell" },
                &[
                    (self.stock, Numeric::from_i64(shares), Numeric::from_i64(cost)),
                    (self.cash, Numeric::from_i64(-cost), Numeric::from_i64(-cost)),
                ],
            )
            .unwrap();
    }

    fn shares(&self) -> Numeric {
        self.book
            .account(self.stock)
            .unwrap()
            .splits()
            .iter()
            .map(|s| self.book.split(*s).unwrap().amount().clone())
            .sum()
    }

    fn all_balanced(&self) -> bool {
        self.book
            .transactions()
            .all(|t| self.book.trans_is_balanced(t.id()).unwrap())
    }
}

#[test]
fn test_scrub_realizes_gains_across_lots() {
    let mut p = Portfolio::new(PolicyKind::Fifo);
    p.trade(1, 10, 1000);
    p.trade(5, 10, 1200);
    p.trade(9, -15, -2100);

    p.book.account_scrub_lots(p.stock).unwrap();

    let lots = p.book.account(p.stock).unwrap().lots().to_vec();
    assert_eq!(lots.len(), 2);
    assert!(p.book.lot_is_closed(lots[0]).unwrap());
    assert_eq!(p.book.lot_balance(lots[1]).unwrap(), Numeric::from_i64(5));
    // 10 @ 100 sold @ 140 and 5 @ 120 sold @ 140
    let gains = p
        .book
        .lookup_account_by_name(p.book.root_account(), "Orphaned Gains-USD")
        .unwrap();
    assert_eq!(p.book.account(gains).unwrap().balance(), &Numeric::from_i64(-500));
    assert_eq!(p.shares(), Numeric::from_i64(5));
    assert!(p.all_balanced());
}

#[test]
fn test_saved_book_keeps_lots_and_gains() {
    let dir = tempfile::tempdir().unwrap();
    let backend = JsonFileBackend::new(dir.path().join("portfolio.json"));

    let mut p = Portfolio::new(PolicyKind::Lifo);
    p.trade(1, 10, 1000);
    p.trade(2, 10, 1500);
    p.trade(3, -10, -1600);
    p.book.account_scrub_lots(p.stock).unwrap();
    backend.save(&mut p.book).unwrap();

    let mut loaded = backend.load().unwrap();
    assert_eq!(loaded.transaction_count(), p.book.transaction_count());
    assert_eq!(loaded.all_lots().count(), p.book.all_lots().count());
    assert_eq!(
        loaded.account(p.stock).unwrap().balance(),
        p.book.account(p.stock).unwrap().balance()
    );
    assert_eq!(loaded.account(p.stock).unwrap().policy(), PolicyKind::Lifo);
    for lot in loaded.all_lots() {
        assert_eq!(
            loaded.lot_balance(lot.id()).unwrap(),
            p.book.lot_balance(lot.id()).unwrap()
        );
    }

    // Scrubbing the reloaded book finds nothing to do
    let counts = (loaded.transaction_count(), loaded.split_count());
    loaded.account_scrub_lots(p.stock).unwrap();
    assert_eq!(counts, (loaded.transaction_count(), loaded.split_count()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_scrub_conserves_shares(trades in prop::collection::vec((1i64..20, 50i64..150, any::<bool>()), 1..12)) {
        let mut p = Portfolio::new(PolicyKind::Fifo);
        for (i, (shares, price, buy)) in trades.iter().enumerate() {
            let shares = if *buy { *shares } else { -*shares };
            p.trade(i as u32 + 1, shares, shares * price);
        }
        let before = p.shares();

        p.book.account_scrub_lots(p.stock).unwrap();

        prop_assert_eq!(p.shares(), before);
        prop_assert!(p.all_balanced());
        let in_lots = p
            .book
            .account(p.stock)
            .unwrap()
            .splits()
            .iter()
            .all(|s| p.book.split(*s).unwrap().lot().is_some());
        prop_assert!(in_lots);
    }
}
