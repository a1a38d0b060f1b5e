use chrono::{DateTime, TimeZone, Utc};
use lotledger_core::business::invoice::{EXTRA_CHARGE_MEMO, POSTED_READ_ONLY};
use lotledger_core::business::{AmountType, EntrySide, Owner, PaymentType};
use lotledger_core::{
    AccountId, AccountType, Book, Commodity, CustomerId, EngineError, EntryId, InvoiceId,
    Numeric, TaxTableId, TxnType, VendorId,
};

fn n(s: &str) -> Numeric {
    Numeric::parse(s).unwrap()
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
}

struct Shop {
    book: Book,
    usd: Commodity,
    receivable: AccountId,
    payable: AccountId,
    bank: AccountId,
    sales: AccountId,
    supplies: AccountId,
    sales_tax: AccountId,
    customer: CustomerId,
    vendor: VendorId,
}

impl Shop {
    fn new() -> Self {
        let mut book = Book::new();
        let usd = Commodity::currency("USD", 100);
        let root = book.root_account();
        let mut add = |t, name| book.add_account(root, t, name, &usd).unwrap();
        let receivable = add(AccountType::Receivable, "Accounts Receivable");
        let payable = add(AccountType::Payable, "Accounts Payable");
        let bank = add(AccountType::Bank, "Checking");
        let sales = add(AccountType::Income, "Sales");
        let supplies = add(AccountType::Expense, "Supplies");
        let sales_tax = add(AccountType::Liability, "Sales Tax");
        let customer = book.create_customer("Corner Cafe", &usd);
        let vendor = book.create_vendor("Paper Supply", &usd);
        Self {
            book,
            usd,
            receivable,
            payable,
            bank,
            sales,
            supplies,
            sales_tax,
            customer,
            vendor,
        }
    }

    fn balance(&self, acc: AccountId) -> Numeric {
        self.book.account(acc).unwrap().balance().clone()
    }

    fn line(&mut self, invoice: InvoiceId, side: EntrySide, acc: AccountId, qty: &str, price: &str) -> EntryId {
        let entry = self.book.create_entry(day(1), "line");
        self.book.entry_set_quantity(entry, n(qty)).unwrap();
        self.book.entry_set_price(entry, side, n(price)).unwrap();
        self.book.entry_set_account(entry, side, Some(acc)).unwrap();
        self.book.invoice_add_entry(invoice, entry).unwrap();
        entry
    }

    fn sales_invoice(&mut self, amount: &str, due: u32) -> InvoiceId {
        let invoice = self.book.create_invoice(Owner::Customer(self.customer), day(1)).unwrap();
        let sales = self.sales;
        self.line(invoice, EntrySide::Invoice, sales, "1", amount);
        let receivable = self.receivable;
        self.book
            .invoice_post_to_account(invoice, receivable, day(2), Some(day(due)), "", false)
            .unwrap();
        invoice
    }

    fn ten_percent_tax(&mut self) -> TaxTableId {
        let table = self.book.create_tax_table("State");
        let acc = self.sales_tax;
        self.book
            .tax_table_add_entry(table, acc, AmountType::Percent, n("10"))
            .unwrap();
        table
    }
}

#[test]
fn test_post_customer_invoice() {
    let mut shop = Shop::new();
    let table = shop.ten_percent_tax();
    let invoice = shop.book.create_invoice(Owner::Customer(shop.customer), day(1)).unwrap();
    let sales = shop.sales;
    let cups = shop.line(invoice, EntrySide::Invoice, sales, "2", "10");
    let lids = shop.line(invoice, EntrySide::Invoice, sales, "1", "5");
    for entry in [cups, lids] {
        shop.book.entry_set_tax_table(entry, EntrySide::Invoice, Some(table)).unwrap();
    }

    let totals = shop.book.invoice_totals(invoice).unwrap();
    assert_eq!(totals.subtotal, n("25"));
    assert_eq!(totals.tax, n("2.50"));
    assert_eq!(totals.total, n("27.50"));
    assert_eq!(shop.book.invoice_type(invoice).unwrap(), "Invoice");

    let receivable = shop.receivable;
    let txn = shop
        .book
        .invoice_post_to_account(invoice, receivable, day(2), Some(day(30)), "March order", false)
        .unwrap();

    assert!(shop.book.trans_is_balanced(txn).unwrap());
    assert_eq!(shop.balance(shop.receivable), n("27.50"));
    assert_eq!(shop.balance(shop.sales), n("-25"));
    assert_eq!(shop.balance(shop.sales_tax), n("-2.50"));

    let trans = shop.book.transaction(txn).unwrap();
    assert_eq!(trans.description(), "Corner Cafe");
    assert_eq!(trans.num(), "000001");
    assert_eq!(trans.txn_type(), TxnType::Invoice);
    assert_eq!(trans.read_only(), Some(POSTED_READ_ONLY));
    assert_eq!(trans.date_due(), Some(day(30)));

    let posted = shop.book.invoice(invoice).unwrap();
    assert!(posted.is_posted());
    assert_eq!(posted.posted_account(), Some(receivable));
    let lot = posted.posted_lot().unwrap();
    assert_eq!(shop.book.lot(lot).unwrap().title(), Some("Invoice 000001"));
    assert_eq!(shop.book.invoice_from_lot(lot), Some(invoice));
    assert_eq!(shop.book.invoice_from_txn(txn), Some(invoice));
    assert!(!shop.book.invoice_is_paid(invoice).unwrap());

    // The shared table was swapped for a frozen copy
    let frozen = shop.book.entry(cups).unwrap().terms(EntrySide::Invoice).tax_table.unwrap();
    assert_ne!(frozen, table);
    assert_eq!(shop.book.tax_table(frozen).unwrap().parent(), Some(table));
    assert_eq!(shop.book.tax_table(table).unwrap().refcount(), 0);

    assert!(matches!(
        shop.book.trans_destroy(txn),
        Err(EngineError::ReadOnly { .. })
    ));
}

#[test]
fn test_posted_invoice_is_locked() {
    let mut shop = Shop::new();
    let invoice = shop.sales_invoice("40", 20);
    let receivable = shop.receivable;

    assert!(matches!(
        shop.book.invoice_post_to_account(invoice, receivable, day(3), None, "", false),
        Err(EngineError::AlreadyPosted(_))
    ));
    let entry = shop.book.create_entry(day(3), "late");
    assert!(matches!(
        shop.book.invoice_add_entry(invoice, entry),
        Err(EngineError::AlreadyPosted(_))
    ));

    let draft = shop.book.create_invoice(Owner::Customer(shop.customer), day(3)).unwrap();
    assert!(matches!(
        shop.book.invoice_unpost(draft, false),
        Err(EngineError::NotPosted(_))
    ));
}

#[test]
fn test_unpost_restores_book() {
    let mut shop = Shop::new();
    let table = shop.ten_percent_tax();
    let invoice = shop.book.create_invoice(Owner::Customer(shop.customer), day(1)).unwrap();
    let sales = shop.sales;
    let entry = shop.line(invoice, EntrySide::Invoice, sales, "3", "10");
    shop.book.entry_set_tax_table(entry, EntrySide::Invoice, Some(table)).unwrap();
    let receivable = shop.receivable;
    let txn = shop
        .book
        .invoice_post_to_account(invoice, receivable, day(2), None, "", false)
        .unwrap();
    let lot = shop.book.invoice(invoice).unwrap().posted_lot().unwrap();

    shop.book.invoice_unpost(invoice, true).unwrap();

    assert!(shop.book.transaction(txn).is_err());
    assert!(shop.book.lot(lot).is_err());
    assert!(shop.balance(shop.receivable).is_zero());
    assert!(shop.balance(shop.sales).is_zero());
    let unposted = shop.book.invoice(invoice).unwrap();
    assert!(!unposted.is_posted());
    assert_eq!(unposted.posted_txn(), None);
    assert_eq!(
        shop.book.entry(entry).unwrap().terms(EntrySide::Invoice).tax_table,
        Some(table)
    );
    assert_eq!(shop.book.tax_table(table).unwrap().refcount(), 1);

    // It can be posted again
    shop.book
        .invoice_post_to_account(invoice, receivable, day(4), None, "", false)
        .unwrap();
    assert_eq!(shop.balance(shop.receivable), n("33"));
}

#[test]
fn test_accumulated_splits() {
    let mut shop = Shop::new();
    let invoice = shop.book.create_invoice(Owner::Customer(shop.customer), day(1)).unwrap();
    let sales = shop.sales;
    shop.line(invoice, EntrySide::Invoice, sales, "1", "7");
    shop.line(invoice, EntrySide::Invoice, sales, "2", "4");
    let receivable = shop.receivable;
    let txn = shop
        .book
        .invoice_post_to_account(invoice, receivable, day(2), None, "", true)
        .unwrap();

    assert_eq!(shop.book.transaction(txn).unwrap().splits().len(), 2);
    assert_eq!(shop.balance(shop.sales), n("-15"));
}

#[test]
fn test_vendor_bill_and_payment() {
    let mut shop = Shop::new();
    let bill = shop.book.create_invoice(Owner::Vendor(shop.vendor), day(1)).unwrap();
    let supplies = shop.supplies;
    shop.line(bill, EntrySide::Bill, supplies, "4", "12.50");
    assert_eq!(shop.book.invoice_type(bill).unwrap(), "Bill");

    let payable = shop.payable;
    shop.book
        .invoice_post_to_account(bill, payable, day(2), Some(day(20)), "", false)
        .unwrap();
    assert_eq!(shop.balance(shop.payable), n("-50"));
    assert_eq!(shop.balance(shop.supplies), n("50"));

    let bank = shop.bank;
    let txn = shop
        .book
        .apply_payment(Owner::Vendor(shop.vendor), Some(bill), payable, bank, n("50"), day(10), "cheque", "1001")
        .unwrap();

    assert_eq!(shop.book.transaction(txn).unwrap().txn_type(), TxnType::Payment);
    assert_eq!(shop.book.transaction(txn).unwrap().num(), "1001");
    assert!(shop.balance(shop.payable).is_zero());
    assert_eq!(shop.balance(shop.bank), n("-50"));
    assert!(shop.book.invoice_is_paid(bill).unwrap());
}

#[test]
fn test_payments_go_by_due_date() {
    let mut shop = Shop::new();
    let later = shop.sales_invoice("100", 30);
    let sooner = shop.sales_invoice("50", 15);
    let (receivable, bank) = (shop.receivable, shop.bank);
    let customer = Owner::Customer(shop.customer);

    shop.book
        .apply_payment(customer, None, receivable, bank, n("80"), day(16), "", "")
        .unwrap();
    assert!(shop.book.invoice_is_paid(sooner).unwrap());
    assert!(!shop.book.invoice_is_paid(later).unwrap());
    let later_lot = shop.book.invoice(later).unwrap().posted_lot().unwrap();
    assert_eq!(shop.book.lot_balance(later_lot).unwrap(), n("70"));

    // Overpaying leaves a pre-payment behind
    shop.book
        .apply_payment(customer, None, receivable, bank, n("100"), day(31), "", "")
        .unwrap();
    assert!(shop.book.invoice_is_paid(later).unwrap());
    assert_eq!(shop.balance(shop.receivable), n("-30"));
    let open = shop.book.account_find_open_lots(receivable, None, None).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(shop.book.owner_from_lot(open[0]), Some(customer));
    assert_eq!(shop.book.invoice_from_lot(open[0]), None);

    // The next invoice claims the pre-payment and carries the rest forward
    let small = shop.sales_invoice("20", 40);
    assert!(shop.book.invoice_is_paid(small).unwrap());
    assert_eq!(shop.book.invoice(small).unwrap().posted_lot(), Some(open[0]));
    assert_eq!(shop.balance(shop.receivable), n("-10"));
    let open = shop.book.account_find_open_lots(receivable, None, None).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(shop.book.lot_balance(open[0]).unwrap(), n("-10"));
    assert_eq!(shop.book.owner_from_lot(open[0]), Some(customer));
}

#[test]
fn test_named_invoice_is_paid_first() {
    let mut shop = Shop::new();
    let sooner = shop.sales_invoice("60", 10);
    let later = shop.sales_invoice("40", 25);
    let (receivable, bank) = (shop.receivable, shop.bank);

    shop.book
        .apply_payment(Owner::Customer(shop.customer), Some(later), receivable, bank, n("40"), day(5), "", "")
        .unwrap();
    assert!(shop.book.invoice_is_paid(later).unwrap());
    assert!(!shop.book.invoice_is_paid(sooner).unwrap());
}

#[test]
fn test_payment_must_be_positive() {
    let mut shop = Shop::new();
    let (receivable, bank) = (shop.receivable, shop.bank);
    let before = shop.book.transaction_count();
    assert!(matches!(
        shop.book
            .apply_payment(Owner::Customer(shop.customer), None, receivable, bank, n("0"), day(5), "", ""),
        Err(EngineError::InvalidArgument(_))
    ));
    assert_eq!(shop.book.transaction_count(), before);
}

#[test]
fn test_expense_voucher_card_entries() {
    let mut shop = Shop::new();
    let root = shop.book.root_account();
    let card = shop
        .book
        .add_account(root, AccountType::Credit, "Company Card", &shop.usd)
        .unwrap();
    let employee = shop.book.create_employee("kim", "Kim Lee", &shop.usd);
    shop.book.employee_set_ccard_account(employee, Some(card)).unwrap();

    let voucher = shop.book.create_invoice(Owner::Employee(employee), day(1)).unwrap();
    let supplies = shop.supplies;
    shop.line(voucher, EntrySide::Bill, supplies, "1", "40");
    let taxi = shop.line(voucher, EntrySide::Bill, supplies, "1", "60");
    shop.book.entry_set_payment_type(taxi, PaymentType::Card).unwrap();
    shop.book.invoice_set_to_charge_amount(voucher, n("5")).unwrap();
    assert_eq!(shop.book.invoice_type(voucher).unwrap(), "Expense");
    assert_eq!(
        shop.book.invoice_total_by_payment_type(voucher, PaymentType::Card).unwrap(),
        n("60")
    );

    let payable = shop.payable;
    let txn = shop
        .book
        .invoice_post_to_account(voucher, payable, day(2), None, "", false)
        .unwrap();

    assert!(shop.book.trans_is_balanced(txn).unwrap());
    assert_eq!(shop.balance(shop.supplies), n("100"));
    assert_eq!(shop.balance(card), n("-65"));
    assert_eq!(shop.balance(shop.payable), n("-35"));
    let extra = shop
        .book
        .transaction(txn)
        .unwrap()
        .splits()
        .iter()
        .filter(|s| shop.book.split(**s).unwrap().memo() == EXTRA_CHARGE_MEMO)
        .count();
    assert_eq!(extra, 1);
}

#[test]
fn test_job_invoice_bills_the_customer() {
    let mut shop = Shop::new();
    let job = shop.book.create_job(Owner::Customer(shop.customer), "Catering").unwrap();
    let invoice = shop.book.create_invoice(Owner::Job(job), day(1)).unwrap();
    let sales = shop.sales;
    shop.line(invoice, EntrySide::Invoice, sales, "1", "75");
    let receivable = shop.receivable;
    let txn = shop
        .book
        .invoice_post_to_account(invoice, receivable, day(2), None, "", false)
        .unwrap();

    assert_eq!(shop.book.invoice_type(invoice).unwrap(), "Invoice");
    assert_eq!(shop.book.transaction(txn).unwrap().description(), "Corner Cafe");
    assert_eq!(shop.balance(shop.receivable), n("75"));
}

#[test]
fn test_entries_move_between_invoices() {
    let mut shop = Shop::new();
    let first = shop.book.create_invoice(Owner::Customer(shop.customer), day(1)).unwrap();
    let second = shop.book.create_invoice(Owner::Customer(shop.customer), day(1)).unwrap();
    let sales = shop.sales;
    let entry = shop.line(first, EntrySide::Invoice, sales, "1", "9");

    shop.book.invoice_add_entry(second, entry).unwrap();
    assert!(shop.book.invoice(first).unwrap().entries().is_empty());
    assert_eq!(shop.book.invoice(second).unwrap().entries(), &[entry]);

    shop.book.entry_destroy(entry).unwrap();
    assert!(shop.book.invoice(second).unwrap().entries().is_empty());
}

#[test]
fn test_failed_posting_leaves_no_lot_behind() {
    let mut shop = Shop::new();
    let root = shop.book.root_account();
    let catering = shop
        .book
        .add_account(root, AccountType::Income, "Catering", &shop.usd)
        .unwrap();
    let invoice = shop.book.create_invoice(Owner::Customer(shop.customer), day(1)).unwrap();
    shop.line(invoice, EntrySide::Invoice, catering, "1", "40");
    shop.book.account_destroy(catering).unwrap();
    let (lots, transactions) = (shop.book.all_lots().count(), shop.book.transaction_count());

    let receivable = shop.receivable;
    assert!(shop
        .book
        .invoice_post_to_account(invoice, receivable, day(2), None, "", false)
        .is_err());

    assert_eq!(shop.book.all_lots().count(), lots);
    assert_eq!(shop.book.transaction_count(), transactions);
    assert!(!shop.book.invoice(invoice).unwrap().is_posted());
    assert_eq!(shop.book.invoice(invoice).unwrap().posted_lot(), None);
    assert_eq!(shop.balance(shop.receivable), n("0"));
}

#[test]
fn test_failed_posting_keeps_prepayment_lot() {
    let mut shop = Shop::new();
    let (receivable, bank) = (shop.receivable, shop.bank);
    let customer = Owner::Customer(shop.customer);
    shop.book
        .apply_payment(customer, None, receivable, bank, n("30"), day(1), "", "")
        .unwrap();
    let prepay = shop.book.account_find_open_lots(receivable, None, None).unwrap()[0];
    let title = shop.book.lot(prepay).unwrap().title().map(str::to_string);

    let root = shop.book.root_account();
    let catering = shop
        .book
        .add_account(root, AccountType::Income, "Catering", &shop.usd)
        .unwrap();
    let invoice = shop.book.create_invoice(customer, day(2)).unwrap();
    shop.line(invoice, EntrySide::Invoice, catering, "1", "20");
    shop.book.account_destroy(catering).unwrap();

    assert!(shop
        .book
        .invoice_post_to_account(invoice, receivable, day(3), None, "", false)
        .is_err());

    assert_eq!(shop.book.lot(prepay).unwrap().title().map(str::to_string), title);
    assert_eq!(shop.book.invoice_from_lot(prepay), None);
    assert_eq!(shop.book.owner_from_lot(prepay), Some(customer));
    assert_eq!(shop.book.lot_balance(prepay).unwrap(), n("-30"));
    assert_eq!(shop.book.lot(prepay).unwrap().count_splits(), 1);
}
