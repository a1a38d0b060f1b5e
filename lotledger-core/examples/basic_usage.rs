//! Basic usage example for lotledger-core: post an invoice and take payment

use chrono::{TimeZone, Utc};
use lotledger_core::business::{EntrySide, Owner};
use lotledger_core::{AccountType, Book, Commodity, EngineResult, Numeric};

fn main() -> EngineResult<()> {
    let mut book = Book::new();
    let usd = Commodity::currency("USD", 100);
    let root = book.root_account();
    let receivable = book.add_account(root, AccountType::Receivable, "Accounts Receivable", &usd)?;
    let sales = book.add_account(root, AccountType::Income, "Sales", &usd)?;
    let bank = book.add_account(root, AccountType::Bank, "Checking", &usd)?;

    let customer = book.create_customer("Corner Cafe", &usd);
    let opened = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single().unwrap_or_else(Utc::now);
    let invoice = book.create_invoice(Owner::Customer(customer), opened)?;
    let entry = book.create_entry(opened, "Espresso beans, 5kg");
    book.entry_set_quantity(entry, Numeric::from_i64(5))?;
    book.entry_set_price(entry, EntrySide::Invoice, Numeric::from_i64(18))?;
    book.entry_set_account(entry, EntrySide::Invoice, Some(sales))?;
    book.invoice_add_entry(invoice, entry)?;

    book.invoice_post_to_account(invoice, receivable, opened, None, "May order", false)?;
    println!("Receivable after posting: {}", book.account(receivable)?.balance());

    book.apply_payment(
        Owner::Customer(customer),
        Some(invoice),
        receivable,
        bank,
        Numeric::from_i64(90),
        Utc::now(),
        "Thanks!",
        "",
    )?;
    println!("Paid: {}", book.invoice_is_paid(invoice)?);
    println!("Bank balance: {}", book.account(bank)?.balance());
    Ok(())
}
