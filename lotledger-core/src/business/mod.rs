//! The business layer: customers, vendors, employees, jobs, tax tables,
//! invoice line items, invoices and payments
//!
//! Business objects live in the same [`Book`](crate::book::Book) arena as the
//! ledger. Posting an invoice turns its entries into an ordinary balanced
//! transaction whose receivable (or payable) split sits in a lot tagged with
//! the invoice. Payments are then matched against those lots.

pub mod customer;
pub mod employee;
pub mod entry;
pub mod invoice;
pub mod job;
pub mod owner;
pub mod payment;
pub mod tax_table;
pub mod vendor;

pub use customer::Customer;
pub use employee::Employee;
pub use entry::{compute_value, DiscountHow, Entry, EntrySide, EntryTerms, EntryValues, PaymentType};
pub use invoice::{Invoice, InvoiceTotals};
pub use job::Job;
pub use owner::{Owner, OwnerType};
pub use tax_table::{
    account_value_add, account_value_add_list, account_value_total, AccountValue, AmountType,
    TaxTable, TaxTableEntry,
};
pub use vendor::Vendor;
