//! Invoice line items and their value computation
//!
//! An entry carries two sets of pricing terms: what we charge a customer
//! (the invoice side) and what a vendor or employee charges us (the bill
//! side). Values are computed on demand from the quantity, price, discount
//! and tax table, and rounded to the currency of the owning invoice.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use lotledger_math::{Numeric, NumericResult};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::business::tax_table::{account_value_add, account_value_total, AccountValue, AmountType, TaxTableEntry};
use crate::error::{EngineError, EngineResult};
use crate::event::EventKind;
use crate::guid::{AccountId, EntityId, EntryId, Guid, IdType, InvoiceId, TaxTableId};
use crate::instance::{impl_entity, Instance};

/// Fraction used when an entry belongs to no invoice yet
const UNATTACHED_FRACTION: i64 = 100_000;

/// When a discount is applied relative to tax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DiscountHow {
    /// Discount the pre-tax amount and tax what is left
    #[default]
    PreTax,
    /// Discount and tax are both computed from the pre-tax amount
    SameTime,
    /// Tax the pre-tax amount and discount the taxed total
    PostTax,
}

impl DiscountHow {
    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountHow::PreTax => "PRETAX",
            DiscountHow::SameTime => "SAMETIME",
            DiscountHow::PostTax => "POSTTAX",
        }
    }
}

impl fmt::Display for DiscountHow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscountHow {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRETAX" => Ok(DiscountHow::PreTax),
            "SAMETIME" => Ok(DiscountHow::SameTime),
            "POSTTAX" => Ok(DiscountHow::PostTax),
            other => Err(EngineError::InvalidArgument(format!("unknown discount-how {:?}", other))),
        }
    }
}

/// How an employee paid for an expense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaymentType {
    /// Out of pocket; reimbursed through the voucher
    #[default]
    Cash,
    /// On the company credit card
    Card,
}

impl PaymentType {
    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Cash => "CASH",
            PaymentType::Card => "CARD",
        }
    }
}

impl FromStr for PaymentType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CASH" => Ok(PaymentType::Cash),
            "CARD" => Ok(PaymentType::Card),
            other => Err(EngineError::InvalidArgument(format!("unknown payment type {:?}", other))),
        }
    }
}

/// Which pricing terms of an entry to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntrySide {
    /// What the customer is charged
    Invoice,
    /// What we are charged
    Bill,
}

/// One side's pricing terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryTerms {
    /// Income or expense account the value is posted to
    pub account: Option<AccountId>,
    /// Unit price
    pub price: Numeric,
    /// Whether the tax table applies
    pub taxable: bool,
    /// Whether the price already includes tax
    pub tax_included: bool,
    /// Tax table, counted as a reference
    pub tax_table: Option<TaxTableId>,
}

impl Default for EntryTerms {
    fn default() -> Self {
        Self {
            account: None,
            price: Numeric::zero(),
            taxable: true,
            tax_included: false,
            tax_table: None,
        }
    }
}

/// Computed value, discount and taxes of an entry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntryValues {
    /// What the merchant receives; `value + tax` is what the buyer pays
    pub value: Numeric,
    /// How much the discount took off
    pub discount: Numeric,
    /// Total tax
    pub tax: Numeric,
    /// Tax per collecting account
    pub taxes: Vec<AccountValue>,
}

/// Compute the value, discount and taxes of `quantity × price`
///
/// With `tax_included` the price is first backed out to its pre-tax
/// amount: `pretax = (aggregate − fixed taxes) / (1 + percent taxes)`.
/// The discount and taxes are then applied in the order `how` names:
///
/// | how        | discount computed on | tax computed on    |
/// |------------|----------------------|--------------------|
/// | `PreTax`   | pretax               | pretax − discount  |
/// | `SameTime` | pretax               | pretax             |
/// | `PostTax`  | pretax + tax         | pretax             |
///
/// Nothing is rounded.
pub fn compute_value(
    quantity: &Numeric,
    price: &Numeric,
    tax_entries: Option<&[TaxTableEntry]>,
    tax_included: bool,
    discount: &Numeric,
    discount_type: AmountType,
    how: DiscountHow,
) -> NumericResult<EntryValues> {
    let hundred = Numeric::from_i64(100);
    let rows = tax_entries.unwrap_or(&[]);

    let aggregate = quantity * price;

    let mut tvalue = Numeric::zero();
    let mut tpercent = Numeric::zero();
    for row in rows {
        match row.amount_type {
            AmountType::Value => tvalue += &row.amount,
            AmountType::Percent => tpercent += &row.amount,
        }
    }
    let tpercent = tpercent.checked_div(&hundred)?;

    let mut pretax = if tax_entries.is_some() && tax_included {
        (&aggregate - &tvalue).checked_div(&(&tpercent + Numeric::from_i64(1)))?
    } else {
        aggregate
    };

    let (value, discount) = match how {
        DiscountHow::PreTax | DiscountHow::SameTime => {
            let discount = match discount_type {
                AmountType::Percent => &pretax * discount.checked_div(&hundred)?,
                AmountType::Value => discount.clone(),
            };
            let value = &pretax - &discount;
            if how == DiscountHow::PreTax {
                pretax = value.clone();
            }
            (value, discount)
        }
        DiscountHow::PostTax => {
            let discount = match discount_type {
                AmountType::Percent => {
                    let after_tax = &pretax + &pretax * &tpercent + &tvalue;
                    after_tax * discount.checked_div(&hundred)?
                }
                AmountType::Value => discount.clone(),
            };
            (&pretax - &discount, discount)
        }
    };

    let mut taxes = Vec::new();
    for row in rows {
        let tax = match row.amount_type {
            AmountType::Value => row.amount.clone(),
            AmountType::Percent => &pretax * row.amount.checked_div(&hundred)?,
        };
        account_value_add(&mut taxes, row.account, &tax);
    }

    Ok(EntryValues {
        value,
        discount,
        tax: account_value_total(&taxes),
        taxes,
    })
}

/// One line of an invoice, bill or expense voucher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub(crate) inst: Instance,
    pub(crate) date: DateTime<Utc>,
    pub(crate) date_entered: DateTime<Utc>,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) action: String,
    #[serde(default)]
    pub(crate) notes: String,
    pub(crate) quantity: Numeric,
    pub(crate) invoice_terms: EntryTerms,
    pub(crate) bill_terms: EntryTerms,
    #[serde(default)]
    pub(crate) discount: Numeric,
    #[serde(default)]
    pub(crate) discount_type: AmountType,
    #[serde(default)]
    pub(crate) discount_how: DiscountHow,
    #[serde(default)]
    pub(crate) billable: bool,
    #[serde(default)]
    pub(crate) payment: PaymentType,
    #[serde(default)]
    pub(crate) invoice: Option<InvoiceId>,
    #[serde(default)]
    pub(crate) bill: Option<InvoiceId>,
}

impl_entity!(Entry, EntryId);

impl Entry {
    /// Entity id
    pub fn id(&self) -> EntryId {
        EntryId::from_guid(self.inst.guid())
    }

    /// Date of the work or purchase
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// When the entry was recorded
    pub fn date_entered(&self) -> DateTime<Utc> {
        self.date_entered
    }

    /// Description, used as the split memo when posting
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Action, e.g. `Hours`
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Notes
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Quantity
    pub fn quantity(&self) -> &Numeric {
        &self.quantity
    }

    /// Pricing terms for one side
    pub fn terms(&self, side: EntrySide) -> &EntryTerms {
        match side {
            EntrySide::Invoice => &self.invoice_terms,
            EntrySide::Bill => &self.bill_terms,
        }
    }

    /// Invoice-side discount
    pub fn discount(&self) -> &Numeric {
        &self.discount
    }

    /// Whether the discount is a value or a percentage
    pub fn discount_type(&self) -> AmountType {
        self.discount_type
    }

    /// When the discount applies relative to tax
    pub fn discount_how(&self) -> DiscountHow {
        self.discount_how
    }

    /// Whether a billed cost is passed on to a customer
    pub fn is_billable(&self) -> bool {
        self.billable
    }

    /// How an expense was paid
    pub fn payment_type(&self) -> PaymentType {
        self.payment
    }

    /// Customer invoice holding this entry
    pub fn invoice(&self) -> Option<InvoiceId> {
        self.invoice
    }

    /// Bill or voucher holding this entry
    pub fn bill(&self) -> Option<InvoiceId> {
        self.bill
    }

    fn terms_mut(&mut self, side: EntrySide) -> &mut EntryTerms {
        match side {
            EntrySide::Invoice => &mut self.invoice_terms,
            EntrySide::Bill => &mut self.bill_terms,
        }
    }
}

impl Book {
    /// Look up an entry
    pub fn entry(&self, id: EntryId) -> EngineResult<&Entry> {
        self.entries.require(id)
    }

    /// Every entry
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Create an empty entry; quantity and prices start at zero
    pub fn create_entry(&mut self, date: DateTime<Utc>, description: &str) -> EntryId {
        let entry = Entry {
            inst: Instance::new(Guid::new()),
            date,
            date_entered: Utc::now(),
            description: description.to_string(),
            action: String::new(),
            notes: String::new(),
            quantity: Numeric::zero(),
            invoice_terms: EntryTerms::default(),
            bill_terms: EntryTerms::default(),
            discount: Numeric::zero(),
            discount_type: AmountType::Percent,
            discount_how: DiscountHow::PreTax,
            billable: false,
            payment: PaymentType::Cash,
            invoice: None,
            bill: None,
        };
        let id = entry.id();
        self.entries.insert(entry);
        self.emit(EventKind::CREATE, IdType::Entry, id.guid());
        id
    }

    pub(crate) fn edit_entry<F>(&mut self, id: EntryId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Entry),
    {
        let entry = self.entries.require_mut(id)?;
        apply(entry);
        entry.inst.set_dirty();
        self.entries.mark_dirty();
        self.emit(EventKind::MODIFY, IdType::Entry, id.guid());
        Ok(())
    }

    /// Set the date
    pub fn entry_set_date(&mut self, id: EntryId, date: DateTime<Utc>) -> EngineResult<()> {
        self.edit_entry(id, |e| e.date = date)
    }

    /// Set the description
    pub fn entry_set_description(&mut self, id: EntryId, description: &str) -> EngineResult<()> {
        self.edit_entry(id, |e| e.description = description.to_string())
    }

    /// Set the action
    pub fn entry_set_action(&mut self, id: EntryId, action: &str) -> EngineResult<()> {
        self.edit_entry(id, |e| e.action = action.to_string())
    }

    /// Set the notes
    pub fn entry_set_notes(&mut self, id: EntryId, notes: &str) -> EngineResult<()> {
        self.edit_entry(id, |e| e.notes = notes.to_string())
    }

    /// Set the quantity
    pub fn entry_set_quantity(&mut self, id: EntryId, quantity: Numeric) -> EngineResult<()> {
        self.edit_entry(id, |e| e.quantity = quantity)
    }

    /// Set one side's unit price
    pub fn entry_set_price(&mut self, id: EntryId, side: EntrySide, price: Numeric) -> EngineResult<()> {
        self.edit_entry(id, |e| e.terms_mut(side).price = price)
    }

    /// Set one side's posting account
    pub fn entry_set_account(&mut self, id: EntryId, side: EntrySide, acc: Option<AccountId>) -> EngineResult<()> {
        if let Some(acc) = acc {
            self.account(acc)?;
        }
        self.edit_entry(id, |e| e.terms_mut(side).account = acc)
    }

    /// Whether one side is taxed
    pub fn entry_set_taxable(&mut self, id: EntryId, side: EntrySide, taxable: bool) -> EngineResult<()> {
        self.edit_entry(id, |e| e.terms_mut(side).taxable = taxable)
    }

    /// Whether one side's price includes tax
    pub fn entry_set_tax_included(&mut self, id: EntryId, side: EntrySide, included: bool) -> EngineResult<()> {
        self.edit_entry(id, |e| e.terms_mut(side).tax_included = included)
    }

    /// Change one side's tax table, moving the reference count
    pub fn entry_set_tax_table(
        &mut self,
        id: EntryId,
        side: EntrySide,
        table: Option<TaxTableId>,
    ) -> EngineResult<()> {
        let old = self.entry(id)?.terms(side).tax_table;
        if old == table {
            return Ok(());
        }
        if let Some(table) = table {
            self.tax_table_inc_ref(table)?;
        }
        if let Some(old) = old.filter(|t| self.tax_tables.contains(*t)) {
            self.tax_table_dec_ref(old)?;
        }
        self.edit_entry(id, |e| e.terms_mut(side).tax_table = table)
    }

    /// Set the invoice-side discount
    pub fn entry_set_discount(
        &mut self,
        id: EntryId,
        discount: Numeric,
        discount_type: AmountType,
        how: DiscountHow,
    ) -> EngineResult<()> {
        self.edit_entry(id, |e| {
            e.discount = discount;
            e.discount_type = discount_type;
            e.discount_how = how;
        })
    }

    /// Mark a bill entry as passed on to a customer
    pub fn entry_set_billable(&mut self, id: EntryId, billable: bool) -> EngineResult<()> {
        self.edit_entry(id, |e| e.billable = billable)
    }

    /// Set how an expense was paid
    pub fn entry_set_payment_type(&mut self, id: EntryId, payment: PaymentType) -> EngineResult<()> {
        self.edit_entry(id, |e| e.payment = payment)
    }

    fn entry_fraction(&self, entry: &Entry) -> i64 {
        entry
            .invoice
            .or(entry.bill)
            .and_then(|inv| self.invoices.get(inv))
            .map(|inv| inv.currency.fraction())
            .unwrap_or(UNATTACHED_FRACTION)
    }

    /// Values of one side, rounded to the currency of the owning invoice
    ///
    /// Each tax row is rounded on its own and `tax` is the sum of the
    /// rounded rows, so posting the rows and the total balances exactly.
    pub fn entry_values(&self, id: EntryId, side: EntrySide) -> EngineResult<EntryValues> {
        let entry = self.entry(id)?;
        let terms = entry.terms(side);
        let rows = match terms.tax_table.filter(|_| terms.taxable) {
            Some(table) => Some(self.tax_table(table)?.entries.as_slice()),
            None => None,
        };
        let zero = Numeric::zero();
        let (discount, discount_type, how) = match side {
            EntrySide::Invoice => (&entry.discount, entry.discount_type, entry.discount_how),
            EntrySide::Bill => (&zero, AmountType::Value, DiscountHow::PreTax),
        };
        let raw = compute_value(
            &entry.quantity,
            &terms.price,
            rows,
            terms.tax_included,
            discount,
            discount_type,
            how,
        )?;

        let fraction = self.entry_fraction(entry);
        let taxes: Vec<AccountValue> = raw
            .taxes
            .into_iter()
            .map(|row| AccountValue {
                account: row.account,
                value: row.value.rounded_to(fraction),
            })
            .collect();
        Ok(EntryValues {
            value: raw.value.rounded_to(fraction),
            discount: raw.discount.rounded_to(fraction),
            tax: account_value_total(&taxes),
            taxes,
        })
    }

    /// Canonical entry order: date, entered date, description, action, GUID
    pub fn entry_order(&self, a: EntryId, b: EntryId) -> Ordering {
        match (self.entries.get(a), self.entries.get(b)) {
            (Some(ea), Some(eb)) => ea
                .date
                .cmp(&eb.date)
                .then_with(|| ea.date_entered.cmp(&eb.date_entered))
                .then_with(|| ea.description.cmp(&eb.description))
                .then_with(|| ea.action.cmp(&eb.action))
                .then_with(|| a.guid().cmp(&b.guid())),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => a.guid().cmp(&b.guid()),
        }
    }

    /// Remove an entry from its invoice and release its tax tables
    pub fn entry_destroy(&mut self, id: EntryId) -> EngineResult<()> {
        let (invoice, bill) = {
            let entry = self.entry(id)?;
            (entry.invoice, entry.bill)
        };
        for inv in [invoice, bill].into_iter().flatten() {
            if self.invoices.contains(inv) {
                self.invoice_remove_entry(inv, id)?;
            }
        }
        self.entry_set_tax_table(id, EntrySide::Invoice, None)?;
        self.entry_set_tax_table(id, EntrySide::Bill, None)?;
        self.entries.remove(id);
        self.emit(EventKind::DESTROY, IdType::Entry, id.guid());
        Ok(())
    }
}
