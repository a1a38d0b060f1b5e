//! Invoices, bills and expense vouchers, and posting them to the ledger
//!
//! Posting turns an invoice into one read-only transaction:
//!
//! * one split per entry (or per account, when accumulating) in the entry's
//!   income or expense account,
//! * one split per tax account,
//! * for expense vouchers, card-paid entries and any extra amount to charge
//!   go to the employee's credit card account instead of the total,
//! * and the posted split for the total in the receivable or payable
//!   account, placed in the invoice's lot.
//!
//! Customer invoices are "reversed": income is credited and the
//! receivable debited. Bills and vouchers are the other way round.
//!
//! If the owner has an unclaimed pre-payment lot in the posting account,
//! the invoice reuses it. When the pre-payment exceeds the invoice, the
//! surplus is carried forward into a fresh pre-payment lot.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use lotledger_math::{Commodity, Numeric};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::business::entry::{EntrySide, PaymentType};
use crate::business::owner::Owner;
use crate::business::tax_table::{account_value_add, account_value_add_list, AccountValue};
use crate::error::{EngineError, EngineResult};
use crate::event::EventKind;
use crate::guid::{AccountId, EntityId, EntryId, Guid, IdType, InvoiceId, LotId, SplitId, TransId};
use crate::instance::{impl_entity, Instance};
use crate::kvp::KvpValue;
use crate::transaction::TxnType;

/// Slot on lots and transactions naming the invoice they belong to
pub const INVOICE_GUID_SLOT: &str = "gncInvoice/invoice-guid";
/// Read-only reason of posted transactions
pub const POSTED_READ_ONLY: &str = "Generated from an invoice.  Try unposting the invoice.";
/// Memo of the credit card split for an invoice's extra charge
pub const EXTRA_CHARGE_MEMO: &str = "Extra to Charge Card";
/// Memo of the splits that carry a surplus pre-payment forward
pub const PAYMENT_FORWARD_MEMO: &str = "Automatic Payment Forward";
/// Action of the splits that carry a surplus pre-payment forward
pub const PAYMENT_FORWARD_ACTION: &str = "Auto Split";

/// Totals of an invoice's entries, rounded per entry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvoiceTotals {
    /// Sum of entry values
    pub subtotal: Numeric,
    /// Sum of entry taxes
    pub tax: Numeric,
    /// `subtotal + tax`
    pub total: Numeric,
}

/// An invoice to a customer, a bill from a vendor, or an employee's expense voucher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub(crate) inst: Instance,
    pub(crate) business_id: String,
    pub(crate) owner: Owner,
    pub(crate) currency: Commodity,
    pub(crate) entries: Vec<EntryId>,
    pub(crate) date_opened: DateTime<Utc>,
    #[serde(default)]
    pub(crate) date_posted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) notes: String,
    #[serde(default)]
    pub(crate) billing_id: String,
    pub(crate) active: bool,
    #[serde(default)]
    pub(crate) to_charge_amount: Numeric,
    #[serde(default)]
    pub(crate) posted_account: Option<AccountId>,
    #[serde(default)]
    pub(crate) posted_txn: Option<TransId>,
    #[serde(default)]
    pub(crate) posted_lot: Option<LotId>,
}

impl_entity!(Invoice, InvoiceId);

impl Invoice {
    /// Entity id
    pub fn id(&self) -> InvoiceId {
        InvoiceId::from_guid(self.inst.guid())
    }

    /// Business id
    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    /// Customer, job, vendor or employee
    pub fn owner(&self) -> Owner {
        self.owner
    }

    /// Currency of every posted split
    pub fn currency(&self) -> &Commodity {
        &self.currency
    }

    /// Entries in canonical order
    pub fn entries(&self) -> &[EntryId] {
        &self.entries
    }

    /// When the invoice was opened
    pub fn date_opened(&self) -> DateTime<Utc> {
        self.date_opened
    }

    /// When the invoice was posted
    pub fn date_posted(&self) -> Option<DateTime<Utc>> {
        self.date_posted
    }

    /// Notes
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// The owner's reference for this invoice
    pub fn billing_id(&self) -> &str {
        &self.billing_id
    }

    /// Active flag
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Extra amount an expense voucher charges to the credit card
    pub fn to_charge_amount(&self) -> &Numeric {
        &self.to_charge_amount
    }

    /// Receivable or payable account it was posted to
    pub fn posted_account(&self) -> Option<AccountId> {
        self.posted_account
    }

    /// Transaction created by posting
    pub fn posted_txn(&self) -> Option<TransId> {
        self.posted_txn
    }

    /// Lot holding the posted split and its payments
    pub fn posted_lot(&self) -> Option<LotId> {
        self.posted_lot
    }

    /// True once posted
    pub fn is_posted(&self) -> bool {
        self.date_posted.is_some()
    }
}

impl Book {
    /// Look up an invoice
    pub fn invoice(&self, id: InvoiceId) -> EngineResult<&Invoice> {
        self.invoices.require(id)
    }

    /// Every invoice
    pub fn invoices(&self) -> impl Iterator<Item = &Invoice> {
        self.invoices.iter()
    }

    /// Find an invoice by business id
    pub fn lookup_invoice_by_id(&self, id: &str) -> Option<InvoiceId> {
        self.invoices
            .iter()
            .find(|i| i.business_id == id)
            .map(|i| i.id())
    }

    /// Open a new invoice in the owner's currency
    pub fn create_invoice(&mut self, owner: Owner, date_opened: DateTime<Utc>) -> EngineResult<InvoiceId> {
        let currency = self.owner_currency(owner)?;
        let invoice = Invoice {
            inst: Instance::new(Guid::new()),
            business_id: self.next_id(IdType::Invoice),
            owner,
            currency,
            entries: Vec::new(),
            date_opened,
            date_posted: None,
            notes: String::new(),
            billing_id: String::new(),
            active: true,
            to_charge_amount: Numeric::zero(),
            posted_account: None,
            posted_txn: None,
            posted_lot: None,
        };
        let id = invoice.id();
        self.invoices.insert(invoice);
        self.emit(EventKind::CREATE, IdType::Invoice, id.guid());
        Ok(id)
    }

    fn edit_invoice<F>(&mut self, id: InvoiceId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Invoice),
    {
        let invoice = self.invoices.require_mut(id)?;
        apply(invoice);
        invoice.inst.set_dirty();
        self.invoices.mark_dirty();
        self.emit(EventKind::MODIFY, IdType::Invoice, id.guid());
        Ok(())
    }

    fn require_unposted(&self, id: InvoiceId) -> EngineResult<()> {
        let invoice = self.invoice(id)?;
        if invoice.is_posted() {
            return Err(EngineError::AlreadyPosted(invoice.business_id.clone()));
        }
        Ok(())
    }

    /// Change the owner of an unposted invoice
    pub fn invoice_set_owner(&mut self, id: InvoiceId, owner: Owner) -> EngineResult<()> {
        self.require_unposted(id)?;
        if !self.owner_exists(owner) {
            return Err(EngineError::not_found(owner.owner_type_id(), owner.guid()));
        }
        self.edit_invoice(id, |i| i.owner = owner)
    }

    /// Change the currency of an unposted invoice
    pub fn invoice_set_currency(&mut self, id: InvoiceId, currency: &Commodity) -> EngineResult<()> {
        self.require_unposted(id)?;
        self.edit_invoice(id, |i| i.currency = currency.clone())
    }

    /// Set the notes
    pub fn invoice_set_notes(&mut self, id: InvoiceId, notes: &str) -> EngineResult<()> {
        self.edit_invoice(id, |i| i.notes = notes.to_string())
    }

    /// Set the owner's reference
    pub fn invoice_set_billing_id(&mut self, id: InvoiceId, billing_id: &str) -> EngineResult<()> {
        self.edit_invoice(id, |i| i.billing_id = billing_id.to_string())
    }

    /// Activate or retire
    pub fn invoice_set_active(&mut self, id: InvoiceId, active: bool) -> EngineResult<()> {
        self.edit_invoice(id, |i| i.active = active)
    }

    /// Set the extra amount an expense voucher charges to the card
    pub fn invoice_set_to_charge_amount(&mut self, id: InvoiceId, amount: Numeric) -> EngineResult<()> {
        self.edit_invoice(id, |i| i.to_charge_amount = amount)
    }

    /// Kind of the end owner, which decides the entry side and signs
    fn invoice_is_customer(&self, id: InvoiceId) -> EngineResult<bool> {
        Ok(matches!(self.owner_end(self.invoice(id)?.owner)?, Owner::Customer(_)))
    }

    fn invoice_side(&self, id: InvoiceId) -> EngineResult<EntrySide> {
        Ok(if self.invoice_is_customer(id)? {
            EntrySide::Invoice
        } else {
            EntrySide::Bill
        })
    }

    /// `Invoice`, `Bill` or `Expense`, by end owner
    pub fn invoice_type(&self, id: InvoiceId) -> EngineResult<&'static str> {
        Ok(match self.owner_end(self.invoice(id)?.owner)? {
            Owner::Customer(_) => "Invoice",
            Owner::Vendor(_) => "Bill",
            Owner::Employee(_) => "Expense",
            Owner::Job(_) => "Invoice",
        })
    }

    /// Add an entry to an unposted invoice, taking it from any previous one
    pub fn invoice_add_entry(&mut self, id: InvoiceId, entry: EntryId) -> EngineResult<()> {
        self.require_unposted(id)?;
        let side = self.invoice_side(id)?;
        let previous = {
            let e = self.entry(entry)?;
            match side {
                EntrySide::Invoice => e.invoice,
                EntrySide::Bill => e.bill,
            }
        };
        if previous == Some(id) {
            return Ok(());
        }
        if let Some(previous) = previous.filter(|p| self.invoices.contains(*p)) {
            self.invoice_remove_entry(previous, entry)?;
        }
        self.edit_entry(entry, |e| match side {
            EntrySide::Invoice => e.invoice = Some(id),
            EntrySide::Bill => e.bill = Some(id),
        })?;

        let mut entries = self.invoice(id)?.entries.clone();
        let pos = entries
            .iter()
            .position(|other| self.entry_order(entry, *other).is_lt())
            .unwrap_or(entries.len());
        entries.insert(pos, entry);
        self.edit_invoice(id, |i| i.entries = entries)
    }

    /// Take an entry off an invoice
    pub fn invoice_remove_entry(&mut self, id: InvoiceId, entry: EntryId) -> EngineResult<()> {
        self.edit_entry(entry, |e| {
            if e.invoice == Some(id) {
                e.invoice = None;
            }
            if e.bill == Some(id) {
                e.bill = None;
            }
        })?;
        self.edit_invoice(id, |i| i.entries.retain(|e| *e != entry))
    }

    /// Subtotal, tax and total of the invoice's entries
    pub fn invoice_totals(&self, id: InvoiceId) -> EngineResult<InvoiceTotals> {
        let side = self.invoice_side(id)?;
        let mut totals = InvoiceTotals::default();
        for entry in &self.invoice(id)?.entries {
            let values = self.entry_values(*entry, side)?;
            totals.subtotal += &values.value;
            totals.tax += &values.tax;
        }
        totals.total = &totals.subtotal + &totals.tax;
        Ok(totals)
    }

    /// Value plus tax of the entries paid a given way
    pub fn invoice_total_by_payment_type(&self, id: InvoiceId, payment: PaymentType) -> EngineResult<Numeric> {
        let side = self.invoice_side(id)?;
        let mut total = Numeric::zero();
        for entry in &self.invoice(id)?.entries {
            if self.entry(*entry)?.payment != payment {
                continue;
            }
            let values = self.entry_values(*entry, side)?;
            total += values.value + values.tax;
        }
        Ok(total)
    }

    /// Due date recorded on the posted transaction
    pub fn invoice_date_due(&self, id: InvoiceId) -> EngineResult<Option<DateTime<Utc>>> {
        match self.invoice(id)?.posted_txn {
            Some(txn) => Ok(self.transaction(txn)?.date_due()),
            None => Ok(None),
        }
    }

    /// True when the posted lot has been paid off
    pub fn invoice_is_paid(&self, id: InvoiceId) -> EngineResult<bool> {
        match self.invoice(id)?.posted_lot {
            Some(lot) if self.lots.contains(lot) => self.lot_is_closed(lot),
            _ => Ok(false),
        }
    }

    /// Invoice a lot was posted for
    pub fn invoice_from_lot(&self, lot: LotId) -> Option<InvoiceId> {
        let guid = self.lots.get(lot)?.inst.slots().get_guid(INVOICE_GUID_SLOT)?;
        let id = InvoiceId::from_guid(guid);
        self.invoices.contains(id).then_some(id)
    }

    /// Invoice a transaction was generated from
    pub fn invoice_from_txn(&self, txn: TransId) -> Option<InvoiceId> {
        let guid = self.transactions.get(txn)?.inst.slots().get_guid(INVOICE_GUID_SLOT)?;
        let id = InvoiceId::from_guid(guid);
        self.invoices.contains(id).then_some(id)
    }

    /// Tag the lot with the invoice; the first lot tagged becomes the posted lot
    pub(crate) fn invoice_attach_to_lot(&mut self, id: InvoiceId, lot: LotId) -> EngineResult<()> {
        self.invoice(id)?;
        {
            let lot = self.lot_mut(lot)?;
            lot.inst.slots_mut().set_path(INVOICE_GUID_SLOT, KvpValue::Guid(id.guid()));
            lot.inst.set_dirty();
        }
        if self.invoice(id)?.posted_lot.is_none() {
            self.edit_invoice(id, |i| i.posted_lot = Some(lot))?;
        }
        Ok(())
    }

    fn invoice_detach_from_lot(&mut self, lot: LotId) -> EngineResult<()> {
        let lot = self.lot_mut(lot)?;
        lot.inst.slots_mut().remove_path(INVOICE_GUID_SLOT);
        lot.inst.set_dirty();
        Ok(())
    }

    pub(crate) fn invoice_attach_to_txn(&mut self, id: InvoiceId, txn: TransId) -> EngineResult<()> {
        self.trans_begin_edit(txn)?;
        {
            let trans = self.transaction_mut(txn)?;
            trans.inst.slots_mut().set_path(INVOICE_GUID_SLOT, KvpValue::Guid(id.guid()));
            trans.txn_type = TxnType::Invoice;
            trans.inst.set_dirty();
        }
        self.trans_commit_edit(txn)?;
        self.edit_invoice(id, |i| i.posted_txn = Some(txn))
    }

    /// An open lot of `acc` holding only an unclaimed pre-payment by `owner`
    fn find_payment_lot(&self, acc: AccountId, owner: Owner, reverse: bool) -> EngineResult<Option<LotId>> {
        let matcher = |book: &Book, lot: LotId| {
            let balance = book.lot_balance(lot).unwrap_or_default();
            let balance = if reverse { balance } else { -balance };
            if balance.is_positive() || book.invoice_from_lot(lot).is_some() {
                return false;
            }
            book.owner_from_lot(lot)
                .and_then(|o| book.owner_end(o).ok())
                .is_some_and(|o| o == owner)
        };
        Ok(self.account_find_open_lots(acc, Some(&matcher), None)?.into_iter().next())
    }

    fn add_posting_split(
        &mut self,
        txn: TransId,
        acc: AccountId,
        value: Numeric,
        memo: &str,
        action: &str,
    ) -> EngineResult<SplitId> {
        let split = self.create_split(txn, acc, value.clone(), value)?;
        self.split_set_memo(split, memo)?;
        self.split_set_action(split, action)?;
        Ok(split)
    }

    /// Post the invoice to a receivable or payable account
    ///
    /// Returns the posted transaction. Shared tax tables are frozen first,
    /// and a billable bill entry copies its bill price into its invoice
    /// price so the cost can be passed on.
    pub fn invoice_post_to_account(
        &mut self,
        id: InvoiceId,
        acc: AccountId,
        post_date: DateTime<Utc>,
        due_date: Option<DateTime<Utc>>,
        memo: &str,
        accumulate: bool,
    ) -> EngineResult<TransId> {
        self.require_unposted(id)?;
        self.account(acc)?;
        let owner = self.owner_end(self.invoice(id)?.owner)?;
        let reverse = matches!(owner, Owner::Customer(_));
        let side = self.invoice_side(id)?;
        let kind = self.invoice_type(id)?;
        let name = self.owner_name(owner)?;
        let (business_id, currency, entries) = {
            let invoice = self.invoice(id)?;
            (invoice.business_id.clone(), invoice.currency.clone(), invoice.entries.clone())
        };
        info!("posting {} {} to {}", kind, business_id, self.account_full_name(acc)?);

        for entry in &entries {
            if let Some(table) = self.entry(*entry)?.terms(side).tax_table {
                let child = self.tax_table_return_child(table, true)?;
                self.entry_set_tax_table(*entry, side, child)?;
            }
            if !reverse && self.entry(*entry)?.billable {
                let price = self.entry(*entry)?.bill_terms.price.clone();
                self.entry_set_price(*entry, EntrySide::Invoice, price)?;
            }
        }

        let (lot, new_lot) = match self.find_payment_lot(acc, owner, reverse)? {
            Some(lot) => {
                debug!("reusing pre-payment lot {}", lot);
                (lot, false)
            }
            None => (self.create_lot(), true),
        };

        let txn = self.create_transaction(&currency, post_date, &name)?;
        self.trans_begin_edit(txn)?;
        let posted = PostingPlan {
            invoice: id,
            acc,
            lot,
            txn,
            side,
            reverse,
            kind,
            memo,
            entries: &entries,
            due_date,
            accumulate,
        };
        if let Err(err) = self.post_splits(&posted, &business_id) {
            warn!("posting {} {} failed: {}", kind, business_id, err);
            self.trans_rollback_edit(txn)?;
            self.trans_destroy(txn)?;
            self.release_posting_lot(id, lot, new_lot)?;
            return Err(err);
        }
        self.trans_commit_edit(txn)?;
        self.lot_set_title(lot, &format!("{} {}", kind, business_id))?;
        self.edit_invoice(id, |i| {
            i.posted_account = Some(acc);
            i.date_posted = Some(post_date);
        })?;

        self.carry_forward_prepayment(lot, acc, owner, &currency, post_date, &name)?;
        Ok(txn)
    }

    /// Undo the lot side of a failed posting
    fn release_posting_lot(&mut self, id: InvoiceId, lot: LotId, new_lot: bool) -> EngineResult<()> {
        if !self.lots.contains(lot) {
            return Ok(());
        }
        if new_lot {
            self.lot_destroy(lot)?;
        } else if self.invoice_from_lot(lot) == Some(id) {
            self.invoice_detach_from_lot(lot)?;
        }
        if self.invoice(id)?.posted_lot == Some(lot) {
            self.edit_invoice(id, |i| i.posted_lot = None)?;
        }
        Ok(())
    }

    fn post_splits(&mut self, plan: &PostingPlan<'_>, business_id: &str) -> EngineResult<()> {
        let sign = |v: Numeric| if plan.reverse { -v } else { v };
        let ccard = match self.owner_end(self.invoice(plan.invoice)?.owner)? {
            Owner::Employee(e) => self.employee(e)?.ccard_account,
            _ => None,
        };

        {
            let trans = self.transaction_mut(plan.txn)?;
            trans.num = business_id.to_string();
            trans.date_due = plan.due_date;
            trans.inst.set_dirty();
        }

        let mut total = Numeric::zero();
        let mut split_info: Vec<AccountValue> = Vec::new();
        for entry in plan.entries {
            let values = self.entry_values(*entry, plan.side)?;
            let (account, description, payment) = {
                let e = self.entry(*entry)?;
                (e.terms(plan.side).account, e.description.clone(), e.payment)
            };
            if let Some(account) = account {
                if plan.accumulate {
                    account_value_add(&mut split_info, account, &values.value);
                } else {
                    self.add_posting_split(plan.txn, account, sign(values.value.clone()), &description, plan.kind)?;
                }
                match ccard {
                    Some(card) if payment == PaymentType::Card => {
                        self.add_posting_split(
                            plan.txn,
                            card,
                            -sign(values.value.clone()),
                            &description,
                            plan.kind,
                        )?;
                    }
                    _ => total += &values.value,
                }
            }
            account_value_add_list(&mut split_info, &values.taxes);
            total += &values.tax;
        }

        for row in split_info {
            self.add_posting_split(plan.txn, row.account, sign(row.value), plan.memo, plan.kind)?;
        }

        let to_charge = self.invoice(plan.invoice)?.to_charge_amount.clone();
        if let Some(card) = ccard.filter(|_| !to_charge.is_zero()) {
            self.add_posting_split(plan.txn, card, -sign(to_charge.clone()), EXTRA_CHARGE_MEMO, plan.kind)?;
            total -= &to_charge;
        }

        let posted = self.add_posting_split(plan.txn, plan.acc, -sign(total), plan.memo, plan.kind)?;
        self.lot_add_split(plan.lot, posted)?;

        self.invoice_attach_to_lot(plan.invoice, plan.lot)?;
        self.invoice_attach_to_txn(plan.invoice, plan.txn)?;
        self.trans_set_read_only(plan.txn, POSTED_READ_ONLY)
    }

    /// Close an over-paid lot and move the surplus into a new pre-payment lot
    fn carry_forward_prepayment(
        &mut self,
        lot: LotId,
        acc: AccountId,
        owner: Owner,
        currency: &Commodity,
        post_date: DateTime<Utc>,
        name: &str,
    ) -> EngineResult<()> {
        let balance = self.lot_balance(lot)?;
        let reverse = matches!(owner, Owner::Customer(_));
        let owed = if reverse { balance.clone() } else { -&balance };
        if !owed.is_negative() {
            return Ok(());
        }
        debug!("carrying {} forward out of lot {}", balance, lot);

        let next = self.create_lot();
        self.owner_attach_to_lot(owner, next)?;
        let t2 = self.create_transaction(currency, post_date, name)?;
        self.trans_begin_edit(t2)?;
        let closing = self.add_posting_split(t2, acc, -&balance, PAYMENT_FORWARD_MEMO, PAYMENT_FORWARD_ACTION)?;
        self.lot_add_split(lot, closing)?;
        let opening = self.add_posting_split(t2, acc, balance, PAYMENT_FORWARD_MEMO, PAYMENT_FORWARD_ACTION)?;
        self.lot_add_split(next, opening)?;
        self.trans_commit_edit(t2)
    }

    /// Undo a posting
    ///
    /// The posted transaction is destroyed, the lot goes back to the owner
    /// (or is destroyed when nothing else is in it). With
    /// `reset_tax_tables` each entry returns to the shared table its frozen
    /// copy was made from.
    pub fn invoice_unpost(&mut self, id: InvoiceId, reset_tax_tables: bool) -> EngineResult<()> {
        let invoice = self.invoice(id)?;
        if !invoice.is_posted() {
            return Err(EngineError::NotPosted(invoice.business_id.clone()));
        }
        let owner = invoice.owner;
        let txn = invoice.posted_txn;
        let lot = invoice.posted_lot;
        info!("unposting invoice {}", invoice.business_id);

        if let Some(txn) = txn.filter(|t| self.transactions.contains(*t)) {
            self.trans_clear_read_only(txn)?;
            self.trans_destroy(txn)?;
        }

        if let Some(lot) = lot.filter(|l| self.lots.contains(*l)) {
            self.invoice_detach_from_lot(lot)?;
            self.owner_attach_to_lot(owner, lot)?;
            if self.lot(lot)?.count_splits() == 0 {
                self.lot_destroy(lot)?;
            }
        }

        self.edit_invoice(id, |i| {
            i.posted_account = None;
            i.posted_txn = None;
            i.posted_lot = None;
            i.date_posted = None;
        })?;

        if reset_tax_tables {
            let side = self.invoice_side(id)?;
            for entry in self.invoice(id)?.entries.clone() {
                let Some(table) = self.entry(entry)?.terms(side).tax_table else {
                    continue;
                };
                let parent = self.tax_table(table)?.parent;
                self.entry_set_tax_table(entry, side, parent)?;
            }
        }
        Ok(())
    }

    /// Remove an unposted invoice; its entries go with it
    pub fn invoice_destroy(&mut self, id: InvoiceId) -> EngineResult<()> {
        self.require_unposted(id)?;
        for entry in self.invoice(id)?.entries.clone() {
            self.entry_destroy(entry)?;
        }
        self.invoices.remove(id);
        self.emit(EventKind::DESTROY, IdType::Invoice, id.guid());
        Ok(())
    }
}

struct PostingPlan<'a> {
    invoice: InvoiceId,
    acc: AccountId,
    lot: LotId,
    txn: TransId,
    side: EntrySide,
    reverse: bool,
    kind: &'static str,
    memo: &'a str,
    entries: &'a [EntryId],
    due_date: Option<DateTime<Utc>>,
    accumulate: bool,
}
