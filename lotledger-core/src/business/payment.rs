//! Applying an owner's payment across their open invoices
//!
//! A payment becomes one transaction: the transfer split in the bank (or
//! card) account, and one split per invoice lot it pays off in the posting
//! account, oldest due date first. Whatever is left over is kept as a
//! pre-payment lot for the next invoice to claim.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use lotledger_math::Numeric;

use crate::book::Book;
use crate::business::owner::Owner;
use crate::error::{EngineError, EngineResult};
use crate::event::EventKind;
use crate::guid::{AccountId, EntityId, IdType, InvoiceId, LotId, TransId};
use crate::transaction::TxnType;

/// Action of the splits paying off invoice lots
pub const PAYMENT_ACTION: &str = "Payment";
/// Action of the split holding an unclaimed surplus
pub const PREPAYMENT_ACTION: &str = "Pre-Payment";

struct PaymentPlan<'a> {
    owner: Owner,
    end: Owner,
    invoice: Option<InvoiceId>,
    posted_acc: AccountId,
    xfer_acc: AccountId,
    amount: Numeric,
    memo: &'a str,
    num: &'a str,
}

impl Book {
    /// Due date of the invoice posted into a lot; lots without one sort first
    pub fn lot_due_date(&self, lot: LotId) -> Option<DateTime<Utc>> {
        self.invoice_from_lot(lot)
            .and_then(|inv| self.invoice_date_due(inv).ok().flatten())
    }

    fn lot_end_owner(&self, lot: LotId) -> Option<Owner> {
        let owner = match self.invoice_from_lot(lot) {
            Some(inv) => self.invoices.get(inv)?.owner,
            None => self.owner_from_lot(lot)?,
        };
        self.owner_end(owner).ok()
    }

    /// Pay `amount` from `xfer_acc` against `owner`'s lots in `posted_acc`
    ///
    /// When `invoice` is given and still open in `posted_acc`, its lot is
    /// paid first; the remaining lots go in due-date order. A surplus is
    /// added to the owner's pre-payment lot, which is created if needed.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_payment(
        &mut self,
        owner: Owner,
        invoice: Option<InvoiceId>,
        posted_acc: AccountId,
        xfer_acc: AccountId,
        amount: Numeric,
        date: DateTime<Utc>,
        memo: &str,
        num: &str,
    ) -> EngineResult<TransId> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidArgument(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }
        self.account(posted_acc)?;
        self.account(xfer_acc)?;
        if let Some(inv) = invoice {
            self.invoice(inv)?;
        }
        let end = self.owner_end(owner)?;
        let name = self.owner_name(end)?;
        let currency = self.owner_currency(owner)?;
        info!("applying payment of {} from {}", amount, name);

        let txn = self.create_transaction(&currency, date, &name)?;
        self.trans_begin_edit(txn)?;
        let plan = PaymentPlan {
            owner,
            end,
            invoice,
            posted_acc,
            xfer_acc,
            amount,
            memo,
            num,
        };
        if let Err(err) = self.payment_splits(txn, &plan) {
            self.trans_rollback_edit(txn)?;
            self.trans_destroy(txn)?;
            return Err(err);
        }
        self.trans_commit_edit(txn)?;
        Ok(txn)
    }

    fn payment_splits(&mut self, txn: TransId, plan: &PaymentPlan<'_>) -> EngineResult<()> {
        let reverse = matches!(plan.end, Owner::Customer(_));
        let sign = |v: Numeric| if reverse { v } else { -v };
        {
            let trans = self.transaction_mut(txn)?;
            trans.num = plan.num.to_string();
            trans.txn_type = TxnType::Payment;
            trans.inst.set_dirty();
        }

        let xfer = self.create_split(txn, plan.xfer_acc, sign(plan.amount.clone()), sign(plan.amount.clone()))?;
        self.split_set_memo(xfer, plan.memo)?;
        self.split_set_action(xfer, PAYMENT_ACTION)?;

        let end = plan.end;
        let matcher = |book: &Book, lot: LotId| book.lot_end_owner(lot) == Some(end);
        let by_due = |book: &Book, a: LotId, b: LotId| book.lot_due_date(a).cmp(&book.lot_due_date(b));
        let mut fifo = self.account_find_open_lots(plan.posted_acc, Some(&matcher), Some(&by_due))?;

        if let Some(inv) = plan.invoice {
            let invoice = self.invoice(inv)?;
            if invoice.posted_account == Some(plan.posted_acc) {
                if let Some(lot) = invoice.posted_lot.filter(|l| fifo.contains(l)) {
                    fifo.retain(|l| *l != lot);
                    fifo.insert(0, lot);
                }
            }
        }

        let mut remaining = plan.amount.clone();
        let mut prepay_lot = None;
        for lot in fifo {
            let balance = self.lot_balance(lot)?;
            let owed = if reverse { balance } else { -balance };
            if owed.is_negative() {
                if prepay_lot.is_some() {
                    warn!("owner {} has more than one pre-payment lot", plan.end);
                } else {
                    prepay_lot = Some(lot);
                }
                continue;
            }

            let paid = if remaining <= owed { remaining.clone() } else { owed };
            remaining -= &paid;
            debug!("paying {} into lot {}", paid, lot);
            let split = self.create_split(txn, plan.posted_acc, -sign(paid.clone()), -sign(paid))?;
            self.split_set_memo(split, plan.memo)?;
            self.split_set_action(split, PAYMENT_ACTION)?;
            self.lot_add_split(lot, split)?;
            if let Some(inv) = self.invoice_from_lot(lot) {
                self.emit(EventKind::MODIFY, IdType::Invoice, inv.guid());
            }
            if remaining.is_zero() {
                break;
            }
        }

        if remaining.is_positive() {
            let lot = match prepay_lot {
                Some(lot) => lot,
                None => {
                    let lot = self.create_lot();
                    self.owner_attach_to_lot(plan.owner, lot)?;
                    lot
                }
            };
            debug!("keeping {} as a pre-payment in lot {}", remaining, lot);
            let split = self.create_split(txn, plan.posted_acc, -sign(remaining.clone()), -sign(remaining))?;
            self.split_set_memo(split, plan.memo)?;
            self.split_set_action(split, PREPAYMENT_ACTION)?;
            self.lot_add_split(lot, split)?;
        }
        Ok(())
    }
}
