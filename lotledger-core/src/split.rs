//! Splits: one leg of a transaction against one account
//!
//! A split moves `amount` units of its account's commodity and is worth
//! `value` in the parent transaction's currency. Every setter runs inside an
//! edit bracket on the parent transaction, so the imbalance check and the
//! account balance refresh happen when the caller's outermost commit runs.

use std::cmp::Ordering;
use std::fmt;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use lotledger_math::{Commodity, Numeric, RoundMode};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::{EngineError, EngineResult};
use crate::event::EventKind;
use crate::guid::{AccountId, EntityId, Guid, IdType, LotId, SplitId, TransId};
use crate::instance::{impl_entity, Instance};
use crate::kvp::KvpValue;
use crate::transaction::Transaction;

/// Slot holding the amount a voided split carried
pub const VOID_FORMER_AMOUNT: &str = "void-former-amount";
/// Slot holding the value a voided split carried
pub const VOID_FORMER_VALUE: &str = "void-former-value";
/// Slot naming a split's special role
pub const SPLIT_TYPE: &str = "split-type";
/// Bag linking the fragments of a split broken across lots
pub const LOT_SPLIT: &str = "lot-split";

/// Denominator used for amounts of a split that has no account yet
const UNROUNDED_FRACTION: i64 = 100_000;

/// Reconciliation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Reconcile {
    /// Not yet seen on a statement
    #[serde(rename = "n")]
    New,
    /// Seen on a statement
    #[serde(rename = "c")]
    Cleared,
    /// Reconciled against a statement
    #[serde(rename = "y")]
    Reconciled,
    /// Frozen into a closed period
    #[serde(rename = "f")]
    Frozen,
    /// Part of a voided transaction
    #[serde(rename = "v")]
    Void,
}

impl Reconcile {
    /// The one-letter code
    pub fn as_char(&self) -> char {
        match self {
            Reconcile::New => 'n',
            Reconcile::Cleared => 'c',
            Reconcile::Reconciled => 'y',
            Reconcile::Frozen => 'f',
            Reconcile::Void => 'v',
        }
    }

    /// Parse a one-letter code
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'n' => Some(Reconcile::New),
            'c' => Some(Reconcile::Cleared),
            'y' => Some(Reconcile::Reconciled),
            'f' => Some(Reconcile::Frozen),
            'v' => Some(Reconcile::Void),
            _ => None,
        }
    }
}

impl Default for Reconcile {
    fn default() -> Self {
        Reconcile::New
    }
}

impl fmt::Display for Reconcile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

bitflags! {
    /// Which cached gains results are stale for a split
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct GainsStatus: u8 {
        /// The split is itself a realized-gains split
        const GAINS = 0x01;
        /// Posted date changed
        const DATE_DIRTY = 0x02;
        /// Amount changed
        const AMNT_DIRTY = 0x04;
        /// Value changed
        const VALU_DIRTY = 0x08;
        /// Lot membership changed
        const LOT_DIRTY = 0x10;
        /// Amount or value changed
        const A_VDIRTY = Self::AMNT_DIRTY.bits() | Self::VALU_DIRTY.bits();
    }
}

/// One leg of a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Split {
    pub(crate) inst: Instance,
    pub(crate) parent: TransId,
    pub(crate) account: Option<AccountId>,
    #[serde(default)]
    pub(crate) lot: Option<LotId>,
    #[serde(default)]
    pub(crate) memo: String,
    #[serde(default)]
    pub(crate) action: String,
    #[serde(default)]
    pub(crate) reconcile: Reconcile,
    #[serde(default)]
    pub(crate) date_reconciled: Option<DateTime<Utc>>,
    pub(crate) amount: Numeric,
    pub(crate) value: Numeric,
    #[serde(skip)]
    pub(crate) balance: Numeric,
    #[serde(skip)]
    pub(crate) cleared_balance: Numeric,
    #[serde(skip)]
    pub(crate) reconciled_balance: Numeric,
    #[serde(default)]
    pub(crate) gains: GainsStatus,
    #[serde(default)]
    pub(crate) gains_split: Option<SplitId>,
    #[serde(default)]
    pub(crate) gains_source: Option<SplitId>,
}

impl_entity!(Split, SplitId);

impl Split {
    fn new(parent: TransId) -> Self {
        Self {
            inst: Instance::new(Guid::new()),
            parent,
            account: None,
            lot: None,
            memo: String::new(),
            action: String::new(),
            reconcile: Reconcile::New,
            date_reconciled: None,
            amount: Numeric::zero(),
            value: Numeric::zero(),
            balance: Numeric::zero(),
            cleared_balance: Numeric::zero(),
            reconciled_balance: Numeric::zero(),
            gains: GainsStatus::A_VDIRTY,
            gains_split: None,
            gains_source: None,
        }
    }

    /// Split id
    pub fn id(&self) -> SplitId {
        SplitId::from_guid(self.inst.guid())
    }

    /// Shared instance state
    pub fn instance(&self) -> &Instance {
        &self.inst
    }

    /// Parent transaction
    pub fn transaction(&self) -> TransId {
        self.parent
    }

    /// Account the split posts to
    pub fn account(&self) -> Option<AccountId> {
        self.account
    }

    /// Lot holding the split
    pub fn lot(&self) -> Option<LotId> {
        self.lot
    }

    /// Memo
    pub fn memo(&self) -> &str {
        &self.memo
    }

    /// Action (e.g. `Buy`, `Payment`)
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Reconciliation state
    pub fn reconcile(&self) -> Reconcile {
        self.reconcile
    }

    /// When the split was reconciled
    pub fn date_reconciled(&self) -> Option<DateTime<Utc>> {
        self.date_reconciled
    }

    /// Quantity in the account's commodity
    pub fn amount(&self) -> &Numeric {
        &self.amount
    }

    /// Worth in the transaction's currency
    pub fn value(&self) -> &Numeric {
        &self.value
    }

    /// Account running balance after this split
    pub fn balance(&self) -> &Numeric {
        &self.balance
    }

    /// Cleared running balance after this split
    pub fn cleared_balance(&self) -> &Numeric {
        &self.cleared_balance
    }

    /// Reconciled running balance after this split
    pub fn reconciled_balance(&self) -> &Numeric {
        &self.reconciled_balance
    }

    /// Gains bookkeeping flags
    pub fn gains(&self) -> GainsStatus {
        self.gains
    }

    /// The realized-gains split computed for this split
    pub fn gains_split(&self) -> Option<SplitId> {
        self.gains_split
    }

    /// For a gains split, the split whose gain it records
    pub fn gains_source(&self) -> Option<SplitId> {
        self.gains_source
    }

    /// Special role: `normal` unless marked otherwise
    pub fn split_type(&self) -> &str {
        self.inst.slots().get_string(SPLIT_TYPE).unwrap_or("normal")
    }

    /// True when the split was broken off another during lot assignment
    pub fn is_lot_split(&self) -> bool {
        self.inst.slots().get_path(LOT_SPLIT).is_some()
    }
}

impl Book {
    /// Look up a split
    pub fn split(&self, id: SplitId) -> EngineResult<&Split> {
        self.splits.require(id)
    }

    pub(crate) fn split_mut(&mut self, id: SplitId) -> EngineResult<&mut Split> {
        self.splits.require_mut(id)
    }

    /// Every split in creation order
    pub fn all_splits(&self) -> impl Iterator<Item = &Split> {
        self.splits.iter()
    }

    /// Parent transaction of a split
    pub fn split_transaction(&self, id: SplitId) -> EngineResult<&Transaction> {
        let parent = self.split(id)?.parent;
        self.transaction(parent)
    }

    fn split_currency_fraction(&self, id: SplitId) -> EngineResult<i64> {
        Ok(self.split_transaction(id)?.currency.fraction())
    }

    fn split_commodity_fraction(&self, id: SplitId) -> EngineResult<i64> {
        Ok(match self.split(id)?.account {
            Some(acc) => self.account(acc)?.commodity_scu(),
            None => UNROUNDED_FRACTION,
        })
    }

    /// Create a split in `trans` against `acc`
    ///
    /// The amount is rounded to the account's SCU, the value to the
    /// transaction currency.
    pub fn create_split(
        &mut self,
        trans: TransId,
        acc: AccountId,
        amount: Numeric,
        value: Numeric,
    ) -> EngineResult<SplitId> {
        self.account(acc)?;
        self.trans_begin_edit(trans)?;
        let result = self.create_split_inner(trans, acc, amount, value);
        self.trans_commit_edit(trans)?;
        result
    }

    fn create_split_inner(
        &mut self,
        trans: TransId,
        acc: AccountId,
        amount: Numeric,
        value: Numeric,
    ) -> EngineResult<SplitId> {
        let currency_fraction = self.transaction(trans)?.currency.fraction();
        let scu = self.account(acc)?.commodity_scu();
        let mut split = Split::new(trans);
        split.amount = amount.convert(scu, RoundMode::HalfUp)?;
        split.value = value.convert(currency_fraction, RoundMode::HalfUp)?;
        let id = split.id();
        self.splits.insert(split);
        {
            let t = self.transaction_mut(trans)?;
            t.splits.push(id);
            t.inst.set_dirty();
        }
        self.emit(EventKind::CREATE, IdType::Split, id.guid());
        self.account_insert_split(acc, id)?;
        Ok(id)
    }

    pub(crate) fn mark_split(&mut self, id: SplitId) -> EngineResult<()> {
        let (account, lot) = {
            let split = self.split(id)?;
            (split.account, split.lot)
        };
        if let Some(acc) = account.and_then(|a| self.accounts.get_mut(a)) {
            acc.balance_dirty = true;
            acc.sort_dirty = true;
        }
        if let Some(lot) = lot.and_then(|l| self.lots.get(l)) {
            lot.closed.set(None);
        }
        Ok(())
    }

    /// Apply `apply` to a split inside its transaction's edit bracket
    pub(crate) fn edit_split<F>(&mut self, id: SplitId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Split, i64, i64),
    {
        let trans = self.split(id)?.parent;
        self.trans_begin_edit(trans)?;
        let result = self.edit_split_inner(id, apply);
        self.trans_commit_edit(trans)?;
        result
    }

    fn edit_split_inner<F>(&mut self, id: SplitId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Split, i64, i64),
    {
        let scu = self.split_commodity_fraction(id)?;
        let fraction = self.split_currency_fraction(id)?;
        let split = self.split_mut(id)?;
        apply(split, scu, fraction);
        split.inst.set_dirty();
        self.mark_split(id)
    }

    /// Set the amount, rounded to the account's SCU
    pub fn split_set_amount(&mut self, id: SplitId, amount: Numeric) -> EngineResult<()> {
        self.edit_split(id, |s, scu, _| {
            s.amount = amount.rounded_to(scu);
            s.gains |= GainsStatus::AMNT_DIRTY;
        })
    }

    /// Set the value, rounded to the transaction currency
    pub fn split_set_value(&mut self, id: SplitId, value: Numeric) -> EngineResult<()> {
        self.edit_split(id, |s, _, fraction| {
            s.value = value.rounded_to(fraction);
            s.gains |= GainsStatus::VALU_DIRTY;
        })
    }

    /// Set the amount and derive the value from a per-unit price
    pub fn split_set_share_price_and_amount(
        &mut self,
        id: SplitId,
        price: &Numeric,
        amount: Numeric,
    ) -> EngineResult<()> {
        self.edit_split(id, |s, scu, fraction| {
            s.amount = amount.rounded_to(scu);
            s.value = (&s.amount * price).rounded_to(fraction);
            s.gains |= GainsStatus::A_VDIRTY;
        })
    }

    /// Derive the value from the current amount and a per-unit price
    pub fn split_set_share_price(&mut self, id: SplitId, price: &Numeric) -> EngineResult<()> {
        self.edit_split(id, |s, _, fraction| {
            s.value = (&s.amount * price).rounded_to(fraction);
            s.gains |= GainsStatus::VALU_DIRTY;
        })
    }

    /// Set the split's worth in `base`, which must be the transaction
    /// currency or the account commodity
    pub fn split_set_base_value(
        &mut self,
        id: SplitId,
        value: Numeric,
        base: &Commodity,
    ) -> EngineResult<()> {
        let split = self.split(id)?;
        let acc = split.account.ok_or_else(|| {
            EngineError::InvalidArgument(format!("split {} has no account", id))
        })?;
        let currency = self.split_transaction(id)?.currency.clone();
        let commodity = self.account(acc)?.commodity.clone();
        let commodity_is_base = commodity.as_ref().is_some_and(|c| c.equiv(base));

        if currency.equiv(base) {
            self.edit_split(id, |s, scu, fraction| {
                if commodity_is_base {
                    s.amount = value.rounded_to(scu);
                }
                s.value = value.rounded_to(fraction);
                s.gains |= GainsStatus::A_VDIRTY;
            })
        } else if commodity_is_base {
            self.edit_split(id, |s, scu, _| {
                s.amount = value.rounded_to(scu);
                s.gains |= GainsStatus::AMNT_DIRTY;
            })
        } else {
            Err(EngineError::InvalidArgument(format!(
                "{} is neither the transaction currency nor the account commodity",
                base
            )))
        }
    }

    /// Change the reconcile state
    pub fn split_set_reconcile(&mut self, id: SplitId, reconcile: Reconcile) -> EngineResult<()> {
        if self.split(id)?.reconcile == reconcile {
            return Ok(());
        }
        self.edit_split(id, |s, _, _| s.reconcile = reconcile)
    }

    /// Record when the split was reconciled
    pub fn split_set_date_reconciled(&mut self, id: SplitId, date: DateTime<Utc>) -> EngineResult<()> {
        self.edit_split(id, |s, _, _| s.date_reconciled = Some(date))
    }

    /// Set the memo
    pub fn split_set_memo(&mut self, id: SplitId, memo: &str) -> EngineResult<()> {
        self.edit_split(id, |s, _, _| s.memo = memo.to_string())
    }

    /// Set the action
    pub fn split_set_action(&mut self, id: SplitId, action: &str) -> EngineResult<()> {
        self.edit_split(id, |s, _, _| s.action = action.to_string())
    }

    /// Move a split to another account
    pub fn split_set_account(&mut self, id: SplitId, acc: AccountId) -> EngineResult<()> {
        self.account(acc)?;
        let trans = self.split(id)?.parent;
        self.trans_begin_edit(trans)?;
        let result = self.account_insert_split(acc, id);
        self.trans_commit_edit(trans)?;
        result
    }

    /// Remove a split from its account, lot and transaction
    ///
    /// Refused for read-only transactions unless the account is being
    /// destroyed or the book is closing. Destroying a split also destroys
    /// the transaction carrying its realized gain.
    pub fn split_destroy(&mut self, id: SplitId) -> EngineResult<()> {
        let (trans, account, gains_split, gains_source) = {
            let split = self.split(id)?;
            (split.parent, split.account, split.gains_split, split.gains_source)
        };
        if let Some(reason) = self.transaction(trans)?.read_only.clone() {
            let account_going = account
                .and_then(|a| self.accounts.get(a))
                .is_some_and(|a| a.inst.is_destroying());
            if !account_going && !self.is_shutting_down() {
                return Err(EngineError::ReadOnly {
                    guid: trans.guid(),
                    reason,
                });
            }
        }
        debug!("destroying split {}", id);

        self.trans_begin_edit(trans)?;

        if let Some(source) = gains_source {
            if let Some(s) = self.splits.get_mut(source) {
                if s.gains_split == Some(id) {
                    s.gains_split = None;
                    s.gains |= GainsStatus::A_VDIRTY;
                }
            }
        }
        if let Some(gains) = gains_split {
            let gains_trans = self.splits.get(gains).map(|g| g.parent);
            if let Some(s) = self.splits.get_mut(gains) {
                s.gains_source = None;
            }
            if let Some(gains_trans) = gains_trans.filter(|t| *t != trans) {
                if let Err(err) = self.trans_destroy(gains_trans) {
                    warn!("could not destroy gains transaction {}: {}", gains_trans, err);
                }
            }
        }

        if let Some(acc) = account.filter(|a| self.accounts.contains(*a)) {
            self.account_remove_split(acc, id)?;
        }
        if let Some(lot) = self.split(id)?.lot {
            if self.lots.contains(lot) {
                self.lot_remove_split(lot, id)?;
            }
        }
        if let Some(t) = self.transactions.get_mut(trans) {
            t.splits.retain(|s| *s != id);
            t.inst.set_dirty();
        }
        self.splits.remove(id);
        self.emit(EventKind::DESTROY, IdType::Split, id.guid());

        self.trans_commit_edit(trans)
    }

    /// Canonical split ordering: by transaction, then memo, action,
    /// reconcile state, amount, value, reconcile date and GUID
    pub fn split_order(&self, a: SplitId, b: SplitId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let (Some(sa), Some(sb)) = (self.splits.get(a), self.splits.get(b)) else {
            return Ordering::Equal;
        };
        self.trans_order(sa.parent, sb.parent)
            .then_with(|| sa.memo.cmp(&sb.memo))
            .then_with(|| sa.action.cmp(&sb.action))
            .then_with(|| sa.reconcile.as_char().cmp(&sb.reconcile.as_char()))
            .then_with(|| sa.amount.cmp(&sb.amount))
            .then_with(|| sa.value.cmp(&sb.value))
            .then_with(|| sa.date_reconciled.cmp(&sb.date_reconciled))
            .then_with(|| sa.inst.guid().cmp(&sb.inst.guid()))
    }

    /// Value per unit of amount; 1 when both are zero, 0 when only the amount is
    pub fn split_share_price(&self, id: SplitId) -> EngineResult<Numeric> {
        let split = self.split(id)?;
        if split.amount.is_zero() {
            return Ok(if split.value.is_zero() {
                Numeric::from_i64(1)
            } else {
                Numeric::zero()
            });
        }
        Ok(split.value.checked_div(&split.amount)?)
    }

    /// Realized gain recorded for a split, recomputing it if stale
    pub fn split_cap_gains(&mut self, id: SplitId) -> EngineResult<Numeric> {
        let split = self.split(id)?;
        if split.gains.contains(GainsStatus::GAINS) {
            return Ok(split.value.clone());
        }
        let stale = split.gains.intersects(GainsStatus::A_VDIRTY)
            || split
                .gains_split
                .and_then(|g| self.splits.get(g))
                .is_some_and(|g| g.gains.intersects(GainsStatus::A_VDIRTY));
        if stale && split.lot.is_some() {
            self.split_compute_cap_gains(id, None)?;
        }
        Ok(self
            .split(id)?
            .gains_split
            .and_then(|g| self.splits.get(g))
            .map(|g| g.value.clone())
            .unwrap_or_default())
    }

    /// For a gains split, the split whose gain it records
    pub fn split_gains_source(&self, id: SplitId) -> EngineResult<Option<SplitId>> {
        Ok(self.split(id)?.gains_source)
    }

    /// The conceptual counterpart of a split
    ///
    /// Defined for two-split transactions, and for transactions where this
    /// split was broken up across lots and ignoring the lot fragments leaves
    /// exactly one other split.
    pub fn split_other_split(&self, id: SplitId) -> EngineResult<Option<SplitId>> {
        let split = self.split(id)?;
        let trans = self.transaction(split.parent)?;
        if !split.is_lot_split() && trans.splits.len() != 2 {
            return Ok(None);
        }
        let mut others = trans.splits.iter().filter(|s| {
            **s != id && self.splits.get(**s).is_some_and(|other| !other.is_lot_split())
        });
        match (others.next(), others.next()) {
            (Some(other), None) => Ok(Some(*other)),
            _ => Ok(None),
        }
    }

    /// Turn a split into a stock split: zero value, amount only
    pub fn split_make_stock_split(&mut self, id: SplitId) -> EngineResult<()> {
        self.edit_split(id, |s, _, _| {
            s.value = Numeric::zero();
            s.inst
                .slots_mut()
                .set_path(SPLIT_TYPE, KvpValue::String("stock-split".into()));
            s.gains |= GainsStatus::VALU_DIRTY;
        })
    }

    /// Zero a split, keeping its former amount and value in its slots
    pub(crate) fn split_void(&mut self, id: SplitId) -> EngineResult<()> {
        self.edit_split(id, |s, _, _| {
            let slots = s.inst.slots_mut();
            slots.set_path(VOID_FORMER_AMOUNT, KvpValue::Numeric(s.amount.clone()));
            slots.set_path(VOID_FORMER_VALUE, KvpValue::Numeric(s.value.clone()));
            s.amount = Numeric::zero();
            s.value = Numeric::zero();
            s.reconcile = Reconcile::Void;
            s.gains |= GainsStatus::A_VDIRTY;
        })
    }

    /// Restore a voided split
    pub(crate) fn split_unvoid(&mut self, id: SplitId) -> EngineResult<()> {
        self.edit_split(id, |s, _, _| {
            let slots = s.inst.slots_mut();
            let amount = slots.remove_path(VOID_FORMER_AMOUNT);
            let value = slots.remove_path(VOID_FORMER_VALUE);
            s.amount = amount
                .as_ref()
                .and_then(KvpValue::as_numeric)
                .cloned()
                .unwrap_or_default();
            s.value = value
                .as_ref()
                .and_then(KvpValue::as_numeric)
                .cloned()
                .unwrap_or_default();
            s.reconcile = Reconcile::New;
            s.gains |= GainsStatus::A_VDIRTY;
        })
    }

    /// Amount a voided split carried before voiding
    pub fn split_void_former_amount(&self, id: SplitId) -> EngineResult<Numeric> {
        Ok(self
            .split(id)?
            .inst
            .slots()
            .get_numeric(VOID_FORMER_AMOUNT)
            .cloned()
            .unwrap_or_default())
    }

    /// Value a voided split carried before voiding
    pub fn split_void_former_value(&self, id: SplitId) -> EngineResult<Numeric> {
        Ok(self
            .split(id)?
            .inst
            .slots()
            .get_numeric(VOID_FORMER_VALUE)
            .cloned()
            .unwrap_or_default())
    }
}
