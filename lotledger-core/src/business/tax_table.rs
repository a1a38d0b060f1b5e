//! Tax tables and per-account value lists
//!
//! A tax table is a named list of `(account, type, amount)` rows. Entries,
//! customers and vendors share tables and count their references. When an
//! invoice is posted, each shared table is frozen: the entry switches to an
//! invisible child copy, so later edits to the parent cannot change what a
//! posted invoice says it charged.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use lotledger_math::Numeric;
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::{EngineError, EngineResult};
use crate::event::EventKind;
use crate::guid::{AccountId, EntityId, Guid, IdType, TaxTableId};
use crate::instance::{impl_entity, Instance};

/// How an amount (a tax row or a discount) is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AmountType {
    /// A fixed value
    Value,
    /// A percentage, written as `5` for 5%
    #[default]
    Percent,
}

impl AmountType {
    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            AmountType::Value => "VALUE",
            AmountType::Percent => "PERCENT",
        }
    }
}

impl fmt::Display for AmountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmountType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALUE" => Ok(AmountType::Value),
            "PERCENT" => Ok(AmountType::Percent),
            other => Err(EngineError::InvalidArgument(format!("unknown amount type {:?}", other))),
        }
    }
}

/// One row of a tax table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTableEntry {
    /// Account the tax is collected into
    pub account: AccountId,
    /// Fixed value or percentage
    pub amount_type: AmountType,
    /// The value, or the percentage
    pub amount: Numeric,
}

/// A named, shareable list of tax rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxTable {
    pub(crate) inst: Instance,
    pub(crate) name: String,
    pub(crate) entries: Vec<TaxTableEntry>,
    #[serde(default)]
    pub(crate) refcount: i64,
    #[serde(default)]
    pub(crate) invisible: bool,
    #[serde(default)]
    pub(crate) parent: Option<TaxTableId>,
    #[serde(default)]
    pub(crate) child: Option<TaxTableId>,
    pub(crate) modtime: DateTime<Utc>,
}

impl_entity!(TaxTable, TaxTableId);

impl TaxTable {
    /// Entity id
    pub fn id(&self) -> TaxTableId {
        TaxTableId::from_guid(self.inst.guid())
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rows
    pub fn entries(&self) -> &[TaxTableEntry] {
        &self.entries
    }

    /// Number of entries, customers and vendors using the table
    pub fn refcount(&self) -> i64 {
        self.refcount
    }

    /// Frozen copies are hidden from name lookups
    pub fn is_invisible(&self) -> bool {
        self.invisible
    }

    /// The table this one is a frozen copy of
    pub fn parent(&self) -> Option<TaxTableId> {
        self.parent
    }

    /// The current frozen copy of this table
    pub fn child(&self) -> Option<TaxTableId> {
        self.child
    }

    /// When the rows last changed
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.modtime
    }
}

/// A value collected per account, e.g. the taxes of one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountValue {
    /// The account
    pub account: AccountId,
    /// Accumulated value
    pub value: Numeric,
}

/// Add `value` to the row for `account`, creating it if needed
pub fn account_value_add(list: &mut Vec<AccountValue>, account: AccountId, value: &Numeric) {
    match list.iter_mut().find(|v| v.account == account) {
        Some(row) => row.value += value,
        None => list.push(AccountValue {
            account,
            value: value.clone(),
        }),
    }
}

/// Merge every row of `other` into `list`
pub fn account_value_add_list(list: &mut Vec<AccountValue>, other: &[AccountValue]) {
    for row in other {
        account_value_add(list, row.account, &row.value);
    }
}

/// Sum of all rows
pub fn account_value_total(list: &[AccountValue]) -> Numeric {
    list.iter().map(|v| &v.value).sum()
}

impl Book {
    /// Look up a tax table
    pub fn tax_table(&self, id: TaxTableId) -> EngineResult<&TaxTable> {
        self.tax_tables.require(id)
    }

    /// Every tax table, frozen copies included
    pub fn tax_tables(&self) -> impl Iterator<Item = &TaxTable> {
        self.tax_tables.iter()
    }

    /// Find a visible table by name
    pub fn lookup_tax_table_by_name(&self, name: &str) -> Option<TaxTableId> {
        self.tax_tables
            .iter()
            .find(|t| !t.invisible && t.name == name)
            .map(|t| t.id())
    }

    /// Create an empty, visible table
    pub fn create_tax_table(&mut self, name: &str) -> TaxTableId {
        let table = TaxTable {
            inst: Instance::new(Guid::new()),
            name: name.to_string(),
            entries: Vec::new(),
            refcount: 0,
            invisible: false,
            parent: None,
            child: None,
            modtime: Utc::now(),
        };
        let id = table.id();
        self.tax_tables.insert(table);
        self.emit(EventKind::CREATE, IdType::TaxTable, id.guid());
        id
    }

    fn edit_tax_table<F>(&mut self, id: TaxTableId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut TaxTable),
    {
        let table = self.tax_tables.require_mut(id)?;
        apply(table);
        table.inst.set_dirty();
        self.tax_tables.mark_dirty();
        self.emit(EventKind::MODIFY, IdType::TaxTable, id.guid());
        Ok(())
    }

    /// Rename
    pub fn tax_table_set_name(&mut self, id: TaxTableId, name: &str) -> EngineResult<()> {
        self.edit_tax_table(id, |t| t.name = name.to_string())
    }

    /// Append a row; the next posting freezes a fresh copy
    pub fn tax_table_add_entry(
        &mut self,
        id: TaxTableId,
        account: AccountId,
        amount_type: AmountType,
        amount: Numeric,
    ) -> EngineResult<()> {
        self.account(account)?;
        self.edit_tax_table(id, |t| {
            t.entries.push(TaxTableEntry {
                account,
                amount_type,
                amount,
            });
            t.modtime = Utc::now();
            t.child = None;
        })
    }

    /// Drop every row collecting into `account`; true if any went
    pub fn tax_table_remove_entry(&mut self, id: TaxTableId, account: AccountId) -> EngineResult<bool> {
        let before = self.tax_table(id)?.entries.len();
        self.edit_tax_table(id, |t| {
            t.entries.retain(|e| e.account != account);
            t.modtime = Utc::now();
            t.child = None;
        })?;
        Ok(self.tax_table(id)?.entries.len() != before)
    }

    /// Count one more user; frozen copies are not counted
    pub fn tax_table_inc_ref(&mut self, id: TaxTableId) -> EngineResult<()> {
        if self.tax_table(id)?.parent.is_some() {
            return Ok(());
        }
        self.edit_tax_table(id, |t| t.refcount += 1)
    }

    /// Count one user fewer; frozen copies are not counted
    pub fn tax_table_dec_ref(&mut self, id: TaxTableId) -> EngineResult<()> {
        let table = self.tax_table(id)?;
        if table.parent.is_some() {
            return Ok(());
        }
        if table.refcount <= 0 {
            warn!("tax table {} released more often than it was used", table.name);
            return Ok(());
        }
        self.edit_tax_table(id, |t| t.refcount -= 1)
    }

    /// The frozen copy of a table, creating it when `make_new` is set
    ///
    /// A table that is already a frozen copy is its own child.
    pub fn tax_table_return_child(&mut self, id: TaxTableId, make_new: bool) -> EngineResult<Option<TaxTableId>> {
        let table = self.tax_table(id)?;
        if table.parent.is_some() {
            return Ok(Some(id));
        }
        if let Some(child) = table.child.filter(|c| self.tax_tables.contains(*c)) {
            return Ok(Some(child));
        }
        if !make_new {
            return Ok(None);
        }

        let name = table.name.clone();
        let entries = table.entries.clone();
        debug!("freezing tax table {}", name);
        let child = self.create_tax_table(&name);
        self.edit_tax_table(child, |t| {
            t.entries = entries;
            t.parent = Some(id);
            t.refcount = 0;
            t.invisible = true;
        })?;
        self.edit_tax_table(id, |t| t.child = Some(child))?;
        Ok(Some(child))
    }

    /// Remove a table nobody uses
    pub fn tax_table_destroy(&mut self, id: TaxTableId) -> EngineResult<()> {
        let table = self.tax_table(id)?;
        if table.refcount > 0 {
            return Err(EngineError::InvalidArgument(format!(
                "tax table {} is still used {} time(s)",
                table.name, table.refcount
            )));
        }
        let parent = table.parent;
        if let Some(parent) = parent.and_then(|p| self.tax_tables.get_mut(p)) {
            if parent.child == Some(id) {
                parent.child = None;
            }
        }
        for other in self.tax_tables.iter_mut() {
            if other.parent == Some(id) {
                other.parent = None;
            }
        }
        self.tax_tables.remove(id);
        self.emit(EventKind::DESTROY, IdType::TaxTable, id.guid());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;

    #[test]
    fn test_amount_type_names() {
        assert_eq!("VALUE".parse::<AmountType>().unwrap(), AmountType::Value);
        assert_eq!(AmountType::Percent.to_string(), "PERCENT");
        assert!("BOTH".parse::<AmountType>().is_err());
    }

    #[test]
    fn test_account_value_lists() {
        let a = AccountId::new();
        let b = AccountId::new();
        let mut list = Vec::new();
        account_value_add(&mut list, a, &Numeric::from_i64(3));
        account_value_add(&mut list, b, &Numeric::from_i64(4));
        account_value_add(&mut list, a, &Numeric::from_i64(5));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].value, Numeric::from_i64(8));

        let mut other = vec![AccountValue { account: b, value: Numeric::from_i64(1) }];
        account_value_add_list(&mut other, &list);
        assert_eq!(account_value_total(&other), Numeric::from_i64(13));
        assert_eq!(account_value_total(&[]), Numeric::zero());
    }

    #[test]
    fn test_return_child_freezes_once() {
        let mut book = Book::new();
        let acc = book.create_account(AccountType::Liability, "Sales Tax");
        let table = book.create_tax_table("State");
        book.tax_table_add_entry(table, acc, AmountType::Percent, Numeric::from_i64(8)).unwrap();

        assert_eq!(book.tax_table_return_child(table, false).unwrap(), None);
        let child = book.tax_table_return_child(table, true).unwrap().unwrap();
        assert_ne!(child, table);
        assert_eq!(book.tax_table_return_child(table, true).unwrap(), Some(child));
        assert_eq!(book.tax_table_return_child(child, true).unwrap(), Some(child));

        let frozen = book.tax_table(child).unwrap();
        assert!(frozen.is_invisible());
        assert_eq!(frozen.parent(), Some(table));
        assert_eq!(frozen.entries(), book.tax_table(table).unwrap().entries());
        assert_eq!(book.lookup_tax_table_by_name("State"), Some(table));
    }

    #[test]
    fn test_children_are_not_counted() {
        let mut book = Book::new();
        let table = book.create_tax_table("State");
        let child = book.tax_table_return_child(table, true).unwrap().unwrap();
        book.tax_table_inc_ref(child).unwrap();
        assert_eq!(book.tax_table(child).unwrap().refcount(), 0);

        book.tax_table_inc_ref(table).unwrap();
        assert!(book.tax_table_destroy(table).is_err());
        book.tax_table_dec_ref(table).unwrap();
        book.tax_table_dec_ref(table).unwrap();
        assert_eq!(book.tax_table(table).unwrap().refcount(), 0);
        book.tax_table_destroy(table).unwrap();
        assert_eq!(book.tax_table(child).unwrap().parent(), None);
    }

    #[test]
    fn test_edits_touch_modtime() {
        let mut book = Book::new();
        let acc = book.create_account(AccountType::Liability, "Sales Tax");
        let table = book.create_tax_table("State");
        let created = book.tax_table(table).unwrap().last_modified();
        book.tax_table_add_entry(table, acc, AmountType::Value, Numeric::from_i64(2)).unwrap();
        assert!(book.tax_table(table).unwrap().last_modified() >= created);
        assert!(book.tax_table_remove_entry(table, acc).unwrap());
        assert!(!book.tax_table_remove_entry(table, acc).unwrap());
    }
}
