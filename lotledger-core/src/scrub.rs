//! Repair passes for splits and transactions
//!
//! Scrubbers fix data that the edit API would not have produced: splits
//! whose amount and value disagree in a single-currency account, splits with
//! no account, and transactions whose values do not sum to zero. Problems
//! are logged and repaired in place; only lookups of missing entities fail.
//!
//! Orphaned splits are adopted by a top-level `Orphan-<CUR>` bank account.
//! Imbalances are absorbed by `Imbalance-<CUR>`, or by an explicit account.

use log::{debug, info, trace};
use lotledger_math::Numeric;

use crate::account::AccountType;
use crate::book::Book;
use crate::error::EngineResult;
use crate::guid::{AccountId, SplitId, TransId};

/// Name prefix of the account absorbing imbalances
pub const IMBALANCE_PREFIX: &str = "Imbalance";
/// Name prefix of the account adopting splits that have none
pub const ORPHAN_PREFIX: &str = "Orphan";

impl Book {
    /// Make the amount equal the value where the account holds the transaction currency
    ///
    /// A split with no account always gets its value as amount. Returns
    /// true when the split changed.
    pub fn split_scrub(&mut self, split: SplitId) -> EngineResult<bool> {
        let (account, amount, value, trans) = {
            let s = self.split(split)?;
            (s.account, s.amount.clone(), s.value.clone(), s.parent)
        };
        let currency = self.transaction(trans)?.currency.clone();

        let fraction = match account {
            None => currency.fraction(),
            Some(acc) => {
                let account = self.account(acc)?;
                match account.commodity.as_ref() {
                    Some(commodity) if commodity.equiv(&currency) => {
                        account.commodity_scu().min(currency.fraction())
                    }
                    _ => return Ok(false),
                }
            }
        };
        if amount.rounded_to(fraction) == value.rounded_to(fraction) {
            return Ok(false);
        }

        info!("split {} has amount {} but value {}; using the value", split, amount, value);
        self.split_set_amount(split, value)?;
        Ok(true)
    }

    /// Scrub every split of a transaction
    pub fn trans_scrub_splits(&mut self, trans: TransId) -> EngineResult<()> {
        let splits = self.transaction(trans)?.splits.clone();
        for split in splits {
            if self.splits.contains(split) {
                self.split_scrub(split)?;
            }
        }
        Ok(())
    }

    /// Balance a transaction by adjusting or adding a split
    ///
    /// The imbalance is taken up by `account` when given, otherwise by the
    /// `Imbalance-<CUR>` account. A balancing split that ends up at zero in
    /// the imbalance account is removed. Returns true when a value changed.
    pub fn trans_scrub_imbalance(&mut self, trans: TransId, account: Option<AccountId>) -> EngineResult<bool> {
        let was_open = self.transaction(trans)?.inst.is_editing();
        if !was_open {
            self.trans_begin_edit(trans)?;
        }
        let result = self.scrub_imbalance_inner(trans, account);
        if !was_open {
            self.trans_commit_edit(trans)?;
        }
        result
    }

    fn scrub_imbalance_inner(&mut self, trans: TransId, account: Option<AccountId>) -> EngineResult<bool> {
        self.trans_scrub_splits(trans)?;

        let imbalance = self.trans_imbalance(trans)?;
        if imbalance.is_zero() {
            return Ok(false);
        }
        let currency = self.transaction(trans)?.currency.clone();
        let target = match account {
            Some(acc) => acc,
            None => self.get_or_make_account(IMBALANCE_PREFIX, &currency, AccountType::Bank)?,
        };
        debug!("transaction {} is off by {}", trans, imbalance);
        self.absorb_imbalance(trans, target, account.is_none(), &imbalance)?;
        Ok(true)
    }

    fn absorb_imbalance(
        &mut self,
        trans: TransId,
        target: AccountId,
        drop_zero: bool,
        imbalance: &Numeric,
    ) -> EngineResult<()> {
        let balance_split = match self.trans_find_split_by_account(trans, target)? {
            Some(split) => split,
            None => self.create_split(trans, target, Numeric::zero(), Numeric::zero())?,
        };

        let new_value = self.split(balance_split)?.value() - imbalance;
        self.split_set_value(balance_split, new_value.clone())?;
        let currency = self.transaction(trans)?.currency.clone();
        if self.account(target)?.commodity.as_ref().is_some_and(|c| c.equiv(&currency)) {
            self.split_set_amount(balance_split, new_value.clone())?;
        }

        if drop_zero && new_value.is_zero() {
            trace!("balancing split {} came to zero; removing it", balance_split);
            return self.split_destroy(balance_split);
        }
        self.split_scrub(balance_split).map(|_| ())
    }

    /// Give every account-less split of a transaction to `Orphan-<CUR>`
    ///
    /// Returns the number of splits adopted.
    pub fn trans_scrub_orphans(&mut self, trans: TransId) -> EngineResult<usize> {
        let orphans: Vec<SplitId> = self
            .transaction(trans)?
            .splits
            .iter()
            .copied()
            .filter(|s| self.splits.get(*s).is_some_and(|s| s.account.is_none()))
            .collect();
        if orphans.is_empty() {
            return Ok(0);
        }
        let currency = self.transaction(trans)?.currency.clone();
        let orphan_account = self.get_or_make_account(ORPHAN_PREFIX, &currency, AccountType::Bank)?;
        for split in &orphans {
            debug!("adopting orphan split {}", split);
            self.split_set_account(*split, orphan_account)?;
        }
        Ok(orphans.len())
    }

    /// Scrub orphans in every transaction touching an account
    pub fn account_scrub_orphans(&mut self, acc: AccountId) -> EngineResult<usize> {
        trace!("looking for orphans in {}", self.account(acc)?.name);
        let mut adopted = 0;
        for trans in self.account_transactions(acc)? {
            if self.transactions.contains(trans) {
                adopted += self.trans_scrub_orphans(trans)?;
            }
        }
        Ok(adopted)
    }

    /// Scrub orphans below and in an account
    pub fn account_tree_scrub_orphans(&mut self, acc: AccountId) -> EngineResult<usize> {
        let mut adopted = 0;
        for child in self.account(acc)?.children.clone() {
            adopted += self.account_tree_scrub_orphans(child)?;
        }
        Ok(adopted + self.account_scrub_orphans(acc)?)
    }

    /// Rebalance every transaction touching an account
    ///
    /// Returns the number of transactions that changed.
    pub fn account_scrub_imbalance(&mut self, acc: AccountId) -> EngineResult<usize> {
        trace!("looking for imbalance in {}", self.account(acc)?.name);
        let mut fixed = 0;
        for trans in self.account_transactions(acc)? {
            if self.transactions.contains(trans) && self.trans_scrub_imbalance(trans, None)? {
                fixed += 1;
            }
        }
        Ok(fixed)
    }

    /// Rebalance transactions below and in an account
    pub fn account_tree_scrub_imbalance(&mut self, acc: AccountId) -> EngineResult<usize> {
        let mut fixed = 0;
        for child in self.account(acc)?.children.clone() {
            fixed += self.account_tree_scrub_imbalance(child)?;
        }
        Ok(fixed + self.account_scrub_imbalance(acc)?)
    }

    fn account_transactions(&self, acc: AccountId) -> EngineResult<Vec<TransId>> {
        let mut seen = Vec::new();
        for split in &self.account(acc)?.splits {
            if let Some(s) = self.splits.get(*split) {
                if !seen.contains(&s.parent) {
                    seen.push(s.parent);
                }
            }
        }
        Ok(seen)
    }
}
