//! Customers: the people we invoice

use lotledger_math::{Commodity, Numeric};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::EngineResult;
use crate::event::EventKind;
use crate::guid::{CustomerId, EntityId, Guid, IdType, TaxTableId};
use crate::instance::{impl_entity, Instance};

/// Someone we send invoices to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub(crate) inst: Instance,
    pub(crate) business_id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) notes: String,
    pub(crate) currency: Commodity,
    #[serde(default)]
    pub(crate) discount: Numeric,
    #[serde(default)]
    pub(crate) credit: Numeric,
    pub(crate) active: bool,
    #[serde(default)]
    pub(crate) tax_table: Option<TaxTableId>,
}

impl_entity!(Customer, CustomerId);

impl Customer {
    /// Entity id
    pub fn id(&self) -> CustomerId {
        CustomerId::from_guid(self.inst.guid())
    }

    /// Business id, e.g. `000001`
    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Notes
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Trading currency
    pub fn currency(&self) -> &Commodity {
        &self.currency
    }

    /// Default discount percentage for new entries
    pub fn discount(&self) -> &Numeric {
        &self.discount
    }

    /// Credit limit
    pub fn credit(&self) -> &Numeric {
        &self.credit
    }

    /// Whether the customer shows up in selection lists
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Default tax table for new entries
    pub fn tax_table(&self) -> Option<TaxTableId> {
        self.tax_table
    }
}

impl Book {
    /// Look up a customer
    pub fn customer(&self, id: CustomerId) -> EngineResult<&Customer> {
        self.customers.require(id)
    }

    /// Every customer
    pub fn customers(&self) -> impl Iterator<Item = &Customer> {
        self.customers.iter()
    }

    /// Find a customer by business id
    pub fn lookup_customer_by_id(&self, id: &str) -> Option<CustomerId> {
        self.customers
            .iter()
            .find(|c| c.business_id == id)
            .map(|c| c.id())
    }

    /// Create an active customer with the next business id
    pub fn create_customer(&mut self, name: &str, currency: &Commodity) -> CustomerId {
        let business_id = self.next_id(IdType::Customer);
        let customer = Customer {
            inst: Instance::new(Guid::new()),
            business_id,
            name: name.to_string(),
            notes: String::new(),
            currency: currency.clone(),
            discount: Numeric::zero(),
            credit: Numeric::zero(),
            active: true,
            tax_table: None,
        };
        let id = customer.id();
        self.customers.insert(customer);
        self.emit(EventKind::CREATE, IdType::Customer, id.guid());
        id
    }

    fn edit_customer<F>(&mut self, id: CustomerId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Customer),
    {
        let customer = self.customers.require_mut(id)?;
        apply(customer);
        customer.inst.set_dirty();
        self.customers.mark_dirty();
        self.emit(EventKind::MODIFY, IdType::Customer, id.guid());
        Ok(())
    }

    /// Rename
    pub fn customer_set_name(&mut self, id: CustomerId, name: &str) -> EngineResult<()> {
        self.edit_customer(id, |c| c.name = name.to_string())
    }

    /// Set the notes
    pub fn customer_set_notes(&mut self, id: CustomerId, notes: &str) -> EngineResult<()> {
        self.edit_customer(id, |c| c.notes = notes.to_string())
    }

    /// Set the default discount
    pub fn customer_set_discount(&mut self, id: CustomerId, discount: Numeric) -> EngineResult<()> {
        self.edit_customer(id, |c| c.discount = discount)
    }

    /// Set the credit limit
    pub fn customer_set_credit(&mut self, id: CustomerId, credit: Numeric) -> EngineResult<()> {
        self.edit_customer(id, |c| c.credit = credit)
    }

    /// Activate or retire
    pub fn customer_set_active(&mut self, id: CustomerId, active: bool) -> EngineResult<()> {
        self.edit_customer(id, |c| c.active = active)
    }

    /// Change the default tax table, moving the reference count
    pub fn customer_set_tax_table(&mut self, id: CustomerId, table: Option<TaxTableId>) -> EngineResult<()> {
        let old = self.customer(id)?.tax_table;
        if old == table {
            return Ok(());
        }
        if let Some(table) = table {
            self.tax_table_inc_ref(table)?;
        }
        if let Some(old) = old {
            self.tax_table_dec_ref(old)?;
        }
        self.edit_customer(id, |c| c.tax_table = table)
    }

    /// Remove a customer, releasing its tax table reference
    pub fn customer_destroy(&mut self, id: CustomerId) -> EngineResult<()> {
        self.customer_set_tax_table(id, None)?;
        self.customers.remove(id);
        self.emit(EventKind::DESTROY, IdType::Customer, id.guid());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business::AmountType;

    #[test]
    fn test_create_assigns_ids() {
        let mut book = Book::new();
        let usd = Commodity::currency("USD", 100);
        let a = book.create_customer("Ann", &usd);
        let b = book.create_customer("Bob", &usd);
        assert_eq!(book.customer(a).unwrap().business_id(), "000001");
        assert_eq!(book.customer(b).unwrap().business_id(), "000002");
        assert_eq!(book.lookup_customer_by_id("000002"), Some(b));
        assert!(book.customer(a).unwrap().is_active());
    }

    #[test]
    fn test_tax_table_reference_moves() {
        let mut book = Book::new();
        let usd = Commodity::currency("USD", 100);
        let tax_acc = book.create_account(crate::account::AccountType::Liability, "Sales Tax");
        let t1 = book.create_tax_table("State");
        let t2 = book.create_tax_table("County");
        book.tax_table_add_entry(t1, tax_acc, AmountType::Percent, Numeric::from_i64(5)).unwrap();
        let c = book.create_customer("Ann", &usd);

        book.customer_set_tax_table(c, Some(t1)).unwrap();
        assert_eq!(book.tax_table(t1).unwrap().refcount(), 1);
        book.customer_set_tax_table(c, Some(t2)).unwrap();
        assert_eq!(book.tax_table(t1).unwrap().refcount(), 0);
        assert_eq!(book.tax_table(t2).unwrap().refcount(), 1);
        book.customer_destroy(c).unwrap();
        assert_eq!(book.tax_table(t2).unwrap().refcount(), 0);
        assert!(book.customer(c).is_err());
    }
}
