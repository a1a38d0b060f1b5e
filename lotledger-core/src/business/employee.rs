//! Employees: people whose expense vouchers we reimburse

use lotledger_math::{Commodity, Numeric};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::EngineResult;
use crate::event::EventKind;
use crate::guid::{AccountId, EmployeeId, EntityId, Guid, IdType};
use crate::instance::{impl_entity, Instance};

/// Someone who files expense vouchers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub(crate) inst: Instance,
    pub(crate) business_id: String,
    pub(crate) username: String,
    pub(crate) name: String,
    pub(crate) currency: Commodity,
    #[serde(default)]
    pub(crate) rate: Numeric,
    pub(crate) active: bool,
    #[serde(default)]
    pub(crate) ccard_account: Option<AccountId>,
}

impl_entity!(Employee, EmployeeId);

impl Employee {
    /// Entity id
    pub fn id(&self) -> EmployeeId {
        EmployeeId::from_guid(self.inst.guid())
    }

    /// Business id
    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    /// Login name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Full name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reimbursement currency
    pub fn currency(&self) -> &Commodity {
        &self.currency
    }

    /// Default hourly rate
    pub fn rate(&self) -> &Numeric {
        &self.rate
    }

    /// Active flag
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Company credit card the employee charges card expenses to
    pub fn ccard_account(&self) -> Option<AccountId> {
        self.ccard_account
    }
}

impl Book {
    /// Look up an employee
    pub fn employee(&self, id: EmployeeId) -> EngineResult<&Employee> {
        self.employees.require(id)
    }

    /// Every employee
    pub fn employees(&self) -> impl Iterator<Item = &Employee> {
        self.employees.iter()
    }

    /// Find an employee by login name
    pub fn lookup_employee_by_username(&self, username: &str) -> Option<EmployeeId> {
        self.employees
            .iter()
            .find(|e| e.username == username)
            .map(|e| e.id())
    }

    /// Create an active employee with the next business id
    pub fn create_employee(&mut self, username: &str, name: &str, currency: &Commodity) -> EmployeeId {
        let employee = Employee {
            inst: Instance::new(Guid::new()),
            business_id: self.next_id(IdType::Employee),
            username: username.to_string(),
            name: name.to_string(),
            currency: currency.clone(),
            rate: Numeric::zero(),
            active: true,
            ccard_account: None,
        };
        let id = employee.id();
        self.employees.insert(employee);
        self.emit(EventKind::CREATE, IdType::Employee, id.guid());
        id
    }

    fn edit_employee<F>(&mut self, id: EmployeeId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Employee),
    {
        let employee = self.employees.require_mut(id)?;
        apply(employee);
        employee.inst.set_dirty();
        self.employees.mark_dirty();
        self.emit(EventKind::MODIFY, IdType::Employee, id.guid());
        Ok(())
    }

    /// Change the full name
    pub fn employee_set_name(&mut self, id: EmployeeId, name: &str) -> EngineResult<()> {
        self.edit_employee(id, |e| e.name = name.to_string())
    }

    /// Set the default rate
    pub fn employee_set_rate(&mut self, id: EmployeeId, rate: Numeric) -> EngineResult<()> {
        self.edit_employee(id, |e| e.rate = rate)
    }

    /// Activate or retire
    pub fn employee_set_active(&mut self, id: EmployeeId, active: bool) -> EngineResult<()> {
        self.edit_employee(id, |e| e.active = active)
    }

    /// Set or clear the company credit card account
    pub fn employee_set_ccard_account(&mut self, id: EmployeeId, acc: Option<AccountId>) -> EngineResult<()> {
        if let Some(acc) = acc {
            self.account(acc)?;
        }
        self.edit_employee(id, |e| e.ccard_account = acc)
    }

    /// Remove an employee
    pub fn employee_destroy(&mut self, id: EmployeeId) -> EngineResult<()> {
        self.employees.remove(id);
        self.emit(EventKind::DESTROY, IdType::Employee, id.guid());
        Ok(())
    }
}
