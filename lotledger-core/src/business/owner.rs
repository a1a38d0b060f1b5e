//! Owners: who an invoice, job or lot belongs to

use std::fmt;

use lotledger_math::Commodity;
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::{EngineError, EngineResult};
use crate::guid::{CustomerId, EmployeeId, EntityId, Guid, IdType, JobId, LotId, VendorId};
use crate::kvp::KvpValue;

/// Lot slot holding the owner's type code
pub const OWNER_TYPE_SLOT: &str = "gncOwner/owner-type";
/// Lot slot holding the owner's GUID
pub const OWNER_GUID_SLOT: &str = "gncOwner/owner-guid";

/// Kind of owner, with the code stored in lot slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OwnerType {
    /// A customer
    Customer = 2,
    /// A job for a customer or vendor
    Job = 3,
    /// A vendor
    Vendor = 4,
    /// An employee
    Employee = 5,
}

impl OwnerType {
    /// Slot code
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Parse a slot code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(OwnerType::Customer),
            3 => Some(OwnerType::Job),
            4 => Some(OwnerType::Vendor),
            5 => Some(OwnerType::Employee),
            _ => None,
        }
    }
}

/// A customer, job, vendor or employee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// Invoices are owed to us
    Customer(CustomerId),
    /// Work done for (or by) the job's own owner
    Job(JobId),
    /// Bills we owe
    Vendor(VendorId),
    /// Expense vouchers we owe
    Employee(EmployeeId),
}

impl Owner {
    /// The owner's kind
    pub fn owner_type(&self) -> OwnerType {
        match self {
            Owner::Customer(_) => OwnerType::Customer,
            Owner::Job(_) => OwnerType::Job,
            Owner::Vendor(_) => OwnerType::Vendor,
            Owner::Employee(_) => OwnerType::Employee,
        }
    }

    /// Entity kind of the owning entity
    pub fn owner_type_id(&self) -> IdType {
        match self {
            Owner::Customer(_) => IdType::Customer,
            Owner::Job(_) => IdType::Job,
            Owner::Vendor(_) => IdType::Vendor,
            Owner::Employee(_) => IdType::Employee,
        }
    }

    /// GUID of the owning entity
    pub fn guid(&self) -> Guid {
        match self {
            Owner::Customer(id) => id.guid(),
            Owner::Job(id) => id.guid(),
            Owner::Vendor(id) => id.guid(),
            Owner::Employee(id) => id.guid(),
        }
    }

    fn from_parts(owner_type: OwnerType, guid: Guid) -> Self {
        match owner_type {
            OwnerType::Customer => Owner::Customer(CustomerId::from_guid(guid)),
            OwnerType::Job => Owner::Job(JobId::from_guid(guid)),
            OwnerType::Vendor => Owner::Vendor(VendorId::from_guid(guid)),
            OwnerType::Employee => Owner::Employee(EmployeeId::from_guid(guid)),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.owner_type(), self.guid())
    }
}

impl Book {
    /// True when the owning entity is in this book
    pub fn owner_exists(&self, owner: Owner) -> bool {
        match owner {
            Owner::Customer(id) => self.customers.contains(id),
            Owner::Job(id) => self.jobs.contains(id),
            Owner::Vendor(id) => self.vendors.contains(id),
            Owner::Employee(id) => self.employees.contains(id),
        }
    }

    /// The owner that money is actually exchanged with; a job resolves to its owner
    pub fn owner_end(&self, owner: Owner) -> EngineResult<Owner> {
        match owner {
            Owner::Job(id) => Ok(self.job(id)?.owner()),
            other => Ok(other),
        }
    }

    /// Display name
    pub fn owner_name(&self, owner: Owner) -> EngineResult<String> {
        Ok(match owner {
            Owner::Customer(id) => self.customer(id)?.name().to_string(),
            Owner::Job(id) => self.job(id)?.name().to_string(),
            Owner::Vendor(id) => self.vendor(id)?.name().to_string(),
            Owner::Employee(id) => self.employee(id)?.name().to_string(),
        })
    }

    /// Currency the owner trades in
    pub fn owner_currency(&self, owner: Owner) -> EngineResult<Commodity> {
        Ok(match self.owner_end(owner)? {
            Owner::Customer(id) => self.customer(id)?.currency().clone(),
            Owner::Vendor(id) => self.vendor(id)?.currency().clone(),
            Owner::Employee(id) => self.employee(id)?.currency().clone(),
            Owner::Job(id) => {
                return Err(EngineError::InvalidArgument(format!(
                    "job {} is owned by another job",
                    id
                )))
            }
        })
    }

    /// Record the owner in the lot's slots
    pub fn owner_attach_to_lot(&mut self, owner: Owner, lot: LotId) -> EngineResult<()> {
        let lot = self.lot_mut(lot)?;
        let slots = lot.inst.slots_mut();
        slots.set_path(OWNER_TYPE_SLOT, KvpValue::Int64(owner.owner_type().code()));
        slots.set_path(OWNER_GUID_SLOT, KvpValue::Guid(owner.guid()));
        lot.inst.set_dirty();
        Ok(())
    }

    /// The owner recorded in the lot's slots, if it still exists
    pub fn owner_from_lot(&self, lot: LotId) -> Option<Owner> {
        let slots = self.lots.get(lot)?.inst.slots();
        let owner_type = OwnerType::from_code(slots.get_i64(OWNER_TYPE_SLOT)?)?;
        let guid = slots.get_guid(OWNER_GUID_SLOT)?;
        let owner = Owner::from_parts(owner_type, guid);
        self.owner_exists(owner).then_some(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes() {
        for t in [OwnerType::Customer, OwnerType::Job, OwnerType::Vendor, OwnerType::Employee] {
            assert_eq!(OwnerType::from_code(t.code()), Some(t));
        }
        assert_eq!(OwnerType::from_code(0), None);
    }

    #[test]
    fn test_job_resolves_to_end_owner() {
        let mut book = Book::new();
        let usd = Commodity::currency("USD", 100);
        let customer = book.create_customer("Ann's Bakery", &usd);
        let job = book
            .create_job(Owner::Customer(customer), "Wedding cake")
            .unwrap();
        assert_eq!(book.owner_end(Owner::Job(job)).unwrap(), Owner::Customer(customer));
        assert_eq!(book.owner_name(Owner::Job(job)).unwrap(), "Wedding cake");
        assert_eq!(book.owner_currency(Owner::Job(job)).unwrap(), usd);
    }

    #[test]
    fn test_lot_round_trip() {
        let mut book = Book::new();
        let usd = Commodity::currency("USD", 100);
        let vendor = book.create_vendor("Paper Supply", &usd);
        let lot = book.create_lot();
        assert_eq!(book.owner_from_lot(lot), None);

        book.owner_attach_to_lot(Owner::Vendor(vendor), lot).unwrap();
        assert_eq!(book.owner_from_lot(lot), Some(Owner::Vendor(vendor)));
    }

    #[test]
    fn test_lot_owner_must_exist() {
        let mut book = Book::new();
        let lot = book.create_lot();
        book.owner_attach_to_lot(Owner::Customer(CustomerId::new()), lot).unwrap();
        assert_eq!(book.owner_from_lot(lot), None);
    }
}
