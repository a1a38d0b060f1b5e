//! Jobs: named pieces of work billed through a customer or vendor

use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::business::owner::Owner;
use crate::error::{EngineError, EngineResult};
use crate::event::EventKind;
use crate::guid::{EntityId, Guid, IdType, JobId};
use crate::instance::{impl_entity, Instance};

/// A project belonging to a customer or vendor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub(crate) inst: Instance,
    pub(crate) business_id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) reference: String,
    pub(crate) owner: Owner,
    pub(crate) active: bool,
}

impl_entity!(Job, JobId);

impl Job {
    /// Entity id
    pub fn id(&self) -> JobId {
        JobId::from_guid(self.inst.guid())
    }

    /// Business id
    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form reference, e.g. a purchase order number
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Owning customer or vendor
    pub fn owner(&self) -> Owner {
        self.owner
    }

    /// Active flag
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Book {
    /// Look up a job
    pub fn job(&self, id: JobId) -> EngineResult<&Job> {
        self.jobs.require(id)
    }

    /// Every job
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Jobs belonging to `owner`
    pub fn owner_jobs(&self, owner: Owner) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|j| j.owner == owner)
            .map(|j| j.id())
            .collect()
    }

    fn check_job_owner(&self, owner: Owner) -> EngineResult<()> {
        match owner {
            Owner::Customer(_) | Owner::Vendor(_) if self.owner_exists(owner) => Ok(()),
            Owner::Customer(_) | Owner::Vendor(_) => {
                Err(EngineError::not_found(owner.owner_type_id(), owner.guid()))
            }
            _ => Err(EngineError::InvalidArgument(format!(
                "a job must belong to a customer or vendor, not {}",
                owner
            ))),
        }
    }

    /// Create an active job for a customer or vendor
    pub fn create_job(&mut self, owner: Owner, name: &str) -> EngineResult<JobId> {
        self.check_job_owner(owner)?;
        let job = Job {
            inst: Instance::new(Guid::new()),
            business_id: self.next_id(IdType::Job),
            name: name.to_string(),
            reference: String::new(),
            owner,
            active: true,
        };
        let id = job.id();
        self.jobs.insert(job);
        self.emit(EventKind::CREATE, IdType::Job, id.guid());
        Ok(id)
    }

    fn edit_job<F>(&mut self, id: JobId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Job),
    {
        let job = self.jobs.require_mut(id)?;
        apply(job);
        job.inst.set_dirty();
        self.jobs.mark_dirty();
        self.emit(EventKind::MODIFY, IdType::Job, id.guid());
        Ok(())
    }

    /// Rename
    pub fn job_set_name(&mut self, id: JobId, name: &str) -> EngineResult<()> {
        self.edit_job(id, |j| j.name = name.to_string())
    }

    /// Set the reference
    pub fn job_set_reference(&mut self, id: JobId, reference: &str) -> EngineResult<()> {
        self.edit_job(id, |j| j.reference = reference.to_string())
    }

    /// Hand the job to another customer or vendor
    pub fn job_set_owner(&mut self, id: JobId, owner: Owner) -> EngineResult<()> {
        self.check_job_owner(owner)?;
        self.edit_job(id, |j| j.owner = owner)
    }

    /// Activate or close
    pub fn job_set_active(&mut self, id: JobId, active: bool) -> EngineResult<()> {
        self.edit_job(id, |j| j.active = active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotledger_math::Commodity;

    #[test]
    fn test_job_owner_rules() {
        let mut book = Book::new();
        let usd = Commodity::currency("USD", 100);
        let customer = book.create_customer("Ann", &usd);
        let employee = book.create_employee("bob", "Bob", &usd);
        let job = book.create_job(Owner::Customer(customer), "Fit-out").unwrap();

        assert!(matches!(
            book.create_job(Owner::Employee(employee), "Nope"),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            book.create_job(Owner::Job(job), "Nested"),
            Err(EngineError::InvalidArgument(_))
        ));
        assert_eq!(book.owner_jobs(Owner::Customer(customer)), vec![job]);
    }
}
