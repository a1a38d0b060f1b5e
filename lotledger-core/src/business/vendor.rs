//! Vendors: the people who bill us

use lotledger_math::Commodity;
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::EngineResult;
use crate::event::EventKind;
use crate::guid::{EntityId, Guid, IdType, TaxTableId, VendorId};
use crate::instance::{impl_entity, Instance};

/// Someone who sends us bills
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub(crate) inst: Instance,
    pub(crate) business_id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) notes: String,
    pub(crate) currency: Commodity,
    pub(crate) active: bool,
    #[serde(default)]
    pub(crate) tax_table: Option<TaxTableId>,
}

impl_entity!(Vendor, VendorId);

impl Vendor {
    /// Entity id
    pub fn id(&self) -> VendorId {
        VendorId::from_guid(self.inst.guid())
    }

    /// Business id
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

    /// Active flag
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Default tax table for bill entries
    pub fn tax_table(&self) -> Option<TaxTableId> {
        self.tax_table
    }
}

impl Book {
    /// Look up a vendor
    pub fn vendor(&self, id: VendorId) -> EngineResult<&Vendor> {
        self.vendors.require(id)
    }

    /// Every vendor
    pub fn vendors(&self) -> impl Iterator<Item = &Vendor> {
        self.vendors.iter()
    }

    /// Find a vendor by business id
    pub fn lookup_vendor_by_id(&self, id: &str) -> Option<VendorId> {
        self.vendors
            .iter()
            .find(|v| v.business_id == id)
            .map(|v| v.id())
    }

    /// Create an active vendor with the next business id
    pub fn create_vendor(&mut self, name: &str, currency: &Commodity) -> VendorId {
        let vendor = Vendor {
            inst: Instance::new(Guid::new()),
            business_id: self.next_id(IdType::Vendor),
            name: name.to_string(),
            notes: String::new(),
            currency: currency.clone(),
            active: true,
            tax_table: None,
        };
        let id = vendor.id();
        self.vendors.insert(vendor);
        self.emit(EventKind::CREATE, IdType::Vendor, id.guid());
        id
    }

    fn edit_vendor<F>(&mut self, id: VendorId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Vendor),
    {
        let vendor = self.vendors.require_mut(id)?;
        apply(vendor);
        vendor.inst.set_dirty();
        self.vendors.mark_dirty();
        self.emit(EventKind::MODIFY, IdType::Vendor, id.guid());
        Ok(())
    }

    /// Rename
    pub fn vendor_set_name(&mut self, id: VendorId, name: &str) -> EngineResult<()> {
        self.edit_vendor(id, |v| v.name = name.to_string())
    }

    /// Set the notes
    pub fn vendor_set_notes(&mut self, id: VendorId, notes: &str) -> EngineResult<()> {
        self.edit_vendor(id, |v| v.notes = notes.to_string())
    }

    /// Activate or retire
    pub fn vendor_set_active(&mut self, id: VendorId, active: bool) -> EngineResult<()> {
        self.edit_vendor(id, |v| v.active = active)
    }

    /// Change the default tax table, moving the reference count
    pub fn vendor_set_tax_table(&mut self, id: VendorId, table: Option<TaxTableId>) -> EngineResult<()> {
        let old = self.vendor(id)?.tax_table;
        if old == table {
            return Ok(());
        }
        if let Some(table) = table {
            self.tax_table_inc_ref(table)?;
        }
        if let Some(old) = old {
            self.tax_table_dec_ref(old)?;
        }
        self.edit_vendor(id, |v| v.tax_table = table)
    }

    /// Remove a vendor, releasing its tax table reference
    pub fn vendor_destroy(&mut self, id: VendorId) -> EngineResult<()> {
        self.vendor_set_tax_table(id, None)?;
        self.vendors.remove(id);
        self.emit(EventKind::DESTROY, IdType::Vendor, id.guid());
        Ok(())
    }
}
