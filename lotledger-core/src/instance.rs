//! Shared entity state and GUID-keyed collections
//!
//! Every engine entity embeds an [`Instance`]: its GUID, its edit level,
//! dirty and destroying flags, and its KVP slots. Mutation happens inside
//! begin/commit brackets; work that depends on the entity being consistent
//! (balance recomputation, imbalance scrubbing) is deferred until the
//! outermost commit brings the level back to zero.
//!
//! Entities of one kind live in a [`Collection`] keyed by their typed id.

use indexmap::IndexMap;
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EngineError, EngineResult};
use crate::guid::{EntityId, Guid};
use crate::kvp::KvpFrame;

/// Identity, edit bracketing and slots common to all entities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    guid: Guid,
    #[serde(skip)]
    edit_level: i32,
    #[serde(skip)]
    dirty: bool,
    #[serde(skip)]
    destroying: bool,
    #[serde(default, skip_serializing_if = "KvpFrame::is_empty")]
    slots: KvpFrame,
}

impl Instance {
    /// Create a clean instance for `guid`
    pub fn new(guid: Guid) -> Self {
        Self {
            guid,
            ..Self::default()
        }
    }

    /// The entity's GUID
    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// Current nesting depth of edit brackets
    pub fn edit_level(&self) -> i32 {
        self.edit_level
    }

    /// True while at least one edit bracket is open
    pub fn is_editing(&self) -> bool {
        self.edit_level > 0
    }

    /// Open an edit bracket; true only for the outermost begin
    pub fn begin_edit(&mut self) -> bool {
        self.edit_level += 1;
        self.edit_level == 1
    }

    /// Close an edit bracket; true only when the outermost bracket closes
    ///
    /// An unmatched commit is logged and the level clamped to zero.
    pub fn commit_edit(&mut self) -> bool {
        self.edit_level -= 1;
        if self.edit_level < 0 {
            warn!("unbalanced commit on {}; clamping edit level", self.guid);
            self.edit_level = 0;
            return false;
        }
        self.edit_level == 0
    }

    pub(crate) fn reset_edit_level(&mut self) {
        self.edit_level = 0;
    }

    /// True when modified since the last `mark_clean`
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flag the entity as modified
    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clear the modified flag
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// True once destruction has been requested
    pub fn is_destroying(&self) -> bool {
        self.destroying
    }

    /// Request destruction at the outermost commit
    pub fn set_destroying(&mut self) {
        self.destroying = true;
        self.dirty = true;
    }

    /// Attached key/value slots
    pub fn slots(&self) -> &KvpFrame {
        &self.slots
    }

    /// Mutable slots; marks the entity dirty
    pub fn slots_mut(&mut self) -> &mut KvpFrame {
        self.dirty = true;
        &mut self.slots
    }
}

/// Implemented by every type stored in a [`Collection`]
pub trait Entity {
    /// Typed id naming this entity
    type Id: EntityId;

    /// Shared instance state
    fn instance(&self) -> &Instance;

    /// Mutable shared instance state
    fn instance_mut(&mut self) -> &mut Instance;

    /// This entity's typed id
    fn id(&self) -> Self::Id {
        Self::Id::from_guid(self.instance().guid())
    }
}

/// Implements [`Entity`] for a struct with an `inst: Instance` field
macro_rules! impl_entity {
    ($ty:ty, $id:ty) => {
        impl $crate::instance::Entity for $ty {
            type Id = $id;

            fn instance(&self) -> &$crate::instance::Instance {
                &self.inst
            }

            fn instance_mut(&mut self) -> &mut $crate::instance::Instance {
                &mut self.inst
            }
        }
    };
}
pub(crate) use impl_entity;

/// All entities of one kind, keyed by id, in insertion order
#[derive(Debug, Clone)]
pub struct Collection<V: Entity> {
    items: IndexMap<V::Id, V>,
    dirty: bool,
}

impl<V: Entity> Default for Collection<V> {
    fn default() -> Self {
        Self {
            items: IndexMap::new(),
            dirty: false,
        }
    }
}

impl<V: Entity> Collection<V> {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when an entity with this id is present
    pub fn contains(&self, id: V::Id) -> bool {
        self.items.contains_key(&id)
    }

    /// Look up by id
    pub fn get(&self, id: V::Id) -> Option<&V> {
        self.items.get(&id)
    }

    /// Look up by id for modification
    pub fn get_mut(&mut self, id: V::Id) -> Option<&mut V> {
        self.items.get_mut(&id)
    }

    /// Look up by id, failing with [`EngineError::NotFound`]
    pub fn require(&self, id: V::Id) -> EngineResult<&V> {
        self.items
            .get(&id)
            .ok_or_else(|| EngineError::not_found(V::Id::ID_TYPE, id.guid()))
    }

    /// Mutable variant of [`Collection::require`]
    pub fn require_mut(&mut self, id: V::Id) -> EngineResult<&mut V> {
        self.items
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(V::Id::ID_TYPE, id.guid()))
    }

    /// Add an entity, replacing any entity with the same id
    pub fn insert(&mut self, value: V) {
        self.dirty = true;
        self.items.insert(value.id(), value);
    }

    /// Remove an entity, keeping the order of the rest
    pub fn remove(&mut self, id: V::Id) -> Option<V> {
        let removed = self.items.shift_remove(&id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Drop every entity
    pub fn clear(&mut self) {
        self.items.clear();
        self.dirty = true;
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.items.values()
    }

    /// Iterate mutably in insertion order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.items.values_mut()
    }

    /// Snapshot of the ids in insertion order
    pub fn ids(&self) -> Vec<V::Id> {
        self.items.keys().copied().collect()
    }

    /// True when an entity was added, removed or marked since the last clean
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.items.values().any(|v| v.instance().is_dirty())
    }

    /// Flag the collection as modified
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clear the collection and entity dirty flags
    pub fn mark_clean(&mut self) {
        self.dirty = false;
        for value in self.items.values_mut() {
            value.instance_mut().mark_clean();
        }
    }
}

impl<V: Entity + Serialize> Serialize for Collection<V> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.items.values())
    }
}

impl<'de, V: Entity + DeserializeOwned> Deserialize<'de> for Collection<V> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<V>::deserialize(deserializer)?;
        let items = values.into_iter().map(|v| (v.id(), v)).collect();
        Ok(Self {
            items,
            dirty: false,
        })
    }
}
