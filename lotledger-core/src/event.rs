//! Entity change notifications
//!
//! The book emits an [`Event`] whenever an entity is created, modified,
//! destroyed, or moved into or out of a container. Handlers are plain
//! closures registered on the [`EventBus`]; generation can be suspended
//! while a bulk operation runs.

use std::fmt;

use bitflags::bitflags;
use log::warn;

use crate::guid::{Guid, IdType};

bitflags! {
    /// Kinds of entity change
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventKind: u32 {
        /// Entity created
        const CREATE = 0x01;
        /// Entity modified
        const MODIFY = 0x02;
        /// Entity destroyed
        const DESTROY = 0x04;
        /// Entity added to a container (e.g. a child account)
        const ADD = 0x08;
        /// Entity removed from a container
        const REMOVE = 0x10;
        /// Container gained an item (e.g. a lot gained a split)
        const ITEM_ADDED = 0x100;
        /// Container lost an item
        const ITEM_REMOVED = 0x200;
    }
}

/// One change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// Kind of entity affected
    pub id_type: IdType,
    /// Entity affected
    pub guid: Guid,
}

/// Handle returned by [`EventBus::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(usize);

type Handler = Box<dyn FnMut(&Event)>;

/// Registry of event handlers
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<(HandlerId, Handler)>,
    next_id: usize,
    suspended: u32,
}

impl EventBus {
    /// Create a bus with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler
    pub fn register<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&Event) + 'static,
    {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Unregister a handler; false when it was not registered
    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(hid, _)| *hid != id);
        self.handlers.len() != before
    }

    /// Stop delivering events until a matching [`EventBus::resume`]
    pub fn suspend(&mut self) {
        self.suspended += 1;
    }

    /// Undo one [`EventBus::suspend`]
    pub fn resume(&mut self) {
        if self.suspended == 0 {
            warn!("event resume without matching suspend");
            return;
        }
        self.suspended -= 1;
    }

    /// True while delivery is suspended
    pub fn is_suspended(&self) -> bool {
        self.suspended > 0
    }

    /// Deliver an event to every handler in registration order
    pub fn emit(&mut self, kind: EventKind, id_type: IdType, guid: Guid) {
        if self.suspended > 0 || self.handlers.is_empty() {
            return;
        }
        let event = Event {
            kind,
            id_type,
            guid,
        };
        for (_, handler) in self.handlers.iter_mut() {
            handler(&event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .field("suspended", &self.suspended)
            .finish()
    }
}
