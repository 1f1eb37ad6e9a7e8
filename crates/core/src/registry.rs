//! Display side table.
//!
//! Displayed textures carry no reference to the page entity that shows them.
//! Pointer events land on a display object, and this table maps that object
//! back to the entity that owns it.

use std::collections::HashMap;

/// Identifier of a display object created on the interactive thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayId(u64);

impl DisplayId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Identifier of a page entity placed on the desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct DisplayRegistry {
    next_id: u64,
    owners: HashMap<DisplayId, EntityId>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a display id owned by `entity`.
    pub fn attach(&mut self, entity: EntityId) -> DisplayId {
        let id = DisplayId(self.next_id);
        self.next_id += 1;
        self.owners.insert(id, entity);
        id
    }

    /// Forget a display object. Returns its former owner.
    pub fn detach(&mut self, display: DisplayId) -> Option<EntityId> {
        self.owners.remove(&display)
    }

    /// Entity a pointer event on `display` should be routed to.
    pub fn entity_for(&self, display: DisplayId) -> Option<EntityId> {
        self.owners.get(&display).copied()
    }

    /// Every display object currently owned by `entity`.
    pub fn displays_of(&self, entity: EntityId) -> Vec<DisplayId> {
        let mut ids: Vec<_> =
            self.owners.iter().filter(|(_, owner)| **owner == entity).map(|(id, _)| *id).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
