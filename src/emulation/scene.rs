//! Ordered set of objects active in the current scene.

use std::sync::RwLock;

use crate::host::ObjectId;

/// Scene membership, in insertion order.
#[derive(Debug, Default)]
pub struct Scene {
    active: RwLock<Vec<ObjectId>>,
}

impl Scene {
    /// Creates an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `object` unless it is already active. Returns whether it was added.
    pub fn add(&self, object: ObjectId) -> bool {
        let mut active = write_lock!(self.active);
        if active.contains(&object) {
            return false;
        }
        active.push(object);
        true
    }

    /// Removes `object`. Returns whether it was active.
    pub fn remove(&self, object: ObjectId) -> bool {
        let mut active = write_lock!(self.active);
        let before = active.len();
        active.retain(|id| *id != object);
        active.len() != before
    }

    /// Whether `object` is active.
    #[must_use]
    pub fn contains(&self, object: ObjectId) -> bool {
        read_lock!(self.active).contains(&object)
    }

    /// Snapshot of the active objects.
    #[must_use]
    pub fn objects(&self) -> Vec<ObjectId> {
        read_lock!(self.active).clone()
    }

    /// Removes every object, returning them in insertion order.
    pub fn clear(&self) -> Vec<ObjectId> {
        std::mem::take(&mut *write_lock!(self.active))
    }
}
