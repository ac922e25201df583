//! Releasing script references to objects that left the scene.
//!
//! An embedded scripting runtime can keep host objects alive through its own reference
//! table long after the scene dropped them. This extension tells the table to collect
//! an object's reference when the object is removed, and every remaining reference when
//! the level ends.

use std::sync::Arc;

use crate::{
    extension::{Extension, InstallSet, ModContext},
    hook::Hook,
    host::{ObjectId, SceneQuery},
    settings::keys,
    Result,
};

/// Declaring type of the removal callback.
pub const ENTITY: &str = "Monocle.Entity";
/// Declaring type of `End`.
pub const LEVEL: &str = "Celeste.Level";

/// Reference table of a scripting runtime embedded in the host.
pub trait ReferenceTable: Send + Sync {
    /// Reference held for `object`, if any.
    fn reference_of(&self, object: ObjectId) -> Option<i32>;

    /// Releases `reference`.
    fn collect(&self, reference: i32);
}

/// Collects script references of removed objects.
pub struct ReferenceCleanup {
    table: Arc<dyn ReferenceTable>,
}

impl ReferenceCleanup {
    /// Creates the extension releasing references from `table`.
    #[must_use]
    pub fn new(table: Arc<dyn ReferenceTable>) -> Self {
        ReferenceCleanup { table }
    }
}

fn release(table: &dyn ReferenceTable, object: ObjectId) {
    if let Some(reference) = table.reference_of(object) {
        log::info!("Cleaning up script reference {reference} to object #{}", object.0);
        table.collect(reference);
    }
}

impl Extension for ReferenceCleanup {
    fn name(&self) -> &str {
        "ReferenceCleanup"
    }

    fn setting(&self) -> &str {
        keys::MASTER_SWITCH.name()
    }

    fn load(&self, cx: &ModContext, installs: &mut InstallSet) -> Result<()> {
        let table = self.table.clone();
        installs.hook_by_name(
            cx,
            ENTITY,
            "Removed",
            Hook::new("release-removed", move |frame| {
                let result = frame.call_next()?;
                if let Some(this) = frame.this() {
                    release(table.as_ref(), this.as_object()?);
                }
                Ok(result)
            })
            .with_owner(self.name()),
        );

        let table = self.table.clone();
        let scene: Arc<dyn SceneQuery> = cx.scene().clone();
        installs.hook_by_name(
            cx,
            LEVEL,
            "End",
            Hook::new("release-level", move |frame| {
                // the level drops its objects without removing them one by one
                for object in scene.all_objects() {
                    release(table.as_ref(), object);
                }
                let result = frame.call_next()?;
                if let Some(this) = frame.this() {
                    release(table.as_ref(), this.as_object()?);
                }
                Ok(result)
            })
            .with_owner(self.name()),
        );
        Ok(())
    }
}

impl std::fmt::Debug for ReferenceCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceCleanup").finish_non_exhaustive()
    }
}
