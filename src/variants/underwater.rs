//! Flooding every room.
//!
//! A watcher task waits for `EverythingIsUnderwater`, fills the current level with water
//! and drains it again once the setting or the master switch is turned off. The water
//! reaches 10 units above the level so entering from below does not splash, but its
//! visible fill starts at the level's top edge.

use std::sync::Arc;

use crate::{
    extension::{CancelToken, Extension, InstallSet, ModContext, Task, TaskStatus},
    host::{FieldAccess, ObjectId, SceneQuery, Value},
    settings::{keys, OverrideRegistry},
    Result,
};

/// Scene category of the level object the water is sized after.
pub const LEVEL: &str = "Celeste.Level";
/// Scene category of the spawned water.
pub const WATER: &str = "Celeste.Water";

const SPLASH_MARGIN: i32 = 10;

/// The `EverythingIsUnderwater` variant.
#[derive(Debug, Default)]
pub struct UnderwaterSwitch;

impl UnderwaterSwitch {
    /// Creates the variant.
    #[must_use]
    pub fn new() -> Self {
        UnderwaterSwitch
    }
}

impl Extension for UnderwaterSwitch {
    fn name(&self) -> &str {
        "EverythingIsUnderwater"
    }

    fn setting(&self) -> &str {
        keys::EVERYTHING_IS_UNDERWATER.name()
    }

    fn load(&self, cx: &ModContext, installs: &mut InstallSet) -> Result<()> {
        installs.task(cx, Box::new(UnderwaterWatcher::new(cx)));
        Ok(())
    }
}

/// Per-frame watcher spawning and removing the water.
pub struct UnderwaterWatcher {
    settings: Arc<OverrideRegistry>,
    scene: Arc<dyn SceneQuery>,
    fields: Arc<dyn FieldAccess>,
    water: Option<ObjectId>,
}

impl UnderwaterWatcher {
    /// Creates a watcher using the context's settings and scene.
    #[must_use]
    pub fn new(cx: &ModContext) -> Self {
        UnderwaterWatcher {
            settings: cx.settings().clone(),
            scene: cx.scene().clone(),
            fields: cx.fields().clone(),
            water: None,
        }
    }

    /// Water currently spawned by this watcher.
    #[must_use]
    pub fn water(&self) -> Option<ObjectId> {
        self.water
    }

    fn spawn_water(&mut self) -> Result<()> {
        let Some(level) = self.scene.active_objects(LEVEL).first().copied() else {
            return Ok(());
        };
        let bound = |name: &str| -> Result<i32> { self.fields.read_field(level, name)?.as_i32() };
        let (left, top, width, height) = (
            bound("Left")?,
            bound("Top")?,
            bound("Width")?,
            bound("Height")?,
        );

        let top = top - SPLASH_MARGIN;
        let height = height + SPLASH_MARGIN;
        let water = self.scene.add_object(
            WATER,
            &[
                ("Left", Value::I32(left)),
                ("Top", Value::I32(top)),
                ("Width", Value::I32(width)),
                ("Height", Value::I32(height)),
                ("FillTop", Value::I32(top)),
                ("FillHeight", Value::I32(height)),
            ],
        )?;

        self.fields
            .write_field(water, "FillTop", Value::I32(top + SPLASH_MARGIN))?;
        self.fields
            .write_field(water, "FillHeight", Value::I32(height - SPLASH_MARGIN))?;
        log::debug!("flooded level #{} with water #{}", level.0, water.0);
        self.water = Some(water);
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        if let Some(water) = self.water.take() {
            log::debug!("draining water #{}", water.0);
            self.scene.remove_object(water)?;
        }
        Ok(())
    }
}

impl Task for UnderwaterWatcher {
    fn name(&self) -> &str {
        "underwater-switch"
    }

    fn poll(&mut self, cancel: &CancelToken) -> Result<TaskStatus> {
        let master = self.settings.get(keys::MASTER_SWITCH)?;
        if cancel.is_cancelled() || !master {
            self.drain()?;
            return Ok(TaskStatus::Finished);
        }

        let flooded = self.settings.get(keys::EVERYTHING_IS_UNDERWATER)?;
        match (flooded, self.water) {
            (true, None) => self.spawn_water()?,
            (false, Some(_)) => self.drain()?,
            _ => {}
        }
        Ok(TaskStatus::Pending)
    }
}

impl std::fmt::Debug for UnderwaterWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnderwaterWatcher")
            .field("water", &self.water)
            .finish_non_exhaustive()
    }
}
