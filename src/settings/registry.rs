//! The process-wide override store.

use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use dashmap::DashMap;

use crate::{
    settings::definition::{keys, SettingDef, SettingKey, SettingValue},
    Error, Result,
};

#[derive(Debug)]
struct SettingSlot {
    def: SettingDef,
    value: AtomicI32,
}

/// Typed key/value store for override settings.
///
/// Every setting is declared once with a [`SettingDef`] and starts at its default. Values are
/// kept in one [`AtomicI32`] per setting, so a read concurrent with a write observes either the
/// old or the new value, never a mix. Setting a value notifies nobody; call sites poll.
///
/// # Examples
///
/// ```rust
/// use modweave::settings::{keys, OverrideRegistry};
///
/// let registry = OverrideRegistry::with_builtin_settings();
/// assert!(!registry.get(keys::MASTER_SWITCH)?);
///
/// registry.set_raw("MasterSwitch", 1)?;
/// assert!(registry.get(keys::MASTER_SWITCH)?);
///
/// registry.reset_all();
/// assert!(!registry.get(keys::MASTER_SWITCH)?);
/// # Ok::<(), modweave::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct OverrideRegistry {
    slots: DashMap<String, Arc<SettingSlot>>,
}

impl OverrideRegistry {
    /// Creates a registry without any declared settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in settings at their defaults.
    #[must_use]
    pub fn with_builtin_settings() -> Self {
        let registry = Self::new();
        match keys::builtin() {
            Ok(defs) => {
                for def in defs {
                    registry.declare(def);
                }
            }
            Err(error) => log::error!("built-in settings rejected: {error}"),
        }
        registry
    }

    /// Declares a setting at its default value.
    ///
    /// Returns `false` and keeps the existing setting if the name is already declared.
    pub fn declare(&self, def: SettingDef) -> bool {
        if self.slots.contains_key(def.name()) {
            return false;
        }

        let slot = Arc::new(SettingSlot {
            value: AtomicI32::new(def.default_raw()),
            def,
        });
        self.slots
            .entry(slot.def.name().to_string())
            .or_insert(slot);
        true
    }

    /// Reads a typed setting.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] or [`crate::Error::SettingKindMismatch`].
    pub fn get<T: SettingValue>(&self, key: SettingKey<T>) -> Result<T> {
        let slot = self.typed_slot::<T>(key.name())?;
        Ok(T::from_raw(slot.value.load(Ordering::Acquire)))
    }

    /// Writes a typed setting.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`], [`crate::Error::SettingKindMismatch`] or
    /// [`crate::Error::SettingOutOfRange`].
    pub fn set<T: SettingValue>(&self, key: SettingKey<T>, value: T) -> Result<()> {
        let slot = self.typed_slot::<T>(key.name())?;
        store(&slot, value.into_raw())
    }

    /// Reads a setting in raw integer form, as the configuration surface sees it.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`].
    pub fn get_raw(&self, name: &str) -> Result<i32> {
        Ok(self.slot(name)?.value.load(Ordering::Acquire))
    }

    /// Writes a setting in raw integer form.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] or [`crate::Error::SettingOutOfRange`].
    pub fn set_raw(&self, name: &str, raw: i32) -> Result<()> {
        let slot = self.slot(name)?;
        store(&slot, raw)
    }

    /// Declared default in raw form.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`].
    pub fn default_raw(&self, name: &str) -> Result<i32> {
        Ok(self.slot(name)?.def.default_raw())
    }

    /// Declaration of a setting.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`].
    pub fn definition(&self, name: &str) -> Result<SettingDef> {
        Ok(self.slot(name)?.def.clone())
    }

    /// Whether a setting currently holds its declared default.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`].
    pub fn is_default(&self, name: &str) -> Result<bool> {
        let slot = self.slot(name)?;
        Ok(slot.value.load(Ordering::Acquire) == slot.def.default_raw())
    }

    /// Restores one setting to its default.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`].
    pub fn reset(&self, name: &str) -> Result<()> {
        let slot = self.slot(name)?;
        slot.value.store(slot.def.default_raw(), Ordering::Release);
        Ok(())
    }

    /// Restores every setting to its default.
    pub fn reset_all(&self) {
        for slot in self.slots.iter() {
            slot.value.store(slot.def.default_raw(), Ordering::Release);
        }
    }

    /// Declared setting names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.iter().map(|slot| slot.key().clone()).collect();
        names.sort();
        names
    }

    fn slot(&self, name: &str) -> Result<Arc<SettingSlot>> {
        self.slots
            .get(name)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| Error::UnknownSetting(name.to_string()))
    }

    fn typed_slot<T: SettingValue>(&self, name: &str) -> Result<Arc<SettingSlot>> {
        let slot = self.slot(name)?;
        let actual = slot.def.kind().name();
        if actual != T::KIND {
            return Err(Error::SettingKindMismatch {
                name: name.to_string(),
                actual,
                requested: T::KIND,
            });
        }
        Ok(slot)
    }
}

fn store(slot: &SettingSlot, raw: i32) -> Result<()> {
    slot.def.check(raw)?;
    let previous = slot.value.swap(raw, Ordering::AcqRel);
    if previous != raw {
        log::debug!("setting {} changed {} -> {}", slot.def.name(), previous, raw);
    }
    Ok(())
}
