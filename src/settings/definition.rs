//! Setting declarations and typed keys.

use std::{fmt, marker::PhantomData};

use crate::{Error, Result};

/// Value domain of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// `false` / `true`, stored as 0 / 1
    Bool,
    /// Integer within `min..=max`
    Int {
        /// Smallest accepted value
        min: i32,
        /// Largest accepted value
        max: i32,
    },
}

impl SettingKind {
    /// Short name used in error messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SettingKind::Bool => "bool",
            SettingKind::Int { .. } => "int",
        }
    }
}

/// Declaration of one override setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingDef {
    name: String,
    kind: SettingKind,
    default: i32,
}

impl SettingDef {
    /// Declares a boolean setting.
    #[must_use]
    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        SettingDef {
            name: name.into(),
            kind: SettingKind::Bool,
            default: i32::from(default),
        }
    }

    /// Declares a bounded integer setting.
    ///
    /// # Errors
    /// Returns [`crate::Error::SettingOutOfRange`] if `default` is outside `min..=max`.
    pub fn int(name: impl Into<String>, min: i32, max: i32, default: i32) -> Result<Self> {
        let def = SettingDef {
            name: name.into(),
            kind: SettingKind::Int { min, max },
            default,
        };
        def.check(default)?;
        Ok(def)
    }

    /// Setting name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value domain.
    #[must_use]
    pub fn kind(&self) -> SettingKind {
        self.kind
    }

    /// Declared default in raw form.
    #[must_use]
    pub fn default_raw(&self) -> i32 {
        self.default
    }

    /// Checks that `raw` is a legal value for this setting.
    ///
    /// # Errors
    /// Returns [`crate::Error::SettingOutOfRange`].
    pub fn check(&self, raw: i32) -> Result<()> {
        let (min, max) = match self.kind {
            SettingKind::Bool => (0, 1),
            SettingKind::Int { min, max } => (min, max),
        };
        if (min..=max).contains(&raw) {
            Ok(())
        } else {
            Err(Error::SettingOutOfRange {
                name: self.name.clone(),
                value: raw,
                min,
                max,
            })
        }
    }
}

/// Rust types a setting can be read as.
pub trait SettingValue: Sized + Copy {
    /// Kind name, matched against [`SettingKind::name`].
    const KIND: &'static str;

    /// Converts from the stored form.
    fn from_raw(raw: i32) -> Self;

    /// Converts to the stored form.
    fn into_raw(self) -> i32;
}

impl SettingValue for bool {
    const KIND: &'static str = "bool";

    fn from_raw(raw: i32) -> Self {
        raw != 0
    }

    fn into_raw(self) -> i32 {
        i32::from(self)
    }
}

impl SettingValue for i32 {
    const KIND: &'static str = "int";

    fn from_raw(raw: i32) -> Self {
        raw
    }

    fn into_raw(self) -> i32 {
        self
    }
}

/// Typed name of a setting.
///
/// # Examples
///
/// ```rust
/// use modweave::settings::{keys, OverrideRegistry};
///
/// let registry = OverrideRegistry::with_builtin_settings();
/// assert_eq!(registry.get(keys::JUMP_COUNT)?, 1);
/// registry.set(keys::JUMP_COUNT, 3)?;
/// assert_eq!(registry.get(keys::JUMP_COUNT)?, 3);
/// # Ok::<(), modweave::Error>(())
/// ```
pub struct SettingKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SettingKey<T> {
    /// Creates a key for the setting called `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        SettingKey {
            name,
            _marker: PhantomData,
        }
    }

    /// Setting name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for SettingKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SettingKey<T> {}

impl<T> fmt::Debug for SettingKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SettingKey").field(&self.name).finish()
    }
}

/// Settings every engine instance declares.
pub mod keys {
    use super::{SettingDef, SettingKey};
    use crate::Result;

    /// Global on/off switch for every extension
    pub const MASTER_SWITCH: SettingKey<bool> = SettingKey::new("MasterSwitch");
    /// Jumps available before touching the ground again; 6 means infinite
    pub const JUMP_COUNT: SettingKey<i32> = SettingKey::new("JumpCount");
    /// Refill extra jumps whenever the dash is refilled
    pub const REFILL_JUMPS_ON_DASH_REFILL: SettingKey<bool> =
        SettingKey::new("RefillJumpsOnDashRefill");
    /// Forbid climb jumps (wall jumps stay possible)
    pub const DISABLE_CLIMB_JUMPING: SettingKey<bool> = SettingKey::new("DisableClimbJumping");
    /// Flood every room with water
    pub const EVERYTHING_IS_UNDERWATER: SettingKey<bool> = SettingKey::new("EverythingIsUnderwater");

    /// Value of [`JUMP_COUNT`] meaning "unlimited"
    pub const INFINITE_JUMPS: i32 = 6;

    /// Declarations of the built-in settings.
    ///
    /// # Errors
    /// Never fails for the built-in bounds; returns the result of [`SettingDef::int`].
    pub fn builtin() -> Result<Vec<SettingDef>> {
        Ok(vec![
            SettingDef::bool(MASTER_SWITCH.name(), false),
            SettingDef::int(JUMP_COUNT.name(), 0, INFINITE_JUMPS, 1)?,
            SettingDef::bool(REFILL_JUMPS_ON_DASH_REFILL.name(), false),
            SettingDef::bool(DISABLE_CLIMB_JUMPING.name(), false),
            SettingDef::bool(EVERYTHING_IS_UNDERWATER.name(), false),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_checked() {
        let def = SettingDef::int("Depth", -2, 2, 0).unwrap();
        assert!(def.check(-2).is_ok());
        assert!(matches!(
            def.check(3),
            Err(Error::SettingOutOfRange { value: 3, min: -2, max: 2, .. })
        ));
        assert!(SettingDef::int("Bad", 0, 1, 5).is_err());
    }

    #[test]
    fn bool_settings_accept_only_zero_and_one() {
        let def = SettingDef::bool("Flag", true);
        assert_eq!(def.default_raw(), 1);
        assert!(def.check(2).is_err());
    }

    #[test]
    fn builtin_declarations() {
        let defs = keys::builtin().unwrap();
        assert_eq!(defs.len(), 5);
        let jump = defs.iter().find(|d| d.name() == "JumpCount").unwrap();
        assert_eq!(jump.kind(), SettingKind::Int { min: 0, max: 6 });
        assert_eq!(jump.default_raw(), 1);
    }
}
