//! Override settings consulted by hooks and injected delegates at call time.
//!
//! # Key Components
//!
//! - [`OverrideRegistry`] - Concurrent typed store, one atomic slot per setting
//! - [`SettingDef`] / [`SettingKind`] - Declarations (boolean or bounded integer, with default)
//! - [`SettingKey`] - Typed setting names; [`keys`] lists the built-in ones

mod definition;
mod registry;

pub use definition::{keys, SettingDef, SettingKey, SettingKind, SettingValue};
pub use registry::OverrideRegistry;
