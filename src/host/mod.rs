//! Capabilities the engine needs from the host program.
//!
//! The engine never reaches into host internals directly. Everything goes through three
//! narrow traits:
//!
//! - [`HostBinding`] - resolve methods, read and replace their instruction bodies, route
//!   calls through the [`crate::hook::HookManager`], and resolve injected delegates
//! - [`FieldAccess`] - read or write a named (possibly private) field of a live object
//! - [`SceneQuery`] - enumerate, add and remove objects of a category in the current scene
//!
//! [`crate::emulation::Runtime`] implements all three and is what the test-suite runs
//! against; a real host adapter implements them on top of whatever reflection facility
//! the host platform offers.

mod value;

pub use value::{ObjectId, Value};

use crate::{
    hook::HookManager,
    metadata::{FieldRef, MemberTable, TargetMethod, TargetMethodRc},
    patch::DelegateTable,
    Result,
};

/// Method-level access to the host program.
pub trait HostBinding: Send + Sync {
    /// Resolves a method by declaring type and name.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingMember`] if the host has no such method.
    fn resolve_method(&self, declaring_type: &str, name: &str) -> Result<TargetMethodRc>;

    /// Resolves a field by declaring type and name.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingMember`] if the host type has no such field.
    fn resolve_field(&self, declaring_type: &str, name: &str) -> Result<FieldRef>;

    /// Current encoded body of `method`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NoMethodBody`] for methods without an instruction body.
    fn method_body(&self, method: &TargetMethod) -> Result<Vec<u8>>;

    /// Replaces the body of `method`; subsequent calls execute the new code.
    ///
    /// # Errors
    /// Returns [`crate::Error::NoMethodBody`] for methods without an instruction body.
    fn replace_method_body(&self, method: &TargetMethod, bytes: Vec<u8>) -> Result<()>;

    /// Token table shared by every body of this host.
    fn members(&self) -> &MemberTable;

    /// Native logic injected into bodies, addressed by delegate tokens.
    fn delegates(&self) -> &DelegateTable;

    /// Interception chains consulted on every call into the host.
    fn hooks(&self) -> &HookManager;
}

/// Named field access on live host objects.
pub trait FieldAccess: Send + Sync {
    /// Reads `field` from `object`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownObject`] or [`crate::Error::MissingMember`].
    fn read_field(&self, object: ObjectId, field: &str) -> Result<Value>;

    /// Writes `value` to `field` on `object`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownObject`], [`crate::Error::MissingMember`] or
    /// [`crate::Error::TypeMismatch`].
    fn write_field(&self, object: ObjectId, field: &str, value: Value) -> Result<()>;
}

/// Scene-level object management.
pub trait SceneQuery: Send + Sync {
    /// Objects of `category` currently active in the scene, in insertion order.
    fn active_objects(&self, category: &str) -> Vec<ObjectId>;

    /// Every object currently active in the scene, in insertion order.
    fn all_objects(&self) -> Vec<ObjectId>;

    /// Creates an object of `category`, applying `fields` on top of the type's defaults.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingMember`] for unknown categories or fields.
    fn add_object(&self, category: &str, fields: &[(&str, Value)]) -> Result<ObjectId>;

    /// Removes `object` from the scene.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownObject`] if the object is not in the scene.
    fn remove_object(&self, object: ObjectId) -> Result<()>;
}
