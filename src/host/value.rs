//! Values exchanged with the host program.

use std::fmt;

use crate::{metadata::ValueType, Error, Result};

/// Handle to a live host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// A value on the evaluation stack, in a field, or passed to a hook or delegate.
///
/// # Examples
///
/// ```rust
/// use modweave::host::Value;
///
/// let timer = Value::from(0.1f32);
/// assert_eq!(timer.as_f32()?, 0.1);
/// assert!(timer.as_i32().is_err());
/// assert!(Value::I32(3).is_truthy());
/// assert!(!Value::Null.is_truthy());
/// # Ok::<(), modweave::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    /// Null reference
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    I32(i32),
    /// 32-bit float
    F32(f32),
    /// Object reference
    Object(ObjectId),
}

impl Value {
    /// Name of the value's type, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "int32",
            Value::F32(_) => "float32",
            Value::Object(_) => "object",
        }
    }

    /// Zero value for a declared type (`false`, `0`, `0.0` or null).
    #[must_use]
    pub fn default_for(ty: ValueType) -> Value {
        match ty {
            ValueType::Bool => Value::Bool(false),
            ValueType::I32 => Value::I32(0),
            ValueType::F32 => Value::F32(0.0),
            ValueType::Object => Value::Null,
        }
    }

    /// Whether the value can be stored in a slot of type `ty`.
    #[must_use]
    pub fn fits(&self, ty: ValueType) -> bool {
        matches!(
            (self, ty),
            (Value::Bool(_), ValueType::Bool)
                | (Value::I32(_), ValueType::I32)
                | (Value::F32(_), ValueType::F32)
                | (Value::Object(_) | Value::Null, ValueType::Object)
        )
    }

    /// Truthiness as used by `brtrue`/`brfalse`: non-zero numbers, `true` and non-null
    /// references are true.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(value) => *value,
            Value::I32(value) => *value != 0,
            Value::F32(value) => *value != 0.0,
            Value::Object(_) => true,
        }
    }

    /// Reads a boolean. Integers are accepted the way the evaluation stack stores them.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeMismatch`] for any other value.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(value) => Ok(*value),
            Value::I32(value) => Ok(*value != 0),
            other => Err(mismatch("bool", other)),
        }
    }

    /// Reads an integer. Booleans are widened to 0/1.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeMismatch`] for any other value.
    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Value::I32(value) => Ok(*value),
            Value::Bool(value) => Ok(i32::from(*value)),
            other => Err(mismatch("int32", other)),
        }
    }

    /// Reads a float.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeMismatch`] for any other value.
    pub fn as_f32(&self) -> Result<f32> {
        match self {
            Value::F32(value) => Ok(*value),
            other => Err(mismatch("float32", other)),
        }
    }

    /// Reads an object reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeMismatch`] for null or non-reference values.
    pub fn as_object(&self) -> Result<ObjectId> {
        match self {
            Value::Object(id) => Ok(*id),
            other => Err(mismatch("object", other)),
        }
    }
}

fn mismatch(expected: &'static str, found: &Value) -> Error {
    Error::TypeMismatch {
        expected,
        found: found.type_name().to_string(),
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I32(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F32(value)
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Value::Object(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::I32(value) => write!(f, "{value}"),
            Value::F32(value) => write!(f, "{value:?}"),
            Value::Object(id) => write!(f, "{id}"),
        }
    }
}
