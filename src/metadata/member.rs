//! Host member identities: target methods, signatures and field references.
//!
//! A [`TargetMethod`] identifies a host method by declaring type, name and
//! [`MethodSig`]. It is an immutable value; every hook chain and patch that targets the
//! same method uses an equal `TargetMethod` as its key. A [`FieldRef`] names a field on a
//! host type, including private fields the engine reaches through
//! [`crate::host::FieldAccess`].

use std::fmt;

use bitflags::bitflags;

/// Type of a value crossing the host boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `System.Boolean`
    Bool,
    /// `System.Int32`
    I32,
    /// `System.Single`
    F32,
    /// Any object reference
    Object,
}

impl ValueType {
    /// Short type name used in method display strings.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::I32 => "int32",
            ValueType::F32 => "float32",
            ValueType::Object => "object",
        }
    }
}

bitflags! {
    /// Method attribute flags (values follow the CIL `MethodAttributes` encoding).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodFlags: u16 {
        /// Only accessible from within the declaring type
        const PRIVATE = 0x0001;
        /// Accessible everywhere
        const PUBLIC = 0x0006;
        /// No `this` argument
        const STATIC = 0x0010;
        /// Dispatched through the object's virtual table
        const VIRTUAL = 0x0040;
    }
}

/// Signature of a host method.
///
/// # Examples
///
/// ```rust
/// use modweave::metadata::{MethodSig, ValueType};
///
/// let sig = MethodSig::instance(vec![ValueType::I32], Some(ValueType::Bool));
/// assert!(sig.has_this());
/// assert_eq!(sig.arg_count(), 2); // this + one parameter
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    /// Attribute flags
    pub flags: MethodFlags,
    /// Parameter types, excluding `this`
    pub params: Vec<ValueType>,
    /// Return type, `None` for `void`
    pub ret: Option<ValueType>,
}

impl MethodSig {
    /// Public instance method signature.
    #[must_use]
    pub fn instance(params: Vec<ValueType>, ret: Option<ValueType>) -> Self {
        MethodSig {
            flags: MethodFlags::PUBLIC,
            params,
            ret,
        }
    }

    /// Public static method signature.
    #[must_use]
    pub fn static_method(params: Vec<ValueType>, ret: Option<ValueType>) -> Self {
        MethodSig {
            flags: MethodFlags::PUBLIC | MethodFlags::STATIC,
            params,
            ret,
        }
    }

    /// Replaces the flags, e.g. to mark a method private or virtual.
    #[must_use]
    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Whether the method receives a `this` argument.
    #[must_use]
    pub fn has_this(&self) -> bool {
        !self.flags.contains(MethodFlags::STATIC)
    }

    /// Number of values popped from the evaluation stack by a call, `this` included.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.has_this())
    }
}

/// Identifies a method in the host program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetMethod {
    declaring_type: String,
    name: String,
    sig: MethodSig,
}

impl TargetMethod {
    /// Creates a method identity.
    #[must_use]
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>, sig: MethodSig) -> Self {
        TargetMethod {
            declaring_type: declaring_type.into(),
            name: name.into(),
            sig,
        }
    }

    /// Full name of the declaring type, e.g. `Celeste.Player`.
    #[must_use]
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// Method name, e.g. `NormalUpdate`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method signature.
    #[must_use]
    pub fn sig(&self) -> &MethodSig {
        &self.sig
    }

    /// `Type::Name` without the signature.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }
}

impl fmt::Display for TargetMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ret = self.sig.ret.map_or("void", |t| t.name());
        let params: Vec<&str> = self.sig.params.iter().map(ValueType::name).collect();
        write!(
            f,
            "{ret} {}::{}({})",
            self.declaring_type,
            self.name,
            params.join(", ")
        )
    }
}

/// Names a field on a host type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    declaring_type: String,
    name: String,
    ty: ValueType,
}

impl FieldRef {
    /// Creates a field reference.
    #[must_use]
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>, ty: ValueType) -> Self {
        FieldRef {
            declaring_type: declaring_type.into(),
            name: name.into(),
            ty,
        }
    }

    /// Declaring type name.
    #[must_use]
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type.
    #[must_use]
    pub fn ty(&self) -> ValueType {
        self.ty
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.ty.name(), self.declaring_type, self.name)
    }
}
