//! Object storage for the reference host.
//!
//! Objects are typed by name and store their fields in a name-keyed map. References
//! ([`ObjectId`]) remain valid until the object is freed explicitly; no garbage collection
//! is simulated.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        RwLock,
    },
};

use crate::{
    host::{ObjectId, Value},
    metadata::ValueType,
    Error, Result,
};

/// Field layout of a host type: declared type and initial value per field.
#[derive(Debug, Clone, Default)]
pub struct TypeLayout {
    fields: Vec<(String, ValueType, Value)>,
}

impl TypeLayout {
    /// Creates an empty layout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field initialised to `ty`'s zero value.
    #[must_use]
    pub fn field(self, name: &str, ty: ValueType) -> Self {
        self.field_with(name, ty, Value::default_for(ty))
    }

    /// Adds a field with an explicit initial value.
    #[must_use]
    pub fn field_with(mut self, name: &str, ty: ValueType, initial: Value) -> Self {
        self.fields.push((name.to_string(), ty, initial));
        self
    }

    /// Declared type of `name`.
    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<ValueType> {
        self.fields
            .iter()
            .find(|(field, _, _)| field == name)
            .map(|(_, ty, _)| *ty)
    }
}

#[derive(Debug, Clone)]
struct HeapObject {
    type_name: String,
    fields: HashMap<String, (ValueType, Value)>,
}

/// Thread-safe object store.
#[derive(Debug, Default)]
pub struct ObjectHeap {
    objects: RwLock<HashMap<u32, HeapObject>>,
    next_id: AtomicU32,
}

impl ObjectHeap {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an object of `type_name` with the fields of `layout`.
    pub fn alloc(&self, type_name: &str, layout: &TypeLayout) -> ObjectId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let fields = layout
            .fields
            .iter()
            .map(|(name, ty, initial)| (name.clone(), (*ty, *initial)))
            .collect();
        write_lock!(self.objects).insert(
            id,
            HeapObject {
                type_name: type_name.to_string(),
                fields,
            },
        );
        ObjectId(id)
    }

    /// Type name of `object`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownObject`].
    pub fn type_of(&self, object: ObjectId) -> Result<String> {
        read_lock!(self.objects)
            .get(&object.0)
            .map(|obj| obj.type_name.clone())
            .ok_or(Error::UnknownObject(object.0))
    }

    /// Reads a field.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownObject`] or [`crate::Error::MissingMember`].
    pub fn read(&self, object: ObjectId, field: &str) -> Result<Value> {
        let objects = read_lock!(self.objects);
        let obj = objects.get(&object.0).ok_or(Error::UnknownObject(object.0))?;
        obj.fields
            .get(field)
            .map(|(_, value)| *value)
            .ok_or_else(|| Error::MissingMember {
                type_name: obj.type_name.clone(),
                member: field.to_string(),
            })
    }

    /// Writes a field, converting between the stack's integer and boolean forms.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownObject`], [`crate::Error::MissingMember`] or
    /// [`crate::Error::TypeMismatch`].
    pub fn write(&self, object: ObjectId, field: &str, value: Value) -> Result<()> {
        let mut objects = write_lock!(self.objects);
        let obj = objects
            .get_mut(&object.0)
            .ok_or(Error::UnknownObject(object.0))?;
        let type_name = obj.type_name.clone();
        let (ty, slot) = obj
            .fields
            .get_mut(field)
            .ok_or_else(|| Error::MissingMember {
                type_name,
                member: field.to_string(),
            })?;
        *slot = coerce(value, *ty)?;
        Ok(())
    }

    /// Frees `object`. Returns `false` if it did not exist.
    pub fn free(&self, object: ObjectId) -> bool {
        write_lock!(self.objects).remove(&object.0).is_some()
    }

    /// Whether `object` is allocated.
    #[must_use]
    pub fn contains(&self, object: ObjectId) -> bool {
        read_lock!(self.objects).contains_key(&object.0)
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        read_lock!(self.objects).len()
    }

    /// Returns `true` if no object is allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Converts a stack value to the representation of a `ty` slot.
///
/// # Errors
/// Returns [`crate::Error::TypeMismatch`] if the value cannot be stored as `ty`.
pub(crate) fn coerce(value: Value, ty: ValueType) -> Result<Value> {
    match (ty, value) {
        (ValueType::Bool, Value::I32(v)) => Ok(Value::Bool(v != 0)),
        (ValueType::I32, Value::Bool(v)) => Ok(Value::I32(i32::from(v))),
        (ty, value) if value.fits(ty) => Ok(value),
        (ty, value) => Err(Error::TypeMismatch {
            expected: ty.name(),
            found: value.type_name().to_string(),
        }),
    }
}
