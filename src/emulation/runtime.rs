//! The reference host: methods, objects and a scene, all in process.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use dashmap::DashMap;

use crate::{
    assembly::{decode, MethodBody},
    emulation::{
        heap::{ObjectHeap, TypeLayout},
        interpreter::Interpreter,
        scene::Scene,
    },
    hook::HookManager,
    host::{FieldAccess, HostBinding, ObjectId, SceneQuery, Value},
    metadata::{FieldRef, MemberTable, TargetMethod, TargetMethodRc, Token, ValueType},
    patch::DelegateTable,
    EngineConfig, Error, Result,
};

/// Native method implementation.
pub type NativeFn =
    Arc<dyn Fn(&Runtime, Option<Value>, &[Value]) -> Result<Option<Value>> + Send + Sync>;

/// Type and method invoked when an object leaves the scene, if the host defines it.
pub const ENTITY_TYPE: &str = "Monocle.Entity";
/// See [`ENTITY_TYPE`].
pub const REMOVED_METHOD: &str = "Removed";

struct IlMethod {
    locals: Vec<ValueType>,
    bytes: RwLock<Vec<u8>>,
    decoded: RwLock<Option<Arc<MethodBody>>>,
}

enum MethodImpl {
    Native(NativeFn),
    Il(IlMethod),
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// In-process host implementing every capability the engine needs.
///
/// Methods are either native closures or instruction bodies executed by the interpreter.
/// Every call, whether from outside or from interpreted code, goes through the
/// [`HookManager`] first; every `call` to a delegate token goes to the [`DelegateTable`].
///
/// # Examples
///
/// ```rust
/// use modweave::assembly::MethodBodyBuilder;
/// use modweave::emulation::Runtime;
/// use modweave::host::Value;
/// use modweave::metadata::{MethodSig, TargetMethod, ValueType};
/// use modweave::EngineConfig;
///
/// let runtime = Runtime::new(EngineConfig::default());
/// let inc = TargetMethod::new(
///     "Demo",
///     "Inc",
///     MethodSig::static_method(vec![ValueType::I32], Some(ValueType::I32)),
/// );
///
/// let mut asm = MethodBodyBuilder::new();
/// asm.emit_ldarg(0)?;
/// asm.emit_ldc_i4(1)?;
/// asm.emit_instruction("add", None)?;
/// asm.emit_instruction("ret", None)?;
/// runtime.define_il(&inc, vec![], asm.finalize_bytes()?);
///
/// assert_eq!(runtime.call(&inc, None, vec![Value::I32(41)])?, Some(Value::I32(42)));
/// # Ok::<(), modweave::Error>(())
/// ```
pub struct Runtime {
    config: EngineConfig,
    members: MemberTable,
    delegates: DelegateTable,
    hooks: HookManager,
    methods: DashMap<TargetMethod, Arc<MethodImpl>>,
    names: DashMap<(String, String), TargetMethodRc>,
    types: DashMap<String, TypeLayout>,
    heap: ObjectHeap,
    scene: Scene,
    depth: AtomicUsize,
}

impl Runtime {
    /// Creates an empty host.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Runtime {
            config,
            members: MemberTable::new(),
            delegates: DelegateTable::new(),
            hooks: HookManager::new(),
            methods: DashMap::new(),
            names: DashMap::new(),
            types: DashMap::new(),
            heap: ObjectHeap::new(),
            scene: Scene::new(),
            depth: AtomicUsize::new(0),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Declares a type and its fields. Redefining a type replaces its layout for new objects.
    pub fn define_type(&self, name: &str, layout: TypeLayout) {
        self.types.insert(name.to_string(), layout);
    }

    /// Defines a method implemented by a closure. Returns the method's token.
    pub fn define_native<F>(&self, method: &TargetMethod, func: F) -> Token
    where
        F: Fn(&Runtime, Option<Value>, &[Value]) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        self.define(method, MethodImpl::Native(Arc::new(func)))
    }

    /// Defines a method implemented by an encoded body. Returns the method's token.
    pub fn define_il(&self, method: &TargetMethod, locals: Vec<ValueType>, bytes: Vec<u8>) -> Token {
        self.define(
            method,
            MethodImpl::Il(IlMethod {
                locals,
                bytes: RwLock::new(bytes),
                decoded: RwLock::new(None),
            }),
        )
    }

    fn define(&self, method: &TargetMethod, implementation: MethodImpl) -> Token {
        let token = self.members.intern_method(method);
        let method_rc = self.members.method(token).ok();
        self.methods.insert(method.clone(), Arc::new(implementation));
        if let Some(method_rc) = method_rc {
            self.names.insert(
                (method.declaring_type().to_string(), method.name().to_string()),
                method_rc,
            );
        }
        token
    }

    /// Calls `method` through its hook chain.
    ///
    /// # Errors
    /// Returns [`crate::Error::RecursionLimit`] past [`EngineConfig::max_call_depth`],
    /// [`crate::Error::MissingMember`] for undefined methods, and any error raised while
    /// executing the method.
    pub fn call(
        &self,
        method: &TargetMethod,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let _depth = self.enter()?;
        self.hooks.invoke(method, this, args, &|this, args| {
            self.call_original(method, this, args)
        })
    }

    /// Resolves `declaring_type::name` and calls it.
    ///
    /// # Errors
    /// Same as [`Self::call`].
    pub fn call_by_name(
        &self,
        declaring_type: &str,
        name: &str,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let method = self.resolve_method(declaring_type, name)?;
        self.call(&method, this, args)
    }

    /// Allocates an object of a declared type outside the scene.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingMember`] if the type is not declared.
    pub fn new_object(&self, type_name: &str) -> Result<ObjectId> {
        let layout = self
            .types
            .get(type_name)
            .map(|layout| layout.value().clone())
            .ok_or_else(|| Error::MissingMember {
                type_name: type_name.to_string(),
                member: ".ctor".to_string(),
            })?;
        Ok(self.heap.alloc(type_name, &layout))
    }

    /// Object storage.
    #[must_use]
    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    /// Scene membership.
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    fn call_original(
        &self,
        method: &TargetMethod,
        this: Option<Value>,
        args: &[Value],
    ) -> Result<Option<Value>> {
        let implementation = self
            .methods
            .get(method)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::MissingMember {
                type_name: method.declaring_type().to_string(),
                member: method.name().to_string(),
            })?;

        match implementation.as_ref() {
            MethodImpl::Native(func) => func(self, this, args),
            MethodImpl::Il(il) => {
                let body = self.decoded(il)?;
                Interpreter::new(self, method, &body, &il.locals, this, args).run()
            }
        }
    }

    fn decoded(&self, il: &IlMethod) -> Result<Arc<MethodBody>> {
        if let Some(body) = read_lock!(il.decoded).as_ref() {
            return Ok(Arc::clone(body));
        }
        let body = Arc::new(decode(&read_lock!(il.bytes))?);
        *write_lock!(il.decoded) = Some(Arc::clone(&body));
        Ok(body)
    }

    fn enter(&self) -> Result<DepthGuard<'_>> {
        let depth = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        let guard = DepthGuard(&self.depth);
        if depth > self.config.max_call_depth {
            return Err(Error::RecursionLimit(self.config.max_call_depth));
        }
        Ok(guard)
    }

    fn il_method(&self, method: &TargetMethod) -> Result<Arc<MethodImpl>> {
        let implementation = self
            .methods
            .get(method)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::MissingMember {
                type_name: method.declaring_type().to_string(),
                member: method.name().to_string(),
            })?;
        match implementation.as_ref() {
            MethodImpl::Il(_) => Ok(implementation),
            MethodImpl::Native(_) => Err(Error::NoMethodBody(method.full_name())),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("methods", &self.methods.len())
            .field("types", &self.types.len())
            .field("objects", &self.heap.len())
            .field("hooks", &self.hooks.len())
            .field("delegates", &self.delegates.len())
            .finish_non_exhaustive()
    }
}

impl HostBinding for Runtime {
    fn resolve_method(&self, declaring_type: &str, name: &str) -> Result<TargetMethodRc> {
        self.names
            .get(&(declaring_type.to_string(), name.to_string()))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::MissingMember {
                type_name: declaring_type.to_string(),
                member: name.to_string(),
            })
    }

    fn resolve_field(&self, declaring_type: &str, name: &str) -> Result<FieldRef> {
        self.types
            .get(declaring_type)
            .and_then(|layout| layout.field_type(name))
            .map(|ty| FieldRef::new(declaring_type, name, ty))
            .ok_or_else(|| Error::MissingMember {
                type_name: declaring_type.to_string(),
                member: name.to_string(),
            })
    }

    fn method_body(&self, method: &TargetMethod) -> Result<Vec<u8>> {
        match self.il_method(method)?.as_ref() {
            MethodImpl::Il(il) => Ok(read_lock!(il.bytes).clone()),
            MethodImpl::Native(_) => Err(Error::NoMethodBody(method.full_name())),
        }
    }

    fn replace_method_body(&self, method: &TargetMethod, bytes: Vec<u8>) -> Result<()> {
        let implementation = self.il_method(method)?;
        let MethodImpl::Il(il) = implementation.as_ref() else {
            return Err(Error::NoMethodBody(method.full_name()));
        };

        let body = Arc::new(decode(&bytes)?);
        log::debug!(
            "replacing body of {} ({} instructions, {} bytes)",
            method.full_name(),
            body.len(),
            bytes.len()
        );
        *write_lock!(il.bytes) = bytes;
        *write_lock!(il.decoded) = Some(body);
        Ok(())
    }

    fn members(&self) -> &MemberTable {
        &self.members
    }

    fn delegates(&self) -> &DelegateTable {
        &self.delegates
    }

    fn hooks(&self) -> &HookManager {
        &self.hooks
    }
}

impl FieldAccess for Runtime {
    fn read_field(&self, object: ObjectId, field: &str) -> Result<Value> {
        self.heap.read(object, field)
    }

    fn write_field(&self, object: ObjectId, field: &str, value: Value) -> Result<()> {
        self.heap.write(object, field, value)
    }
}

impl SceneQuery for Runtime {
    fn active_objects(&self, category: &str) -> Vec<ObjectId> {
        self.scene
            .objects()
            .into_iter()
            .filter(|object| {
                self.heap
                    .type_of(*object)
                    .is_ok_and(|type_name| type_name == category)
            })
            .collect()
    }

    fn all_objects(&self) -> Vec<ObjectId> {
        self.scene.objects()
    }

    fn add_object(&self, category: &str, fields: &[(&str, Value)]) -> Result<ObjectId> {
        let object = self.new_object(category)?;
        for (name, value) in fields {
            if let Err(error) = self.heap.write(object, name, *value) {
                self.heap.free(object);
                return Err(error);
            }
        }
        self.scene.add(object);
        Ok(object)
    }

    fn remove_object(&self, object: ObjectId) -> Result<()> {
        if !self.scene.remove(object) {
            return Err(Error::UnknownObject(object.0));
        }

        if let Ok(removed) = self.resolve_method(ENTITY_TYPE, REMOVED_METHOD) {
            let args = removed
                .sig()
                .params
                .iter()
                .map(|ty| Value::default_for(*ty))
                .collect();
            self.call(&removed, Some(Value::Object(object)), args)?;
        }
        Ok(())
    }
}
