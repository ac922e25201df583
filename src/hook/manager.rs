//! Hook manager for registering and dispatching wrappers.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use dashmap::DashMap;

use crate::{
    hook::{
        chain::{dispatch, ChainEntry, HookChain},
        core::Hook,
        types::{HookHandle, OriginalFn},
    },
    host::Value,
    metadata::TargetMethod,
    Result,
};

static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(0);

/// Registry of wrapper chains keyed by target method.
///
/// # Examples
///
/// ```rust
/// use modweave::hook::{Hook, HookManager};
/// use modweave::host::Value;
/// use modweave::metadata::{MethodSig, TargetMethod, ValueType};
///
/// let manager = HookManager::new();
/// let target = TargetMethod::new(
///     "Celeste.Player",
///     "get_Speed",
///     MethodSig::instance(vec![], Some(ValueType::I32)),
/// );
///
/// let handle = manager.register(&target, Hook::new("plus-one", |frame| {
///     let inner = frame.call_next()?.unwrap_or_default().as_i32()?;
///     Ok(Some(Value::I32(inner + 1)))
/// }));
///
/// let original = |_this: Option<Value>, _args: &[Value]| Ok(Some(Value::I32(10)));
/// assert_eq!(manager.invoke(&target, None, vec![], &original)?, Some(Value::I32(11)));
///
/// assert!(manager.unregister(handle));
/// assert_eq!(manager.invoke(&target, None, vec![], &original)?, Some(Value::I32(10)));
/// # Ok::<(), modweave::Error>(())
/// ```
///
/// # Thread Safety
///
/// All methods take `&self`. Chains live in a [`DashMap`]; the map guard is released
/// before any wrapper runs, so wrappers may register or unregister hooks themselves.
#[derive(Debug, Default)]
pub struct HookManager {
    chains: DashMap<TargetMethod, Arc<HookChain>>,
}

impl HookManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `hook` as the outermost wrapper of `target`.
    pub fn register(&self, target: &TargetMethod, hook: Hook) -> HookHandle {
        let id = NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("registering hook '{}' on {}", hook.name(), target.full_name());

        let chain = self.chain(target);
        chain.prepend(ChainEntry { id, hook });
        HookHandle {
            target: target.clone(),
            id,
        }
    }

    /// Removes exactly the wrapper `handle` was issued for.
    ///
    /// Returns `false` if the handle belongs to a different manager. Handle ids are unique
    /// process-wide, so a foreign handle never removes a wrapper here.
    pub fn unregister(&self, handle: HookHandle) -> bool {
        let removed = self
            .chains
            .get(&handle.target)
            .map(|chain| Arc::clone(chain.value()))
            .is_some_and(|chain| chain.remove(handle.id));

        if removed {
            log::debug!("unregistered hook #{} from {}", handle.id, handle.target.full_name());
        }
        removed
    }

    /// Invokes `target` through its chain, ending in `original`.
    ///
    /// # Errors
    /// Propagates errors from wrappers that could not be recovered and from `original`.
    pub fn invoke(
        &self,
        target: &TargetMethod,
        this: Option<Value>,
        args: Vec<Value>,
        original: &OriginalFn<'_>,
    ) -> Result<Option<Value>> {
        let snapshot = self
            .chains
            .get(target)
            .map(|chain| chain.value().snapshot());

        match snapshot {
            Some(entries) => dispatch(&entries, target, this, args, original),
            None => original(this, &args),
        }
    }

    /// Whether any wrapper is installed on `target`.
    #[must_use]
    pub fn is_hooked(&self, target: &TargetMethod) -> bool {
        self.chain_len(target) > 0
    }

    /// Number of wrappers installed on `target`.
    #[must_use]
    pub fn chain_len(&self, target: &TargetMethod) -> usize {
        self.chains.get(target).map_or(0, |chain| chain.len())
    }

    /// Names of the wrappers on `target`, outermost first.
    #[must_use]
    pub fn hook_names(&self, target: &TargetMethod) -> Vec<String> {
        self.chains.get(target).map_or_else(Vec::new, |chain| {
            chain
                .snapshot()
                .iter()
                .map(|entry| entry.hook().name().to_string())
                .collect()
        })
    }

    /// Total number of wrappers across all targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.iter().map(|chain| chain.len()).sum()
    }

    /// Returns `true` if no wrapper is installed anywhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn chain(&self, target: &TargetMethod) -> Arc<HookChain> {
        Arc::clone(
            self.chains
                .entry(target.clone())
                .or_insert_with(|| Arc::new(HookChain::new()))
                .value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::metadata::{MethodSig, ValueType};

    fn target() -> TargetMethod {
        TargetMethod::new(
            "Celeste.Player",
            "ClimbJump",
            MethodSig::instance(vec![], None),
        )
    }

    fn tracing_hook(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Hook {
        Hook::new(name, move |frame| {
            log.lock().unwrap().push(name);
            frame.call_next()
        })
    }

    #[test]
    fn last_registered_runs_outermost() {
        let manager = HookManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = manager.register(&target(), tracing_hook("a", log.clone()));
        let _b = manager.register(&target(), tracing_hook("b", log.clone()));

        let trace = log.clone();
        manager
            .invoke(&target(), Some(Value::Null), vec![], &move |_, _| {
                trace.lock().unwrap().push("original");
                Ok(None)
            })
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["b", "a", "original"]);
        assert_eq!(manager.hook_names(&target()), vec!["b", "a"]);
    }

    #[test]
    fn short_circuit_skips_inner_and_original() {
        let manager = HookManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _inner = manager.register(&target(), tracing_hook("inner", log.clone()));
        let _outer = manager.register(&target(), Hook::new("suppress", |_frame| Ok(None)));

        let trace = log.clone();
        manager
            .invoke(&target(), None, vec![], &move |_, _| {
                trace.lock().unwrap().push("original");
                Ok(None)
            })
            .unwrap();

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn unregister_in_any_order() {
        let manager = HookManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = manager.register(&target(), tracing_hook("a", log.clone()));
        let b = manager.register(&target(), tracing_hook("b", log.clone()));
        let c = manager.register(&target(), tracing_hook("c", log.clone()));

        assert!(manager.unregister(b));
        assert_eq!(manager.hook_names(&target()), vec!["c", "a"]);
        assert!(manager.unregister(a));
        assert!(manager.unregister(c));
        assert!(!manager.is_hooked(&target()));
        assert!(manager.is_empty());
    }

    #[test]
    fn handles_from_another_manager_are_rejected() {
        let first = HookManager::new();
        let second = HookManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let ours = first.register(&target(), tracing_hook("ours", log.clone()));
        let theirs = second.register(&target(), tracing_hook("theirs", log.clone()));

        assert!(!first.unregister(theirs));
        assert_eq!(first.hook_names(&target()), vec!["ours"]);
        assert_eq!(second.hook_names(&target()), vec!["theirs"]);
        assert!(first.unregister(ours));
    }

    #[test]
    fn wrapper_can_rewrite_arguments() {
        let manager = HookManager::new();
        let add = TargetMethod::new(
            "Math",
            "Add",
            MethodSig::static_method(vec![ValueType::I32, ValueType::I32], Some(ValueType::I32)),
        );
        let _h = manager.register(
            &add,
            Hook::new("swap-to-ten", |frame| frame.call_next_with(vec![Value::I32(10), Value::I32(0)])),
        );

        let result = manager
            .invoke(&add, None, vec![Value::I32(1), Value::I32(2)], &|_, args| {
                Ok(Some(Value::I32(args[0].as_i32()? + args[1].as_i32()?)))
            })
            .unwrap();
        assert_eq!(result, Some(Value::I32(10)));
    }

    #[test]
    fn registration_during_call_does_not_affect_it() {
        let manager = Arc::new(HookManager::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let late = Arc::new(Mutex::new(None));

        let m = manager.clone();
        let l = log.clone();
        let slot = late.clone();
        let _outer = manager.register(
            &target(),
            Hook::new("registrar", move |frame| {
                let handle = m.register(&target(), tracing_hook("late", l.clone()));
                *slot.lock().unwrap() = Some(handle);
                frame.call_next()
            }),
        );

        manager.invoke(&target(), None, vec![], &|_, _| Ok(None)).unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(manager.chain_len(&target()), 2);

        let handle = late.lock().unwrap().take().unwrap();
        assert!(manager.unregister(handle));
    }
}
