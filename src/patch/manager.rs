//! Application, bookkeeping and reversal of patches.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use crate::{
    assembly::{decode, encode},
    host::HostBinding,
    metadata::{TargetMethod, Token},
    patch::cursor::PatchCursor,
    EngineConfig, Result,
};

/// Body manipulator run by [`PatchManager::apply`].
pub type Manipulator = Arc<dyn Fn(&mut PatchCursor<'_>) -> Result<()> + Send + Sync>;

static NEXT_PATCH_ID: AtomicU64 = AtomicU64::new(0);

/// Outcome of applying one patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchStatus {
    /// The manipulator ran and its result is live in the host
    Applied {
        /// Instructions emitted by the manipulator
        inserted: usize,
    },
    /// The manipulator hit host drift; the body was left as it was
    Skipped {
        /// Rendered error that caused the skip
        reason: String,
    },
}

impl PatchStatus {
    /// Whether the patch is live.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, PatchStatus::Applied { .. })
    }
}

/// Ownership token for an applied (or skipped) patch, passed to [`PatchManager::remove`].
///
/// Ids are unique across every manager in the process, so a handle never matches a patch
/// recorded by another manager.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping a PatchHandle makes the patch permanent"]
pub struct PatchHandle {
    target: TargetMethod,
    id: u64,
}

impl PatchHandle {
    /// Method the patch was applied to.
    #[must_use]
    pub fn target(&self) -> &TargetMethod {
        &self.target
    }
}

struct AppliedPatch {
    id: u64,
    name: String,
    manipulator: Manipulator,
    status: PatchStatus,
    delegates: Vec<Token>,
}

struct PatchedMethod {
    pristine: Vec<u8>,
    patches: Vec<AppliedPatch>,
}

struct Run {
    bytes: Vec<u8>,
    inserted: usize,
    delegates: Vec<Token>,
}

/// Applies patches to host method bodies and can take them off again.
///
/// Patches on one method are cumulative: each manipulator sees the body as left by the
/// patches applied before it, in application order. Nothing prevents applying the same
/// manipulator twice; doing so duplicates its effect.
///
/// The first patch on a method captures the method's pristine bytes. Removing a patch
/// rebuilds the method from those bytes by re-running the remaining manipulators in their
/// original order, and removing the last patch writes the pristine bytes back unchanged.
///
/// # Examples
///
/// ```rust,ignore
/// use modweave::patch::{match_ldfld, MoveType, PatchManager};
///
/// let patches = PatchManager::new(host.clone(), EngineConfig::default());
/// let handle = patches.apply(&normal_update, "grace timer", |cursor| {
///     cursor.goto_next(MoveType::After, &[match_ldfld("Celeste.Player", "jumpGraceTimer")])?;
///     cursor.emit_delegate("clamp", 1, Some(ValueType::F32), |args| Ok(Some(args[0])))?;
///     Ok(())
/// })?;
/// patches.remove(&handle)?;
/// ```
///
/// # Thread Safety
///
/// Applying and removing are serialised by one lock. Manipulators run while it is held
/// and must not call back into the same manager.
pub struct PatchManager {
    host: Arc<dyn HostBinding>,
    config: EngineConfig,
    methods: Mutex<HashMap<TargetMethod, PatchedMethod>>,
}

impl PatchManager {
    /// Creates a manager writing through `host`.
    pub fn new(host: Arc<dyn HostBinding>, config: EngineConfig) -> Self {
        PatchManager {
            host,
            config,
            methods: Mutex::new(HashMap::new()),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `manipulator` on the current body of `target` and installs the result.
    ///
    /// A [`crate::Error::PatternNotFound`] or [`crate::Error::MissingMember`] from the
    /// manipulator is logged and recorded as [`PatchStatus::Skipped`]; the host body stays
    /// byte-for-byte what it was. With [`EngineConfig::fail_on_missing_pattern`] set, those
    /// errors are returned instead.
    ///
    /// # Errors
    /// Returns host errors, codec errors, and any other manipulator error. On error nothing
    /// is recorded and delegates registered by the manipulator are dropped.
    pub fn apply<F>(&self, target: &TargetMethod, name: &str, manipulator: F) -> Result<PatchHandle>
    where
        F: Fn(&mut PatchCursor<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let manipulator: Manipulator = Arc::new(manipulator);
        let mut methods = lock!(self.methods);
        let current = self.host.method_body(target)?;

        let (status, delegates) = match self.run(target, &manipulator, &current) {
            Ok(run) => {
                if let Err(error) = self.host.replace_method_body(target, run.bytes) {
                    self.drop_delegates(&run.delegates);
                    return Err(error);
                }
                if self.config.log_patch_sites {
                    log::info!(
                        "applied patch '{name}' to {} ({} instructions inserted)",
                        target.full_name(),
                        run.inserted
                    );
                }
                (PatchStatus::Applied { inserted: run.inserted }, run.delegates)
            }
            Err(error) if error.is_host_drift() => {
                if self.config.fail_on_missing_pattern {
                    return Err(error);
                }
                log::warn!("patch '{name}' skipped: {error}");
                (PatchStatus::Skipped { reason: error.to_string() }, Vec::new())
            }
            Err(error) => return Err(error),
        };

        let id = NEXT_PATCH_ID.fetch_add(1, Ordering::Relaxed);
        methods
            .entry(target.clone())
            .or_insert_with(|| PatchedMethod {
                pristine: current,
                patches: Vec::new(),
            })
            .patches
            .push(AppliedPatch {
                id,
                name: name.to_string(),
                manipulator,
                status,
                delegates,
            });

        Ok(PatchHandle {
            target: target.clone(),
            id,
        })
    }

    /// Takes a patch off its method.
    ///
    /// Returns `false` if the handle belongs to a different manager or was already removed.
    ///
    /// # Errors
    /// Returns host or codec errors from rebuilding the method, or a manipulator error
    /// that is not host drift. The patch stays installed in that case and `handle` can be
    /// passed again once the cause is gone.
    pub fn remove(&self, handle: &PatchHandle) -> Result<bool> {
        let mut methods = lock!(self.methods);
        let Some(method) = methods.get_mut(&handle.target) else {
            return Ok(false);
        };
        let Some(position) = method.patches.iter().position(|p| p.id == handle.id) else {
            return Ok(false);
        };
        let removed = method.patches.remove(position);

        if method.patches.is_empty() {
            if let Err(error) = self
                .host
                .replace_method_body(&handle.target, method.pristine.clone())
            {
                method.patches.insert(position, removed);
                return Err(error);
            }
            self.drop_delegates(&removed.delegates);
            methods.remove(&handle.target);
            log::info!(
                "removed patch '{}', {} restored",
                removed.name,
                handle.target.full_name()
            );
            return Ok(true);
        }

        let rebuilt = match self.rebuild(&handle.target, method) {
            Ok(rebuilt) => rebuilt,
            Err(error) => {
                method.patches.insert(position, removed);
                return Err(error);
            }
        };

        self.drop_delegates(&removed.delegates);
        for (patch, (status, delegates)) in method.patches.iter_mut().zip(rebuilt) {
            self.drop_delegates(&patch.delegates);
            patch.status = status;
            patch.delegates = delegates;
        }
        log::info!(
            "removed patch '{}' from {}, {} remaining",
            removed.name,
            handle.target.full_name(),
            method.patches.len()
        );
        Ok(true)
    }

    /// Status of the patch `handle` refers to.
    #[must_use]
    pub fn status(&self, handle: &PatchHandle) -> Option<PatchStatus> {
        let methods = lock!(self.methods);
        methods
            .get(&handle.target)?
            .patches
            .iter()
            .find(|patch| patch.id == handle.id)
            .map(|patch| patch.status.clone())
    }

    /// Names and statuses of the patches on `target`, in application order.
    #[must_use]
    pub fn patches(&self, target: &TargetMethod) -> Vec<(String, PatchStatus)> {
        let methods = lock!(self.methods);
        methods.get(target).map_or_else(Vec::new, |method| {
            method
                .patches
                .iter()
                .map(|patch| (patch.name.clone(), patch.status.clone()))
                .collect()
        })
    }

    /// Whether any patch is recorded for `target`.
    #[must_use]
    pub fn is_patched(&self, target: &TargetMethod) -> bool {
        lock!(self.methods).contains_key(target)
    }

    /// Re-runs every remaining patch of `method` from its pristine body and installs the
    /// result. Returns the new status and delegates of each patch.
    fn rebuild(
        &self,
        target: &TargetMethod,
        method: &PatchedMethod,
    ) -> Result<Vec<(PatchStatus, Vec<Token>)>> {
        let mut bytes = method.pristine.clone();
        let mut rebuilt = Vec::with_capacity(method.patches.len());

        for patch in &method.patches {
            match self.run(target, &patch.manipulator, &bytes) {
                Ok(run) => {
                    bytes = run.bytes;
                    rebuilt.push((PatchStatus::Applied { inserted: run.inserted }, run.delegates));
                }
                Err(error) if error.is_host_drift() => {
                    log::warn!("patch '{}' skipped while rebuilding: {error}", patch.name);
                    rebuilt.push((PatchStatus::Skipped { reason: error.to_string() }, Vec::new()));
                }
                Err(error) => {
                    for (_, delegates) in &rebuilt {
                        self.drop_delegates(delegates);
                    }
                    return Err(error);
                }
            }
        }

        if let Err(error) = self.host.replace_method_body(target, bytes) {
            for (_, delegates) in &rebuilt {
                self.drop_delegates(delegates);
            }
            return Err(error);
        }
        Ok(rebuilt)
    }

    fn run(&self, target: &TargetMethod, manipulator: &Manipulator, bytes: &[u8]) -> Result<Run> {
        let mut body = decode(bytes)?;
        let mut cursor = PatchCursor::new(
            &mut body,
            target,
            self.host.members(),
            self.host.delegates(),
        )
        .with_site_logging(self.config.log_patch_sites);

        let outcome = manipulator(&mut cursor);
        let inserted = cursor.inserted();
        let delegates = cursor.into_delegates();

        let encoded = outcome.and_then(|()| {
            let bytes = encode(&body)?;
            if self.config.verify_branches {
                let reread = decode(&bytes)?;
                if reread.len() != body.len() {
                    return Err(malformed_error!(
                        "patched {} re-decodes to {} instructions, expected {}",
                        target.full_name(),
                        reread.len(),
                        body.len()
                    ));
                }
            }
            Ok(bytes)
        });

        match encoded {
            Ok(bytes) => Ok(Run {
                bytes,
                inserted,
                delegates,
            }),
            Err(error) => {
                self.drop_delegates(&delegates);
                Err(error)
            }
        }
    }

    fn drop_delegates(&self, delegates: &[Token]) {
        for token in delegates {
            self.host.delegates().remove(*token);
        }
    }
}

impl fmt::Debug for PatchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::OpCode,
        host::Value,
        metadata::ValueType,
        patch::{match_ldc_i4, match_opcode, MoveType},
        test::{calculator_runtime, calculator_target, RejectingHost},
        Error,
    };

    fn call(runtime: &crate::emulation::Runtime, x: i32) -> i32 {
        runtime
            .call(&calculator_target(), None, vec![Value::I32(x)])
            .unwrap()
            .unwrap()
            .as_i32()
            .unwrap()
    }

    /// Multiplies the value on the stack right before `ret` by `factor`.
    fn scale(factor: i32) -> impl Fn(&mut PatchCursor<'_>) -> Result<()> + Send + Sync + 'static {
        move |cursor| {
            cursor.goto_next(MoveType::Before, &[match_opcode(OpCode::Ret)])?;
            cursor.emit_ldc_i4(factor)?;
            cursor.emit(OpCode::Mul, crate::assembly::Operand::None)?;
            Ok(())
        }
    }

    #[test]
    fn apply_and_remove_restore_pristine_bytes() {
        let runtime = calculator_runtime();
        let patches = PatchManager::new(runtime.clone(), EngineConfig::default());
        let pristine = runtime.method_body(&calculator_target()).unwrap();

        let handle = patches.apply(&calculator_target(), "double", scale(2)).unwrap();
        assert_eq!(patches.status(&handle), Some(PatchStatus::Applied { inserted: 2 }));
        assert_eq!(call(&runtime, 5), 2 * (5 + 1));
        assert_ne!(runtime.method_body(&calculator_target()).unwrap(), pristine);

        assert!(patches.remove(&handle).unwrap());
        assert_eq!(runtime.method_body(&calculator_target()).unwrap(), pristine);
        assert_eq!(call(&runtime, 5), 6);
        assert!(!patches.is_patched(&calculator_target()));
    }

    #[test]
    fn pattern_miss_leaves_body_untouched() {
        let runtime = calculator_runtime();
        let patches = PatchManager::new(runtime.clone(), EngineConfig::default());
        let pristine = runtime.method_body(&calculator_target()).unwrap();

        let handle = patches
            .apply(&calculator_target(), "missing", |cursor| {
                cursor.goto_next(MoveType::After, &[match_ldc_i4(1234)])?;
                cursor.emit_delegate("never", 0, None, |_| Ok(None))?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(patches.status(&handle), Some(PatchStatus::Skipped { .. })));
        assert_eq!(runtime.method_body(&calculator_target()).unwrap(), pristine);
        assert!(runtime.delegates().is_empty());
        assert!(patches.remove(&handle).unwrap());
    }

    #[test]
    fn strict_config_turns_miss_into_error() {
        let runtime = calculator_runtime();
        let patches = PatchManager::new(runtime.clone(), EngineConfig::strict());
        let result = patches.apply(&calculator_target(), "missing", |cursor| {
            cursor.goto_next(MoveType::After, &[match_ldc_i4(1234)])
        });
        assert!(matches!(result, Err(Error::PatternNotFound { .. })));
        assert!(!patches.is_patched(&calculator_target()));
    }

    #[test]
    fn removing_middle_patch_rebuilds_the_rest_in_order() {
        let runtime = calculator_runtime();
        let patches = PatchManager::new(runtime.clone(), EngineConfig::default());

        let double = patches.apply(&calculator_target(), "double", scale(2)).unwrap();
        let triple = patches.apply(&calculator_target(), "triple", scale(3)).unwrap();
        let offset = patches
            .apply(&calculator_target(), "offset", |cursor| {
                cursor.goto_next(MoveType::Before, &[match_opcode(OpCode::Ret)])?;
                cursor.emit_ldc_i4(100)?;
                cursor.emit(OpCode::Add, crate::assembly::Operand::None)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(call(&runtime, 1), (1 + 1) * 2 * 3 + 100);

        assert!(patches.remove(&triple).unwrap());
        assert_eq!(call(&runtime, 1), (1 + 1) * 2 + 100);
        let names: Vec<String> = patches
            .patches(&calculator_target())
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["double", "offset"]);

        assert!(patches.remove(&double).unwrap());
        assert!(patches.remove(&offset).unwrap());
        assert_eq!(call(&runtime, 1), 2);
    }

    #[test]
    fn delegates_follow_their_patch() {
        let runtime = calculator_runtime();
        let patches = PatchManager::new(runtime.clone(), EngineConfig::default());

        let handle = patches
            .apply(&calculator_target(), "negate", |cursor| {
                cursor.goto_next(MoveType::Before, &[match_opcode(OpCode::Ret)])?;
                cursor.emit_delegate("negate", 1, Some(ValueType::I32), |args| {
                    Ok(Some(Value::I32(-args[0].as_i32()?)))
                })?;
                Ok(())
            })
            .unwrap();
        assert_eq!(runtime.delegates().len(), 1);
        assert_eq!(call(&runtime, 4), -5);

        assert!(patches.remove(&handle).unwrap());
        assert!(runtime.delegates().is_empty());
    }

    #[test]
    fn foreign_handles_are_ignored() {
        let runtime = calculator_runtime();
        let first = PatchManager::new(runtime.clone(), EngineConfig::default());
        let second = PatchManager::new(runtime.clone(), EngineConfig::default());
        let doubled = first.apply(&calculator_target(), "double", scale(2)).unwrap();
        let tripled = second.apply(&calculator_target(), "triple", scale(3)).unwrap();

        assert!(!second.remove(&doubled).unwrap());
        assert!(!first.remove(&tripled).unwrap());
        assert!(second.status(&tripled).is_some_and(|status| status.is_applied()));
        assert_eq!(second.patches(&calculator_target()).len(), 1);
        assert_eq!(call(&runtime, 1), (1 + 1) * 2 * 3);

        assert!(second.remove(&tripled).unwrap());
        assert!(first.remove(&doubled).unwrap());
        assert_eq!(call(&runtime, 1), 2);
    }

    #[test]
    fn failed_removal_keeps_the_handle_usable() {
        let runtime = calculator_runtime();
        let host = RejectingHost::new(runtime.clone());
        let patches = PatchManager::new(host.clone(), EngineConfig::default());
        let pristine = runtime.method_body(&calculator_target()).unwrap();
        let handle = patches.apply(&calculator_target(), "double", scale(2)).unwrap();

        host.reject_writes(true);
        assert!(matches!(patches.remove(&handle), Err(Error::Malformed { .. })));
        assert!(patches.status(&handle).is_some());
        assert_eq!(call(&runtime, 5), 12);

        host.reject_writes(false);
        assert!(patches.remove(&handle).unwrap());
        assert!(!patches.remove(&handle).unwrap());
        assert_eq!(runtime.method_body(&calculator_target()).unwrap(), pristine);
    }
}
