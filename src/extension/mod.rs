//! Load/unload-bound bundles of hooks, patches and watcher tasks.
//!
//! An [`Extension`] installs everything it needs in [`Extension::load`] through an
//! [`InstallSet`], which remembers every hook handle, patch handle and task token. The
//! [`ExtensionManager`] keeps that set while the extension is loaded and tears it down on
//! unload, so an extension never has to undo its own installations by hand.
//!
//! # Key Components
//!
//! - [`Extension`] - The trait every extension implements
//! - [`ModContext`] - Shared handles to the host, settings, patcher and scheduler
//! - [`InstallSet`] - What one loaded extension installed
//! - [`ExtensionManager`] - Registration order, strict load/unload alternation
//! - [`Scheduler`] / [`Task`] / [`CancelToken`] - Cooperative per-frame watchers
//!
//! # Host drift
//!
//! The `*_by_name` helpers on [`InstallSet`] resolve their target through the host first.
//! If the host no longer has the method, the helper logs a warning and installs nothing
//! for that one entry; the rest of the extension still loads.

mod lifecycle;
mod watcher;

pub use lifecycle::{ExtensionInfo, ExtensionManager};
pub use watcher::{CancelToken, Scheduler, Task, TaskStatus};

use std::sync::Arc;

use crate::{
    hook::{Hook, HookHandle},
    host::{FieldAccess, HostBinding, SceneQuery},
    metadata::TargetMethod,
    patch::{PatchCursor, PatchHandle, PatchManager},
    settings::OverrideRegistry,
    EngineConfig, Result,
};

/// A unit of modded behaviour gated by one override setting.
///
/// # Examples
///
/// ```rust,ignore
/// struct NoClimbJumps;
///
/// impl Extension for NoClimbJumps {
///     fn name(&self) -> &str { "DisableClimbJumping" }
///     fn setting(&self) -> &str { "DisableClimbJumping" }
///
///     fn load(&self, cx: &ModContext, installs: &mut InstallSet) -> Result<()> {
///         installs.hook_by_name(cx, "Celeste.Player", "ClimbJump", Hook::new("skip", |_| Ok(None)));
///         Ok(())
///     }
/// }
/// ```
pub trait Extension: Send + Sync {
    /// Unique name, also used as the log target suffix.
    fn name(&self) -> &str;

    /// Name of the override setting this extension is configured through.
    fn setting(&self) -> &str;

    /// Value of [`Self::setting`] when unconfigured, as declared in the registry.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] if the setting was never declared.
    fn default_value(&self, settings: &OverrideRegistry) -> Result<i32> {
        settings.default_raw(self.setting())
    }

    /// Current value of [`Self::setting`].
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] if the setting was never declared.
    fn value(&self, settings: &OverrideRegistry) -> Result<i32> {
        settings.get_raw(self.setting())
    }

    /// Stores a new value for [`Self::setting`].
    ///
    /// # Errors
    /// Returns the registry's error for unknown settings or out-of-range values.
    fn set_value(&self, settings: &OverrideRegistry, value: i32) -> Result<()> {
        settings.set_raw(self.setting(), value)
    }

    /// Installs hooks, patches and tasks, recording each in `installs`.
    ///
    /// # Errors
    /// Any error aborts the load; whatever was recorded in `installs` so far is removed.
    fn load(&self, cx: &ModContext, installs: &mut InstallSet) -> Result<()>;

    /// Extra teardown run before the recorded installations are removed.
    ///
    /// # Errors
    /// An error is returned from [`ExtensionManager::unload`] after the installations
    /// have been removed anyway.
    fn unload(&self, _cx: &ModContext) -> Result<()> {
        Ok(())
    }
}

/// Shared handles given to every extension.
///
/// Cloning is cheap; all clones refer to the same host, registry, patcher and scheduler.
#[derive(Clone)]
pub struct ModContext {
    host: Arc<dyn HostBinding>,
    fields: Arc<dyn FieldAccess>,
    scene: Arc<dyn SceneQuery>,
    settings: Arc<OverrideRegistry>,
    patches: Arc<PatchManager>,
    scheduler: Arc<Scheduler>,
}

impl ModContext {
    /// Builds a context around a host implementing every capability.
    pub fn new<H>(host: Arc<H>, settings: Arc<OverrideRegistry>, config: EngineConfig) -> Self
    where
        H: HostBinding + FieldAccess + SceneQuery + 'static,
    {
        let binding: Arc<dyn HostBinding> = host.clone();
        ModContext {
            patches: Arc::new(PatchManager::new(binding.clone(), config)),
            host: binding,
            fields: host.clone(),
            scene: host,
            settings,
            scheduler: Arc::new(Scheduler::new()),
        }
    }

    /// Method-level host access.
    #[must_use]
    pub fn host(&self) -> &Arc<dyn HostBinding> {
        &self.host
    }

    /// Field access on live host objects.
    #[must_use]
    pub fn fields(&self) -> &Arc<dyn FieldAccess> {
        &self.fields
    }

    /// Scene queries.
    #[must_use]
    pub fn scene(&self) -> &Arc<dyn SceneQuery> {
        &self.scene
    }

    /// Override settings.
    #[must_use]
    pub fn settings(&self) -> &Arc<OverrideRegistry> {
        &self.settings
    }

    /// Patch bookkeeping for every extension of this mod.
    #[must_use]
    pub fn patches(&self) -> &Arc<PatchManager> {
        &self.patches
    }

    /// Per-frame task runner.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }
}

impl std::fmt::Debug for ModContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModContext")
            .field("patches", &self.patches)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

/// Everything one loaded extension installed.
#[derive(Debug, Default)]
#[must_use = "an InstallSet must be uninstalled to undo its hooks and patches"]
pub struct InstallSet {
    hooks: Vec<HookHandle>,
    patches: Vec<PatchHandle>,
    tasks: Vec<CancelToken>,
}

impl InstallSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` on `target`.
    pub fn hook(&mut self, cx: &ModContext, target: &TargetMethod, hook: Hook) {
        self.hooks.push(cx.host().hooks().register(target, hook));
    }

    /// Resolves `declaring_type::name` and registers `hook` on it.
    ///
    /// Returns `false` if the host has no such method; the miss is logged.
    pub fn hook_by_name(
        &mut self,
        cx: &ModContext,
        declaring_type: &str,
        name: &str,
        hook: Hook,
    ) -> bool {
        match tolerate_drift(cx.host().resolve_method(declaring_type, name)) {
            Ok(Some(target)) => {
                self.hook(cx, &target, hook);
                true
            }
            Ok(None) => false,
            Err(error) => {
                log::warn!("hook on {declaring_type}::{name} not installed: {error}");
                false
            }
        }
    }

    /// Applies a patch to `target` through the context's [`PatchManager`].
    ///
    /// # Errors
    /// Propagates errors from [`PatchManager::apply`].
    pub fn patch<F>(
        &mut self,
        cx: &ModContext,
        target: &TargetMethod,
        name: &str,
        manipulator: F,
    ) -> Result<()>
    where
        F: Fn(&mut PatchCursor<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.patches
            .push(cx.patches().apply(target, name, manipulator)?);
        Ok(())
    }

    /// Resolves `declaring_type::method` and patches it.
    ///
    /// Returns `Ok(false)` if the host has no such method; the miss is logged.
    ///
    /// # Errors
    /// Propagates errors from [`PatchManager::apply`].
    pub fn patch_by_name<F>(
        &mut self,
        cx: &ModContext,
        declaring_type: &str,
        method: &str,
        name: &str,
        manipulator: F,
    ) -> Result<bool>
    where
        F: Fn(&mut PatchCursor<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let Some(target) = tolerate_drift(cx.host().resolve_method(declaring_type, method))?
        else {
            return Ok(false);
        };
        self.patch(cx, &target, name, manipulator)?;
        Ok(true)
    }

    /// Spawns a watcher task that is cancelled on uninstall.
    pub fn task(&mut self, cx: &ModContext, task: Box<dyn Task>) {
        self.tasks.push(cx.scheduler().spawn(task));
    }

    /// Number of hooks, patches and tasks recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len() + self.patches.len() + self.tasks.len()
    }

    /// Returns `true` if nothing was installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes everything, newest first.
    ///
    /// Every removal is attempted even if one fails. Patches that could not be removed
    /// stay in the set, so calling this again retries exactly those.
    ///
    /// # Errors
    /// Returns the first error raised while removing a patch.
    pub fn uninstall(&mut self, cx: &ModContext) -> Result<()> {
        let mut first_error = None;

        for cancel in self.tasks.drain(..).rev() {
            cancel.cancel();
        }
        for handle in self.hooks.drain(..).rev() {
            if !cx.host().hooks().unregister(handle) {
                log::debug!("hook was already unregistered");
            }
        }

        let mut stranded = Vec::new();
        for handle in self.patches.drain(..).rev() {
            if let Err(error) = cx.patches().remove(&handle) {
                log::warn!("failed to remove patch on {}: {error}", handle.target().full_name());
                first_error.get_or_insert(error);
                stranded.push(handle);
            }
        }
        stranded.reverse();
        self.patches = stranded;

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Turns host drift into `Ok(None)` after logging it.
///
/// # Errors
/// Any error that is not host drift is passed through.
pub fn tolerate_drift<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.is_host_drift() => {
            log::warn!("host drift, entry skipped: {error}");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}
