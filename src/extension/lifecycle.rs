//! Registration and the load/unload state machine.

use std::sync::Arc;

use crate::{
    extension::{Extension, InstallSet, ModContext},
    settings::keys,
    Error, Result,
};

/// One row of [`ExtensionManager::enumerate`], for a configuration surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionInfo {
    /// Extension name
    pub name: String,
    /// Current setting value
    pub value: i32,
    /// Setting value when unconfigured
    pub default: i32,
    /// Whether the extension is loaded
    pub loaded: bool,
}

struct Registered {
    extension: Arc<dyn Extension>,
    installed: Option<InstallSet>,
}

/// Owns the extensions of one mod and drives their lifecycle.
///
/// Every extension is either unloaded or loaded. [`Self::load`] on a loaded extension and
/// [`Self::unload`] on an unloaded one are contract violations and return
/// [`Error::AlreadyLoaded`] / [`Error::NotLoaded`] without touching the host.
///
/// [`Self::load_all`] walks the extensions in registration order and
/// [`Self::unload_all`] in reverse, so patches stacked on a shared method are peeled off in
/// the opposite order they were applied.
///
/// # Examples
///
/// ```rust,ignore
/// let mut manager = ExtensionManager::new(cx);
/// manager.register(Arc::new(JumpCount::new(settings.clone())))?;
/// manager.register(Arc::new(DisableClimbJumping::new()))?;
///
/// settings.set(keys::MASTER_SWITCH, true)?;
/// manager.apply_master_switch()?;
/// assert!(manager.is_loaded("JumpCount"));
/// ```
pub struct ExtensionManager {
    cx: ModContext,
    extensions: Vec<Registered>,
}

impl ExtensionManager {
    /// Creates a manager with no extensions.
    #[must_use]
    pub fn new(cx: ModContext) -> Self {
        ExtensionManager {
            cx,
            extensions: Vec::new(),
        }
    }

    /// Context handed to every extension.
    #[must_use]
    pub fn context(&self) -> &ModContext {
        &self.cx
    }

    /// Adds an extension in the unloaded state.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateExtension`] if the name is taken, or
    /// [`Error::UnknownSetting`] if the extension's setting was never declared.
    pub fn register(&mut self, extension: Arc<dyn Extension>) -> Result<()> {
        if self.position(extension.name()).is_some() {
            return Err(Error::DuplicateExtension(extension.name().to_string()));
        }
        self.cx.settings().definition(extension.setting())?;
        log::debug!("registered extension {}", extension.name());
        self.extensions.push(Registered {
            extension,
            installed: None,
        });
        Ok(())
    }

    /// Names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|entry| entry.extension.name().to_string())
            .collect()
    }

    /// Whether `name` is loaded. Unknown names are reported as not loaded.
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.position(name)
            .is_some_and(|index| self.extensions[index].installed.is_some())
    }

    /// Loads one extension.
    ///
    /// If the extension's [`Extension::load`] fails, whatever it had installed is removed
    /// again and the extension stays unloaded. Should that rollback itself fail, the
    /// leftovers are kept and the extension counts as loaded until [`Self::unload`]
    /// clears them.
    ///
    /// # Errors
    /// Returns [`Error::UnknownExtension`], [`Error::AlreadyLoaded`] or the load error.
    pub fn load(&mut self, name: &str) -> Result<()> {
        let index = self.index(name)?;
        let entry = &mut self.extensions[index];
        if entry.installed.is_some() {
            return Err(Error::AlreadyLoaded(name.to_string()));
        }

        let mut installs = InstallSet::new();
        if let Err(error) = entry.extension.load(&self.cx, &mut installs) {
            log::warn!("loading {name} failed: {error}");
            if let Err(cleanup) = installs.uninstall(&self.cx) {
                log::warn!("rolling back {name} failed: {cleanup}");
                entry.installed = Some(installs);
            }
            return Err(error);
        }

        log::info!("loaded {name} ({} installations)", installs.len());
        entry.installed = Some(installs);
        Ok(())
    }

    /// Unloads one extension, removing everything it installed.
    ///
    /// If a patch cannot be taken off, the extension stays loaded holding only what is
    /// left, and a later unload retries it. [`Extension::unload`] runs on every attempt.
    ///
    /// # Errors
    /// Returns [`Error::UnknownExtension`], [`Error::NotLoaded`], or the first error raised
    /// by [`Extension::unload`] or by a patch removal.
    pub fn unload(&mut self, name: &str) -> Result<()> {
        let index = self.index(name)?;
        let entry = &mut self.extensions[index];
        let installs = entry
            .installed
            .as_mut()
            .ok_or_else(|| Error::NotLoaded(name.to_string()))?;

        let teardown = entry.extension.unload(&self.cx);
        let removal = installs.uninstall(&self.cx);
        if installs.is_empty() {
            entry.installed = None;
            log::info!("unloaded {name}");
        } else {
            log::warn!("{name} stays loaded, {} patches could not be removed", installs.len());
        }
        teardown.and(removal)
    }

    /// Loads every unloaded extension in registration order.
    ///
    /// A failing extension is logged and skipped. Returns the names that failed.
    pub fn load_all(&mut self) -> Vec<String> {
        let pending: Vec<String> = self
            .extensions
            .iter()
            .filter(|entry| entry.installed.is_none())
            .map(|entry| entry.extension.name().to_string())
            .collect();

        pending
            .into_iter()
            .filter(|name| self.load(name).is_err())
            .collect()
    }

    /// Unloads every loaded extension in reverse registration order.
    ///
    /// Errors are logged. Returns the names whose teardown reported an error.
    pub fn unload_all(&mut self) -> Vec<String> {
        let loaded: Vec<String> = self
            .extensions
            .iter()
            .rev()
            .filter(|entry| entry.installed.is_some())
            .map(|entry| entry.extension.name().to_string())
            .collect();

        loaded
            .into_iter()
            .filter(|name| match self.unload(name) {
                Ok(()) => false,
                Err(error) => {
                    log::warn!("unloading {name} reported: {error}");
                    true
                }
            })
            .collect()
    }

    /// Loads or unloads everything to match the master switch.
    ///
    /// Returns the names that failed to change state.
    ///
    /// # Errors
    /// Returns [`Error::UnknownSetting`] if the master switch was never declared.
    pub fn apply_master_switch(&mut self) -> Result<Vec<String>> {
        if self.cx.settings().get(keys::MASTER_SWITCH)? {
            Ok(self.load_all())
        } else {
            Ok(self.unload_all())
        }
    }

    /// Name, value, default and load state of every extension, in registration order.
    ///
    /// # Errors
    /// Returns [`Error::UnknownSetting`] if a setting disappeared from the registry.
    pub fn enumerate(&self) -> Result<Vec<ExtensionInfo>> {
        self.extensions
            .iter()
            .map(|entry| {
                Ok(ExtensionInfo {
                    name: entry.extension.name().to_string(),
                    value: entry.extension.value(self.cx.settings())?,
                    default: entry.extension.default_value(self.cx.settings())?,
                    loaded: entry.installed.is_some(),
                })
            })
            .collect()
    }

    /// Current setting value of `name`.
    ///
    /// # Errors
    /// Returns [`Error::UnknownExtension`] or the registry's error.
    pub fn value(&self, name: &str) -> Result<i32> {
        let index = self.index(name)?;
        self.extensions[index].extension.value(self.cx.settings())
    }

    /// Stores a setting value for `name` through the extension.
    ///
    /// # Errors
    /// Returns [`Error::UnknownExtension`] or the registry's error.
    pub fn set_value(&self, name: &str, value: i32) -> Result<()> {
        let index = self.index(name)?;
        self.extensions[index]
            .extension
            .set_value(self.cx.settings(), value)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.extensions
            .iter()
            .position(|entry| entry.extension.name() == name)
    }

    fn index(&self, name: &str) -> Result<usize> {
        self.position(name)
            .ok_or_else(|| Error::UnknownExtension(name.to_string()))
    }
}

impl Drop for ExtensionManager {
    fn drop(&mut self) {
        self.unload_all();
    }
}

impl std::fmt::Debug for ExtensionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionManager")
            .field("extensions", &self.names())
            .finish_non_exhaustive()
    }
}
