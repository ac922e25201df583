//! Per-method wrapper chains.
//!
//! A [`HookChain`] stores its wrappers as an immutable snapshot (`Arc<[ChainEntry]>`).
//! Registering or removing a wrapper builds a new snapshot and swaps it in under a short
//! write lock; an invocation clones the current snapshot once when it starts. A call that
//! is already running therefore keeps the exact chain it started with, no matter how the
//! chain changes while it runs.

use std::sync::{Arc, RwLock};

use crate::{
    hook::{
        core::Hook,
        types::{CallFrame, OriginalFn},
    },
    host::Value,
    metadata::TargetMethod,
    Result,
};

/// One installed wrapper.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub(crate) id: u64,
    pub(crate) hook: Hook,
}

impl ChainEntry {
    /// The installed hook.
    #[must_use]
    pub fn hook(&self) -> &Hook {
        &self.hook
    }
}

/// Ordered wrappers around one target method, outermost first.
#[derive(Debug)]
pub struct HookChain {
    entries: RwLock<Arc<[ChainEntry]>>,
}

impl Default for HookChain {
    fn default() -> Self {
        HookChain {
            entries: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl HookChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current wrappers, outermost first.
    #[must_use]
    pub fn snapshot(&self) -> Arc<[ChainEntry]> {
        read_lock!(self.entries).clone()
    }

    /// Installs `entry` as the new outermost wrapper.
    pub fn prepend(&self, entry: ChainEntry) {
        let mut entries = write_lock!(self.entries);
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.push(entry);
        next.extend(entries.iter().cloned());
        *entries = Arc::from(next);
    }

    /// Removes the wrapper with the given id. Returns `false` if it was not installed.
    pub fn remove(&self, id: u64) -> bool {
        let mut entries = write_lock!(self.entries);
        if !entries.iter().any(|entry| entry.id == id) {
            return false;
        }

        let next: Vec<ChainEntry> = entries
            .iter()
            .filter(|entry| entry.id != id)
            .cloned()
            .collect();
        *entries = Arc::from(next);
        true
    }

    /// Number of installed wrappers.
    #[must_use]
    pub fn len(&self) -> usize {
        read_lock!(self.entries).len()
    }

    /// Returns `true` if no wrapper is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs `entries` (outermost first) around `original`.
///
/// A wrapper that fails never leaves the call half-done: the error is logged, and if the
/// wrapper had not called through yet the chain calls through on its behalf. If it had,
/// the inner result it received stands.
pub(crate) fn dispatch(
    entries: &[ChainEntry],
    method: &TargetMethod,
    this: Option<Value>,
    args: Vec<Value>,
    original: &OriginalFn<'_>,
) -> Result<Option<Value>> {
    let Some((outer, inner)) = entries.split_first() else {
        return original(this, &args);
    };

    let mut frame = CallFrame::new(method, this, args, inner, original);
    match outer.hook.run(&mut frame) {
        Ok(result) => Ok(result),
        Err(error) => {
            log::warn!(
                "wrapper '{}' on {} failed: {}",
                outer.hook.name(),
                method.full_name(),
                error
            );

            if !frame.called_through() {
                frame.call_next()
            } else if let Some(result) = frame.inner_result() {
                Ok(result)
            } else {
                Err(error)
            }
        }
    }
}
