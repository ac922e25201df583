//! Core types for the interception chain.
//!
//! - [`HookHandle`]: ownership token for one registered wrapper
//! - [`CallFrame`]: what a wrapper sees while it runs
//! - [`WrapperFn`] / [`OriginalFn`]: type aliases for wrapper closures and the terminal call

use std::sync::Arc;

use crate::{
    hook::chain::{dispatch, ChainEntry},
    host::Value,
    metadata::TargetMethod,
    Error, Result,
};

/// Type alias for wrapper closures.
///
/// A wrapper receives the [`CallFrame`] of the current invocation and returns the value the
/// call evaluates to (`None` for `void`).
pub type WrapperFn = Arc<dyn Fn(&mut CallFrame<'_>) -> Result<Option<Value>> + Send + Sync>;

/// Terminal call at the end of a chain: the original, unhooked implementation.
///
/// Receives `this` (if the method has one) and the argument list.
pub type OriginalFn<'a> = dyn Fn(Option<Value>, &[Value]) -> Result<Option<Value>> + 'a;

/// Ownership token for a registered wrapper.
///
/// Handles are neither `Clone` nor `Copy`: [`crate::hook::HookManager::unregister`]
/// consumes the handle, so a wrapper can be removed exactly once and only by its owner.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping a HookHandle leaks the wrapper until the manager is dropped"]
pub struct HookHandle {
    pub(crate) target: TargetMethod,
    pub(crate) id: u64,
}

impl HookHandle {
    /// Method the wrapper was registered on.
    #[must_use]
    pub fn target(&self) -> &TargetMethod {
        &self.target
    }
}

/// Per-invocation view handed to a wrapper.
///
/// `call_next` and `call_next_with` continue with the next inner wrapper, eventually
/// reaching the unhooked method. A wrapper may call through any number of times,
/// or not at all to short-circuit the call.
///
/// # Examples
///
/// ```rust
/// use modweave::hook::{CallFrame, Hook};
/// use modweave::host::Value;
///
/// // Doubles the first argument before calling through.
/// let hook = Hook::new("double-first", |frame: &mut CallFrame<'_>| {
///     let doubled = frame.arg(0)?.as_i32()? * 2;
///     frame.args_mut()[0] = Value::I32(doubled);
///     frame.call_next()
/// });
/// assert_eq!(hook.name(), "double-first");
/// ```
pub struct CallFrame<'a> {
    method: &'a TargetMethod,
    this: Option<Value>,
    args: Vec<Value>,
    inner: &'a [ChainEntry],
    original: &'a OriginalFn<'a>,
    called_through: bool,
    inner_result: Option<Option<Value>>,
}

impl<'a> CallFrame<'a> {
    pub(crate) fn new(
        method: &'a TargetMethod,
        this: Option<Value>,
        args: Vec<Value>,
        inner: &'a [ChainEntry],
        original: &'a OriginalFn<'a>,
    ) -> Self {
        CallFrame {
            method,
            this,
            args,
            inner,
            original,
            called_through: false,
            inner_result: None,
        }
    }

    /// The intercepted method.
    #[must_use]
    pub fn method(&self) -> &TargetMethod {
        self.method
    }

    /// The receiver, `None` for static methods.
    #[must_use]
    pub fn this(&self) -> Option<Value> {
        self.this
    }

    /// Arguments as they will be passed to the next wrapper.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Mutable arguments; changes are seen by `call_next`.
    pub fn args_mut(&mut self) -> &mut Vec<Value> {
        &mut self.args
    }

    /// Argument at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the call has fewer arguments.
    pub fn arg(&self, index: usize) -> Result<Value> {
        self.args.get(index).copied().ok_or(Error::OutOfBounds)
    }

    /// Whether this wrapper has called through at least once.
    #[must_use]
    pub fn called_through(&self) -> bool {
        self.called_through
    }

    /// Calls the next inner wrapper with the current arguments.
    ///
    /// # Errors
    /// Propagates errors from inner wrappers or the unhooked method.
    pub fn call_next(&mut self) -> Result<Option<Value>> {
        let args = self.args.clone();
        self.call_next_with(args)
    }

    /// Calls the next inner wrapper with replacement arguments.
    ///
    /// # Errors
    /// Propagates errors from inner wrappers or the unhooked method.
    pub fn call_next_with(&mut self, args: Vec<Value>) -> Result<Option<Value>> {
        self.called_through = true;
        let result = dispatch(self.inner, self.method, self.this, args, self.original)?;
        self.inner_result = Some(result);
        Ok(result)
    }

    pub(crate) fn inner_result(&self) -> Option<Option<Value>> {
        self.inner_result
    }
}
