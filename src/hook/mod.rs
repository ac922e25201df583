//! Call interception chains.
//!
//! Every hooked host method has a chain of wrappers. Invoking the method runs the outermost
//! wrapper; each wrapper may inspect or rewrite arguments, call through to the next inner
//! wrapper, or short-circuit. The innermost call through always reaches the original
//! implementation.
//!
//! # Ordering
//!
//! [`HookManager::register`] prepends, so the last registered wrapper wraps all previous
//! ones. [`HookManager::unregister`] removes exactly one wrapper regardless of its position.
//! Wrappers must not assume they are alone on a method.
//!
//! # Failure Handling
//!
//! A wrapper that returns an error is logged and the chain completes anyway: if it had not
//! called through, the chain does so on its behalf.
//!
//! # Key Components
//!
//! - [`HookManager`] - Registry of chains keyed by [`crate::metadata::TargetMethod`]
//! - [`Hook`] - Named wrapper closure
//! - [`CallFrame`] - Per-invocation state handed to a wrapper
//! - [`HookHandle`] - Ownership token consumed by unregistration

mod chain;
mod core;
mod manager;
mod types;

pub use chain::{ChainEntry, HookChain};
pub use core::Hook;
pub use manager::HookManager;
pub use types::{CallFrame, HookHandle, OriginalFn, WrapperFn};
