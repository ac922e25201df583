//! In-process reference host.
//!
//! [`Runtime`] implements [`crate::host::HostBinding`], [`crate::host::FieldAccess`] and
//! [`crate::host::SceneQuery`] on top of an interpreter for the engine's own instruction
//! format. It is what the engine is tested against, and it doubles as a template for
//! adapters to real hosts: every capability the engine uses is exercised here.
//!
//! # Key Components
//!
//! - [`Runtime`] - Method table, hook dispatch, object heap and scene
//! - [`ObjectHeap`] / [`TypeLayout`] - Named-field objects
//! - [`Scene`] - Ordered set of active objects

mod heap;
mod interpreter;
mod runtime;
mod scene;

pub use heap::{ObjectHeap, TypeLayout};
pub use runtime::{NativeFn, Runtime, ENTITY_TYPE, REMOVED_METHOD};
pub use scene::Scene;
