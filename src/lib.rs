// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # modweave
//!
//! Runtime hooking and instruction splicing for extending a host program that cannot be
//! recompiled. `modweave` changes host behaviour in two ways:
//!
//! - **Hooks** wrap a host method. Every call goes through a chain of wrappers, each of
//!   which may call through, short-circuit, or rewrite arguments and results.
//! - **Patches** rewrite a method's instruction body. A cursor searches for an instruction
//!   pattern and splices new instructions in, including calls into native Rust closures
//!   ("delegates"). Branches that crossed the insertion point keep pointing where they did.
//!
//! Both are owned by **extensions**, which install them on load and remove them on unload.
//! After an unload the host behaves exactly as it did before the load.
//!
//! ## Features
//!
//! - **🔁 Reversible** - every hook and patch is removed by the handle that installed it
//! - **🧩 Composable** - any number of wrappers and patches may target the same method
//! - **🛡️ Drift tolerant** - a pattern that no longer matches disables that one patch, not the mod
//! - **⚙️ Typed settings** - concurrent override registry read at every call site
//! - **🧪 Testable** - an in-process reference host executes patched bodies
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use modweave::prelude::*;
//!
//! // A host with one method: int32 Demo::Inc(int32) => x + 1
//! let runtime = Arc::new(Runtime::new(EngineConfig::default()));
//! let inc = TargetMethod::new(
//!     "Demo",
//!     "Inc",
//!     MethodSig::static_method(vec![ValueType::I32], Some(ValueType::I32)),
//! );
//! let mut asm = MethodBodyBuilder::new();
//! asm.emit_ldarg(0)?;
//! asm.emit_ldc_i4(1)?;
//! asm.emit_instruction("add", None)?;
//! asm.emit_instruction("ret", None)?;
//! runtime.define_il(&inc, vec![], asm.finalize_bytes()?);
//!
//! // Multiply the result by ten right before it is returned.
//! let patches = PatchManager::new(runtime.clone(), EngineConfig::default());
//! let handle = patches.apply(&inc, "times-ten", |cursor| {
//!     cursor.goto_next(MoveType::Before, &[match_opcode(OpCode::Ret)])?;
//!     cursor.emit_ldc_i4(10)?;
//!     cursor.emit(OpCode::Mul, Operand::None)?;
//!     Ok(())
//! })?;
//! assert_eq!(runtime.call(&inc, None, vec![Value::I32(4)])?, Some(Value::I32(50)));
//!
//! // Removing the patch restores the original body.
//! patches.remove(&handle)?;
//! assert_eq!(runtime.call(&inc, None, vec![Value::I32(4)])?, Some(Value::I32(5)));
//! # Ok::<(), modweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - Instruction model, body codec and assembler
//! - [`patch`] - Patterns, [`patch::PatchCursor`], delegates and [`patch::PatchManager`]
//! - [`hook`] - Per-method wrapper chains
//! - [`settings`] - [`settings::OverrideRegistry`] and the built-in settings
//! - [`extension`] - Extension trait, lifecycle manager and per-frame scheduler
//! - [`host`] - Capabilities the engine requires from the host
//! - [`emulation`] - Reference host running bodies through an interpreter
//! - [`variants`] - Gameplay variants built on the above
//! - [`metadata`] / [`stream`] - Member tokens and byte-level helpers
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Host drift is the one recoverable
//! class of error: [`Error::PatternNotFound`] and [`Error::MissingMember`] are logged and
//! turn the affected patch or hook into a no-op, see [`Error::is_host_drift`].
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade. Patch sites and lifecycle transitions are
//! logged at `info`, host drift at `warn`. Install any `log` implementation to see them.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use modweave::prelude::*;
///
/// let settings = OverrideRegistry::with_builtin_settings();
/// settings.set(keys::JUMP_COUNT, 2)?;
/// # Ok::<(), modweave::Error>(())
/// ```
pub mod prelude;

pub mod assembly;
mod config;
pub mod emulation;
pub mod extension;
pub mod hook;
pub mod host;
pub mod metadata;
pub mod patch;
pub mod settings;
pub mod stream;
pub mod variants;

/// `modweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `modweave` Error type
///
/// See [`error::Error`](Error) for the variants and how the engine reacts to each group.
pub use error::Error;

/// Engine-wide configuration, see [`EngineConfig::default`] and the presets.
pub use config::EngineConfig;
