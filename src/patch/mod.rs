//! Instruction-stream patching of host method bodies.
//!
//! A patch is a manipulator closure that receives a [`PatchCursor`] over the decoded body
//! of a target method. It searches for a pattern (a slice of [`Predicate`]s), then emits new
//! instructions at the match: loads, calls, branches to existing instructions, and calls
//! into native closures registered in the [`DelegateTable`].
//!
//! Inserting never invalidates a branch. Bodies address branch targets by
//! [`crate::assembly::InstrId`], and the encoder recomputes every displacement (promoting
//! short branches that no longer fit) when the body is written back.
//!
//! # Host Drift
//!
//! A pattern that does not match is the normal failure mode after the host changed. The
//! [`PatchManager`] logs it, marks the patch [`PatchStatus::Skipped`], and leaves the method
//! exactly as it was.
//!
//! # Key Components
//!
//! - [`PatchManager`] - Applies, tracks and removes patches per target method
//! - [`PatchCursor`] / [`MoveType`] - Searching and emitting inside one body
//! - [`Predicate`] and the `match_*` constructors - Instruction patterns
//! - [`DelegateTable`] - Native closures callable from patched code

mod cursor;
mod delegate;
mod manager;
mod pattern;

pub use cursor::{MoveType, PatchCursor};
pub use delegate::{DelegateEntry, DelegateFn, DelegateTable};
pub use manager::{Manipulator, PatchHandle, PatchManager, PatchStatus};
pub use pattern::{
    match_call, match_callvirt, match_callvirt_containing, match_ldarg, match_ldc_i4,
    match_ldfld, match_ldloc, match_opcode, match_stfld, matching, Predicate,
};
