//! # modweave Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the modweave library. Import this module to get quick access to the essential
//! types for hooking and patching a host.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all modweave operations
pub use crate::Error;

/// The result type used throughout modweave
pub use crate::Result;

/// Engine-wide configuration
pub use crate::EngineConfig;

// ================================================================================================
// Host Capabilities
// ================================================================================================

/// Traits a host implements to be modded
pub use crate::host::{FieldAccess, HostBinding, SceneQuery};

/// Values crossing the host boundary
pub use crate::host::{ObjectId, Value};

// ================================================================================================
// Members
// ================================================================================================

/// Method and field identities
pub use crate::metadata::{FieldRef, MethodSig, TargetMethod, ValueType};

/// Member tokens and the interning table
pub use crate::metadata::{MemberTable, Token};

// ================================================================================================
// Instructions
// ================================================================================================

/// Instruction model
pub use crate::assembly::{InstrId, Instruction, MethodBody, OpCode, Operand};

/// Assembler for method bodies
pub use crate::assembly::MethodBodyBuilder;

// ================================================================================================
// Hooks
// ================================================================================================

/// Wrapper chains around host methods
pub use crate::hook::{CallFrame, Hook, HookHandle, HookManager};

// ================================================================================================
// Patches
// ================================================================================================

/// Cursor-driven body rewriting
pub use crate::patch::{MoveType, PatchCursor, PatchHandle, PatchManager, PatchStatus};

/// Instruction pattern predicates
pub use crate::patch::{
    match_call, match_callvirt, match_callvirt_containing, match_ldarg, match_ldc_i4,
    match_ldfld, match_ldloc, match_opcode, match_stfld, matching, Predicate,
};

// ================================================================================================
// Settings and Extensions
// ================================================================================================

/// Typed settings
pub use crate::settings::{keys, OverrideRegistry, SettingKey};

/// Extension lifecycle
pub use crate::extension::{Extension, ExtensionManager, InstallSet, ModContext};

/// Per-frame tasks
pub use crate::extension::{CancelToken, Scheduler, Task, TaskStatus};

// ================================================================================================
// Reference Host
// ================================================================================================

/// In-process host executing method bodies
pub use crate::emulation::{Runtime, TypeLayout};
