//! Gameplay variants built on the engine.
//!
//! Each variant is an [`crate::extension::Extension`] gated by one built-in setting from
//! [`crate::settings::keys`]:
//!
//! | Variant | Setting | Mechanism |
//! |---|---|---|
//! | [`JumpCount`] | `JumpCount` | patches on the player update methods and `UseRefill` |
//! | [`DisableClimbJumping`] | `DisableClimbJumping` | hook on `ClimbJump`, patch on `ClimbUpdate` |
//! | [`UnderwaterSwitch`] | `EverythingIsUnderwater` | per-frame watcher task |
//! | [`ReferenceCleanup`] | `MasterSwitch` | hooks on object removal and level end |
//!
//! Injected delegates read their settings on every call, so changing a setting takes
//! effect on the next frame without reloading the variant.

mod disable_climb_jumping;
mod jump_count;
mod reference_cleanup;
mod underwater;

pub use disable_climb_jumping::DisableClimbJumping;
pub use jump_count::{JumpBuffer, JumpCount};
pub use reference_cleanup::{ReferenceCleanup, ReferenceTable};
pub use underwater::{UnderwaterSwitch, UnderwaterWatcher, LEVEL, WATER};

use crate::{host::Value, Error, Result};

/// Declaring type of every player method the variants touch.
pub const PLAYER: &str = "Celeste.Player";

/// Delegate argument `index`.
pub(crate) fn arg(args: &[Value], index: usize) -> Result<Value> {
    args.get(index).copied().ok_or(Error::OutOfBounds)
}
