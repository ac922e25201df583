//! Climbing without climb jumps.
//!
//! While `DisableClimbJumping` is on, pressing jump while holding a wall only does
//! something if it is a wall jump (pushing away from the wall). Two entries make that
//! happen:
//!
//! - a hook on `Player::ClimbJump` that skips the original
//! - a patch on `Player::ClimbUpdate` that makes the jump button read as released unless
//!   `moveX == -Facing`

use std::sync::Arc;

use crate::{
    extension::{Extension, InstallSet, ModContext},
    hook::Hook,
    host::{FieldAccess, Value},
    metadata::{FieldRef, ValueType},
    patch::{match_callvirt, MoveType, PatchCursor},
    settings::{keys, OverrideRegistry},
    variants::{arg, PLAYER},
    Result,
};

/// The `DisableClimbJumping` variant.
#[derive(Debug, Default)]
pub struct DisableClimbJumping;

impl DisableClimbJumping {
    /// Creates the variant.
    #[must_use]
    pub fn new() -> Self {
        DisableClimbJumping
    }
}

impl Extension for DisableClimbJumping {
    fn name(&self) -> &str {
        "DisableClimbJumping"
    }

    fn setting(&self) -> &str {
        keys::DISABLE_CLIMB_JUMPING.name()
    }

    fn load(&self, cx: &ModContext, installs: &mut InstallSet) -> Result<()> {
        let settings = cx.settings().clone();
        installs.hook_by_name(
            cx,
            PLAYER,
            "ClimbJump",
            Hook::new("disable-climb-jump", move |frame| {
                if settings.get(keys::DISABLE_CLIMB_JUMPING)? {
                    return Ok(None);
                }
                frame.call_next()
            })
            .with_owner(self.name()),
        );

        let Some(move_x) = crate::extension::tolerate_drift(cx.host().resolve_field(PLAYER, "moveX"))?
        else {
            return Ok(());
        };
        let settings = cx.settings().clone();
        let fields = cx.fields().clone();
        installs.patch_by_name(cx, PLAYER, "ClimbUpdate", "jump button check", move |cursor| {
            patch_jump_button_check(cursor, &move_x, &settings, &fields)
        })?;
        Ok(())
    }
}

fn patch_jump_button_check(
    cursor: &mut PatchCursor<'_>,
    move_x: &FieldRef,
    settings: &Arc<OverrideRegistry>,
    fields: &Arc<dyn FieldAccess>,
) -> Result<()> {
    cursor.goto_next(
        MoveType::After,
        &[match_callvirt("Monocle.VirtualButton", "get_Pressed")],
    )?;
    cursor.log_site("Patching jump button check in climb update");

    cursor.emit_ldarg(0)?;
    cursor.emit_ldarg(0)?;
    cursor.emit_ldfld(move_x)?;

    let settings = settings.clone();
    let fields = fields.clone();
    cursor.emit_delegate("jump_button_check", 3, Some(ValueType::Bool), move |args| {
        let pressed = arg(args, 0)?.as_bool()?;
        if !settings.get(keys::DISABLE_CLIMB_JUMPING)? {
            return Ok(Some(Value::Bool(pressed)));
        }

        let player = arg(args, 1)?.as_object()?;
        let move_x = arg(args, 2)?.as_i32()?;
        let facing = fields.read_field(player, "Facing")?.as_i32()?;
        // a wall jump is still allowed
        Ok(Some(Value::Bool(pressed && move_x == -facing)))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::player::{player_runtime, spawn_player, update},
        EngineConfig,
    };

    #[test]
    fn only_wall_jumps_remain() {
        let runtime = player_runtime();
        let settings = Arc::new(OverrideRegistry::with_builtin_settings());
        let cx = ModContext::new(runtime.clone(), settings.clone(), EngineConfig::strict());
        let player = spawn_player(&runtime);
        let button = runtime.read_field(player, "jumpButton").unwrap().as_object().unwrap();
        runtime.write_field(button, "pressed", Value::Bool(true)).unwrap();

        let variant = DisableClimbJumping::new();
        let mut installs = InstallSet::new();
        variant.load(&cx, &mut installs).unwrap();
        assert_eq!(installs.len(), 2);

        // setting off: behaves like the original
        assert_eq!(update(&runtime, player, "ClimbUpdate"), 1);
        assert_eq!(runtime.read_field(player, "climbJumps").unwrap(), Value::I32(1));

        settings.set(keys::DISABLE_CLIMB_JUMPING, true).unwrap();
        assert_eq!(update(&runtime, player, "ClimbUpdate"), 0);
        assert_eq!(runtime.read_field(player, "climbJumps").unwrap(), Value::I32(1));

        runtime.write_field(player, "moveX", Value::I32(-1)).unwrap();
        assert_eq!(update(&runtime, player, "ClimbUpdate"), 2);
        assert_eq!(runtime.read_field(player, "wallJumps").unwrap(), Value::I32(1));

        // the hook alone suppresses direct climb jumps
        runtime
            .call_by_name(PLAYER, "ClimbJump", Some(Value::Object(player)), vec![])
            .unwrap();
        assert_eq!(runtime.read_field(player, "climbJumps").unwrap(), Value::I32(1));

        installs.uninstall(&cx).unwrap();
        runtime.write_field(player, "moveX", Value::I32(0)).unwrap();
        assert_eq!(update(&runtime, player, "ClimbUpdate"), 1);
        assert_eq!(runtime.read_field(player, "climbJumps").unwrap(), Value::I32(2));
    }
}
