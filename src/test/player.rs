//! A small player host.
//!
//! Update methods return the state the player ends up in: `0` nothing happened, `1` a
//! regular jump, `2` a wall jump. Natives count what was called in `climbJumps` and
//! `wallJumps` so tests can tell which path ran.

use std::sync::Arc;

use crate::{
    assembly::{MethodBodyBuilder, OpCode},
    emulation::{Runtime, TypeLayout, ENTITY_TYPE, REMOVED_METHOD},
    host::{FieldAccess, HostBinding, ObjectId, SceneQuery, Value},
    metadata::{FieldRef, MethodSig, TargetMethod, ValueType},
    EngineConfig, Result,
};

pub const PLAYER: &str = "Celeste.Player";
pub const BUTTON: &str = "Monocle.VirtualButton";
pub const LEVEL: &str = "Celeste.Level";
pub const WATER: &str = "Celeste.Water";

pub fn method(name: &str) -> TargetMethod {
    let sig = match name {
        "UseRefill" => MethodSig::instance(vec![ValueType::Bool], Some(ValueType::Bool)),
        "WallJumpCheck" => MethodSig::instance(vec![ValueType::I32], Some(ValueType::Bool)),
        "WallJump" => MethodSig::instance(vec![ValueType::I32], None),
        "ClimbJump" => MethodSig::instance(vec![], None),
        _ => MethodSig::instance(vec![], Some(ValueType::I32)),
    };
    TargetMethod::new(PLAYER, name, sig)
}

fn field(runtime: &Runtime, name: &str, ty: ValueType) -> crate::metadata::Token {
    runtime
        .members()
        .intern_field(&FieldRef::new(PLAYER, name, ty))
}

/// Host with the player type, its update methods, a jump button, a level and water.
pub fn player_runtime() -> Arc<Runtime> {
    super::init_logging();
    let runtime = Runtime::new(EngineConfig::strict());

    runtime.define_type(
        PLAYER,
        TypeLayout::new()
            .field("jumpGraceTimer", ValueType::F32)
            .field("Dashes", ValueType::I32)
            .field_with("Stamina", ValueType::F32, Value::F32(110.0))
            .field("moveX", ValueType::I32)
            .field_with("Facing", ValueType::I32, Value::I32(1))
            .field("wallLeft", ValueType::Bool)
            .field("wallRight", ValueType::Bool)
            .field("jumpButton", ValueType::Object)
            .field("climbJumps", ValueType::I32)
            .field("wallJumps", ValueType::I32),
    );
    runtime.define_type(BUTTON, TypeLayout::new().field("pressed", ValueType::Bool));
    runtime.define_type(
        LEVEL,
        TypeLayout::new()
            .field("Left", ValueType::I32)
            .field("Top", ValueType::I32)
            .field_with("Width", ValueType::I32, Value::I32(320))
            .field_with("Height", ValueType::I32, Value::I32(180)),
    );
    runtime.define_type(
        WATER,
        TypeLayout::new()
            .field("Left", ValueType::I32)
            .field("Top", ValueType::I32)
            .field("Width", ValueType::I32)
            .field("Height", ValueType::I32)
            .field("FillTop", ValueType::I32)
            .field("FillHeight", ValueType::I32),
    );

    define_natives(&runtime);
    for name in ["NormalUpdate", "DashUpdate"] {
        runtime.define_il(&method(name), vec![], jump_update(&runtime).unwrap());
    }
    runtime.define_il(&method("UseRefill"), vec![ValueType::I32], use_refill(&runtime).unwrap());
    runtime.define_il(&method("ClimbUpdate"), vec![], climb_update(&runtime).unwrap());

    Arc::new(runtime)
}

fn count(runtime: &Runtime, this: Option<Value>, counter: &str) -> Result<()> {
    let player = this.unwrap_or_default().as_object()?;
    let current = runtime.read_field(player, counter)?.as_i32()?;
    runtime.write_field(player, counter, Value::I32(current + 1))
}

fn define_natives(runtime: &Runtime) {
    runtime.define_native(&method("WallJumpCheck"), |rt, this, args| {
        let player = this.unwrap_or_default().as_object()?;
        let wall = match args[0].as_i32()? {
            1 => "wallRight",
            _ => "wallLeft",
        };
        Ok(Some(rt.read_field(player, wall)?))
    });
    runtime.define_native(&method("ClimbJump"), |rt, this, _| {
        count(rt, this, "climbJumps")?;
        Ok(None)
    });
    runtime.define_native(&method("WallJump"), |rt, this, _| {
        count(rt, this, "wallJumps")?;
        Ok(None)
    });
    runtime.define_native(
        &TargetMethod::new(BUTTON, "get_Pressed", MethodSig::instance(vec![], Some(ValueType::Bool))),
        |rt, this, _| Ok(Some(rt.read_field(this.unwrap_or_default().as_object()?, "pressed")?)),
    );
    runtime.define_native(
        &TargetMethod::new(LEVEL, "End", MethodSig::instance(vec![], None)),
        |rt, _, _| {
            rt.scene().clear();
            Ok(None)
        },
    );
    runtime.define_native(
        &TargetMethod::new(
            ENTITY_TYPE,
            REMOVED_METHOD,
            MethodSig::instance(vec![ValueType::Object], None),
        ),
        |_, _, _| Ok(None),
    );
}

/// `if (jumpGraceTimer > 0) { jump } else if (WallJumpCheck(1) || WallJumpCheck(-1)) { wall jump }`
fn jump_update(runtime: &Runtime) -> Result<Vec<u8>> {
    let timer = field(runtime, "jumpGraceTimer", ValueType::F32);
    let wall_check = runtime.members().intern_method(&method("WallJumpCheck"));

    let mut asm = MethodBodyBuilder::new();
    asm.emit_ldarg(0)?;
    asm.emit_token(OpCode::Ldfld, timer)?;
    asm.emit_ldc_r4(0.0)?;
    asm.emit_branch("ble.un.s", "wall")?;
    asm.emit_ldarg(0)?;
    asm.emit_ldc_r4(0.0)?;
    asm.emit_token(OpCode::Stfld, timer)?;
    asm.emit_ldc_i4(1)?;
    asm.emit_instruction("ret", None)?;

    asm.define_label("wall")?;
    asm.emit_ldarg(0)?;
    asm.emit_ldc_i4(1)?;
    asm.emit_token(OpCode::Callvirt, wall_check)?;
    asm.emit_branch("brtrue.s", "wall_jump")?;
    asm.emit_ldarg(0)?;
    asm.emit_ldc_i4(-1)?;
    asm.emit_token(OpCode::Callvirt, wall_check)?;
    asm.emit_branch("brtrue.s", "wall_jump")?;
    asm.emit_ldc_i4(0)?;
    asm.emit_instruction("ret", None)?;

    asm.define_label("wall_jump")?;
    asm.emit_ldc_i4(2)?;
    asm.emit_instruction("ret", None)?;
    asm.finalize_bytes()
}

/// Refills dashes when below the maximum or when stamina is low.
fn use_refill(runtime: &Runtime) -> Result<Vec<u8>> {
    let dashes = field(runtime, "Dashes", ValueType::I32);
    let stamina = field(runtime, "Stamina", ValueType::F32);

    let mut asm = MethodBodyBuilder::new();
    asm.emit_ldarg(1)?;
    asm.emit_branch("brtrue.s", "two")?;
    asm.emit_ldc_i4(1)?;
    asm.emit_branch("br.s", "store")?;
    asm.define_label("two")?;
    asm.emit_ldc_i4(2)?;
    asm.define_label("store")?;
    asm.emit_stloc(0)?;

    asm.emit_ldarg(0)?;
    asm.emit_token(OpCode::Ldfld, dashes)?;
    asm.emit_ldloc(0)?;
    asm.emit_branch("blt.s", "refill")?;

    asm.emit_ldarg(0)?;
    asm.emit_token(OpCode::Ldfld, stamina)?;
    asm.emit_ldc_r4(20.0)?;
    asm.emit_branch("bge.un.s", "keep")?;

    asm.define_label("refill")?;
    asm.emit_ldarg(0)?;
    asm.emit_ldloc(0)?;
    asm.emit_token(OpCode::Stfld, dashes)?;
    asm.emit_ldc_i4(1)?;
    asm.emit_instruction("ret", None)?;

    asm.define_label("keep")?;
    asm.emit_ldc_i4(0)?;
    asm.emit_instruction("ret", None)?;
    asm.finalize_bytes()
}

/// Climb jump, or wall jump when pushing away from the wall, on a jump press.
fn climb_update(runtime: &Runtime) -> Result<Vec<u8>> {
    let button = field(runtime, "jumpButton", ValueType::Object);
    let move_x = field(runtime, "moveX", ValueType::I32);
    let facing = field(runtime, "Facing", ValueType::I32);
    let pressed = runtime.members().intern_method(&TargetMethod::new(
        BUTTON,
        "get_Pressed",
        MethodSig::instance(vec![], Some(ValueType::Bool)),
    ));
    let wall_jump = runtime.members().intern_method(&method("WallJump"));
    let climb_jump = runtime.members().intern_method(&method("ClimbJump"));

    let mut asm = MethodBodyBuilder::new();
    asm.emit_ldarg(0)?;
    asm.emit_token(OpCode::Ldfld, button)?;
    asm.emit_token(OpCode::Callvirt, pressed)?;
    asm.emit_branch("brfalse.s", "stay")?;

    asm.emit_ldarg(0)?;
    asm.emit_token(OpCode::Ldfld, move_x)?;
    asm.emit_ldarg(0)?;
    asm.emit_token(OpCode::Ldfld, facing)?;
    asm.emit_instruction("neg", None)?;
    asm.emit_branch("bne.un.s", "climb")?;

    asm.emit_ldarg(0)?;
    asm.emit_ldarg(0)?;
    asm.emit_token(OpCode::Ldfld, facing)?;
    asm.emit_instruction("neg", None)?;
    asm.emit_token(OpCode::Callvirt, wall_jump)?;
    asm.emit_ldc_i4(2)?;
    asm.emit_instruction("ret", None)?;

    asm.define_label("climb")?;
    asm.emit_ldarg(0)?;
    asm.emit_token(OpCode::Callvirt, climb_jump)?;
    asm.emit_ldc_i4(1)?;
    asm.emit_instruction("ret", None)?;

    asm.define_label("stay")?;
    asm.emit_ldc_i4(0)?;
    asm.emit_instruction("ret", None)?;
    asm.finalize_bytes()
}

/// A player in the scene holding a jump button.
pub fn spawn_player(runtime: &Runtime) -> ObjectId {
    let button = runtime.add_object(BUTTON, &[]).unwrap();
    runtime
        .add_object(PLAYER, &[("jumpButton", Value::Object(button))])
        .unwrap()
}

/// Calls a parameterless player update and returns the resulting state.
pub fn update(runtime: &Runtime, player: ObjectId, name: &str) -> i32 {
    runtime
        .call(&method(name), Some(Value::Object(player)), vec![])
        .unwrap()
        .unwrap()
        .as_i32()
        .unwrap()
}
