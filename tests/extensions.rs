//! Extension lifecycles, settings and the jump-count variant through the public API.

use std::sync::Arc;

use modweave::{prelude::*, variants::JumpCount};

const PLAYER: &str = "Celeste.Player";

fn update(name: &str) -> TargetMethod {
    TargetMethod::new(PLAYER, name, MethodSig::instance(vec![], Some(ValueType::I32)))
}

fn wall_jump_check() -> TargetMethod {
    TargetMethod::new(
        PLAYER,
        "WallJumpCheck",
        MethodSig::instance(vec![ValueType::I32], Some(ValueType::Bool)),
    )
}

/// `1` for a grounded or buffered jump, `2` for a wall jump, `0` otherwise.
fn jump_update(runtime: &Runtime) -> Result<Vec<u8>> {
    let timer = runtime
        .members()
        .intern_field(&FieldRef::new(PLAYER, "jumpGraceTimer", ValueType::F32));
    let check = runtime.members().intern_method(&wall_jump_check());

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
    asm.emit_token(OpCode::Callvirt, check)?;
    asm.emit_branch("brtrue.s", "wall_jump")?;
    asm.emit_ldarg(0)?;
    asm.emit_ldc_i4(-1)?;
    asm.emit_token(OpCode::Callvirt, check)?;
    asm.emit_branch("brtrue.s", "wall_jump")?;
    asm.emit_ldc_i4(0)?;
    asm.emit_instruction("ret", None)?;
    asm.define_label("wall_jump")?;
    asm.emit_ldc_i4(2)?;
    asm.emit_instruction("ret", None)?;
    asm.finalize_bytes()
}

/// A player host without `UseRefill`, as an older host version would look.
fn host() -> Arc<Runtime> {
    let _ = env_logger::builder().is_test(true).try_init();
    let runtime = Runtime::new(EngineConfig::default());
    runtime.define_type(
        PLAYER,
        TypeLayout::new()
            .field("jumpGraceTimer", ValueType::F32)
            .field("wallLeft", ValueType::Bool)
            .field("wallRight", ValueType::Bool),
    );
    runtime.define_native(&wall_jump_check(), |rt, this, args| {
        let player = this.unwrap_or_default().as_object()?;
        let wall = if args[0].as_i32()? == 1 { "wallRight" } else { "wallLeft" };
        Ok(Some(rt.read_field(player, wall)?))
    });
    for name in ["NormalUpdate", "DashUpdate"] {
        let body = jump_update(&runtime).unwrap();
        runtime.define_il(&update(name), vec![], body);
    }
    Arc::new(runtime)
}

fn jump(runtime: &Runtime, player: ObjectId, timer: f32) -> i32 {
    runtime
        .write_field(player, "jumpGraceTimer", Value::F32(timer))
        .unwrap();
    runtime
        .call(&update("NormalUpdate"), Some(Value::Object(player)), vec![])
        .unwrap()
        .unwrap()
        .as_i32()
        .unwrap()
}

struct Fixture {
    runtime: Arc<Runtime>,
    settings: Arc<OverrideRegistry>,
    manager: ExtensionManager,
    jumps: Arc<JumpCount>,
}

fn fixture() -> Fixture {
    let runtime = host();
    let settings = Arc::new(OverrideRegistry::with_builtin_settings());
    let cx = ModContext::new(runtime.clone(), settings.clone(), EngineConfig::default());
    let jumps = Arc::new(JumpCount::new(settings.clone()));

    let mut manager = ExtensionManager::new(cx);
    manager.register(jumps.clone()).unwrap();
    Fixture {
        runtime,
        settings,
        manager,
        jumps,
    }
}

#[test]
fn buffer_arithmetic() {
    let settings = Arc::new(OverrideRegistry::with_builtin_settings());
    let jumps = JumpCount::new(settings.clone());

    settings.set(keys::JUMP_COUNT, 5).unwrap();
    assert!(jumps.add_jumps(3, false).unwrap());
    assert_eq!(jumps.jump_buffer(), 3);
    // A JumpCount of 5 caps the buffer at 4 extra jumps.
    assert!(jumps.add_jumps(2, true).unwrap());
    assert_eq!(jumps.jump_buffer(), 4);

    let settings = Arc::new(OverrideRegistry::with_builtin_settings());
    let jumps = JumpCount::new(settings.clone());
    settings.set(keys::JUMP_COUNT, 3).unwrap();
    assert!(jumps.refill_jump_buffer().unwrap());
    assert_eq!(jumps.jump_buffer(), 2);
    assert!(!jumps.refill_jump_buffer().unwrap());
    assert_eq!(jumps.jump_buffer(), 2);
}

#[test]
fn load_then_unload_restores_the_baseline() {
    let mut fx = fixture();
    let normal = update("NormalUpdate");
    let pristine = fx.runtime.method_body(&normal).unwrap();
    let player = fx.runtime.new_object(PLAYER).unwrap();
    let timers = [0.0_f32, 0.05, 0.1, 1.0];
    let baseline: Vec<i32> = timers.iter().map(|t| jump(&fx.runtime, player, *t)).collect();

    fx.settings.set(keys::JUMP_COUNT, 1).unwrap();
    fx.manager.load("JumpCount").unwrap();
    assert!(fx.manager.is_loaded("JumpCount"));
    fx.manager.unload("JumpCount").unwrap();

    assert_eq!(fx.runtime.method_body(&normal).unwrap(), pristine);
    assert!(fx.runtime.delegates().is_empty());
    let after: Vec<i32> = timers.iter().map(|t| jump(&fx.runtime, player, *t)).collect();
    assert_eq!(after, baseline);
}

#[test]
fn buffered_jumps_replace_the_grace_timer() {
    let mut fx = fixture();
    fx.settings.set(keys::JUMP_COUNT, 3).unwrap();
    // `UseRefill` is absent from this host; the variant still loads without it.
    fx.manager.load("JumpCount").unwrap();

    let player = fx.runtime.new_object(PLAYER).unwrap();
    assert_eq!(jump(&fx.runtime, player, 0.1), 1);
    assert_eq!(fx.jumps.jump_buffer(), 2);

    assert_eq!(jump(&fx.runtime, player, 0.0), 1);
    assert_eq!(jump(&fx.runtime, player, 0.0), 1);
    assert_eq!(fx.jumps.jump_buffer(), 0);
    assert_eq!(jump(&fx.runtime, player, 0.0), 0);

    // Wall jumps are untouched and do not spend the buffer.
    fx.jumps.add_jumps(1, true).unwrap();
    fx.runtime
        .write_field(player, "wallLeft", Value::Bool(true))
        .unwrap();
    assert_eq!(jump(&fx.runtime, player, 0.0), 2);
    assert_eq!(fx.jumps.jump_buffer(), 1);

    fx.manager.unload("JumpCount").unwrap();
}

#[test]
fn settings_change_behaviour_without_reloading() {
    let mut fx = fixture();
    fx.settings.set(keys::JUMP_COUNT, 1).unwrap();
    fx.manager.load("JumpCount").unwrap();
    let player = fx.runtime.new_object(PLAYER).unwrap();

    assert_eq!(jump(&fx.runtime, player, 0.0), 0);
    fx.settings.set(keys::JUMP_COUNT, keys::INFINITE_JUMPS).unwrap();
    assert_eq!(jump(&fx.runtime, player, 0.0), 1);
    assert_eq!(jump(&fx.runtime, player, 0.0), 1);

    fx.settings.set(keys::JUMP_COUNT, 0).unwrap();
    assert_eq!(jump(&fx.runtime, player, 0.5), 0);
    fx.manager.unload("JumpCount").unwrap();
}

#[test]
fn lifecycle_violations_are_reported() {
    let mut fx = fixture();

    assert!(matches!(
        fx.manager.unload("JumpCount"),
        Err(Error::NotLoaded(_))
    ));
    fx.manager.load("JumpCount").unwrap();
    assert!(matches!(
        fx.manager.load("JumpCount"),
        Err(Error::AlreadyLoaded(_))
    ));
    assert!(matches!(
        fx.manager.load("Nothing"),
        Err(Error::UnknownExtension(_))
    ));
    assert!(matches!(
        fx.manager.register(fx.jumps.clone()),
        Err(Error::DuplicateExtension(_))
    ));
    fx.manager.unload("JumpCount").unwrap();
}

#[test]
fn master_switch_and_enumeration() {
    let mut fx = fixture();
    fx.manager.set_value("JumpCount", 4).unwrap();

    let info = fx.manager.enumerate().unwrap();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].name, "JumpCount");
    assert_eq!(info[0].value, 4);
    assert_eq!(info[0].default, 1);
    assert!(!info[0].loaded);

    fx.settings.set(keys::MASTER_SWITCH, true).unwrap();
    assert!(fx.manager.apply_master_switch().unwrap().is_empty());
    assert!(fx.manager.is_loaded("JumpCount"));

    fx.settings.set(keys::MASTER_SWITCH, false).unwrap();
    assert!(fx.manager.apply_master_switch().unwrap().is_empty());
    assert!(!fx.manager.is_loaded("JumpCount"));
    assert!(fx.runtime.delegates().is_empty());
}

#[test]
fn out_of_range_values_are_rejected() {
    let settings = OverrideRegistry::with_builtin_settings();
    settings.set(keys::JUMP_COUNT, 2).unwrap();

    assert!(matches!(
        settings.set(keys::JUMP_COUNT, 7),
        Err(Error::SettingOutOfRange { value: 7, .. })
    ));
    assert!(settings.set_raw("MasterSwitch", 2).is_err());
    assert_eq!(settings.get(keys::JUMP_COUNT).unwrap(), 2);

    settings.reset_all();
    assert_eq!(settings.get(keys::JUMP_COUNT).unwrap(), 1);
}

#[test]
fn reads_never_observe_torn_values() {
    let settings = OverrideRegistry::with_builtin_settings();
    settings.set(keys::JUMP_COUNT, 2).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..2000 {
                let value = if i % 2 == 0 { 5 } else { 2 };
                settings.set(keys::JUMP_COUNT, value).unwrap();
            }
        });
        for _ in 0..3 {
            scope.spawn(|| {
                for _ in 0..2000 {
                    let value = settings.get(keys::JUMP_COUNT).unwrap();
                    assert!(value == 2 || value == 5, "observed {value}");
                }
            });
        }
    });
}
