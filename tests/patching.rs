//! Instruction patching end to end: assemble, patch, execute, remove.

use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use modweave::{
    assembly::{decode, encode},
    prelude::*,
};

fn unary(name: &str) -> TargetMethod {
    TargetMethod::new(
        "Demo.Patched",
        name,
        MethodSig::static_method(vec![ValueType::I32], Some(ValueType::I32)),
    )
}

fn host() -> Arc<Runtime> {
    let _ = env_logger::builder().is_test(true).try_init();
    Arc::new(Runtime::new(EngineConfig::default()))
}

/// `x + 1`
fn define_inc(runtime: &Runtime) -> TargetMethod {
    let method = unary("Inc");
    let mut asm = MethodBodyBuilder::new();
    asm.emit_ldarg(0).unwrap();
    asm.emit_ldc_i4(1).unwrap();
    asm.emit_instruction("add", None).unwrap();
    asm.emit_instruction("ret", None).unwrap();
    runtime.define_il(&method, vec![], asm.finalize_bytes().unwrap());
    method
}

/// `x != 0 ? 20 : 10`, with two returns.
fn define_pick(runtime: &Runtime) -> TargetMethod {
    let method = unary("Pick");
    let mut asm = MethodBodyBuilder::new();
    asm.emit_ldarg(0).unwrap();
    asm.emit_branch("brtrue.s", "nonzero").unwrap();
    asm.emit_ldc_i4(10).unwrap();
    asm.emit_instruction("ret", None).unwrap();
    asm.define_label("nonzero").unwrap();
    asm.emit_ldc_i4(20).unwrap();
    asm.emit_instruction("ret", None).unwrap();
    runtime.define_il(&method, vec![], asm.finalize_bytes().unwrap());
    method
}

/// `(x != 0 ? 7 : 5)` computed through a shared `ret`.
fn define_join(runtime: &Runtime) -> TargetMethod {
    let method = unary("Join");
    let mut asm = MethodBodyBuilder::new();
    asm.emit_ldarg(0).unwrap();
    asm.emit_branch("brtrue.s", "one").unwrap();
    asm.emit_ldc_i4(5).unwrap();
    asm.emit_branch("br.s", "join").unwrap();
    asm.define_label("one").unwrap();
    asm.emit_ldc_i4(7).unwrap();
    asm.define_label("join").unwrap();
    asm.emit_instruction("ret", None).unwrap();
    runtime.define_il(&method, vec![], asm.finalize_bytes().unwrap());
    method
}

fn call(runtime: &Runtime, method: &TargetMethod, x: i32) -> i32 {
    runtime
        .call(method, None, vec![Value::I32(x)])
        .unwrap()
        .unwrap()
        .as_i32()
        .unwrap()
}

fn times_ten(cursor: &mut PatchCursor<'_>) -> Result<()> {
    cursor.goto_next(MoveType::Before, &[match_opcode(OpCode::Ret)])?;
    cursor.emit_ldc_i4(10)?;
    cursor.emit(OpCode::Mul, Operand::None)?;
    Ok(())
}

fn plus_three(cursor: &mut PatchCursor<'_>) -> Result<()> {
    cursor.goto_next(MoveType::Before, &[match_opcode(OpCode::Ret)])?;
    cursor.emit_ldc_i4(3)?;
    cursor.emit(OpCode::Add, Operand::None)?;
    Ok(())
}

#[test]
fn unmodified_bodies_reencode_identically() {
    let runtime = host();
    for method in [define_inc(&runtime), define_pick(&runtime), define_join(&runtime)] {
        let bytes = runtime.method_body(&method).unwrap();
        let body = decode(&bytes).unwrap();
        assert_eq!(encode(&body).unwrap(), bytes, "{method}");
    }
}

#[test]
fn branches_survive_long_insertions() {
    let runtime = host();
    let pick = define_pick(&runtime);
    let patches = PatchManager::new(runtime.clone(), EngineConfig::strict());

    let handle = patches
        .apply(&pick, "padding", |cursor| {
            cursor.goto_next(MoveType::After, &[match_opcode(OpCode::BrtrueS)])?;
            for _ in 0..200 {
                cursor.emit(OpCode::Nop, Operand::None)?;
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(call(&runtime, &pick, 0), 10);
    assert_eq!(call(&runtime, &pick, 1), 20);

    // The short branch no longer reaches and was widened.
    let body = decode(&runtime.method_body(&pick).unwrap()).unwrap();
    assert_eq!(body.get(1).unwrap().opcode, OpCode::Brtrue);
    body.verify().unwrap();

    assert!(patches.remove(&handle).unwrap());
    let restored = decode(&runtime.method_body(&pick).unwrap()).unwrap();
    assert_eq!(restored.get(1).unwrap().opcode, OpCode::BrtrueS);
}

#[test]
fn before_keeps_incoming_branches_on_the_match() {
    let runtime = host();
    let join = define_join(&runtime);
    let patches = PatchManager::new(runtime.clone(), EngineConfig::strict());

    let handle = patches
        .apply(&join, "before", |cursor| {
            cursor.goto_next(MoveType::Before, &[match_opcode(OpCode::Ret)])?;
            cursor.emit_ldc_i4(100)?;
            cursor.emit(OpCode::Add, Operand::None)?;
            Ok(())
        })
        .unwrap();

    // The taken `br.s join` still lands on `ret` and skips the insertion.
    assert_eq!(call(&runtime, &join, 0), 5);
    assert_eq!(call(&runtime, &join, 1), 107);
    patches.remove(&handle).unwrap();
}

#[test]
fn after_label_redirects_incoming_branches() {
    let runtime = host();
    let join = define_join(&runtime);
    let patches = PatchManager::new(runtime.clone(), EngineConfig::strict());

    let handle = patches
        .apply(&join, "after-label", |cursor| {
            cursor.goto_next(MoveType::AfterLabel, &[match_opcode(OpCode::Ret)])?;
            cursor.emit_ldc_i4(100)?;
            cursor.emit(OpCode::Add, Operand::None)?;
            Ok(())
        })
        .unwrap();

    assert_eq!(call(&runtime, &join, 0), 105);
    assert_eq!(call(&runtime, &join, 1), 107);
    patches.remove(&handle).unwrap();
}

#[test]
fn forward_scans_visit_each_match_once() {
    let runtime = host();
    let pick = define_pick(&runtime);
    let patches = PatchManager::new(runtime.clone(), EngineConfig::strict());

    let handle = patches
        .apply(&pick, "every-return", |cursor| {
            while cursor.try_goto_next(MoveType::Before, &[match_opcode(OpCode::Ret)]) {
                cursor.emit_ldc_i4(1)?;
                cursor.emit(OpCode::Add, Operand::None)?;
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(patches.status(&handle), Some(PatchStatus::Applied { inserted: 4 }));
    assert_eq!(call(&runtime, &pick, 0), 11);
    assert_eq!(call(&runtime, &pick, 1), 21);
    patches.remove(&handle).unwrap();
}

#[test]
fn pattern_miss_leaves_the_body_untouched() {
    let runtime = host();
    let inc = define_inc(&runtime);
    let before = runtime.method_body(&inc).unwrap();

    let patches = PatchManager::new(runtime.clone(), EngineConfig::default());
    let handle = patches
        .apply(&inc, "drifted", |cursor| {
            cursor.emit_ldc_i4(0)?;
            cursor.goto_next(MoveType::After, &[match_call("Demo.Gone", "Missing")])?;
            cursor.emit(OpCode::Pop, Operand::None)?;
            Ok(())
        })
        .unwrap();

    assert!(matches!(
        patches.status(&handle),
        Some(PatchStatus::Skipped { .. })
    ));
    assert_eq!(runtime.method_body(&inc).unwrap(), before);
    assert_eq!(call(&runtime, &inc, 4), 5);

    assert!(patches.remove(&handle).unwrap());
    assert_eq!(runtime.method_body(&inc).unwrap(), before);
}

#[test]
fn pattern_miss_is_an_error_when_strict() {
    let runtime = host();
    let inc = define_inc(&runtime);
    let before = runtime.method_body(&inc).unwrap();

    let patches = PatchManager::new(runtime.clone(), EngineConfig::strict());
    let error = patches
        .apply(&inc, "drifted", |cursor| {
            cursor.goto_next(MoveType::Before, &[match_opcode(OpCode::Switch)])
        })
        .unwrap_err();

    assert!(error.is_host_drift());
    assert!(!patches.is_patched(&inc));
    assert_eq!(runtime.method_body(&inc).unwrap(), before);
}

#[test]
fn patches_stack_in_application_order() {
    let runtime = host();
    let inc = define_inc(&runtime);
    let pristine = runtime.method_body(&inc).unwrap();
    let patches = PatchManager::new(runtime.clone(), EngineConfig::strict());

    let first = patches.apply(&inc, "times-ten", times_ten).unwrap();
    let second = patches.apply(&inc, "plus-three", plus_three).unwrap();
    // ((x + 1) * 10) + 3: the later patch sees the earlier one's output.
    assert_eq!(call(&runtime, &inc, 1), 23);
    assert_eq!(
        patches
            .patches(&inc)
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>(),
        vec!["times-ten", "plus-three"]
    );

    // Removing the first patch replays the second on the pristine body.
    patches.remove(&first).unwrap();
    assert_eq!(call(&runtime, &inc, 1), 5);

    patches.remove(&second).unwrap();
    assert_eq!(runtime.method_body(&inc).unwrap(), pristine);
    assert!(!patches.is_patched(&inc));
}

#[test]
fn reversed_order_gives_a_different_result() {
    let runtime = host();
    let inc = define_inc(&runtime);
    let patches = PatchManager::new(runtime.clone(), EngineConfig::strict());

    let first = patches.apply(&inc, "plus-three", plus_three).unwrap();
    let second = patches.apply(&inc, "times-ten", times_ten).unwrap();
    assert_eq!(call(&runtime, &inc, 1), 50);

    patches.remove(&second).unwrap();
    patches.remove(&first).unwrap();
    assert_eq!(call(&runtime, &inc, 1), 2);
}

#[test]
fn applying_twice_duplicates_behaviour() {
    let runtime = host();
    let inc = define_inc(&runtime);
    let patches = PatchManager::new(runtime.clone(), EngineConfig::strict());

    let a = patches.apply(&inc, "times-ten", times_ten).unwrap();
    let b = patches.apply(&inc, "times-ten", times_ten).unwrap();
    assert_eq!(call(&runtime, &inc, 1), 200);

    patches.remove(&a).unwrap();
    assert_eq!(call(&runtime, &inc, 1), 20);
    patches.remove(&b).unwrap();
    assert_eq!(call(&runtime, &inc, 1), 2);
}

#[test]
fn delegates_live_as_long_as_their_patch() {
    let runtime = host();
    let inc = define_inc(&runtime);
    let patches = PatchManager::new(runtime.clone(), EngineConfig::strict());
    let bonus = Arc::new(AtomicI32::new(5));

    let shared = bonus.clone();
    let handle = patches
        .apply(&inc, "bonus", move |cursor| {
            let shared = shared.clone();
            cursor.goto_next(MoveType::Before, &[match_opcode(OpCode::Ret)])?;
            cursor.emit_delegate("add-bonus", 1, Some(ValueType::I32), move |args| {
                let value = args[0].as_i32()?;
                Ok(Some(Value::I32(value + shared.load(Ordering::SeqCst))))
            })?;
            Ok(())
        })
        .unwrap();

    assert_eq!(runtime.delegates().len(), 1);
    assert_eq!(call(&runtime, &inc, 1), 7);

    // Delegates read shared state on every call.
    bonus.store(-2, Ordering::SeqCst);
    assert_eq!(call(&runtime, &inc, 1), 0);

    patches.remove(&handle).unwrap();
    assert!(runtime.delegates().is_empty());
    assert_eq!(call(&runtime, &inc, 1), 2);
}

#[test]
fn hooks_and_patches_compose() {
    let runtime = host();
    let inc = define_inc(&runtime);
    let patches = PatchManager::new(runtime.clone(), EngineConfig::strict());

    let patch = patches.apply(&inc, "times-ten", times_ten).unwrap();
    let hook = runtime.hooks().register(
        &inc,
        Hook::new("negate-input", |frame| {
            let x = frame.arg(0)?.as_i32()?;
            frame.call_next_with(vec![Value::I32(-x)])
        }),
    );

    // hook(2) -> patched(-2) = (-2 + 1) * 10
    assert_eq!(call(&runtime, &inc, 2), -10);

    runtime.hooks().unregister(hook);
    patches.remove(&patch).unwrap();
    assert_eq!(call(&runtime, &inc, 2), 3);
}
