//! Benchmarks for body patching and patched-method dispatch.
//!
//! Covers the hot paths of a modded host:
//! - Decoding and re-encoding a method body
//! - Applying and removing a patch (decode, splice, encode, install)
//! - Calling a patched method with an injected delegate
//! - Calling through a stack of hook wrappers

extern crate modweave;

use criterion::{criterion_group, criterion_main, Criterion};
use modweave::{
    assembly::{decode, encode},
    prelude::*,
};
use std::{hint::black_box, sync::Arc};

fn select() -> TargetMethod {
    TargetMethod::new(
        "Bench.Branchy",
        "Select",
        MethodSig::static_method(vec![ValueType::I32], Some(ValueType::I32)),
    )
}

/// A switch over four cases, each returning a different constant.
fn branchy_body() -> Vec<u8> {
    let mut asm = MethodBodyBuilder::new();
    asm.emit_ldarg(0).unwrap();
    asm.emit_switch(&["a", "b", "c", "d"]).unwrap();
    asm.emit_ldc_i4(-1).unwrap();
    asm.emit_instruction("ret", None).unwrap();
    for (label, value) in [("a", 10), ("b", 20), ("c", 30), ("d", 40)] {
        asm.define_label(label).unwrap();
        asm.emit_ldc_i4(value).unwrap();
        asm.emit_instruction("ret", None).unwrap();
    }
    asm.finalize_bytes().unwrap()
}

fn host() -> Arc<Runtime> {
    let runtime = Arc::new(Runtime::new(EngineConfig::lenient()));
    runtime.define_il(&select(), vec![], branchy_body());
    runtime
}

fn add_one_to_every_return(cursor: &mut PatchCursor<'_>) -> Result<()> {
    while cursor.try_goto_next(MoveType::AfterLabel, &[match_opcode(OpCode::Ret)]) {
        cursor.emit_delegate("bump", 1, Some(ValueType::I32), |args| {
            Ok(Some(Value::I32(args[0].as_i32()? + 1)))
        })?;
    }
    Ok(())
}

/// Benchmark decoding then re-encoding an unmodified body.
fn bench_codec_roundtrip(c: &mut Criterion) {
    let bytes = branchy_body();

    c.bench_function("codec_roundtrip", |b| {
        b.iter(|| {
            let body = decode(black_box(&bytes)).unwrap();
            black_box(encode(&body).unwrap())
        });
    });
}

/// Benchmark applying and removing a patch that touches every return.
fn bench_apply_remove(c: &mut Criterion) {
    let runtime = host();
    let patches = PatchManager::new(runtime.clone(), EngineConfig::lenient());

    c.bench_function("patch_apply_remove", |b| {
        b.iter(|| {
            let handle = patches
                .apply(&select(), "bump", add_one_to_every_return)
                .unwrap();
            black_box(patches.remove(&handle).unwrap())
        });
    });
}

/// Benchmark calling a method with delegates spliced into every path.
fn bench_patched_call(c: &mut Criterion) {
    let runtime = host();
    let patches = PatchManager::new(runtime.clone(), EngineConfig::lenient());
    let _handle = patches
        .apply(&select(), "bump", add_one_to_every_return)
        .unwrap();
    let method = select();

    c.bench_function("patched_call", |b| {
        b.iter(|| {
            runtime
                .call(&method, None, vec![Value::I32(black_box(2))])
                .unwrap()
        });
    });
}

/// Benchmark calling through eight wrappers.
fn bench_hook_chain(c: &mut Criterion) {
    let runtime = host();
    let method = select();
    for i in 0..8 {
        let _ = runtime
            .hooks()
            .register(&method, Hook::new(format!("pass-{i}"), |frame| frame.call_next()));
    }

    c.bench_function("hook_chain_8", |b| {
        b.iter(|| {
            runtime
                .call(&method, None, vec![Value::I32(black_box(1))])
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_codec_roundtrip,
    bench_apply_remove,
    bench_patched_call,
    bench_hook_chain,
);
criterion_main!(benches);
