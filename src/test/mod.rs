//! Shared fixtures for unit tests.
//!
//! - [`calculator_runtime`] - a host with one static arithmetic method
//! - [`player`] - a host modelled after the player update methods the variants patch
//! - [`RejectingHost`] - a host wrapper whose body writes can be made to fail

pub mod player;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{
    assembly::MethodBodyBuilder,
    emulation::Runtime,
    hook::HookManager,
    host::HostBinding,
    metadata::{FieldRef, MemberTable, MethodSig, TargetMethod, TargetMethodRc, ValueType},
    patch::DelegateTable,
    EngineConfig, Result,
};

/// Routes `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `static int32 Demo.Calculator::Compute(int32)`.
pub fn calculator_target() -> TargetMethod {
    TargetMethod::new(
        "Demo.Calculator",
        "Compute",
        MethodSig::static_method(vec![ValueType::I32], Some(ValueType::I32)),
    )
}

/// Host defining [`calculator_target`] as `ldarg.0; ldc.i4.1; add; ret`.
pub fn calculator_runtime() -> Arc<Runtime> {
    init_logging();
    let runtime = Runtime::new(EngineConfig::strict());

    let mut asm = MethodBodyBuilder::new();
    asm.emit_ldarg(0).unwrap();
    asm.emit_ldc_i4(1).unwrap();
    asm.emit_instruction("add", None).unwrap();
    asm.emit_instruction("ret", None).unwrap();
    runtime.define_il(&calculator_target(), vec![], asm.finalize_bytes().unwrap());

    Arc::new(runtime)
}

/// Forwards to a [`Runtime`] but can refuse [`HostBinding::replace_method_body`].
pub struct RejectingHost {
    inner: Arc<Runtime>,
    rejecting: AtomicBool,
}

impl RejectingHost {
    pub fn new(inner: Arc<Runtime>) -> Arc<Self> {
        Arc::new(RejectingHost {
            inner,
            rejecting: AtomicBool::new(false),
        })
    }

    pub fn reject_writes(&self, reject: bool) {
        self.rejecting.store(reject, Ordering::SeqCst);
    }
}

impl HostBinding for RejectingHost {
    fn resolve_method(&self, declaring_type: &str, name: &str) -> Result<TargetMethodRc> {
        self.inner.resolve_method(declaring_type, name)
    }

    fn resolve_field(&self, declaring_type: &str, name: &str) -> Result<FieldRef> {
        self.inner.resolve_field(declaring_type, name)
    }

    fn method_body(&self, method: &TargetMethod) -> Result<Vec<u8>> {
        self.inner.method_body(method)
    }

    fn replace_method_body(&self, method: &TargetMethod, bytes: Vec<u8>) -> Result<()> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(malformed_error!("write to {} rejected", method.full_name()));
        }
        self.inner.replace_method_body(method, bytes)
    }

    fn members(&self) -> &MemberTable {
        self.inner.members()
    }

    fn delegates(&self) -> &DelegateTable {
        self.inner.delegates()
    }

    fn hooks(&self) -> &HookManager {
        self.inner.hooks()
    }
}
