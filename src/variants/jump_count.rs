//! Extra jumps in mid-air.
//!
//! `JumpCount` is the number of jumps available before the player has to touch the ground
//! again; the first one is the vanilla grounded jump, the others are kept in a buffer that
//! refills while the jump grace timer runs. `0` disables jumping entirely and
//! [`keys::INFINITE_JUMPS`] never runs out.
//!
//! Three patches carry the behaviour:
//!
//! - `NormalUpdate` and `DashUpdate`: the loaded grace timer is passed through
//!   [`JumpBuffer::can_jump`] together with both wall-jump checks, so a buffered jump can
//!   stand in for an expired timer. A refill from the grace timer is injected at the start.
//! - `UseRefill`: a refill is also consumed when the jump buffer is not full and
//!   `RefillJumpsOnDashRefill` is on.

use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use crate::{
    assembly::{Instruction, OpCode, Operand},
    extension::{Extension, InstallSet, ModContext},
    host::Value,
    metadata::ValueType,
    patch::{match_ldarg, match_ldfld, match_ldloc, match_opcode, MoveType, PatchCursor},
    settings::{keys, OverrideRegistry},
    variants::{arg, PLAYER},
    Error, Result,
};

/// Buffered extra jumps, shared between the extension and its injected delegates.
#[derive(Debug)]
pub struct JumpBuffer {
    settings: Arc<OverrideRegistry>,
    buffer: AtomicI32,
}

impl JumpBuffer {
    /// Creates an empty buffer reading the jump settings from `settings`.
    #[must_use]
    pub fn new(settings: Arc<OverrideRegistry>) -> Self {
        JumpBuffer {
            settings,
            buffer: AtomicI32::new(0),
        }
    }

    /// Extra jumps left.
    #[must_use]
    pub fn get(&self) -> i32 {
        self.buffer.load(Ordering::Acquire)
    }

    fn jump_count(&self) -> Result<i32> {
        self.settings.get(keys::JUMP_COUNT)
    }

    fn replace(&self, value: i32) -> bool {
        self.buffer.swap(value, Ordering::AcqRel) != value
    }

    /// Gives the maximum number of extra jumps. Returns whether the buffer changed.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] if `JumpCount` is not declared.
    pub fn refill(&self) -> Result<bool> {
        Ok(self.replace(self.jump_count()? - 1))
    }

    /// Adds `jumps` extra jumps, never exceeding the configured count when `capped`.
    ///
    /// A negative buffer is reset to zero first, so adding jumps while jumping is disabled
    /// still grants them. Returns whether the buffer changed.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] if `JumpCount` is not declared.
    pub fn add(&self, jumps: i32, capped: bool) -> Result<bool> {
        let mut value = self.get().max(0).saturating_add(jumps);
        if capped {
            value = value.min(self.jump_count()? - 1);
        }
        Ok(self.replace(value))
    }

    /// Refills the buffer while the player is able to do a grounded jump.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] if `JumpCount` is not declared.
    pub fn refill_from_grace_timer(&self, grace_timer: f32) -> Result<()> {
        if grace_timer > 0.0 {
            self.refill()?;
        }
        Ok(())
    }

    /// Grace timer the patched update should see instead of `grace_timer`.
    ///
    /// Wall jumps are left alone. An expired timer is replaced by a full one when a
    /// buffered jump is available, consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] if `JumpCount` is not declared.
    pub fn can_jump(&self, grace_timer: f32, wall_right: bool, wall_left: bool) -> Result<f32> {
        let jump_count = self.jump_count()?;
        if jump_count == 0 && self.get() <= 0 {
            return Ok(0.0);
        }
        if wall_left || wall_right {
            return Ok(grace_timer);
        }
        if jump_count == keys::INFINITE_JUMPS {
            return Ok(1.0);
        }
        if grace_timer > 0.0 || self.get() <= 0 {
            return Ok(grace_timer);
        }
        self.buffer.fetch_sub(1, Ordering::AcqRel);
        Ok(1.0)
    }

    /// Whether a dash refill should also be consumed to refill jumps.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] if a jump setting is not declared.
    pub fn needs_refilling(&self) -> Result<bool> {
        let jump_count = self.jump_count()?;
        Ok(self.settings.get(keys::REFILL_JUMPS_ON_DASH_REFILL)?
            && jump_count >= 2
            && self.get() < jump_count - 1)
    }

    /// Reacts to the player's dash being refilled.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] if a jump setting is not declared.
    pub fn dash_refilled(&self) -> Result<()> {
        if self.settings.get(keys::REFILL_JUMPS_ON_DASH_REFILL)? && self.jump_count()? >= 2 {
            self.refill_from_grace_timer(1.0)?;
        }
        Ok(())
    }
}

/// The `JumpCount` variant.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use modweave::settings::{keys, OverrideRegistry};
/// use modweave::variants::JumpCount;
///
/// let settings = Arc::new(OverrideRegistry::with_builtin_settings());
/// settings.set(keys::JUMP_COUNT, 3)?;
///
/// let jumps = JumpCount::new(settings);
/// assert!(jumps.add_jumps(3, false)?);
/// assert_eq!(jumps.jump_buffer(), 3);
/// assert!(jumps.refill_jump_buffer()?);
/// assert_eq!(jumps.jump_buffer(), 2);
/// # Ok::<(), modweave::Error>(())
/// ```
#[derive(Debug)]
pub struct JumpCount {
    buffer: Arc<JumpBuffer>,
}

impl JumpCount {
    /// Creates the variant with an empty jump buffer.
    #[must_use]
    pub fn new(settings: Arc<OverrideRegistry>) -> Self {
        JumpCount {
            buffer: Arc::new(JumpBuffer::new(settings)),
        }
    }

    /// Extra jumps currently buffered.
    #[must_use]
    pub fn jump_buffer(&self) -> i32 {
        self.buffer.get()
    }

    /// See [`JumpBuffer::refill`].
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] if `JumpCount` is not declared.
    pub fn refill_jump_buffer(&self) -> Result<bool> {
        self.buffer.refill()
    }

    /// See [`JumpBuffer::add`].
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] if `JumpCount` is not declared.
    pub fn add_jumps(&self, jumps: i32, capped: bool) -> Result<bool> {
        self.buffer.add(jumps, capped)
    }

    /// See [`JumpBuffer::dash_refilled`].
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownSetting`] if a jump setting is not declared.
    pub fn dash_refilled(&self) -> Result<()> {
        self.buffer.dash_refilled()
    }
}

impl Extension for JumpCount {
    fn name(&self) -> &str {
        "JumpCount"
    }

    fn setting(&self) -> &str {
        keys::JUMP_COUNT.name()
    }

    fn load(&self, cx: &ModContext, installs: &mut InstallSet) -> Result<()> {
        for method in ["NormalUpdate", "DashUpdate"] {
            let buffer = self.buffer.clone();
            installs.patch_by_name(cx, PLAYER, method, "jump grace timer", move |cursor| {
                patch_jump_grace_timer(cursor, &buffer)
            })?;
        }

        let buffer = self.buffer.clone();
        installs.patch_by_name(cx, PLAYER, "UseRefill", "jump refill", move |cursor| {
            patch_use_refill(cursor, &buffer)
        })?;
        Ok(())
    }
}

fn patch_jump_grace_timer(cursor: &mut PatchCursor<'_>, buffer: &Arc<JumpBuffer>) -> Result<()> {
    let wall_jump_check = cursor.find_method_reference("WallJumpCheck")?;

    cursor.goto_next(MoveType::After, &[match_ldfld(PLAYER, "jumpGraceTimer")])?;
    cursor.log_site("Patching jump count");

    let grace_timer = cursor
        .prev_instruction()
        .and_then(Instruction::token)
        .ok_or_else(|| malformed_error!("ldfld without a field token"))?;

    cursor.emit_ldarg(0)?;
    cursor.emit_ldc_i4(1)?;
    cursor.emit_callvirt(&wall_jump_check)?;
    cursor.emit_ldarg(0)?;
    cursor.emit_ldc_i4(-1)?;
    cursor.emit_callvirt(&wall_jump_check)?;

    let jumps = buffer.clone();
    cursor.emit_delegate("can_jump", 3, Some(ValueType::F32), move |args| {
        let timer = jumps.can_jump(
            arg(args, 0)?.as_f32()?,
            arg(args, 1)?.as_bool()?,
            arg(args, 2)?.as_bool()?,
        )?;
        Ok(Some(Value::F32(timer)))
    })?;

    // the grace timer is private, so reload it at the start to feed the refill
    cursor.set_index(0)?;
    cursor.emit_ldarg(0)?;
    cursor.emit(OpCode::Ldfld, Operand::Token(grace_timer))?;

    let jumps = buffer.clone();
    cursor.emit_delegate("refill_jump_buffer", 1, None, move |args| {
        jumps.refill_from_grace_timer(arg(args, 0)?.as_f32()?)?;
        Ok(None)
    })?;
    Ok(())
}

fn patch_use_refill(cursor: &mut PatchCursor<'_>, buffer: &Arc<JumpBuffer>) -> Result<()> {
    cursor.goto_next(
        MoveType::After,
        &[
            match_ldarg(0),
            match_ldfld(PLAYER, "Dashes"),
            match_ldloc(0),
            match_opcode(OpCode::BltS),
        ],
    )?;

    let refill = cursor
        .prev_instruction()
        .and_then(|instr| instr.targets().first().copied())
        .ok_or_else(|| Error::InvalidBranch("dash comparison has no target".to_string()))?;

    cursor.log_site("Injecting jump refill check");

    let jumps = buffer.clone();
    cursor.emit_delegate("jump_needs_refilling", 0, Some(ValueType::Bool), move |_| {
        Ok(Some(Value::Bool(jumps.needs_refilling()?)))
    })?;
    cursor.emit_branch(OpCode::BrtrueS, refill)?;
    Ok(())
}
