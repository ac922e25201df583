//! Label-based authoring of method bodies.
//!
//! [`MethodBodyBuilder`] is how hosts and tests write bodies by hand. Branches name a
//! label; labels are bound to the next emitted instruction and resolved when the builder
//! is finalized, so forward references need no bookkeeping by the caller.
//!
//! # Examples
//!
//! ```rust
//! use modweave::assembly::MethodBodyBuilder;
//!
//! let mut builder = MethodBodyBuilder::new();
//! builder.emit_ldarg(1)?;
//! builder.emit_branch("brfalse.s", "zero")?;
//! builder.emit_ldc_i4(10)?;
//! builder.emit_instruction("ret", None)?;
//! builder.define_label("zero")?;
//! builder.emit_ldc_i4(0)?;
//! builder.emit_instruction("ret", None)?;
//!
//! let body = builder.finalize()?;
//! assert_eq!(body.len(), 6);
//! # Ok::<(), modweave::Error>(())
//! ```

use std::{collections::HashMap, str::FromStr};

use crate::{
    assembly::{encode, FlowType, Immediate, InstrId, Instruction, MethodBody, OpCode, Operand},
    metadata::Token,
    Error, Result,
};

/// A branch waiting for its label to be resolved.
#[derive(Debug, Clone)]
struct LabelFixup {
    /// Index of the branch instruction
    instruction: usize,
    /// Labels referenced, one for branches, many for `switch`
    labels: Vec<String>,
}

/// Assembles a [`MethodBody`] from mnemonics and labels.
#[derive(Debug, Default)]
pub struct MethodBodyBuilder {
    instructions: Vec<Instruction>,
    labels: HashMap<String, usize>,
    fixups: Vec<LabelFixup>,
}

impl MethodBodyBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits an instruction by mnemonic.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidMnemonic`] for unknown mnemonics and
    /// [`crate::Error::InvalidOperand`] if the operand does not fit the opcode.
    pub fn emit_instruction(&mut self, mnemonic: &str, operand: Option<Operand>) -> Result<()> {
        let opcode =
            OpCode::from_str(mnemonic).map_err(|_| Error::InvalidMnemonic(mnemonic.to_string()))?;
        self.emit(opcode, operand.unwrap_or(Operand::None))
    }

    /// Emits an instruction by opcode.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] if the operand does not fit the opcode, or
    /// [`crate::Error::InvalidBranch`] for branch opcodes (use [`Self::emit_branch`]).
    pub fn emit(&mut self, opcode: OpCode, operand: Operand) -> Result<()> {
        if opcode.is_branch() || opcode == OpCode::Switch {
            return Err(Error::InvalidBranch(format!(
                "'{opcode}' needs a label, use emit_branch or emit_switch"
            )));
        }

        let instruction = Instruction::new(opcode, operand);
        instruction.validate()?;
        self.instructions.push(instruction);
        Ok(())
    }

    /// Emits a branch to `label`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidBranch`] if the mnemonic is not a branch.
    pub fn emit_branch(&mut self, mnemonic: &str, label: &str) -> Result<()> {
        let opcode =
            OpCode::from_str(mnemonic).map_err(|_| Error::InvalidMnemonic(mnemonic.to_string()))?;
        if !matches!(
            opcode.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch
        ) {
            return Err(Error::InvalidBranch(format!(
                "instruction '{mnemonic}' is not a branch instruction"
            )));
        }

        self.fixups.push(LabelFixup {
            instruction: self.instructions.len(),
            labels: vec![label.to_string()],
        });
        self.instructions
            .push(Instruction::new(opcode, Operand::Target(InstrId::PENDING)));
        Ok(())
    }

    /// Emits a `switch` over `labels`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidBranch`] for an empty table.
    pub fn emit_switch(&mut self, labels: &[&str]) -> Result<()> {
        if labels.is_empty() {
            return Err(Error::InvalidBranch(
                "switch must have at least one target".to_string(),
            ));
        }

        self.fixups.push(LabelFixup {
            instruction: self.instructions.len(),
            labels: labels.iter().map(|label| (*label).to_string()).collect(),
        });
        self.instructions.push(Instruction::new(
            OpCode::Switch,
            Operand::Switch(vec![InstrId::PENDING; labels.len()]),
        ));
        Ok(())
    }

    /// Binds `label` to the next emitted instruction.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateLabel`] if the label is already bound.
    pub fn define_label(&mut self, label: &str) -> Result<()> {
        if self.labels.contains_key(label) {
            return Err(Error::DuplicateLabel(label.to_string()));
        }
        self.labels.insert(label.to_string(), self.instructions.len());
        Ok(())
    }

    /// Emits the most compact `ldarg` form.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] for indices above 255.
    pub fn emit_ldarg(&mut self, index: u16) -> Result<()> {
        match OpCode::ldarg_for(index) {
            Some(opcode) => self.emit(opcode, Operand::None),
            None => self.emit(OpCode::LdargS, Operand::Argument(index)),
        }
    }

    /// Emits the most compact `ldloc` form.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] for indices above 255.
    pub fn emit_ldloc(&mut self, index: u16) -> Result<()> {
        match OpCode::ldloc_for(index) {
            Some(opcode) => self.emit(opcode, Operand::None),
            None => self.emit(OpCode::LdlocS, Operand::Local(index)),
        }
    }

    /// Emits the most compact `stloc` form.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] for indices above 255.
    pub fn emit_stloc(&mut self, index: u16) -> Result<()> {
        match OpCode::stloc_for(index) {
            Some(opcode) => self.emit(opcode, Operand::None),
            None => self.emit(OpCode::StlocS, Operand::Local(index)),
        }
    }

    /// Emits the most compact integer constant form.
    ///
    /// # Errors
    /// Never fails for valid constants; returns the result of [`Self::emit`].
    pub fn emit_ldc_i4(&mut self, value: i32) -> Result<()> {
        if let Some(opcode) = OpCode::ldc_i4_for(value) {
            return self.emit(opcode, Operand::None);
        }
        match i8::try_from(value) {
            Ok(small) => self.emit(OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(small))),
            Err(_) => self.emit(OpCode::LdcI4, Operand::Immediate(Immediate::Int32(value))),
        }
    }

    /// Emits `ldc.r4 value`.
    ///
    /// # Errors
    /// Never fails; returns the result of [`Self::emit`].
    pub fn emit_ldc_r4(&mut self, value: f32) -> Result<()> {
        self.emit(OpCode::LdcR4, Operand::Immediate(Immediate::Float32(value)))
    }

    /// Emits a token-carrying instruction such as `call`, `callvirt`, `ldfld` or `stfld`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] if `opcode` takes no token.
    pub fn emit_token(&mut self, opcode: OpCode, token: Token) -> Result<()> {
        self.emit(opcode, Operand::Token(token))
    }

    /// Number of instructions emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Resolves all labels and produces the body.
    ///
    /// # Errors
    /// Returns [`crate::Error::UndefinedLabel`] for labels that were never defined and
    /// [`crate::Error::InvalidBranch`] for labels bound past the last instruction.
    pub fn finalize(mut self) -> Result<MethodBody> {
        let count = self.instructions.len();
        for fixup in &self.fixups {
            let mut targets = Vec::with_capacity(fixup.labels.len());
            for label in &fixup.labels {
                let index = *self
                    .labels
                    .get(label)
                    .ok_or_else(|| Error::UndefinedLabel(label.clone()))?;
                if index >= count {
                    return Err(Error::InvalidBranch(format!(
                        "label '{label}' is not followed by an instruction"
                    )));
                }
                targets.push(InstrId(u32::try_from(index).map_err(|_| Error::OutOfBounds)?));
            }

            let instruction = &mut self.instructions[fixup.instruction];
            instruction.operand = match instruction.operand {
                Operand::Switch(_) => Operand::Switch(targets),
                _ => Operand::Target(targets[0]),
            };
        }

        MethodBody::from_instructions(self.instructions)
    }

    /// Resolves all labels and encodes the body.
    ///
    /// # Errors
    /// See [`Self::finalize`] and [`crate::assembly::encode`].
    pub fn finalize_bytes(self) -> Result<Vec<u8>> {
        encode(&self.finalize()?)
    }
}
