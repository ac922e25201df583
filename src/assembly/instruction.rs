//! Instruction representation, operand types and control-flow metadata.
//!
//! The central type is [`Instruction`]: an [`OpCode`] plus an [`Operand`], tagged with a
//! stable [`InstrId`] once it belongs to a [`crate::assembly::MethodBody`]. Branch
//! operands reference other instructions by id, never by byte offset, so inserting code
//! into a body cannot silently break a control-flow edge.
//!
//! # Key Components
//!
//! - [`Instruction`] - An opcode with its operand and identity
//! - [`Operand`] - Typed operand (immediate, token, argument, local, branch target, switch table)
//! - [`Immediate`] - Constant values embedded in the instruction stream
//! - [`OperandType`] - How an opcode's operand is encoded
//! - [`FlowType`] - Control flow classification
//!
//! # Examples
//!
//! ```rust
//! use modweave::assembly::{Immediate, Instruction, OpCode, Operand};
//!
//! let push = Instruction::new(OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(12)));
//! assert_eq!(push.constant_i32(), Some(12));
//! assert_eq!(push.to_string(), "ldc.i4.s 12");
//!
//! let compact = Instruction::simple(OpCode::LdcI4_3);
//! assert_eq!(compact.constant_i32(), Some(3));
//! ```

use std::fmt;

use crate::{assembly::OpCode, metadata::Token, Error, Result};

/// Stable identity of an instruction inside a method body.
///
/// Ids are assigned when an instruction enters a body and never change afterwards,
/// regardless of how many instructions are inserted before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrId(pub(crate) u32);

impl InstrId {
    /// Placeholder id carried by instructions that are not part of a body yet
    pub const PENDING: InstrId = InstrId(u32::MAX);

    /// Raw id value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Whether this id has been assigned by a body.
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        *self != Self::PENDING
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_assigned() {
            write!(f, "#{}", self.0)
        } else {
            f.write_str("#pending")
        }
    }
}

/// How an opcode's operand is encoded in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer
    Int8,
    /// Signed 32-bit integer
    Int32,
    /// 32-bit floating point
    Float32,
    /// Unsigned 8-bit argument index
    Argument8,
    /// Unsigned 8-bit local index
    Local8,
    /// Metadata token
    Token,
    /// Signed 8-bit branch displacement
    ShortTarget,
    /// Signed 32-bit branch displacement
    Target,
    /// Jump table: count followed by 32-bit displacements
    Switch,
}

impl OperandType {
    /// Size in bytes, or `None` for the variable-size switch table.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8
            | OperandType::Argument8
            | OperandType::Local8
            | OperandType::ShortTarget => Some(1),
            OperandType::Int32 | OperandType::Float32 | OperandType::Token | OperandType::Target => {
                Some(4)
            }
            OperandType::Switch => None,
        }
    }
}

/// A constant embedded in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// `ldc.i4.s` operand
    Int8(i8),
    /// `ldc.i4` operand
    Int32(i32),
    /// `ldc.r4` operand
    Float32(f32),
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value:?}"),
        }
    }
}

/// Typed instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Constant value
    Immediate(Immediate),
    /// Field, method or delegate token
    Token(Token),
    /// Argument index
    Argument(u16),
    /// Local variable index
    Local(u16),
    /// Branch target
    Target(InstrId),
    /// Jump table targets
    Switch(Vec<InstrId>),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, "{imm}"),
            Operand::Token(token) => write!(f, "{token}"),
            Operand::Argument(index) => write!(f, "A_{index}"),
            Operand::Local(index) => write!(f, "V_{index}"),
            Operand::Target(id) => write!(f, "{id}"),
            Operand::Switch(targets) => {
                let targets: Vec<String> = targets.iter().map(ToString::to_string).collect();
                write!(f, "({})", targets.join(", "))
            }
        }
    }
}

/// Control flow behaviour of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Either branches or falls through
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Calls a method and falls through
    Call,
    /// Leaves the method
    Return,
    /// Jump table
    Switch,
}

/// A single instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub(crate) id: InstrId,
    /// The opcode
    pub opcode: OpCode,
    /// The operand, shaped according to [`OpCode::operand_type`]
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction that is not yet part of a body.
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            id: InstrId::PENDING,
            opcode,
            operand,
        }
    }

    /// Creates an operand-less instruction.
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Self::new(opcode, Operand::None)
    }

    /// Identity within the owning body.
    #[must_use]
    pub fn id(&self) -> InstrId {
        self.id
    }

    /// Mnemonic of the opcode.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.opcode.mnemonic()
    }

    /// Control flow classification of the opcode.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode.flow_type()
    }

    /// Whether execution can continue with the next instruction.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        !matches!(
            self.flow_type(),
            FlowType::UnconditionalBranch | FlowType::Return
        )
    }

    /// Branch targets of this instruction (empty for non-branches).
    #[must_use]
    pub fn targets(&self) -> Vec<InstrId> {
        match &self.operand {
            Operand::Target(id) => vec![*id],
            Operand::Switch(ids) => ids.clone(),
            _ => Vec::new(),
        }
    }

    /// Rewrites every branch target equal to `from` to `to`, returning how many changed.
    pub fn redirect(&mut self, from: InstrId, to: InstrId) -> usize {
        match &mut self.operand {
            Operand::Target(id) if *id == from => {
                *id = to;
                1
            }
            Operand::Switch(ids) => {
                let mut changed = 0;
                for id in ids.iter_mut().filter(|id| **id == from) {
                    *id = to;
                    changed += 1;
                }
                changed
            }
            _ => 0,
        }
    }

    /// The token operand, if any.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }

    /// Argument index loaded or stored by this instruction, compact forms included.
    #[must_use]
    pub fn argument_index(&self) -> Option<u16> {
        match (self.opcode, &self.operand) {
            (OpCode::LdargS | OpCode::StargS, Operand::Argument(index)) => Some(*index),
            (op, _) => op.implied_argument(),
        }
    }

    /// Local index loaded or stored by this instruction, compact forms included.
    #[must_use]
    pub fn local_index(&self) -> Option<u16> {
        match (self.opcode, &self.operand) {
            (OpCode::LdlocS | OpCode::StlocS, Operand::Local(index)) => Some(*index),
            (op, _) => op.implied_local(),
        }
    }

    /// Integer constant pushed by this instruction, compact forms included.
    #[must_use]
    pub fn constant_i32(&self) -> Option<i32> {
        match (self.opcode, &self.operand) {
            (OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(value))) => Some(i32::from(*value)),
            (OpCode::LdcI4, Operand::Immediate(Immediate::Int32(value))) => Some(*value),
            (op, _) => op.implied_constant(),
        }
    }

    /// Checks that the operand has the shape the opcode expects.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] on a mismatch.
    pub fn validate(&self) -> Result<()> {
        let ok = match (self.opcode.operand_type(), &self.operand) {
            (OperandType::None, Operand::None)
            | (OperandType::Int8, Operand::Immediate(Immediate::Int8(_)))
            | (OperandType::Int32, Operand::Immediate(Immediate::Int32(_)))
            | (OperandType::Float32, Operand::Immediate(Immediate::Float32(_)))
            | (OperandType::Token, Operand::Token(_))
            | (OperandType::ShortTarget | OperandType::Target, Operand::Target(_))
            | (OperandType::Switch, Operand::Switch(_)) => true,
            (OperandType::Argument8, Operand::Argument(index))
            | (OperandType::Local8, Operand::Local(index)) => *index <= u16::from(u8::MAX),
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            Err(Error::InvalidOperand {
                mnemonic: self.mnemonic(),
                reason: format!("operand {:?} does not match {:?}", self.operand, self.opcode.operand_type()),
            })
        }
    }

    /// Encoded size in bytes with the instruction's current opcode.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        self.encoded_size_as(self.opcode)
    }

    /// Encoded size in bytes if this instruction were emitted as `opcode`, used when
    /// laying out promoted branch forms.
    #[must_use]
    pub fn encoded_size_as(&self, opcode: OpCode) -> usize {
        let operand = match (&self.operand, opcode.operand_type().size()) {
            (Operand::Switch(targets), None) => 4 + 4 * targets.len(),
            (_, size) => size.unwrap_or(0),
        };
        opcode.size() + operand
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::None => f.write_str(self.mnemonic()),
            _ => write!(f, "{} {}", self.mnemonic(), self.operand),
        }
    }
}
