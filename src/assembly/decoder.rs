//! Decoding of raw method body bytes into a [`MethodBody`].
//!
//! Decoding runs in two passes. The first walks the byte stream, reading each opcode and
//! its operand and recording branch destinations as absolute byte offsets. The second
//! maps those offsets onto instruction indices; a destination that does not start an
//! instruction is reported as malformed. Branch forms are kept exactly as found so that
//! re-encoding an unmodified body reproduces the input.
//!
//! Tokens stay opaque here; resolving them is the job of [`crate::metadata::MemberTable`].

use std::collections::HashMap;

use crate::{
    assembly::{
        opcodes::EXTENDED_PREFIX, Immediate, InstrId, Instruction, MethodBody, OpCode, Operand,
        OperandType,
    },
    metadata::Token,
    stream::Parser,
    Error, Result,
};

/// Operand as read from the stream, before branch offsets are resolved.
enum RawOperand {
    Resolved(Operand),
    Branch(usize),
    Switch(Vec<usize>),
}

/// Decodes a complete method body.
///
/// # Errors
/// - [`crate::Error::InvalidOpcode`] for bytes outside the supported instruction set
/// - [`crate::Error::OutOfBounds`] for a truncated operand
/// - [`crate::Error::Malformed`] for a branch that does not land on an instruction
///
/// # Examples
///
/// ```rust
/// use modweave::assembly::{decode, OpCode};
///
/// // ldarg.0; brtrue.s +1; nop; ret
/// let body = decode(&[0x02, 0x2D, 0x01, 0x00, 0x2A])?;
/// assert_eq!(body.len(), 4);
/// assert_eq!(body.get(1).unwrap().opcode, OpCode::BrtrueS);
/// assert_eq!(body.get(1).unwrap().targets(), vec![body.get(3).unwrap().id()]);
/// # Ok::<(), modweave::Error>(())
/// ```
pub fn decode(bytes: &[u8]) -> Result<MethodBody> {
    let mut parser = Parser::new(bytes);
    let mut raw = Vec::new();
    let mut starts = HashMap::new();

    while parser.has_more_data() {
        let offset = parser.pos();
        let opcode = read_opcode(&mut parser)?;
        let operand = read_operand(&mut parser, opcode)?;
        starts.insert(offset, raw.len());
        raw.push((opcode, operand));
    }

    let resolve = |destination: usize| -> Result<InstrId> {
        let index = starts.get(&destination).ok_or_else(|| {
            malformed_error!("Branch destination {:#x} is not an instruction boundary", destination)
        })?;
        Ok(InstrId(u32::try_from(*index).map_err(|_| Error::OutOfBounds)?))
    };

    let mut instructions = Vec::with_capacity(raw.len());
    for (opcode, operand) in raw {
        let operand = match operand {
            RawOperand::Resolved(operand) => operand,
            RawOperand::Branch(destination) => Operand::Target(resolve(destination)?),
            RawOperand::Switch(destinations) => Operand::Switch(
                destinations
                    .into_iter()
                    .map(resolve)
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        instructions.push(Instruction::new(opcode, operand));
    }

    MethodBody::from_instructions(instructions)
}

fn read_opcode(parser: &mut Parser<'_>) -> Result<OpCode> {
    let first = parser.read_le::<u8>()?;
    let value = if first == EXTENDED_PREFIX {
        0xFE00 | u16::from(parser.read_le::<u8>()?)
    } else {
        u16::from(first)
    };

    OpCode::from_value(value).ok_or(Error::InvalidOpcode(value))
}

fn read_operand(parser: &mut Parser<'_>, opcode: OpCode) -> Result<RawOperand> {
    let operand = match opcode.operand_type() {
        OperandType::None => RawOperand::Resolved(Operand::None),
        OperandType::Int8 => {
            RawOperand::Resolved(Operand::Immediate(Immediate::Int8(parser.read_le()?)))
        }
        OperandType::Int32 => {
            RawOperand::Resolved(Operand::Immediate(Immediate::Int32(parser.read_le()?)))
        }
        OperandType::Float32 => {
            RawOperand::Resolved(Operand::Immediate(Immediate::Float32(parser.read_le()?)))
        }
        OperandType::Argument8 => {
            RawOperand::Resolved(Operand::Argument(u16::from(parser.read_le::<u8>()?)))
        }
        OperandType::Local8 => {
            RawOperand::Resolved(Operand::Local(u16::from(parser.read_le::<u8>()?)))
        }
        OperandType::Token => RawOperand::Resolved(Operand::Token(Token(parser.read_le()?))),
        OperandType::ShortTarget => {
            let delta = i64::from(parser.read_le::<i8>()?);
            RawOperand::Branch(destination(parser.pos(), delta)?)
        }
        OperandType::Target => {
            let delta = i64::from(parser.read_le::<i32>()?);
            RawOperand::Branch(destination(parser.pos(), delta)?)
        }
        OperandType::Switch => {
            let count = parser.read_le::<u32>()? as usize;
            if count.saturating_mul(4) > parser.remaining() {
                return Err(Error::OutOfBounds);
            }
            let mut deltas = Vec::with_capacity(count);
            for _ in 0..count {
                deltas.push(i64::from(parser.read_le::<i32>()?));
            }
            let end = parser.pos();
            RawOperand::Switch(
                deltas
                    .into_iter()
                    .map(|delta| destination(end, delta))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
    };

    Ok(operand)
}

fn destination(next: usize, delta: i64) -> Result<usize> {
    let next = i64::try_from(next).map_err(|_| Error::OutOfBounds)?;
    usize::try_from(next + delta)
        .map_err(|_| malformed_error!("Branch displacement {} leaves the method body", delta))
}
