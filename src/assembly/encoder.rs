//! Encoding of a [`MethodBody`] back into bytes.
//!
//! Branches keep the form they were decoded or authored with. After code has been
//! inserted, a short branch may no longer reach its target; such branches are promoted to
//! their long form. Promotion grows the body, which can push other short branches out of
//! range, so layout is repeated until no further promotion happens.
//!
//! # Examples
//!
//! ```rust
//! use modweave::assembly::{decode, encode};
//!
//! let original = [0x02, 0x2C, 0x02, 0x17, 0x2A, 0x16, 0x2A];
//! let body = decode(&original)?;
//! assert_eq!(encode(&body)?, original);
//! # Ok::<(), modweave::Error>(())
//! ```

use crate::{
    assembly::{opcodes::EXTENDED_PREFIX, Immediate, InstrId, MethodBody, OpCode, Operand},
    stream::write_le,
    Error, Result,
};

/// Encodes a body, promoting short branches that no longer fit.
///
/// # Errors
/// Returns [`crate::Error::InvalidOperand`] or [`crate::Error::DanglingTarget`] if the body
/// fails verification.
pub fn encode(body: &MethodBody) -> Result<Vec<u8>> {
    body.verify()?;

    let mut forms: Vec<OpCode> = body.iter().map(|instruction| instruction.opcode).collect();
    let offsets = loop {
        let offsets = layout(body, &forms);
        if !promote_out_of_range(body, &mut forms, &offsets)? {
            break offsets;
        }
    };

    let mut bytes = Vec::with_capacity(offsets.last().copied().unwrap_or(0));
    for (index, instruction) in body.iter().enumerate() {
        let opcode = forms[index];
        emit_opcode(&mut bytes, opcode);

        let end = offsets[index + 1];
        match &instruction.operand {
            Operand::None => {}
            Operand::Immediate(Immediate::Int8(value)) => write_le(&mut bytes, *value),
            Operand::Immediate(Immediate::Int32(value)) => write_le(&mut bytes, *value),
            Operand::Immediate(Immediate::Float32(value)) => write_le(&mut bytes, *value),
            Operand::Token(token) => write_le(&mut bytes, token.value()),
            Operand::Argument(index) | Operand::Local(index) => {
                write_le(&mut bytes, u8::try_from(*index).map_err(|_| Error::OutOfBounds)?);
            }
            Operand::Target(target) => {
                let delta = displacement(body, &offsets, *target, end)?;
                if opcode.long_form().is_some() {
                    let delta = i8::try_from(delta).map_err(|_| {
                        Error::InvalidBranch(format!("{opcode} displacement {delta} after layout"))
                    })?;
                    write_le(&mut bytes, delta);
                } else {
                    write_le(&mut bytes, delta);
                }
            }
            Operand::Switch(targets) => {
                let count = u32::try_from(targets.len()).map_err(|_| Error::OutOfBounds)?;
                write_le(&mut bytes, count);
                for target in targets {
                    write_le(&mut bytes, displacement(body, &offsets, *target, end)?);
                }
            }
        }
    }

    Ok(bytes)
}

/// Byte offset of every instruction plus the total size as the final entry.
fn layout(body: &MethodBody, forms: &[OpCode]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(body.len() + 1);
    let mut offset = 0;
    for (instruction, opcode) in body.iter().zip(forms) {
        offsets.push(offset);
        offset += instruction.encoded_size_as(*opcode);
    }
    offsets.push(offset);
    offsets
}

fn promote_out_of_range(
    body: &MethodBody,
    forms: &mut [OpCode],
    offsets: &[usize],
) -> Result<bool> {
    let mut promoted = false;
    for (index, instruction) in body.iter().enumerate() {
        let Some(long) = forms[index].long_form() else {
            continue;
        };
        let Operand::Target(target) = instruction.operand else {
            continue;
        };

        let delta = displacement(body, offsets, target, offsets[index + 1])?;
        if i8::try_from(delta).is_err() {
            log::debug!(
                "promoting {} at instruction {} to {} (displacement {})",
                forms[index],
                index,
                long,
                delta
            );
            forms[index] = long;
            promoted = true;
        }
    }
    Ok(promoted)
}

fn displacement(
    body: &MethodBody,
    offsets: &[usize],
    target: InstrId,
    end: usize,
) -> Result<i32> {
    let position = body.position(target).ok_or(Error::DanglingTarget(target))?;
    let to = i64::try_from(offsets[position]).map_err(|_| Error::OutOfBounds)?;
    let from = i64::try_from(end).map_err(|_| Error::OutOfBounds)?;
    i32::try_from(to - from).map_err(|_| Error::OutOfBounds)
}

fn emit_opcode(bytes: &mut Vec<u8>, opcode: OpCode) {
    let value = opcode.value();
    if opcode.is_extended() {
        bytes.push(EXTENDED_PREFIX);
    }
    bytes.push((value & 0xFF) as u8);
}
