//! Editable method bodies.
//!
//! A [`MethodBody`] is an index-based instruction list plus a relocation table mapping
//! every [`InstrId`] to its current position. Inserting instructions shifts positions but
//! never ids, and branch operands hold ids, so every existing control-flow edge stays
//! attached to the instruction it pointed at. Redirecting an edge is always an explicit
//! call to [`MethodBody::redirect_incoming`].

use std::collections::HashMap;

use crate::{
    assembly::{InstrId, Instruction},
    Error, Result,
};

/// An ordered instruction sequence with stable instruction identities.
///
/// # Examples
///
/// ```rust
/// use modweave::assembly::{Instruction, MethodBody, OpCode};
///
/// let mut body = MethodBody::from_instructions(vec![
///     Instruction::simple(OpCode::Ldarg0),
///     Instruction::simple(OpCode::Ret),
/// ])?;
/// let ret = body.get(1).unwrap().id();
///
/// body.insert(1, vec![Instruction::simple(OpCode::Nop)])?;
/// assert_eq!(body.position(ret), Some(2));
/// # Ok::<(), modweave::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodBody {
    instructions: Vec<Instruction>,
    positions: HashMap<InstrId, usize>,
    next_id: u32,
}

impl MethodBody {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a body from a positional instruction list.
    ///
    /// Instruction `i` receives id `i`, so branch operands in the input must already use
    /// positional ids (the decoder and [`crate::assembly::MethodBodyBuilder`] produce them).
    ///
    /// # Errors
    /// Returns [`crate::Error::DanglingTarget`] if a branch refers past the end of the list.
    pub fn from_instructions(instructions: Vec<Instruction>) -> Result<Self> {
        let mut body = MethodBody {
            instructions,
            positions: HashMap::new(),
            next_id: 0,
        };

        for (index, instruction) in body.instructions.iter_mut().enumerate() {
            instruction.id = InstrId(next_id_value(index)?);
        }
        body.next_id = next_id_value(body.instructions.len())?;
        body.relocate();
        body.check_targets()?;
        Ok(body)
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the body holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instruction at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Mutable access to the instruction at `index`.
    ///
    /// The instruction's id cannot be changed through this reference.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(index)
    }

    /// All instructions in order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Iterates over the instructions in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Current position of the instruction with the given id.
    #[must_use]
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Instruction with the given id.
    #[must_use]
    pub fn by_id(&self, id: InstrId) -> Option<&Instruction> {
        self.position(id).and_then(|index| self.instructions.get(index))
    }

    /// Inserts `new` before position `index`, returning the ids assigned to the new
    /// instructions. Existing branch targets are left untouched.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index > len()`, or
    /// [`crate::Error::InvalidOperand`] if an instruction's operand does not fit its opcode.
    pub fn insert(&mut self, index: usize, new: Vec<Instruction>) -> Result<Vec<InstrId>> {
        if index > self.instructions.len() {
            return Err(Error::OutOfBounds);
        }
        for instruction in &new {
            instruction.validate()?;
        }

        let mut ids = Vec::with_capacity(new.len());
        let mut prepared = Vec::with_capacity(new.len());
        for mut instruction in new {
            instruction.id = self.allocate_id()?;
            ids.push(instruction.id);
            prepared.push(instruction);
        }

        self.instructions.splice(index..index, prepared);
        self.relocate();
        Ok(ids)
    }

    /// Rewrites every branch that targets `from` so that it targets `to` instead.
    ///
    /// Returns the number of rewritten edges.
    ///
    /// # Errors
    /// Returns [`crate::Error::DanglingTarget`] if `to` is not part of this body.
    pub fn redirect_incoming(&mut self, from: InstrId, to: InstrId) -> Result<usize> {
        if self.position(to).is_none() {
            return Err(Error::DanglingTarget(to));
        }

        Ok(self
            .instructions
            .iter_mut()
            .map(|instruction| instruction.redirect(from, to))
            .sum())
    }

    /// Positions of the branch instructions that target `id`.
    #[must_use]
    pub fn incoming(&self, id: InstrId) -> Vec<usize> {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, instruction)| instruction.targets().contains(&id))
            .map(|(index, _)| index)
            .collect()
    }

    /// Checks that every operand fits its opcode and every branch target is in the body.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] or [`crate::Error::DanglingTarget`].
    pub fn verify(&self) -> Result<()> {
        for instruction in &self.instructions {
            instruction.validate()?;
        }
        self.check_targets()
    }

    fn check_targets(&self) -> Result<()> {
        for instruction in &self.instructions {
            if let Some(target) = instruction
                .targets()
                .into_iter()
                .find(|target| !self.positions.contains_key(target))
            {
                return Err(Error::DanglingTarget(target));
            }
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> Result<InstrId> {
        let id = InstrId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .filter(|next| *next != InstrId::PENDING.0)
            .ok_or(Error::OutOfBounds)?;
        Ok(id)
    }

    fn relocate(&mut self) {
        self.positions.clear();
        self.positions.extend(
            self.instructions
                .iter()
                .enumerate()
                .map(|(index, instruction)| (instruction.id, index)),
        );
    }
}

impl<'a> IntoIterator for &'a MethodBody {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

fn next_id_value(index: usize) -> Result<u32> {
    u32::try_from(index)
        .ok()
        .filter(|value| *value != InstrId::PENDING.0)
        .ok_or(Error::OutOfBounds)
}
