//! Cursor-based editing of a decoded method body.
//!
//! A [`PatchCursor`] sits between two instructions of a [`MethodBody`]. Searching moves it
//! to a pattern match; emitting inserts at the cursor and advances past the new
//! instruction, so consecutive emits come out in program order.
//!
//! # Positioning
//!
//! | [`MoveType`] | Cursor lands | Branches into the matched instruction |
//! |--------------|--------------|----------------------------------------|
//! | `Before` | before the first matched instruction | keep targeting it, skipping emitted code |
//! | `AfterLabel` | before the first matched instruction | moved to the first emitted instruction |
//! | `After` | after the last matched instruction | unchanged |
//!
//! # Examples
//!
//! ```rust
//! use modweave::assembly::{Instruction, MethodBody, OpCode};
//! use modweave::metadata::{MemberTable, MethodSig, TargetMethod};
//! use modweave::patch::{match_opcode, DelegateTable, MoveType, PatchCursor};
//!
//! let method = TargetMethod::new("Demo", "Run", MethodSig::static_method(vec![], None));
//! let members = MemberTable::new();
//! let delegates = DelegateTable::new();
//! let mut body = MethodBody::from_instructions(vec![
//!     Instruction::simple(OpCode::Nop),
//!     Instruction::simple(OpCode::Ret),
//! ])?;
//!
//! let mut cursor = PatchCursor::new(&mut body, &method, &members, &delegates);
//! cursor.goto_next(MoveType::Before, &[match_opcode(OpCode::Ret)])?;
//! cursor.emit_ldc_i4(7)?;
//! cursor.emit(OpCode::Pop, modweave::assembly::Operand::None)?;
//! assert_eq!(cursor.index(), 3);
//!
//! assert_eq!(body.len(), 4);
//! # Ok::<(), modweave::Error>(())
//! ```

use crate::{
    assembly::{Immediate, InstrId, Instruction, MethodBody, OpCode, Operand, OperandType},
    host::Value,
    metadata::{FieldRef, MemberTable, TargetMethod, TargetMethodRc, Token, ValueType},
    patch::{
        delegate::DelegateTable,
        pattern::{find_backward, find_forward, Predicate},
    },
    Error, Result,
};

/// Where a successful search leaves the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    /// Before the match; existing branches still jump to the matched instruction
    Before,
    /// Before the match; existing branches jump to whatever is emitted there first
    AfterLabel,
    /// After the last matched instruction
    After,
}

/// Editing position inside a method body.
pub struct PatchCursor<'a> {
    body: &'a mut MethodBody,
    method: &'a TargetMethod,
    members: &'a MemberTable,
    delegates: &'a DelegateTable,
    index: usize,
    last_match: Option<InstrId>,
    label: Option<InstrId>,
    owned_delegates: Vec<Token>,
    inserted: usize,
    log_sites: bool,
}

impl<'a> PatchCursor<'a> {
    /// Creates a cursor at the start of `body`.
    pub fn new(
        body: &'a mut MethodBody,
        method: &'a TargetMethod,
        members: &'a MemberTable,
        delegates: &'a DelegateTable,
    ) -> Self {
        PatchCursor {
            body,
            method,
            members,
            delegates,
            index: 0,
            last_match: None,
            label: None,
            owned_delegates: Vec::new(),
            inserted: 0,
            log_sites: true,
        }
    }

    pub(crate) fn with_site_logging(mut self, enabled: bool) -> Self {
        self.log_sites = enabled;
        self
    }

    /// Method being edited.
    #[must_use]
    pub fn method(&self) -> &TargetMethod {
        self.method
    }

    /// Body being edited.
    #[must_use]
    pub fn body(&self) -> &MethodBody {
        self.body
    }

    /// Member table used to resolve and intern tokens.
    #[must_use]
    pub fn members(&self) -> &MemberTable {
        self.members
    }

    /// Position of the cursor: the index of the instruction right after it.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Moves the cursor to `index` and forgets any pending label.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index > body.len()`.
    pub fn set_index(&mut self, index: usize) -> Result<()> {
        if index > self.body.len() {
            return Err(Error::OutOfBounds);
        }
        self.index = index;
        self.label = None;
        Ok(())
    }

    /// Instruction right after the cursor.
    #[must_use]
    pub fn next_instruction(&self) -> Option<&Instruction> {
        self.body.get(self.index)
    }

    /// Instruction right before the cursor.
    #[must_use]
    pub fn prev_instruction(&self) -> Option<&Instruction> {
        self.index.checked_sub(1).and_then(|index| self.body.get(index))
    }

    /// Number of instructions emitted through this cursor.
    #[must_use]
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Searches forward from the cursor for `pattern` and moves onto the match.
    ///
    /// # Errors
    /// Returns [`crate::Error::PatternNotFound`] with the cursor left where it was.
    pub fn goto_next(&mut self, move_type: MoveType, pattern: &[Predicate]) -> Result<()> {
        let found = find_forward(self.body, self.index, pattern, self.members, self.last_match);
        self.land(found, move_type, pattern.len())
    }

    /// Like [`Self::goto_next`], but reports a miss as `false`.
    pub fn try_goto_next(&mut self, move_type: MoveType, pattern: &[Predicate]) -> bool {
        self.goto_next(move_type, pattern).is_ok()
    }

    /// Searches backward from the cursor for `pattern` and moves onto the match.
    ///
    /// # Errors
    /// Returns [`crate::Error::PatternNotFound`] with the cursor left where it was.
    pub fn goto_prev(&mut self, move_type: MoveType, pattern: &[Predicate]) -> Result<()> {
        let found = find_backward(self.body, self.index, pattern, self.members, self.last_match);
        self.land(found, move_type, pattern.len())
    }

    fn land(&mut self, found: Option<usize>, move_type: MoveType, width: usize) -> Result<()> {
        let Some(start) = found else {
            return Err(Error::PatternNotFound {
                target: self.method.to_string(),
                cursor: self.index,
            });
        };

        let matched = self.body.get(start).map(Instruction::id);
        self.last_match = matched;
        self.label = None;
        match move_type {
            MoveType::Before => self.index = start,
            MoveType::AfterLabel => {
                self.index = start;
                self.label = matched;
            }
            MoveType::After => self.index = start + width,
        }
        Ok(())
    }

    /// Inserts one instruction at the cursor and moves past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] if the operand does not fit the opcode, or
    /// [`crate::Error::DanglingTarget`] for branches to instructions outside this body.
    pub fn emit(&mut self, opcode: OpCode, operand: Operand) -> Result<InstrId> {
        let instruction = Instruction::new(opcode, operand);
        if let Some(missing) = instruction
            .targets()
            .into_iter()
            .find(|target| self.body.position(*target).is_none())
        {
            return Err(Error::DanglingTarget(missing));
        }

        let own_operand = instruction.operand.clone();
        let ids = self.body.insert(self.index, vec![instruction])?;
        let id = ids[0];

        if let Some(label) = self.label.take() {
            self.body.redirect_incoming(label, id)?;
            // the new instruction keeps its own targets
            if let Some(emitted) = self.body.get_mut(self.index) {
                emitted.operand = own_operand;
            }
        }

        self.index += 1;
        self.inserted += 1;
        Ok(id)
    }

    /// Emits the most compact `ldarg` form.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] for indices above 255.
    pub fn emit_ldarg(&mut self, index: u16) -> Result<InstrId> {
        match OpCode::ldarg_for(index) {
            Some(opcode) => self.emit(opcode, Operand::None),
            None => self.emit(OpCode::LdargS, Operand::Argument(index)),
        }
    }

    /// Emits the most compact `ldloc` form.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] for indices above 255.
    pub fn emit_ldloc(&mut self, index: u16) -> Result<InstrId> {
        match OpCode::ldloc_for(index) {
            Some(opcode) => self.emit(opcode, Operand::None),
            None => self.emit(OpCode::LdlocS, Operand::Local(index)),
        }
    }

    /// Emits the most compact integer constant form.
    ///
    /// # Errors
    /// Propagates errors from [`Self::emit`].
    pub fn emit_ldc_i4(&mut self, value: i32) -> Result<InstrId> {
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
    /// Propagates errors from [`Self::emit`].
    pub fn emit_ldc_r4(&mut self, value: f32) -> Result<InstrId> {
        self.emit(OpCode::LdcR4, Operand::Immediate(Immediate::Float32(value)))
    }

    /// Emits `ldfld field`, interning the field reference.
    ///
    /// # Errors
    /// Propagates errors from [`Self::emit`].
    pub fn emit_ldfld(&mut self, field: &FieldRef) -> Result<InstrId> {
        let token = self.members.intern_field(field);
        self.emit(OpCode::Ldfld, Operand::Token(token))
    }

    /// Emits `call method`, interning the method reference.
    ///
    /// # Errors
    /// Propagates errors from [`Self::emit`].
    pub fn emit_call(&mut self, method: &TargetMethod) -> Result<InstrId> {
        let token = self.members.intern_method(method);
        self.emit(OpCode::Call, Operand::Token(token))
    }

    /// Emits `callvirt method`, interning the method reference.
    ///
    /// # Errors
    /// Propagates errors from [`Self::emit`].
    pub fn emit_callvirt(&mut self, method: &TargetMethod) -> Result<InstrId> {
        let token = self.members.intern_method(method);
        self.emit(OpCode::Callvirt, Operand::Token(token))
    }

    /// Emits a branch to an instruction already in the body.
    ///
    /// Short forms are promoted by the encoder if the displacement outgrows them.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidBranch`] if `opcode` is not a single-target branch, or
    /// [`crate::Error::DanglingTarget`] if `target` is not in this body.
    pub fn emit_branch(&mut self, opcode: OpCode, target: InstrId) -> Result<InstrId> {
        if !matches!(
            opcode.operand_type(),
            OperandType::ShortTarget | OperandType::Target
        ) {
            return Err(Error::InvalidBranch(format!(
                "{} does not take a branch target",
                opcode.mnemonic()
            )));
        }
        self.emit(opcode, Operand::Target(target))
    }

    /// Registers `func` as a delegate and emits a call to it.
    ///
    /// At run time the call pops `arity` values (the last pushed is the last argument) and
    /// pushes the result unless `returns` is `None`. The delegate belongs to the patch
    /// being applied and is dropped when that patch is removed.
    ///
    /// # Errors
    /// Propagates errors from [`Self::emit`].
    pub fn emit_delegate<F>(
        &mut self,
        name: &str,
        arity: usize,
        returns: Option<ValueType>,
        func: F,
    ) -> Result<InstrId>
    where
        F: Fn(&[Value]) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        let token = self.delegates.register(name, arity, returns, func);
        self.owned_delegates.push(token);
        self.emit(OpCode::Call, Operand::Token(token))
    }

    /// Returns the first method called through `callvirt` whose name contains `fragment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingMember`] if the body makes no such call.
    pub fn find_method_reference(&self, fragment: &str) -> Result<TargetMethodRc> {
        self.body
            .iter()
            .filter(|instr| instr.opcode == OpCode::Callvirt)
            .filter_map(|instr| instr.token())
            .filter_map(|token| self.members.method(token).ok())
            .find(|method| method.name().contains(fragment))
            .ok_or_else(|| Error::MissingMember {
                type_name: self.method.declaring_type().to_string(),
                member: fragment.to_string(),
            })
    }

    /// Logs the current position as a patch site.
    pub fn log_site(&self, what: &str) {
        if self.log_sites {
            log::info!(
                "{what} at {} in IL code for {}",
                self.index,
                self.method.full_name()
            );
        }
    }

    pub(crate) fn into_delegates(self) -> Vec<Token> {
        self.owned_delegates
    }
}
