//! Evaluation-stack interpreter for decoded method bodies.
//!
//! The [`Interpreter`] executes one [`MethodBody`] invocation. Calls leave the interpreter
//! through the [`Runtime`], so every call made by interpreted code passes through the hook
//! chains and injected delegates exactly like a call from outside.

use std::cmp::Ordering;

use crate::{
    assembly::{Immediate, InstrId, Instruction, MethodBody, OpCode, Operand},
    emulation::{heap::coerce, Runtime},
    host::{FieldAccess, HostBinding, Value},
    metadata::{TargetMethod, Token, ValueType},
    Error, Result,
};

/// What executing one instruction asks the dispatch loop to do.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StepResult {
    /// Continue with the next instruction
    Continue,
    /// Jump to the instruction with this id
    Branch(InstrId),
    /// Leave the method
    Return(Option<Value>),
}

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i32, i32),
    Float(f32, f32),
}

/// One activation of an interpreted method.
pub(crate) struct Interpreter<'a> {
    runtime: &'a Runtime,
    method: &'a TargetMethod,
    body: &'a MethodBody,
    arguments: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
    position: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(
        runtime: &'a Runtime,
        method: &'a TargetMethod,
        body: &'a MethodBody,
        locals: &[ValueType],
        this: Option<Value>,
        args: &[Value],
    ) -> Self {
        let mut arguments = Vec::with_capacity(args.len() + 1);
        if method.sig().has_this() {
            arguments.push(this.unwrap_or(Value::Null));
        }
        arguments.extend_from_slice(args);

        Interpreter {
            runtime,
            method,
            body,
            arguments,
            locals: locals.iter().map(|ty| Value::default_for(*ty)).collect(),
            stack: Vec::new(),
            position: 0,
        }
    }

    /// Runs until the method returns.
    ///
    /// # Errors
    /// Returns [`crate::Error::FellThrough`] if execution runs off the end of the body, and
    /// any error raised by an instruction or a callee.
    pub(crate) fn run(mut self) -> Result<Option<Value>> {
        loop {
            let Some(instruction) = self.body.get(self.position) else {
                return Err(Error::FellThrough(self.method.full_name()));
            };

            match self.step(instruction)? {
                StepResult::Continue => self.position += 1,
                StepResult::Branch(target) => {
                    self.position = self
                        .body
                        .position(target)
                        .ok_or(Error::DanglingTarget(target))?;
                }
                StepResult::Return(value) => return Ok(value),
            }
        }
    }

    fn step(&mut self, instruction: &Instruction) -> Result<StepResult> {
        let opcode = instruction.opcode;
        match opcode {
            OpCode::Nop => {}
            OpCode::Ldarg0 | OpCode::Ldarg1 | OpCode::Ldarg2 | OpCode::Ldarg3 | OpCode::LdargS => {
                let index = self.slot_index(instruction.argument_index())?;
                let value = *self.arguments.get(index).ok_or(Error::OutOfBounds)?;
                self.push(value);
            }
            OpCode::StargS => {
                let index = self.slot_index(instruction.argument_index())?;
                let value = self.pop()?;
                *self.arguments.get_mut(index).ok_or(Error::OutOfBounds)? = value;
            }
            OpCode::Ldloc0 | OpCode::Ldloc1 | OpCode::Ldloc2 | OpCode::Ldloc3 | OpCode::LdlocS => {
                let index = self.slot_index(instruction.local_index())?;
                let value = *self.locals.get(index).ok_or(Error::OutOfBounds)?;
                self.push(value);
            }
            OpCode::Stloc0 | OpCode::Stloc1 | OpCode::Stloc2 | OpCode::Stloc3 | OpCode::StlocS => {
                let index = self.slot_index(instruction.local_index())?;
                let value = self.pop()?;
                *self.locals.get_mut(index).ok_or(Error::OutOfBounds)? = value;
            }
            OpCode::Ldnull => self.push(Value::Null),
            OpCode::LdcR4 => match instruction.operand {
                Operand::Immediate(Immediate::Float32(value)) => self.push(Value::F32(value)),
                _ => return Err(invalid_operand(instruction)),
            },
            OpCode::Dup => {
                let value = self.peek()?;
                self.push(value);
            }
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::Call | OpCode::Callvirt => return self.call(instruction),
            OpCode::Ret => {
                let value = match self.method.sig().ret {
                    Some(ty) => Some(coerce(self.pop()?, ty)?),
                    None => None,
                };
                return Ok(StepResult::Return(value));
            }
            OpCode::Switch => {
                let Operand::Switch(targets) = &instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let selector = self.pop()?.as_i32()?;
                if let Some(target) = usize::try_from(selector)
                    .ok()
                    .and_then(|index| targets.get(index))
                {
                    return Ok(StepResult::Branch(*target));
                }
            }
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                let result = self.arithmetic(opcode)?;
                self.push(result);
            }
            OpCode::And | OpCode::Or => {
                let b = self.pop()?.as_i32()?;
                let a = self.pop()?.as_i32()?;
                self.push(Value::I32(if opcode == OpCode::And { a & b } else { a | b }));
            }
            OpCode::Neg => {
                let value = match self.pop()? {
                    Value::F32(v) => Value::F32(-v),
                    other => Value::I32(other.as_i32()?.wrapping_neg()),
                };
                self.push(value);
            }
            OpCode::Not => {
                let value = self.pop()?.as_i32()?;
                self.push(Value::I32(!value));
            }
            OpCode::ConvI4 => {
                let value = match self.pop()? {
                    #[allow(clippy::cast_possible_truncation)]
                    Value::F32(v) => v as i32,
                    other => other.as_i32()?,
                };
                self.push(Value::I32(value));
            }
            OpCode::ConvR4 => {
                let value = match self.pop()? {
                    Value::F32(v) => v,
                    #[allow(clippy::cast_precision_loss)]
                    other => other.as_i32()? as f32,
                };
                self.push(Value::F32(value));
            }
            OpCode::Ldfld => {
                let field = self.runtime.members().field(token_of(instruction)?)?;
                let object = self.pop()?.as_object()?;
                let value = self.runtime.read_field(object, field.name())?;
                self.push(value);
            }
            OpCode::Stfld => {
                let field = self.runtime.members().field(token_of(instruction)?)?;
                let value = self.pop()?;
                let object = self.pop()?.as_object()?;
                self.runtime.write_field(object, field.name(), value)?;
            }
            OpCode::Ceq | OpCode::Cgt | OpCode::Clt => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = match opcode {
                    OpCode::Ceq => values_equal(a, b)?,
                    OpCode::Cgt => compare(a, b)? == Some(Ordering::Greater),
                    _ => compare(a, b)? == Some(Ordering::Less),
                };
                self.push(Value::I32(i32::from(result)));
            }
            _ if opcode.is_branch() => return self.branch(instruction),
            _ => {
                if let Some(constant) = instruction.constant_i32() {
                    self.push(Value::I32(constant));
                } else {
                    return Err(invalid_operand(instruction));
                }
            }
        }
        Ok(StepResult::Continue)
    }

    fn call(&mut self, instruction: &Instruction) -> Result<StepResult> {
        let token = token_of(instruction)?;

        let result = if token.table() == Token::DELEGATE {
            let arity = self.runtime.delegates().get(token)?.arity();
            let args = self.pop_n(arity)?;
            self.runtime.delegates().invoke(token, &args)?
        } else {
            let callee = self.runtime.members().method(token)?;
            let sig = callee.sig();
            let args = self.pop_n(sig.arg_count() - usize::from(sig.has_this()))?;
            let this = if sig.has_this() {
                let receiver = self.pop()?;
                if instruction.opcode == OpCode::Callvirt && receiver == Value::Null {
                    return Err(Error::TypeMismatch {
                        expected: "object",
                        found: format!("null receiver calling {}", callee.full_name()),
                    });
                }
                Some(receiver)
            } else {
                None
            };
            self.runtime.call(&callee, this, args)?
        };

        if let Some(value) = result {
            self.push(value);
        }
        Ok(StepResult::Continue)
    }

    fn branch(&mut self, instruction: &Instruction) -> Result<StepResult> {
        let Operand::Target(target) = instruction.operand else {
            return Err(invalid_operand(instruction));
        };
        let opcode = instruction.opcode.short_form().unwrap_or(instruction.opcode);

        let taken = match opcode {
            OpCode::BrS => true,
            OpCode::BrfalseS => !self.pop()?.is_truthy(),
            OpCode::BrtrueS => self.pop()?.is_truthy(),
            _ => {
                let b = self.pop()?;
                let a = self.pop()?;
                match opcode {
                    OpCode::BeqS => values_equal(a, b)?,
                    OpCode::BneUnS => !values_equal(a, b)?,
                    _ => {
                        let ordering = compare(a, b)?;
                        match (opcode, ordering) {
                            (
                                OpCode::BgeUnS | OpCode::BgtUnS | OpCode::BleUnS | OpCode::BltUnS,
                                None,
                            ) => true,
                            (_, None) => false,
                            (OpCode::BgeS | OpCode::BgeUnS, Some(ord)) => ord != Ordering::Less,
                            (OpCode::BgtS | OpCode::BgtUnS, Some(ord)) => ord == Ordering::Greater,
                            (OpCode::BleS | OpCode::BleUnS, Some(ord)) => ord != Ordering::Greater,
                            (OpCode::BltS | OpCode::BltUnS, Some(ord)) => ord == Ordering::Less,
                            _ => return Err(invalid_operand(instruction)),
                        }
                    }
                }
            }
        };

        Ok(if taken {
            StepResult::Branch(target)
        } else {
            StepResult::Continue
        })
    }

    fn arithmetic(&mut self, opcode: OpCode) -> Result<Value> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok(match (numeric(a, b)?, opcode) {
            (Numeric::Int(a, b), OpCode::Add) => Value::I32(a.wrapping_add(b)),
            (Numeric::Int(a, b), OpCode::Sub) => Value::I32(a.wrapping_sub(b)),
            (Numeric::Int(a, b), OpCode::Mul) => Value::I32(a.wrapping_mul(b)),
            (Numeric::Int(a, b), _) => Value::I32(a.checked_div(b).ok_or(Error::TypeMismatch {
                expected: "non-zero divisor",
                found: b.to_string(),
            })?),
            (Numeric::Float(a, b), OpCode::Add) => Value::F32(a + b),
            (Numeric::Float(a, b), OpCode::Sub) => Value::F32(a - b),
            (Numeric::Float(a, b), OpCode::Mul) => Value::F32(a * b),
            (Numeric::Float(a, b), _) => Value::F32(a / b),
        })
    }

    fn slot_index(&self, index: Option<u16>) -> Result<usize> {
        index.map(usize::from).ok_or(Error::OutOfBounds)
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or(Error::StackUnderflow(self.position))
    }

    fn peek(&self) -> Result<Value> {
        self.stack
            .last()
            .copied()
            .ok_or(Error::StackUnderflow(self.position))
    }

    /// Pops `count` values, returned in push order.
    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>> {
        if self.stack.len() < count {
            return Err(Error::StackUnderflow(self.position));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }
}

fn token_of(instruction: &Instruction) -> Result<Token> {
    instruction.token().ok_or_else(|| invalid_operand(instruction))
}

fn invalid_operand(instruction: &Instruction) -> Error {
    Error::InvalidOperand {
        mnemonic: instruction.mnemonic(),
        reason: format!("cannot execute with operand {:?}", instruction.operand),
    }
}

fn numeric(a: Value, b: Value) -> Result<Numeric> {
    match (a, b) {
        (Value::F32(a), Value::F32(b)) => Ok(Numeric::Float(a, b)),
        (Value::F32(_), other) | (other, Value::F32(_)) => Err(Error::TypeMismatch {
            expected: "float32",
            found: other.type_name().to_string(),
        }),
        (a, b) => Ok(Numeric::Int(a.as_i32()?, b.as_i32()?)),
    }
}

fn compare(a: Value, b: Value) -> Result<Option<Ordering>> {
    Ok(match numeric(a, b)? {
        Numeric::Int(a, b) => Some(a.cmp(&b)),
        Numeric::Float(a, b) => a.partial_cmp(&b),
    })
}

fn values_equal(a: Value, b: Value) -> Result<bool> {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => Ok(a == b),
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, Value::Object(_)) | (Value::Object(_), Value::Null) => Ok(false),
        _ => Ok(compare(a, b)? == Some(Ordering::Equal)),
    }
}
