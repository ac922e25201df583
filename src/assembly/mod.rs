//! Instruction model and method body codec.
//!
//! This module turns raw method body bytes into an editable [`MethodBody`] and back. The
//! body is an index-based instruction list in which every instruction has a stable
//! [`InstrId`]; branch operands refer to ids, and a relocation table maps ids to current
//! positions. That is what lets the patcher insert code without touching existing
//! control-flow edges.
//!
//! # Key Components
//!
//! - [`OpCode`] - The supported instruction set with mnemonics and operand encodings
//! - [`Instruction`], [`Operand`], [`Immediate`] - Typed instruction representation
//! - [`MethodBody`] - Instruction list plus relocation table
//! - [`decode`] / [`encode`] - Byte codec with automatic short-to-long branch promotion
//! - [`MethodBodyBuilder`] - Label-based assembler for authoring bodies
//!
//! # Examples
//!
//! ```rust
//! use modweave::assembly::{decode, encode, Instruction, OpCode};
//!
//! // ldarg.0; brfalse.s +1; nop; ret
//! let bytes = [0x02, 0x2C, 0x01, 0x00, 0x2A];
//! let mut body = decode(&bytes)?;
//!
//! // Insert before the nop; the branch still lands on `ret`.
//! body.insert(2, vec![Instruction::simple(OpCode::Nop)])?;
//! assert_eq!(encode(&body)?, vec![0x02, 0x2C, 0x02, 0x00, 0x00, 0x2A]);
//! # Ok::<(), modweave::Error>(())
//! ```

mod body;
mod builder;
mod decoder;
mod encoder;
mod instruction;
pub(crate) mod opcodes;

pub use body::MethodBody;
pub use builder::MethodBodyBuilder;
pub use decoder::decode;
pub use encoder::encode;
pub use instruction::{FlowType, Immediate, InstrId, Instruction, Operand, OperandType};
pub use opcodes::OpCode;
