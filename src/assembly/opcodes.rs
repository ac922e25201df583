//! The supported instruction set.
//!
//! Opcode values follow CIL numbering: single-byte opcodes use their byte value, two-byte
//! opcodes are stored as `0xFE00 | second_byte`. Only the subset a patched method body
//! needs is supported; anything else decodes to [`crate::Error::InvalidOpcode`].
//!
//! Every opcode carries static metadata (mnemonic, operand encoding, control flow) through
//! [`OpCode::operand_type`] and [`OpCode::flow_type`]. Mnemonics come from `strum` so the
//! same table drives [`std::fmt::Display`] and mnemonic parsing.
//!
//! # Examples
//!
//! ```rust
//! use modweave::assembly::{FlowType, OpCode, OperandType};
//! use std::str::FromStr;
//!
//! let op = OpCode::from_str("brtrue.s")?;
//! assert_eq!(op, OpCode::BrtrueS);
//! assert_eq!(op.value(), 0x2D);
//! assert_eq!(op.operand_type(), OperandType::ShortTarget);
//! assert_eq!(op.flow_type(), FlowType::ConditionalBranch);
//! assert_eq!(op.long_form(), Some(OpCode::Brtrue));
//! # Ok::<(), strum::ParseError>(())
//! ```

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::assembly::instruction::{FlowType, OperandType};

/// Prefix byte of two-byte opcodes
pub const EXTENDED_PREFIX: u8 = 0xFE;

/// Distance between a short branch opcode and its long form.
const LONG_BRANCH_DELTA: u16 = 0x38 - 0x2B;

macro_rules! define_opcodes {
    ($(
        $(#[$doc:meta])*
        $name:ident = $value:literal, $mnemonic:literal, $operand:ident, $flow:ident;
    )*) => {
        /// A supported opcode.
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
        )]
        #[repr(u16)]
        pub enum OpCode {
            $(
                $(#[$doc])*
                #[strum(serialize = $mnemonic)]
                $name = $value,
            )*
        }

        impl OpCode {
            /// Looks up an opcode by its numeric value (`0xFE00 | b` for two-byte opcodes).
            #[must_use]
            pub fn from_value(value: u16) -> Option<OpCode> {
                match value {
                    $($value => Some(OpCode::$name),)*
                    _ => None,
                }
            }

            /// Encoding of this opcode's operand.
            #[must_use]
            pub const fn operand_type(&self) -> OperandType {
                match self {
                    $(OpCode::$name => OperandType::$operand,)*
                }
            }

            /// Control flow behaviour of this opcode.
            #[must_use]
            pub const fn flow_type(&self) -> FlowType {
                match self {
                    $(OpCode::$name => FlowType::$flow,)*
                }
            }
        }
    };
}

define_opcodes! {
    /// No operation
    Nop = 0x00, "nop", None, Sequential;
    /// Load argument 0
    Ldarg0 = 0x02, "ldarg.0", None, Sequential;
    /// Load argument 1
    Ldarg1 = 0x03, "ldarg.1", None, Sequential;
    /// Load argument 2
    Ldarg2 = 0x04, "ldarg.2", None, Sequential;
    /// Load argument 3
    Ldarg3 = 0x05, "ldarg.3", None, Sequential;
    /// Load local 0
    Ldloc0 = 0x06, "ldloc.0", None, Sequential;
    /// Load local 1
    Ldloc1 = 0x07, "ldloc.1", None, Sequential;
    /// Load local 2
    Ldloc2 = 0x08, "ldloc.2", None, Sequential;
    /// Load local 3
    Ldloc3 = 0x09, "ldloc.3", None, Sequential;
    /// Store local 0
    Stloc0 = 0x0A, "stloc.0", None, Sequential;
    /// Store local 1
    Stloc1 = 0x0B, "stloc.1", None, Sequential;
    /// Store local 2
    Stloc2 = 0x0C, "stloc.2", None, Sequential;
    /// Store local 3
    Stloc3 = 0x0D, "stloc.3", None, Sequential;
    /// Load argument by 8-bit index
    LdargS = 0x0E, "ldarg.s", Argument8, Sequential;
    /// Store argument by 8-bit index
    StargS = 0x10, "starg.s", Argument8, Sequential;
    /// Load local by 8-bit index
    LdlocS = 0x11, "ldloc.s", Local8, Sequential;
    /// Store local by 8-bit index
    StlocS = 0x13, "stloc.s", Local8, Sequential;
    /// Push a null reference
    Ldnull = 0x14, "ldnull", None, Sequential;
    /// Push -1
    LdcI4M1 = 0x15, "ldc.i4.m1", None, Sequential;
    /// Push 0
    LdcI4_0 = 0x16, "ldc.i4.0", None, Sequential;
    /// Push 1
    LdcI4_1 = 0x17, "ldc.i4.1", None, Sequential;
    /// Push 2
    LdcI4_2 = 0x18, "ldc.i4.2", None, Sequential;
    /// Push 3
    LdcI4_3 = 0x19, "ldc.i4.3", None, Sequential;
    /// Push 4
    LdcI4_4 = 0x1A, "ldc.i4.4", None, Sequential;
    /// Push 5
    LdcI4_5 = 0x1B, "ldc.i4.5", None, Sequential;
    /// Push 6
    LdcI4_6 = 0x1C, "ldc.i4.6", None, Sequential;
    /// Push 7
    LdcI4_7 = 0x1D, "ldc.i4.7", None, Sequential;
    /// Push 8
    LdcI4_8 = 0x1E, "ldc.i4.8", None, Sequential;
    /// Push an 8-bit immediate as int32
    LdcI4S = 0x1F, "ldc.i4.s", Int8, Sequential;
    /// Push an int32 immediate
    LdcI4 = 0x20, "ldc.i4", Int32, Sequential;
    /// Push a float32 immediate
    LdcR4 = 0x22, "ldc.r4", Float32, Sequential;
    /// Duplicate the top of the stack
    Dup = 0x25, "dup", None, Sequential;
    /// Discard the top of the stack
    Pop = 0x26, "pop", None, Sequential;
    /// Call a method or injected delegate
    Call = 0x28, "call", Token, Call;
    /// Return from the method
    Ret = 0x2A, "ret", None, Return;
    /// Unconditional branch (short)
    BrS = 0x2B, "br.s", ShortTarget, UnconditionalBranch;
    /// Branch if false (short)
    BrfalseS = 0x2C, "brfalse.s", ShortTarget, ConditionalBranch;
    /// Branch if true (short)
    BrtrueS = 0x2D, "brtrue.s", ShortTarget, ConditionalBranch;
    /// Branch if equal (short)
    BeqS = 0x2E, "beq.s", ShortTarget, ConditionalBranch;
    /// Branch if greater or equal (short)
    BgeS = 0x2F, "bge.s", ShortTarget, ConditionalBranch;
    /// Branch if greater (short)
    BgtS = 0x30, "bgt.s", ShortTarget, ConditionalBranch;
    /// Branch if less or equal (short)
    BleS = 0x31, "ble.s", ShortTarget, ConditionalBranch;
    /// Branch if less (short)
    BltS = 0x32, "blt.s", ShortTarget, ConditionalBranch;
    /// Branch if not equal or unordered (short)
    BneUnS = 0x33, "bne.un.s", ShortTarget, ConditionalBranch;
    /// Branch if greater, equal or unordered (short)
    BgeUnS = 0x34, "bge.un.s", ShortTarget, ConditionalBranch;
    /// Branch if greater or unordered (short)
    BgtUnS = 0x35, "bgt.un.s", ShortTarget, ConditionalBranch;
    /// Branch if less, equal or unordered (short)
    BleUnS = 0x36, "ble.un.s", ShortTarget, ConditionalBranch;
    /// Branch if less or unordered (short)
    BltUnS = 0x37, "blt.un.s", ShortTarget, ConditionalBranch;
    /// Unconditional branch
    Br = 0x38, "br", Target, UnconditionalBranch;
    /// Branch if false
    Brfalse = 0x39, "brfalse", Target, ConditionalBranch;
    /// Branch if true
    Brtrue = 0x3A, "brtrue", Target, ConditionalBranch;
    /// Branch if equal
    Beq = 0x3B, "beq", Target, ConditionalBranch;
    /// Branch if greater or equal
    Bge = 0x3C, "bge", Target, ConditionalBranch;
    /// Branch if greater
    Bgt = 0x3D, "bgt", Target, ConditionalBranch;
    /// Branch if less or equal
    Ble = 0x3E, "ble", Target, ConditionalBranch;
    /// Branch if less
    Blt = 0x3F, "blt", Target, ConditionalBranch;
    /// Branch if not equal or unordered
    BneUn = 0x40, "bne.un", Target, ConditionalBranch;
    /// Branch if greater, equal or unordered
    BgeUn = 0x41, "bge.un", Target, ConditionalBranch;
    /// Branch if greater or unordered
    BgtUn = 0x42, "bgt.un", Target, ConditionalBranch;
    /// Branch if less, equal or unordered
    BleUn = 0x43, "ble.un", Target, ConditionalBranch;
    /// Branch if less or unordered
    BltUn = 0x44, "blt.un", Target, ConditionalBranch;
    /// Jump table
    Switch = 0x45, "switch", Switch, Switch;
    /// Add
    Add = 0x58, "add", None, Sequential;
    /// Subtract
    Sub = 0x59, "sub", None, Sequential;
    /// Multiply
    Mul = 0x5A, "mul", None, Sequential;
    /// Divide
    Div = 0x5B, "div", None, Sequential;
    /// Bitwise and
    And = 0x5F, "and", None, Sequential;
    /// Bitwise or
    Or = 0x60, "or", None, Sequential;
    /// Negate
    Neg = 0x65, "neg", None, Sequential;
    /// Bitwise complement
    Not = 0x66, "not", None, Sequential;
    /// Convert to int32
    ConvI4 = 0x69, "conv.i4", None, Sequential;
    /// Convert to float32
    ConvR4 = 0x6B, "conv.r4", None, Sequential;
    /// Call a method through the object's virtual table
    Callvirt = 0x6F, "callvirt", Token, Call;
    /// Load an instance field
    Ldfld = 0x7B, "ldfld", Token, Sequential;
    /// Store an instance field
    Stfld = 0x7D, "stfld", Token, Sequential;
    /// Compare equal
    Ceq = 0xFE01, "ceq", None, Sequential;
    /// Compare greater
    Cgt = 0xFE02, "cgt", None, Sequential;
    /// Compare less
    Clt = 0xFE04, "clt", None, Sequential;
}

impl OpCode {
    /// Numeric value of this opcode.
    #[must_use]
    pub const fn value(&self) -> u16 {
        *self as u16
    }

    /// Mnemonic, e.g. `"ldarg.0"`.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.into()
    }

    /// Whether this opcode is encoded with the [`EXTENDED_PREFIX`] byte.
    #[must_use]
    pub const fn is_extended(&self) -> bool {
        self.value() > 0xFF
    }

    /// Size of the opcode itself in bytes (1 or 2).
    #[must_use]
    pub const fn size(&self) -> usize {
        if self.is_extended() {
            2
        } else {
            1
        }
    }

    /// Whether this opcode takes a branch target operand (short or long).
    #[must_use]
    pub const fn is_branch(&self) -> bool {
        matches!(
            self.operand_type(),
            OperandType::ShortTarget | OperandType::Target
        )
    }

    /// The long form of a short branch.
    #[must_use]
    pub fn long_form(&self) -> Option<OpCode> {
        match self.operand_type() {
            OperandType::ShortTarget => OpCode::from_value(self.value() + LONG_BRANCH_DELTA),
            _ => None,
        }
    }

    /// The short form of a long branch.
    #[must_use]
    pub fn short_form(&self) -> Option<OpCode> {
        match self.operand_type() {
            OperandType::Target => OpCode::from_value(self.value() - LONG_BRANCH_DELTA),
            _ => None,
        }
    }

    /// The compact `ldarg.N` opcode for an argument index, if one exists.
    #[must_use]
    pub fn ldarg_for(index: u16) -> Option<OpCode> {
        match index {
            0 => Some(OpCode::Ldarg0),
            1 => Some(OpCode::Ldarg1),
            2 => Some(OpCode::Ldarg2),
            3 => Some(OpCode::Ldarg3),
            _ => None,
        }
    }

    /// The compact `ldloc.N` opcode for a local index, if one exists.
    #[must_use]
    pub fn ldloc_for(index: u16) -> Option<OpCode> {
        match index {
            0 => Some(OpCode::Ldloc0),
            1 => Some(OpCode::Ldloc1),
            2 => Some(OpCode::Ldloc2),
            3 => Some(OpCode::Ldloc3),
            _ => None,
        }
    }

    /// The compact `stloc.N` opcode for a local index, if one exists.
    #[must_use]
    pub fn stloc_for(index: u16) -> Option<OpCode> {
        match index {
            0 => Some(OpCode::Stloc0),
            1 => Some(OpCode::Stloc1),
            2 => Some(OpCode::Stloc2),
            3 => Some(OpCode::Stloc3),
            _ => None,
        }
    }

    /// The compact `ldc.i4.N` opcode for a constant, if one exists.
    #[must_use]
    pub fn ldc_i4_for(value: i32) -> Option<OpCode> {
        match value {
            -1 => Some(OpCode::LdcI4M1),
            0 => Some(OpCode::LdcI4_0),
            1 => Some(OpCode::LdcI4_1),
            2 => Some(OpCode::LdcI4_2),
            3 => Some(OpCode::LdcI4_3),
            4 => Some(OpCode::LdcI4_4),
            5 => Some(OpCode::LdcI4_5),
            6 => Some(OpCode::LdcI4_6),
            7 => Some(OpCode::LdcI4_7),
            8 => Some(OpCode::LdcI4_8),
            _ => None,
        }
    }

    /// Argument index implied by a compact `ldarg.N` opcode.
    #[must_use]
    pub const fn implied_argument(&self) -> Option<u16> {
        match self {
            OpCode::Ldarg0 => Some(0),
            OpCode::Ldarg1 => Some(1),
            OpCode::Ldarg2 => Some(2),
            OpCode::Ldarg3 => Some(3),
            _ => None,
        }
    }

    /// Local index implied by a compact `ldloc.N` / `stloc.N` opcode.
    #[must_use]
    pub const fn implied_local(&self) -> Option<u16> {
        match self {
            OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
            OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
            OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
            OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
            _ => None,
        }
    }

    /// Constant implied by a compact `ldc.i4.N` opcode.
    #[must_use]
    pub const fn implied_constant(&self) -> Option<i32> {
        match self {
            OpCode::LdcI4M1 => Some(-1),
            OpCode::LdcI4_0 => Some(0),
            OpCode::LdcI4_1 => Some(1),
            OpCode::LdcI4_2 => Some(2),
            OpCode::LdcI4_3 => Some(3),
            OpCode::LdcI4_4 => Some(4),
            OpCode::LdcI4_5 => Some(5),
            OpCode::LdcI4_6 => Some(6),
            OpCode::LdcI4_7 => Some(7),
            OpCode::LdcI4_8 => Some(8),
            _ => None,
        }
    }
}
