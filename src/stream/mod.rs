//! Byte-level access for the method body codec.
//!
//! # Key Components
//!
//! - [`Parser`] - Bounds-checked cursor for decoding instruction streams
//! - [`ByteIO`] - Little-endian conversion trait for operand primitives
//! - [`read_le_at`], [`write_le`] - Free-standing helpers used by the decoder and encoder

mod io;
mod parser;

pub use io::{read_le_at, write_le, ByteIO};
pub use parser::Parser;
