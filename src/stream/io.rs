//! Little-endian reading and writing of primitive operand values.
//!
//! Method bodies store every multi-byte operand (branch displacements, immediates,
//! metadata tokens) in little-endian order. This module provides the [`ByteIO`] trait
//! implemented for every primitive the instruction set uses, plus bounds-checked
//! helpers that read at an offset and advance it.
//!
//! # Examples
//!
//! ```rust
//! use modweave::stream::{read_le_at, write_le};
//!
//! let mut buffer = Vec::new();
//! write_le(&mut buffer, 0x0A00_0001u32);
//! write_le(&mut buffer, -2i8);
//!
//! let mut offset = 0;
//! let token: u32 = read_le_at(&buffer, &mut offset)?;
//! let delta: i8 = read_le_at(&buffer, &mut offset)?;
//! assert_eq!(token, 0x0A00_0001);
//! assert_eq!(delta, -2);
//! assert_eq!(offset, 5);
//! # Ok::<(), modweave::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for type-specific safe binary data reading and writing.
///
/// Each implementation names the fixed-size byte array for its type (e.g. `[u8; 4]`
/// for `u32`) and forwards to the standard library's endian conversions.
pub trait ByteIO: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_byte_io {
    ($($ty:ty => $size:expr),* $(,)?) => {
        $(
            impl ByteIO for $ty {
                type Bytes = [u8; $size];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_byte_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Read a value of type `T` at `offset` in little-endian and advance `offset`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: ByteIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(bytes) = T::Bytes::try_from(&data[*offset..end]) else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(bytes))
}

/// Append `value` to `buffer` in little-endian.
pub fn write_le<T: ByteIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}
