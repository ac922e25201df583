//! Cursor-based byte reader used by the method body decoder.
//!
//! [`Parser`] keeps a position within a borrowed byte slice and offers bounds-checked
//! reads of the primitive operand types. It never panics on truncated input; every read
//! past the end reports [`crate::Error::OutOfBounds`].

use crate::{
    stream::io::{read_le_at, ByteIO},
    Result,
};

/// A cursor over a method body's bytes.
///
/// # Examples
///
/// ```rust
/// use modweave::stream::Parser;
///
/// let data = [0x2B, 0x01, 0x00, 0x2A]; // br.s +1, nop, ret
/// let mut parser = Parser::new(&data);
///
/// assert_eq!(parser.read_le::<u8>()?, 0x2B);
/// assert_eq!(parser.read_le::<i8>()?, 1);
/// assert_eq!(parser.pos(), 2);
/// assert!(parser.has_more_data());
/// # Ok::<(), modweave::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] from a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Returns the current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns the bytes that have not been consumed yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Read a type `T` from the current position in little-endian format and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_le<T: ByteIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn truncated_operand_reports_out_of_bounds() {
        let data = [0x20, 0x01, 0x02];
        let mut parser = Parser::new(&data);
        parser.read_le::<u8>().unwrap();
        assert!(matches!(parser.read_le::<i32>(), Err(Error::OutOfBounds)));
        assert_eq!(parser.pos(), 1);
        assert_eq!(parser.remaining(), 2);
    }
}
