//! Metadata tokens referencing fields, methods and injected delegates.
//!
//! A token packs a table identifier into its high byte and a 1-based row into the low
//! 24 bits, the same layout CIL uses. Method bodies store tokens in place of the member
//! they reference; the [`crate::metadata::MemberTable`] maps them back.
//!
//! | Table | Byte | Resolves to |
//! |-------|------|-------------|
//! | [`Token::FIELD`] | `0x04` | [`crate::metadata::FieldRef`] |
//! | [`Token::METHOD`] | `0x0A` | [`crate::metadata::TargetMethod`] |
//! | [`Token::DELEGATE`] | `0x7E` | [`crate::patch::DelegateEntry`] |

use std::fmt;

/// A metadata token: table byte plus 24-bit row.
///
/// # Examples
///
/// ```rust
/// use modweave::metadata::Token;
///
/// let token = Token::from_parts(Token::METHOD, 3);
/// assert_eq!(token.value(), 0x0A00_0003);
/// assert_eq!(token.table(), Token::METHOD);
/// assert_eq!(token.row(), 3);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Field reference table
    pub const FIELD: u8 = 0x04;
    /// Method reference table
    pub const METHOD: u8 = 0x0A;
    /// Injected delegate table
    pub const DELEGATE: u8 = 0x7E;

    /// Wraps a raw token value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Builds a token from a table byte and a row (row is masked to 24 bits).
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns the table identifier (high byte).
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the 1-based row.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` for the all-zero token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
