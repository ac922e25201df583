//! Interning table mapping member references to metadata tokens and back.
//!
//! Method bodies only carry [`Token`]s. The [`MemberTable`] is the single place where a
//! token is turned into the [`FieldRef`] or [`TargetMethod`] it stands for, and where a
//! patch that references a new member obtains a token for it. Rows are append-only, so
//! a token handed out once stays valid for the lifetime of the table, even while other
//! threads intern further members.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    metadata::{FieldRef, TargetMethod, Token},
    Error, Result,
};

/// Reference-counted method identity as stored in the table
pub type TargetMethodRc = Arc<TargetMethod>;
/// Reference-counted field reference as stored in the table
pub type FieldRefRc = Arc<FieldRef>;

/// Append-only interning table for field and method references.
///
/// # Examples
///
/// ```rust
/// use modweave::metadata::{FieldRef, MemberTable, Token, ValueType};
///
/// let table = MemberTable::new();
/// let field = FieldRef::new("Celeste.Player", "jumpGraceTimer", ValueType::F32);
///
/// let token = table.intern_field(&field);
/// assert_eq!(token.table(), Token::FIELD);
/// assert_eq!(table.intern_field(&field), token);
/// assert_eq!(table.field(token)?.name(), "jumpGraceTimer");
/// # Ok::<(), modweave::Error>(())
/// ```
///
/// # Thread Safety
///
/// All operations take `&self`; rows live in [`boxcar::Vec`]s and the reverse index is a
/// [`DashMap`], so concurrent interning of the same member yields one token.
#[derive(Default)]
pub struct MemberTable {
    fields: boxcar::Vec<FieldRefRc>,
    methods: boxcar::Vec<TargetMethodRc>,
    field_index: DashMap<FieldRef, Token>,
    method_index: DashMap<TargetMethod, Token>,
}

impl MemberTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token for `field`, adding a row if it is not yet known.
    pub fn intern_field(&self, field: &FieldRef) -> Token {
        match self.field_index.entry(field.clone()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let index = self.fields.push(Arc::new(field.clone()));
                let token = Token::from_parts(Token::FIELD, row_for(index));
                entry.insert(token);
                token
            }
        }
    }

    /// Returns the token for `method`, adding a row if it is not yet known.
    pub fn intern_method(&self, method: &TargetMethod) -> Token {
        match self.method_index.entry(method.clone()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let index = self.methods.push(Arc::new(method.clone()));
                let token = Token::from_parts(Token::METHOD, row_for(index));
                entry.insert(token);
                token
            }
        }
    }

    /// Resolves a field token.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownToken`] if the token is not a known field row.
    pub fn field(&self, token: Token) -> Result<FieldRefRc> {
        if token.table() != Token::FIELD {
            return Err(Error::UnknownToken(token.value()));
        }
        lookup(&self.fields, token)
    }

    /// Resolves a method token.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownToken`] if the token is not a known method row.
    pub fn method(&self, token: Token) -> Result<TargetMethodRc> {
        if token.table() != Token::METHOD {
            return Err(Error::UnknownToken(token.value()));
        }
        lookup(&self.methods, token)
    }

    /// Finds an already-interned method whose name contains `fragment`.
    #[must_use]
    pub fn find_method(&self, declaring_type: &str, fragment: &str) -> Option<TargetMethodRc> {
        self.methods
            .iter()
            .map(|(_, method)| method)
            .find(|m| m.declaring_type() == declaring_type && m.name().contains(fragment))
            .cloned()
    }

    /// Number of interned fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.count()
    }

    /// Number of interned methods.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.count()
    }
}

fn row_for(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(0x00FF_FFFF)
}

fn lookup<T: Clone>(rows: &boxcar::Vec<T>, token: Token) -> Result<T> {
    let row = token.row() as usize;
    if row == 0 {
        return Err(Error::UnknownToken(token.value()));
    }
    rows.get(row - 1)
        .cloned()
        .ok_or(Error::UnknownToken(token.value()))
}
