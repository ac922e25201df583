//! Identities of host members and the tokens that reference them.
//!
//! # Key Components
//!
//! - [`Token`] - Table byte plus row, as stored in method bodies
//! - [`TargetMethod`] / [`MethodSig`] - A host method identified by declaring type, name and signature
//! - [`FieldRef`] - A (possibly private) field on a host type
//! - [`MemberTable`] - Interning table translating tokens to members and back

mod member;
mod table;
mod token;

pub use member::{FieldRef, MethodFlags, MethodSig, TargetMethod, ValueType};
pub use table::{FieldRefRc, MemberTable, TargetMethodRc};
pub use token::Token;
