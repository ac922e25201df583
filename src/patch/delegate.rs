//! Native logic callable from patched method bodies.
//!
//! A patch that needs to compute something the host code cannot express registers a
//! closure here and emits a `call` to the returned [`Token`] (table [`Token::DELEGATE`]).
//! When the host reaches that call it pops [`DelegateEntry::arity`] values off the
//! evaluation stack, invokes the closure, and pushes its result if it has one.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use dashmap::DashMap;

use crate::{host::Value, metadata::ValueType, metadata::Token, Error, Result};

/// Closure type stored for an injected delegate.
pub type DelegateFn = Arc<dyn Fn(&[Value]) -> Result<Option<Value>> + Send + Sync>;

/// A registered delegate.
pub struct DelegateEntry {
    name: String,
    arity: usize,
    returns: Option<ValueType>,
    func: DelegateFn,
}

impl DelegateEntry {
    /// Diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stack values consumed.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Type of the pushed result, `None` for `void`.
    #[must_use]
    pub fn returns(&self) -> Option<ValueType> {
        self.returns
    }
}

impl fmt::Debug for DelegateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateEntry")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// Registry of injected delegates addressed by token.
///
/// # Examples
///
/// ```rust
/// use modweave::host::Value;
/// use modweave::metadata::ValueType;
/// use modweave::patch::DelegateTable;
///
/// let table = DelegateTable::new();
/// let token = table.register("negate", 1, Some(ValueType::I32), |args| {
///     Ok(Some(Value::I32(-args[0].as_i32()?)))
/// });
///
/// assert_eq!(table.invoke(token, &[Value::I32(4)])?, Some(Value::I32(-4)));
/// assert!(table.remove(token));
/// assert!(table.invoke(token, &[Value::I32(4)]).is_err());
/// # Ok::<(), modweave::Error>(())
/// ```
///
/// # Thread Safety
///
/// Entries are stored as [`Arc`]s in a [`DashMap`]; [`DelegateTable::invoke`] releases the
/// map guard before the closure runs.
#[derive(Debug, Default)]
pub struct DelegateTable {
    entries: DashMap<u32, Arc<DelegateEntry>>,
    next_row: AtomicU32,
}

impl DelegateTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `func` and returns the token that calls it.
    pub fn register<F>(
        &self,
        name: impl Into<String>,
        arity: usize,
        returns: Option<ValueType>,
        func: F,
    ) -> Token
    where
        F: Fn(&[Value]) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        let row = self.next_row.fetch_add(1, Ordering::Relaxed) + 1;
        let token = Token::from_parts(Token::DELEGATE, row);
        let entry = DelegateEntry {
            name: name.into(),
            arity,
            returns,
            func: Arc::new(func),
        };
        log::debug!("registered delegate '{}' as {}", entry.name, token);
        self.entries.insert(token.value(), Arc::new(entry));
        token
    }

    /// Looks up a delegate.
    ///
    /// # Errors
    /// Returns [`crate::Error::DelegateNotFound`] for unknown or removed tokens.
    pub fn get(&self, token: Token) -> Result<Arc<DelegateEntry>> {
        self.entries
            .get(&token.value())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::DelegateNotFound(token.value()))
    }

    /// Invokes a delegate with exactly [`DelegateEntry::arity`] arguments.
    ///
    /// # Errors
    /// Returns [`crate::Error::DelegateNotFound`], [`crate::Error::TypeMismatch`] if the
    /// argument count or the result type is wrong, or whatever the closure returns.
    pub fn invoke(&self, token: Token, args: &[Value]) -> Result<Option<Value>> {
        let entry = self.get(token)?;
        if args.len() != entry.arity {
            return Err(Error::TypeMismatch {
                expected: "delegate argument count",
                found: format!("{} arguments for '{}' (arity {})", args.len(), entry.name, entry.arity),
            });
        }

        let result = (entry.func)(args)?;
        match (entry.returns, result) {
            (None, None) => Ok(None),
            (Some(ty), Some(value)) if value.fits(ty) => Ok(Some(value)),
            (expected, found) => Err(Error::TypeMismatch {
                expected: expected.map_or("void", |ty| ty.name()),
                found: found.map_or_else(|| "void".to_string(), |v| v.type_name().to_string()),
            }),
        }
    }

    /// Drops a delegate. Returns `false` if it was not registered.
    pub fn remove(&self, token: Token) -> bool {
        self.entries.remove(&token.value()).is_some()
    }

    /// Number of live delegates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no delegate is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_delegate_rows() {
        let table = DelegateTable::new();
        let a = table.register("a", 0, None, |_| Ok(None));
        let b = table.register("b", 0, None, |_| Ok(None));
        assert_ne!(a, b);
        assert_eq!(a.table(), Token::DELEGATE);
        assert_eq!(table.get(b).unwrap().name(), "b");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn arity_is_enforced() {
        let table = DelegateTable::new();
        let token = table.register("pair", 2, None, |_| Ok(None));
        assert!(matches!(
            table.invoke(token, &[Value::I32(1)]),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(table.invoke(token, &[Value::I32(1), Value::Bool(true)]).unwrap(), None);
    }

    #[test]
    fn result_type_is_checked() {
        let table = DelegateTable::new();
        let lying = table.register("lying", 0, Some(ValueType::F32), |_| Ok(Some(Value::Bool(true))));
        let silent = table.register("silent", 0, Some(ValueType::Bool), |_| Ok(None));
        assert!(table.invoke(lying, &[]).is_err());
        assert!(table.invoke(silent, &[]).is_err());
    }

    #[test]
    fn removed_delegates_are_gone() {
        let table = DelegateTable::new();
        let token = table.register("once", 0, None, |_| Ok(None));
        assert!(table.remove(token));
        assert!(!table.remove(token));
        assert!(matches!(table.get(token), Err(Error::DelegateNotFound(_))));
        assert!(table.is_empty());
    }
}
