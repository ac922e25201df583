//! Hook definition.

use std::{fmt, sync::Arc};

use crate::{
    hook::types::{CallFrame, WrapperFn},
    host::Value,
    Result,
};

/// A named wrapper around a host method.
///
/// # Examples
///
/// ```rust
/// use modweave::hook::Hook;
///
/// // Suppresses the original entirely.
/// let hook = Hook::new("skip", |_frame| Ok(None)).with_owner("DisableClimbJumping");
/// assert_eq!(hook.owner(), Some("DisableClimbJumping"));
/// ```
#[derive(Clone)]
pub struct Hook {
    name: String,
    owner: Option<String>,
    wrapper: WrapperFn,
}

impl Hook {
    /// Creates a hook from a name and a wrapper closure.
    pub fn new<F>(name: impl Into<String>, wrapper: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        Hook {
            name: name.into(),
            owner: None,
            wrapper: Arc::new(wrapper),
        }
    }

    /// Records the extension that installed this hook, for diagnostics.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Hook name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installing extension, if recorded.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub(crate) fn run(&self, frame: &mut CallFrame<'_>) -> Result<Option<Value>> {
        (self.wrapper)(frame)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
