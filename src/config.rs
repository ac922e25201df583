//! Engine-wide configuration.
//!
//! [`EngineConfig`] controls how strictly the engine treats host drift and how much it logs.
//! Besides [`Default`] there are two presets:
//!
//! - [`EngineConfig::strict`] - a missing pattern is a hard error; used by tests that pin
//!   the exact host layout
//! - [`EngineConfig::lenient`] - skips branch verification and site logging; for hosts that
//!   apply many patches at startup

/// Configuration for patching and the reference host.
///
/// # Examples
///
/// ```rust
/// use modweave::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert!(!config.fail_on_missing_pattern);
/// assert!(config.verify_branches);
///
/// let strict = EngineConfig::strict();
/// assert!(strict.fail_on_missing_pattern);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Turn a patch whose pattern does not match into an error instead of a logged skip
    /// (default: false).
    pub fail_on_missing_pattern: bool,

    /// Check every branch operand after a patch ran (default: true).
    pub verify_branches: bool,

    /// Maximum nested calls the reference interpreter allows (default: 256).
    pub max_call_depth: usize,

    /// Log the cursor position of every patch site at info level (default: true).
    pub log_patch_sites: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            fail_on_missing_pattern: false,
            verify_branches: true,
            max_call_depth: 256,
            log_patch_sites: true,
        }
    }
}

impl EngineConfig {
    /// Every check enabled and pattern misses are errors.
    #[must_use]
    pub fn strict() -> Self {
        EngineConfig {
            fail_on_missing_pattern: true,
            ..Self::default()
        }
    }

    /// Minimal checking and logging.
    #[must_use]
    pub fn lenient() -> Self {
        EngineConfig {
            fail_on_missing_pattern: false,
            verify_branches: false,
            max_call_depth: 256,
            log_patch_sites: false,
        }
    }
}
