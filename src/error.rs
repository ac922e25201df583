use thiserror::Error;

use crate::assembly::InstrId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into four groups that map onto how the engine reacts to them:
///
/// ## Host drift (recoverable, logged)
/// - [`Error::PatternNotFound`] - A patch pattern did not match the current method body
/// - [`Error::MissingMember`] - A field or method the engine expected on a host type is absent
///
/// Both are fatal to the single patch or hook that raised them, never to the whole engine.
/// The [`crate::patch::PatchManager`] converts them into a skipped patch unless configured
/// otherwise through [`crate::EngineConfig::fail_on_missing_pattern`].
///
/// ## Contract violations
/// - [`Error::AlreadyLoaded`] / [`Error::NotLoaded`] - Extension lifecycle used out of order
///
/// ## Codec errors
/// - [`Error::InvalidOpcode`], [`Error::InvalidBranch`], [`Error::OutOfBounds`], [`Error::Malformed`]
///
/// ## Settings and runtime errors
/// - [`Error::UnknownSetting`], [`Error::SettingOutOfRange`], [`Error::SettingKindMismatch`]
/// - [`Error::TypeMismatch`], [`Error::StackUnderflow`], [`Error::RecursionLimit`] and friends
///
/// # Examples
///
/// ```rust
/// use modweave::{Error, settings::OverrideRegistry};
///
/// let registry = OverrideRegistry::with_builtin_settings();
/// match registry.set_raw("JumpCount", 99) {
///     Err(Error::SettingOutOfRange { name, value, .. }) => {
///         eprintln!("{name} rejected {value}");
///     }
///     Err(e) => eprintln!("Other error: {e}"),
///     Ok(()) => {}
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A patch pattern found no match scanning forward from the cursor.
    ///
    /// This is the expected symptom of a host update that reshuffled a method body.
    /// The method body is left untouched.
    #[error("Pattern not found in {target} (scan started at instruction {cursor})")]
    PatternNotFound {
        /// Display form of the method being patched
        target: String,
        /// Cursor index the scan started from
        cursor: usize,
    },

    /// A named internal member the engine relies on does not exist on the host type.
    #[error("Member '{member}' not found on '{type_name}'")]
    MissingMember {
        /// The declaring type that was searched
        type_name: String,
        /// The missing field or method name
        member: String,
    },

    /// An extension was loaded while already loaded.
    #[error("Extension '{0}' is already loaded")]
    AlreadyLoaded(String),

    /// An extension was unloaded while not loaded.
    #[error("Extension '{0}' is not loaded")]
    NotLoaded(String),

    /// No extension with that name has been registered.
    #[error("Unknown extension '{0}'")]
    UnknownExtension(String),

    /// An extension with that name is already registered.
    #[error("Extension '{0}' is already registered")]
    DuplicateExtension(String),

    /// The byte stream contains an opcode outside the supported instruction set.
    #[error("Invalid opcode 0x{0:04X}")]
    InvalidOpcode(u16),

    /// A mnemonic did not resolve to a known opcode.
    #[error("Invalid mnemonic '{0}'")]
    InvalidMnemonic(String),

    /// Operand does not fit the opcode it was emitted with.
    #[error("Invalid operand for '{mnemonic}': {reason}")]
    InvalidOperand {
        /// Mnemonic of the offending instruction
        mnemonic: &'static str,
        /// What was wrong with the operand
        reason: String,
    },

    /// A branch instruction is malformed or points outside its method body.
    #[error("Invalid branch: {0}")]
    InvalidBranch(String),

    /// A branch operand refers to an instruction id that is not part of the body.
    #[error("Branch target {0} is not part of the method body")]
    DanglingTarget(InstrId),

    /// A label was referenced but never placed.
    #[error("Undefined label '{0}'")]
    UndefinedLabel(String),

    /// A label was placed twice.
    #[error("Duplicate label '{0}'")]
    DuplicateLabel(String),

    /// The method body is damaged and could not be decoded.
    ///
    /// Includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading or editing a body.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A metadata token did not resolve in the member table.
    #[error("Unknown token 0x{0:08X}")]
    UnknownToken(u32),

    /// The target has no decodable body (native host method).
    #[error("Method {0} has no instruction body")]
    NoMethodBody(String),

    /// A delegate id did not resolve to registered native logic.
    #[error("Delegate {0} is not registered")]
    DelegateNotFound(u32),

    /// No setting with that name was declared.
    #[error("Unknown setting '{0}'")]
    UnknownSetting(String),

    /// An integer setting was assigned a value outside its declared bounds.
    #[error("Value {value} for setting '{name}' is outside {min}..={max}")]
    SettingOutOfRange {
        /// Setting name
        name: String,
        /// Rejected value
        value: i32,
        /// Inclusive lower bound
        min: i32,
        /// Inclusive upper bound
        max: i32,
    },

    /// A setting was accessed with the wrong type.
    #[error("Setting '{name}' is {actual}, not {requested}")]
    SettingKindMismatch {
        /// Setting name
        name: String,
        /// Declared kind
        actual: &'static str,
        /// Kind the caller asked for
        requested: &'static str,
    },

    /// A value on the evaluation stack or in a field had an unexpected type.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected type name
        expected: &'static str,
        /// Actual value, rendered
        found: String,
    },

    /// An instruction popped more values than the evaluation stack held.
    #[error("Evaluation stack underflow at instruction {0}")]
    StackUnderflow(usize),

    /// Execution ran off the end of a method body.
    #[error("Execution fell through the end of {0}")]
    FellThrough(String),

    /// Reached the maximum call depth allowed.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// The referenced host object does not exist (or was removed).
    #[error("Unknown object #{0}")]
    UnknownObject(u32),

    /// A hook wrapper reported a failure.
    #[error("Hook '{name}' failed: {message}")]
    HookFailed {
        /// Name of the wrapper
        name: String,
        /// Failure description
        message: String,
    },

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,
}

impl Error {
    /// Whether this error is the symptom of a host whose layout no longer matches what a
    /// patch or hook expects ([`Error::PatternNotFound`] or [`Error::MissingMember`]).
    #[must_use]
    pub fn is_host_drift(&self) -> bool {
        matches!(
            self,
            Error::PatternNotFound { .. } | Error::MissingMember { .. }
        )
    }
}
