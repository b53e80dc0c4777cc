//! Error types for the compiler front end.
//!
//! Every fallible operation in this crate returns [`crate::Result`], which carries the
//! [`Error`] enum defined here. Errors are fatal for the run that produced them: the
//! decoder, the plug resolver and the scanner never try to recover a partial result.
//! Non-fatal conditions (stale plug candidates, failing debug sinks) are reported through
//! [`crate::metadata::diagnostics::Diagnostics`] instead.
//!
//! # Error Categories
//!
//! - **Decoding**: [`Error::Malformed`], [`Error::OutOfBounds`], [`Error::BranchOutOfRange`]
//! - **Metadata lookups**: [`Error::TypeNotFound`], [`Error::MethodNotFound`], [`Error::FieldNotFound`]
//! - **Plugs**: [`Error::PlugTargetNotFound`], [`Error::DuplicatePlugField`],
//!   [`Error::NativeCodeNeedsPlug`], [`Error::PlugRequired`], [`Error::PlugNotQueued`]
//! - **Layout**: [`Error::NotSupported`]
//! - **Internal**: [`Error::TypeNotQueued`], [`Error::RecursionLimit`], [`Error::Error`]

use thiserror::Error;

/// Builds an [`Error::Malformed`] that records the source location of the check that failed.
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

/// Builds an [`Error::OutOfBounds`] for a truncated read.
macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this crate can return.
///
/// # Examples
///
/// ```rust
/// use cilfront::Error;
///
/// fn describe(err: &Error) -> &'static str {
///     match err {
///         Error::BranchOutOfRange { .. } => "bad branch",
///         Error::PlugRequired(_) => "missing plug",
///         _ => "other",
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A method body or metadata blob is damaged and could not be decoded.
    ///
    /// The error records where in this crate the malformation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading a byte stream.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A branch or switch target lies outside of the method body.
    ///
    /// Branches never cross method boundaries, so a target outside `[0, len)`
    /// means the body is malformed.
    #[error("Branch jumps outside method - {method} at IL_{offset:04X} targets {target}")]
    BranchOutOfRange {
        /// Full name of the method being decoded
        method: String,
        /// Offset of the branch instruction
        offset: usize,
        /// The computed (invalid) target
        target: i64,
    },

    /// A feature is used which is not supported, e.g. an unknown value type layout kind.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// A type could not be found by name.
    #[error("Failed to find type - {0}")]
    TypeNotFound(String),

    /// A method could not be found on a type.
    #[error("Failed to find method - {0}")]
    MethodNotFound(String),

    /// A field could not be found on a type.
    #[error("Failed to find field - {0}")]
    FieldNotFound(String),

    /// A method without managed body (p/invoke, native, internal call) was reached and
    /// no plug replaces it.
    #[error("Native code encountered, plug required - {0}")]
    NativeCodeNeedsPlug(String),

    /// A method marked as requiring a plug was reached and none is implemented.
    #[error("Method {0} requires a plug, but none is implemented")]
    PlugRequired(String),

    /// The target of a non-optional plug annotation could not be resolved.
    #[error("Plug target not found - {0}")]
    PlugTargetNotFound(String),

    /// Two field plugs for the same field were declared on one plug type.
    #[error("Duplicate PlugField found for field '{field_id}' on '{target}'!")]
    DuplicatePlugField {
        /// Full name of the plugged type
        target: String,
        /// The duplicated field id
        field_id: String,
    },

    /// A resolved plug was never added to the reachable item set.
    #[error("Plug {plug} for {method} was not queued")]
    PlugNotQueued {
        /// Full name of the plugged method
        method: String,
        /// Full name of the plug
        plug: String,
    },

    /// A UID was requested for a type that is not part of the reachable item set.
    #[error("Cannot get UID of types which are not queued - {0}")]
    TypeNotQueued(String),

    /// Generic instantiation recursed deeper than allowed.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
