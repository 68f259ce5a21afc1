use thiserror::Error;

use crate::ir::FunctionId;

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
/// The specialization stage itself never fails: every call site it cannot handle is a filtered
/// "not applicable" outcome (see [`crate::compiler::passes::existential::SiteOutcome`]). Errors are reserved for the
/// infrastructure around the stage, such as module construction and pass execution.
///
/// # Error Categories
///
/// ## Construction Errors
/// - [`Error::Malformed`] - IR handed to a builder or the module is structurally invalid
/// - [`Error::DuplicateFunction`] - A function name is registered twice
///
/// ## Lookup Errors
/// - [`Error::FunctionNotFound`] - A function id does not name a function in the module
///
/// ## Pipeline Errors
/// - [`Error::LockError`] - Thread synchronization failure
///
/// # Examples
///
/// ```rust
/// use exspec::{Error, ir::{FunctionId, Module}};
///
/// let module = Module::new("main");
/// match module.function(FunctionId::new(7)) {
///     Some(function) => println!("found {}", function.name()),
///     None => eprintln!("{}", Error::FunctionNotFound(FunctionId::new(7))),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The IR is structurally invalid.
    ///
    /// Raised by builders and module operations when they are handed IR that
    /// violates a structural rule (e.g. a block id out of range). The error
    /// includes the source location where the malformation was detected.
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

    /// A function with this name already exists in the module.
    #[error("Function '{0}' already exists in the module")]
    DuplicateFunction(String),

    /// Failed to find a function in the module.
    ///
    /// The associated [`FunctionId`] identifies which function was not found.
    #[error("Failed to find function in module - {0}")]
    FunctionNotFound(FunctionId),

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically
    /// when a mutex was poisoned by a panicking pass.
    #[error("Failed to lock target")]
    LockError,
}
