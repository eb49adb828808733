//! Canonical failure taxonomy shared by the engine and its collaborators.
//!
//! Every way a test can go wrong ends up as a [`Failure`]: a kind, a human-readable message, an ordered mapping of
//! structured info (`Expected`, `Actual`, ...) and a stack-like trace string. The engine treats all kinds the same
//! way at run time; the kind only matters for reporting.

use std::any::Any;
use std::fmt;
use std::panic::Location;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

/// Result of a setUp, tearDown, hook or test body.
pub type TestOutcome = Result<(), Failure>;

/// Builtin failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Malformed fixture or test declaration.
    DefinitionError,
    /// Malformed declaration shape (wrong number of arguments).
    TypeError,
    /// Raised by an assertion helper.
    AssertionError,
    /// Anything else raised by user code, including panics.
    UncaughtException,
    /// Lookup of an unregistered name (services, scope values).
    ReferenceError,
    /// Bundler failure (missing or malformed module).
    ScriptError,
}

impl ErrorKind {
    /// Return the canonical display name (`"AssertionError"`, ...).
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DefinitionError => "DefinitionError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::AssertionError => "AssertionError",
            ErrorKind::UncaughtException => "UncaughtException",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::ScriptError => "ScriptError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed step of a test.
///
/// Displays as `Kind: message`. The `stack` always starts with that same line, followed by the source location the
/// failure was raised from when one is known.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    pub info: IndexMap<String, String>,
    pub stack: String,
}

impl Failure {
    /// Create a failure of the given kind, recording the caller's location in the stack.
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let location = Location::caller();
        let stack = format!(
            "{kind}: {message}\n    at {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
        Self {
            kind,
            message,
            info: IndexMap::new(),
            stack,
        }
    }

    /// Create an `AssertionError` failure.
    #[track_caller]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AssertionError, message)
    }

    /// Create an `UncaughtException` failure.
    #[track_caller]
    pub fn uncaught(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UncaughtException, message)
    }

    /// Create a `ReferenceError` failure.
    #[track_caller]
    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReferenceError, message)
    }

    /// Convert a panic payload (as returned by `catch_unwind`) into an `UncaughtException`.
    ///
    /// ## Notes
    ///
    /// - A panic that carries a `Failure` (e.g. `std::panic::panic_any(failure)`) is passed through unchanged.
    /// - Payloads that are neither `&str`, `String` nor `Failure` get a generic message.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<Failure>() {
            Ok(failure) => return *failure,
            Err(other) => other,
        };
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panicked with a non-string payload".to_string()
        };
        let stack = format!("{}: {message}\n    at <panic>", ErrorKind::UncaughtException);
        Self {
            kind: ErrorKind::UncaughtException,
            message,
            info: IndexMap::new(),
            stack,
        }
    }

    /// Attach a structured info entry. Later entries with the same key replace earlier ones.
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    /// Return the first line of the stack (always `Kind: message`).
    pub fn headline(&self) -> &str {
        self.stack.lines().next().unwrap_or("")
    }
}

/// Convert arbitrary errors into test failures so test bodies can use `?` on foreign results.
pub trait ResultExt<T> {
    /// Map the error into an `UncaughtException` carrying its `Display` text.
    fn or_fail(self) -> Result<T, Failure>;
}

impl<T, E: fmt::Display> ResultExt<T> for Result<T, E> {
    #[track_caller]
    fn or_fail(self) -> Result<T, Failure> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(Failure::uncaught(err.to_string())),
        }
    }
}
