//! Error types for the particle engine core.
//!
//! Plain enums with manual `Display`/`Error` impls, matching this codebase's
//! established error-handling idiom rather than reaching for a derive-macro
//! error crate.

use std::fmt;

/// All errors the engine can raise, always synchronously at the offending call.
#[derive(Debug)]
pub enum EngineError {
    /// A particle group or action list id was out of range or already deleted.
    BadHandle(String),
    /// A negative radius, negative count, or `NaN` was passed where a finite,
    /// non-negative value was required.
    InvalidValue(String),
    /// The call is not legal in the current recording/execution mode.
    WrongMode(String),
    /// The engine does not implement this action/domain combination.
    NotImplemented(String),
    /// An internal invariant was violated; indicates an engine bug.
    InternalAssertion(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::BadHandle(msg) => write!(f, "bad handle: {msg}"),
            EngineError::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
            EngineError::WrongMode(msg) => write!(f, "wrong mode: {msg}"),
            EngineError::NotImplemented(msg) => write!(f, "not implemented: {msg}"),
            EngineError::InternalAssertion(msg) => write!(f, "internal assertion failed: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = Result<T, EngineError>;
