//! Parser and evaluator errors

use thiserror::Error;
use tracing::error;

use crate::value::Shape;
use crate::registry::VariableKind;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Value handed back alongside a failed scalar lookup.
pub const ERROR_RESULT: f64 = f32::MAX as f64;

/// Value handed back alongside a failed vector lookup.
pub const ERROR_VECTOR: [f64; 3] = [ERROR_RESULT; 3];

/// Parser and evaluator errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("no function has been set")]
    NoFunction,

    /// Grammar violation; `position` indexes characters of the formula as
    /// it was supplied, spaces included.
    #[error("syntax error: {message}; see position {position}")]
    Syntax { message: String, position: usize },

    #[error("type error: {message}")]
    Type { message: String },

    #[error("{operation}: {message}")]
    Domain {
        operation: &'static str,
        message: String,
    },

    #[error("{kind} variable '{name}' does not exist")]
    UnknownVariable { kind: VariableKind, name: String },

    #[error("{kind} variable number {index} does not exist ({count} defined)")]
    VariableIndex {
        kind: VariableKind,
        index: usize,
        count: usize,
    },

    #[error("no valid {expected} result: the function yields a {actual}")]
    ResultShape { expected: Shape, actual: Shape },

    #[error("no valid result: the last evaluation failed")]
    NoResult,
}

impl Error {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    /// Errors that leave the compiled program usable.
    ///
    /// Lookup and domain failures only affect the current request; syntax and
    /// type failures mean there is no program until the formula is fixed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Error::NoFunction | Error::Syntax { .. } | Error::Type { .. }
        )
    }
}

/// Collapse a lookup result into its sentinel value.
///
/// Bulk callers evaluating thousands of records usually want to keep going
/// after a bad record; the error is logged and the sentinel returned.
pub trait OrSentinel {
    type Output;

    fn or_sentinel(self) -> Self::Output;
}

impl OrSentinel for Result<f64> {
    type Output = f64;

    fn or_sentinel(self) -> f64 {
        self.unwrap_or_else(|err| {
            error!(%err, "substituting error sentinel");
            ERROR_RESULT
        })
    }
}

impl OrSentinel for Result<[f64; 3]> {
    type Output = [f64; 3];

    fn or_sentinel(self) -> [f64; 3] {
        self.unwrap_or_else(|err| {
            error!(%err, "substituting error sentinel");
            ERROR_VECTOR
        })
    }
}
