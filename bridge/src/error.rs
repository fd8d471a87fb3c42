///
/// Bridge error types.
///
/// Every failure the bridge can surface: engine startup, session
/// lifecycle, codec mismatches, result-set bounds, and disposal
/// violations. All of these are contract breaches and propagate to the
/// caller; none are retried. Business outcomes of a procedure (not
/// found, constraint failed) are not errors at all, they travel as
/// status codes on the call outcome.
///

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    #[error("No open database connection")]
    NotOpen,

    #[error("Type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
        context: String,
    },

    #[error("Index out of range: row {row} col {col} in a {rows}x{cols} result set")]
    IndexOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Result set used after dispose")]
    UseAfterDispose,

    #[error("Unknown procedure '{name}'")]
    UnknownProcedure { name: String },

    #[error("Engine error: {message}")]
    Engine { message: String },
}

impl BridgeError {
    /// Shorthand for codec-level mismatches where the found side is a
    /// kind name rather than a formatted value.
    pub fn mismatch(expected: &'static str, found: impl Into<String>, context: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            expected,
            found: found.into(),
            context: context.into(),
        }
    }
}
