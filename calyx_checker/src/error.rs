//! Checker error model.
//!
//! Errors are value objects carrying `(file, line, message)` plus a kind
//! tag. A raised error unwinds the current declaration through `?` and is
//! caught at the declaration driver, which records it and moves on to the
//! next declaration. Exceeding [`MAX_ERRORS`] aborts the whole check with
//! a synthetic fatal entry.

use calyx_ast::Span;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure budget: past this many recorded errors the checker stops
/// walking declarations entirely.
pub const MAX_ERRORS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckErrorKind {
    TypeMismatch,
    UnknownName,
    DuplicateName,
    MissingRequired,
    RedundantNullCheck,
    RedundantTruth,
    AmbiguousCall,
    AmbiguousField,
    UnreachableCode,
    IllegalShadowing,
    AssignToConst,
    UseBeforeDef,
    BadParameterOrder,
    RecordMasksAnyMethod,
    NotParsable,
    UnsupportedOp,
    /// Synthetic entry recorded when the failure budget is exhausted.
    Fatal,
}

/// A single checker diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{file}:{line}: {message}")]
pub struct CheckError {
    pub kind: CheckErrorKind,
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl CheckError {
    pub fn new(
        kind: CheckErrorKind,
        file: impl Into<String>,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            file: file.into(),
            line: span.start_line,
            message: message.into(),
        }
    }
}

pub type CheckResult<T> = Result<T, CheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_file_and_line() {
        let err = CheckError::new(
            CheckErrorKind::UnknownName,
            "app.cx",
            Span::at(12, 3),
            "Variable 'x' is not defined",
        );
        assert_eq!(err.to_string(), "app.cx:12: Variable 'x' is not defined");
    }
}
