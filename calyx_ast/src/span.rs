use serde::{Deserialize, Serialize};

/// Source code span with byte offsets and 1-indexed line/column positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub start_column: usize,
    pub end_column: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        end_line: usize,
        start_column: usize,
        end_column: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            end_line,
            start_column,
            end_column,
        }
    }

    /// A span for compiler-generated nodes with no source position.
    pub fn synthetic() -> Self {
        Self::new(0, 0, 0, 0, 0, 0)
    }

    /// A single-line span starting at `line`:`column`.
    /// Convenient for declaration tables and tests.
    pub fn at(line: usize, column: usize) -> Self {
        Self::new(0, 0, line, line, column, column)
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}
