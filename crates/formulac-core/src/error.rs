//! Error types for formulac-core

use std::fmt;
use thiserror::Error;

/// Result type alias using [`CoreError`]
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in formulac-core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid cell address format
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    /// Invalid cell range format
    #[error("Invalid cell range: {0}")]
    InvalidRange(String),

    /// Row index out of bounds
    #[error("Row index {0} out of bounds (max: {1})")]
    RowOutOfBounds(u32, u32),

    /// Column index out of bounds
    #[error("Column index {0} out of bounds (max: {1})")]
    ColumnOutOfBounds(u32, u16),

    /// Token array grew past the hard token ceiling
    #[error("Formula exceeds maximum of {0} tokens")]
    TokenOverflow(usize),
}

/// Spreadsheet error constants (`#VALUE!`, `#REF!`, ...)
///
/// These are the error values a formula can contain as literals and the
/// codes the compiler records on a token array when compilation had to
/// repair or reject a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `#NULL!` - intersection of ranges that do not intersect
    Null,
    /// `#DIV/0!` - division by zero
    Div0,
    /// `#VALUE!` - wrong operand/argument type
    Value,
    /// `#REF!` - invalid reference
    Ref,
    /// `#NAME?` - unresolved name
    Name,
    /// `#NUM!` - invalid numeric value
    Num,
    /// `#N/A` - value not available
    NotAvailable,
    /// Malformed formula; could not be fully parsed
    Pair,
    /// Internal: unbalanced array stack after compilation
    StackImbalance,
}

impl ErrorCode {
    /// Canonical display text of the error constant.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Null => "#NULL!",
            ErrorCode::Div0 => "#DIV/0!",
            ErrorCode::Value => "#VALUE!",
            ErrorCode::Ref => "#REF!",
            ErrorCode::Name => "#NAME?",
            ErrorCode::Num => "#NUM!",
            ErrorCode::NotAvailable => "#N/A",
            ErrorCode::Pair => "#FMT!",
            ErrorCode::StackImbalance => "#FMT!",
        }
    }

    /// Parse an error constant from its display text.
    pub fn parse(s: &str) -> Option<ErrorCode> {
        match s.to_ascii_uppercase().as_str() {
            "#NULL!" => Some(ErrorCode::Null),
            "#DIV/0!" => Some(ErrorCode::Div0),
            "#VALUE!" => Some(ErrorCode::Value),
            "#REF!" => Some(ErrorCode::Ref),
            "#NAME?" => Some(ErrorCode::Name),
            "#NUM!" => Some(ErrorCode::Num),
            "#N/A" => Some(ErrorCode::NotAvailable),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
