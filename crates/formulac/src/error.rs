//! Compiler error types

use formulac_core::{CoreError, ErrorCode, FORMULA_MAXJUMPCOUNT, FORMULA_MAXTOKENS, MAX_RECURSION};
use thiserror::Error;

/// Result type alias using [`CompileError`]
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors raised while compiling or decompiling a formula.
///
/// Lexical and resource-limit errors are always fatal. Syntactic errors are
/// fatal only when the compiler runs with `stop_on_error`; otherwise they
/// are repaired in place with a sentinel token and surface as the error
/// code recorded on the token array.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Character that cannot start or continue any token
    #[error("Illegal character '{0}' in formula")]
    IllegalChar(char),

    /// String literal without a closing quote
    #[error("Unterminated string literal")]
    UnterminatedString,

    /// Matrix literal without a closing brace
    #[error("Unterminated matrix literal")]
    UnterminatedMatrix,

    /// Formula produced more than `FORMULA_MAXTOKENS` tokens
    #[error("Formula exceeds maximum of {FORMULA_MAXTOKENS} tokens")]
    TokenOverflow,

    /// Jump command with too many branches, or jump commands nested too deep
    #[error("Jump command exceeds maximum of {FORMULA_MAXJUMPCOUNT} jumps")]
    JumpOverflow,

    /// Parser recursion exceeded `MAX_RECURSION`
    #[error("Formula nesting exceeds maximum depth of {MAX_RECURSION}")]
    RecursionOverflow,

    /// Token that does not fit the grammar at this position
    #[error("Unexpected '{0}' in formula")]
    UnexpectedToken(String),

    /// Unbalanced parentheses
    #[error("Missing closing parenthesis")]
    MissingClose,

    /// Symbol not found in the opcode map, nor resolvable as a reference,
    /// named expression or add-in function
    #[error("Unknown name: {0}")]
    UnknownName(String),

    /// Function called with an argument count outside its arity
    #[error("Wrong argument count for {function}: accepted {min}..={max}, got {got}")]
    WrongArgCount {
        function: String,
        min: u8,
        max: u8,
        got: u16,
    },

    /// Matrix literal whose rows have unequal lengths
    #[error("Matrix rows have unequal lengths")]
    RaggedMatrix,

    /// Token array that cannot have come out of a successful compile
    #[error("Malformed token array")]
    MalformedRpn,

    /// A host reference hook reported failure
    #[error("Invalid reference: {0}")]
    Reference(String),

    /// Supplied opcode value outside the closed enumeration
    #[error("OpCode value {0} out of range")]
    InvalidOpCode(u16),

    /// Separator set where two separators share a character
    #[error("Separator clash: '{0}' used for both {1} and {2}")]
    SeparatorClash(char, &'static str, &'static str),

    /// Array stack not unwound at the end of a compile
    #[error("Internal error: unbalanced token array stack")]
    UnbalancedArrayStack,

    /// Error bubbled up from the core data model
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CompileError {
    /// The error constant recorded on a token array for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CompileError::UnknownName(_) => ErrorCode::Name,
            CompileError::Reference(_) => ErrorCode::Ref,
            CompileError::UnbalancedArrayStack => ErrorCode::StackImbalance,
            CompileError::Core(CoreError::InvalidAddress(_) | CoreError::InvalidRange(_)) => {
                ErrorCode::Ref
            }
            _ => ErrorCode::Pair,
        }
    }

    /// Whether non-fatal compilation may repair this error with a sentinel
    /// token and continue. Resource-limit errors never are.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CompileError::UnexpectedToken(_)
                | CompileError::MissingClose
                | CompileError::UnknownName(_)
                | CompileError::WrongArgCount { .. }
                | CompileError::Reference(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_never_recoverable() {
        assert!(!CompileError::TokenOverflow.is_recoverable());
        assert!(!CompileError::JumpOverflow.is_recoverable());
        assert!(!CompileError::RecursionOverflow.is_recoverable());
        assert!(CompileError::MissingClose.is_recoverable());
        assert!(CompileError::UnknownName("X".into()).is_recoverable());
    }

    #[test]
    fn error_codes() {
        assert_eq!(
            CompileError::UnknownName("X".into()).error_code(),
            ErrorCode::Name
        );
        assert_eq!(CompileError::MissingClose.error_code(), ErrorCode::Pair);
    }
}
