//! The RPN token array
//!
//! A [`FormulaTokenArray`] is the compiled form of a formula: tokens in
//! post-order (operands before operators), directly evaluable against a
//! value stack. The array also carries a cursor used while walking it and
//! the error code of a compile that had to repair or reject input.

use crate::error::{CoreError, ErrorCode, Result};
use crate::token::Token;

/// Maximum number of tokens in one formula.
pub const FORMULA_MAXTOKENS: usize = 8192;

/// Maximum number of jumps of one jump command (`IF`, `CHOOSE`).
pub const FORMULA_MAXJUMPCOUNT: usize = 32;

/// Maximum parser recursion depth. An explicit counter, not the host call
/// stack, enforces this.
pub const MAX_RECURSION: usize = 400;

/// An ordered sequence of tokens in RPN, plus a walk cursor and an error
/// code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormulaTokenArray {
    code: Vec<Token>,
    cursor: usize,
    error: Option<ErrorCode>,
}

impl FormulaTokenArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one token, enforcing the token ceiling.
    pub fn push(&mut self, token: Token) -> Result<()> {
        if self.code.len() >= FORMULA_MAXTOKENS {
            return Err(CoreError::TokenOverflow(FORMULA_MAXTOKENS));
        }
        self.code.push(token);
        Ok(())
    }

    /// Replace the token at `index`, used to patch jump tables once branch
    /// offsets are known.
    pub fn replace(&mut self, index: usize, token: Token) {
        self.code[index] = token;
    }

    /// Drop everything from `len` onward.
    pub fn truncate(&mut self, len: usize) {
        self.code.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.code.get(index)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.code
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.code.iter()
    }

    /// Reset the walk cursor to the first token.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Advance the cursor by one and return the token it passed.
    pub fn next(&mut self) -> Option<&Token> {
        let tok = self.code.get(self.cursor)?;
        self.cursor += 1;
        Some(tok)
    }

    /// Error recorded by the last compile, if any.
    pub fn error(&self) -> Option<ErrorCode> {
        self.error
    }

    /// Record a compile error. The first recorded code wins.
    pub fn set_error(&mut self, code: ErrorCode) {
        if self.error.is_none() {
            self.error = Some(code);
        }
    }

    /// Clear tokens, cursor and error for a fresh compile.
    pub fn clear(&mut self) {
        self.code.clear();
        self.cursor = 0;
        self.error = None;
    }

    /// Opcode-by-opcode, operand-by-operand equality; the walk cursor and
    /// error code do not participate.
    pub fn semantically_equal(&self, other: &FormulaTokenArray) -> bool {
        self.code == other.code
    }
}

impl<'a> IntoIterator for &'a FormulaTokenArray {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.code.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::OpCode;

    #[test]
    fn push_enforces_token_ceiling() {
        let mut arr = FormulaTokenArray::new();
        for _ in 0..FORMULA_MAXTOKENS {
            arr.push(Token::number(1.0)).unwrap();
        }
        let err = arr.push(Token::number(1.0)).unwrap_err();
        assert!(matches!(err, CoreError::TokenOverflow(FORMULA_MAXTOKENS)));
        assert_eq!(arr.len(), FORMULA_MAXTOKENS);
    }

    #[test]
    fn cursor_walk() {
        let mut arr = FormulaTokenArray::new();
        arr.push(Token::number(1.0)).unwrap();
        arr.push(Token::number(2.0)).unwrap();
        arr.push(Token::op(OpCode::Add)).unwrap();

        assert_eq!(arr.next().unwrap().op, OpCode::Push);
        assert_eq!(arr.cursor(), 1);
        arr.rewind();
        assert_eq!(arr.cursor(), 0);
        assert_eq!(arr.iter().count(), 3);
    }

    #[test]
    fn first_error_wins() {
        let mut arr = FormulaTokenArray::new();
        arr.set_error(ErrorCode::Name);
        arr.set_error(ErrorCode::Value);
        assert_eq!(arr.error(), Some(ErrorCode::Name));
        arr.clear();
        assert_eq!(arr.error(), None);
    }

    #[test]
    fn semantic_equality_ignores_cursor() {
        let mut a = FormulaTokenArray::new();
        let mut b = FormulaTokenArray::new();
        a.push(Token::number(1.0)).unwrap();
        b.push(Token::number(1.0)).unwrap();
        a.next();
        // cursor positions differ but token content matches
        assert!(a.semantically_equal(&b));
    }
}
