//! Formula lexer
//!
//! Splits raw formula text into primitive lexemes, one per call. All
//! grammar-dependent characters come from the opcode map's
//! [`SeparatorSet`]; matrix separators are recognized only inside `{...}`.
//! Whitespace between tokens is discarded, except inside string literals.

use crate::error::{CompileError, Result};
use crate::grammar::{AddressConvention, SeparatorSet};
use crate::opcode_map::OpCodeMap;
use formulac_core::{ErrorCode, OpCode, FORMULA_MAXTOKENS};
use std::sync::Arc;

/// One primitive token as produced by the lexer, before the parser turns
/// it into RPN.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lexeme {
    /// Operator, separator or function name resolved via the opcode map
    Op(OpCode),
    /// Numeric literal
    Number(f64),
    /// String literal (unescaped)
    Str(String),
    /// Unresolved identifier or reference-looking text, original spelling
    Ident(String),
    /// Error constant literal
    ErrorConst(ErrorCode),
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    token_start: usize,
    map: Arc<OpCodeMap>,
    seps: SeparatorSet,
    convention: AddressConvention,
    matrix_depth: u32,
    produced: usize,
    /// Previous lexeme could end a reference operand; Excel grammars spell
    /// intersection as whitespace between two of those.
    after_operand: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, map: Arc<OpCodeMap>, convention: AddressConvention) -> Self {
        let seps = *map.separators();
        Self {
            input,
            pos: 0,
            token_start: 0,
            map,
            seps,
            convention,
            matrix_depth: 0,
            produced: 0,
            after_operand: false,
        }
    }

    /// Source text of the most recently returned lexeme.
    pub fn span(&self) -> &'a str {
        &self.input[self.token_start..self.pos]
    }

    /// Advance by exactly one primitive token; `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Lexeme>> {
        let lexeme = self.scan_token()?;
        self.after_operand = matches!(
            &lexeme,
            Some(Lexeme::Ident(_)) | Some(Lexeme::Op(OpCode::Close))
        );
        Ok(lexeme)
    }

    fn scan_token(&mut self) -> Result<Option<Lexeme>> {
        let ws_start = self.pos;
        self.skip_whitespace();
        self.token_start = self.pos;

        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(None),
        };

        self.produced += 1;
        if self.produced > FORMULA_MAXTOKENS {
            return Err(CompileError::TokenOverflow);
        }

        // Excel grammars spell range intersection as whitespace between
        // two references; the bang is taken by sheet qualification there
        if self.convention == AddressConvention::ExcelA1
            && self.matrix_depth == 0
            && self.after_operand
            && self.pos > ws_start
            && (c.is_alphabetic() || c == '$' || c == '\'' || c == '(')
        {
            self.token_start = ws_start;
            return Ok(Some(Lexeme::Op(OpCode::Intersect)));
        }

        // matrix separators bind only inside braces and take priority over
        // the argument separator there (the column separator may share its
        // character with it)
        if self.matrix_depth > 0 {
            if c == self.seps.array_col {
                self.advance();
                return Ok(Some(Lexeme::Op(OpCode::ArrayColSep)));
            }
            if c == self.seps.array_row {
                self.advance();
                return Ok(Some(Lexeme::Op(OpCode::ArrayRowSep)));
            }
        }
        if c == self.seps.arg {
            self.advance();
            return Ok(Some(Lexeme::Op(OpCode::Sep)));
        }

        match c {
            '+' => return self.single(OpCode::Add),
            '-' => return self.single(OpCode::Subtract),
            '*' => return self.single(OpCode::Multiply),
            '/' => return self.single(OpCode::Divide),
            '^' => return self.single(OpCode::Power),
            '%' => return self.single(OpCode::Percent),
            '&' => return self.single(OpCode::Concat),
            ':' => return self.single(OpCode::Range),
            '~' => return self.single(OpCode::Union),
            '!' => return self.single(OpCode::Intersect),
            '(' => return self.single(OpCode::Open),
            ')' => return self.single(OpCode::Close),
            '{' => {
                self.matrix_depth += 1;
                return self.single(OpCode::ArrayOpen);
            }
            '}' => {
                if self.matrix_depth == 0 {
                    return Err(CompileError::UnexpectedToken("}".into()));
                }
                self.matrix_depth -= 1;
                return self.single(OpCode::ArrayClose);
            }
            '<' => {
                self.advance();
                return Ok(Some(Lexeme::Op(match self.peek_char() {
                    Some('=') => {
                        self.advance();
                        OpCode::LessEqual
                    }
                    Some('>') => {
                        self.advance();
                        OpCode::NotEqual
                    }
                    _ => OpCode::LessThan,
                })));
            }
            '>' => {
                self.advance();
                return Ok(Some(Lexeme::Op(if self.peek_char() == Some('=') {
                    self.advance();
                    OpCode::GreaterEqual
                } else {
                    OpCode::GreaterThan
                })));
            }
            '=' => return self.single(OpCode::Equal),
            _ => {}
        }

        if c == self.seps.string_quote {
            return self.scan_string().map(Some);
        }
        if c == '\'' {
            return self.scan_quoted_sheet_ref().map(Some);
        }
        if c == '#' {
            return self.scan_error_constant().map(Some);
        }
        if c.is_ascii_digit() || (c == self.seps.decimal && self.peek_digit_at(1)) {
            return self.scan_number().map(Some);
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            return self.scan_identifier().map(Some);
        }

        Err(CompileError::IllegalChar(c))
    }

    fn single(&mut self, op: OpCode) -> Result<Option<Lexeme>> {
        self.advance();
        Ok(Some(Lexeme::Op(op)))
    }

    fn scan_string(&mut self) -> Result<Lexeme> {
        let quote = self.seps.string_quote;
        self.advance();
        let mut s = String::new();
        loop {
            match self.peek_char() {
                None => return Err(CompileError::UnterminatedString),
                Some(c) if c == quote => {
                    // doubled quote is an escaped quote
                    if self.peek_char_at(1) == Some(quote) {
                        s.push(quote);
                        self.advance();
                        self.advance();
                    } else {
                        self.advance();
                        return Ok(Lexeme::Str(s));
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
    }

    /// `'Sheet name'` fragment plus the sheet separator and cell part,
    /// scanned as one reference-looking identifier.
    fn scan_quoted_sheet_ref(&mut self) -> Result<Lexeme> {
        let start = self.pos;
        self.advance();
        loop {
            match self.peek_char() {
                None => return Err(CompileError::UnterminatedString),
                Some('\'') => {
                    if self.peek_char_at(1) == Some('\'') {
                        self.advance();
                        self.advance();
                    } else {
                        self.advance();
                        break;
                    }
                }
                Some(_) => self.advance(),
            }
        }
        if self.peek_char() == Some(self.convention.sheet_separator()) {
            self.advance();
            while self.peek_char().is_some_and(|c| self.seps.is_ident_char(c)) {
                self.advance();
            }
        }
        Ok(Lexeme::Ident(self.input[start..self.pos].to_string()))
    }

    fn scan_error_constant(&mut self) -> Result<Lexeme> {
        let start = self.pos;
        self.advance();
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '!' | '?' | '.'))
        {
            self.advance();
        }
        let text = &self.input[start..self.pos];
        match ErrorCode::parse(text) {
            Some(code) => Ok(Lexeme::ErrorConst(code)),
            // unresolved; the parser surfaces it as an unknown name
            None => Ok(Lexeme::Ident(text.to_string())),
        }
    }

    fn scan_number(&mut self) -> Result<Lexeme> {
        let start = self.pos;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek_char() == Some(self.seps.decimal) {
            self.advance();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if self.peek_char().is_some_and(|c| c == 'e' || c == 'E') {
            // consume the exponent only if digits actually follow
            let mark = self.pos;
            self.advance();
            if self.peek_char().is_some_and(|c| c == '+' || c == '-') {
                self.advance();
            }
            if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.pos = mark;
            }
        }
        let text = &self.input[start..self.pos];
        let normalized: String = if self.seps.decimal != '.' {
            text.replace(self.seps.decimal, ".")
        } else {
            text.to_string()
        };
        let value: f64 = normalized
            .parse()
            .map_err(|_| CompileError::UnexpectedToken(text.to_string()))?;
        Ok(Lexeme::Number(value))
    }

    fn scan_identifier(&mut self) -> Result<Lexeme> {
        let start = self.pos;
        while self.peek_char().is_some_and(|c| self.seps.is_ident_char(c)) {
            self.advance();
        }
        // Excel-style sheet qualification: the bang glues the sheet name to
        // the cell part, so it is scanned as one reference token
        if self.convention == AddressConvention::ExcelA1 && self.peek_char() == Some('!') {
            if self.peek_char_at(1).is_some_and(|c| self.seps.is_ident_char(c)) {
                self.advance();
                while self.peek_char().is_some_and(|c| self.seps.is_ident_char(c)) {
                    self.advance();
                }
            }
        }
        let text = &self.input[start..self.pos];

        if let Some(op) = self.map.lookup_ident(text) {
            // A spelling like LOG10 doubles as a cell address; only the
            // following parenthesis makes it a function call. Nullary
            // functions and operators spelled as words stand on their own.
            let callable = op.is_nullary_function()
                || !op.is_function()
                || self.peek_nonspace() == Some('(');
            if callable {
                return Ok(Lexeme::Op(op));
            }
        }
        Ok(Lexeme::Ident(text.to_string()))
    }

    // === Cursor helpers ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn peek_digit_at(&self, offset: usize) -> bool {
        self.peek_char_at(offset).is_some_and(|c| c.is_ascii_digit())
    }

    fn peek_nonspace(&self) -> Option<char> {
        self.input[self.pos..].chars().find(|c| !c.is_whitespace())
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }
}
