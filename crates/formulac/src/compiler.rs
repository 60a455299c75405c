//! Formula compiler
//!
//! [`FormulaCompiler`] turns formula text into an RPN
//! [`FormulaTokenArray`] and back. Parsing is a recursive-descent
//! precedence ladder; each rung compiles its operands first and then
//! appends the operator token, so the output is directly stack-evaluable.
//! The reverse direction lives in [`decompiler`](crate::decompiler) and
//! is reachable through
//! [`create_string_from_token_array`](FormulaCompiler::create_string_from_token_array).
//!
//! Two switches change error behavior: with `stop_on_error` (the
//! default) the first syntactic error aborts the compile; without it the
//! compiler repairs the fragment with a sentinel token, records an error
//! code on the array and keeps going. `auto_correction` additionally
//! accumulates a corrected rendition of the input text.

use crate::error::{CompileError, Result};
use crate::grammar::{AddressConvention, Grammar};
use crate::hooks::{A1Resolver, ReferenceResolver};
use crate::lexer::{Lexeme, Lexer};
use crate::opcode_map::{OpCodeMap, OpCodeMapRegistry};
use formulac_core::{
    ComplexRef, ErrorCode, FormulaTokenArray, Matrix, MatrixValue, OpCode, Payload, Token,
    FORMULA_MAXJUMPCOUNT, MAX_RECURSION,
};
use std::sync::Arc;

/// Compiler for one grammar, holding the shared opcode map and the host's
/// reference resolver.
pub struct FormulaCompiler<R: ReferenceResolver = A1Resolver> {
    registry: Arc<OpCodeMapRegistry>,
    grammar: Grammar,
    map: Arc<OpCodeMap>,
    resolver: R,
    jump_reorder: bool,
    stop_on_error: bool,
    autocorrect: bool,
    corrected: bool,
    corrected_formula: String,
    corrected_symbol: String,
}

impl FormulaCompiler<A1Resolver> {
    /// A compiler with the standalone A1 resolver.
    pub fn new(registry: Arc<OpCodeMapRegistry>, grammar: Grammar) -> Self {
        Self::with_resolver(registry, grammar, A1Resolver)
    }
}

impl<R: ReferenceResolver> FormulaCompiler<R> {
    pub fn with_resolver(registry: Arc<OpCodeMapRegistry>, grammar: Grammar, resolver: R) -> Self {
        let map = registry.get_op_code_map(grammar);
        Self {
            registry,
            grammar,
            map,
            resolver,
            jump_reorder: true,
            stop_on_error: true,
            autocorrect: false,
            corrected: false,
            corrected_formula: String::new(),
            corrected_symbol: String::new(),
        }
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    /// Switch to another grammar; the map comes from the shared registry.
    pub fn set_grammar(&mut self, grammar: Grammar) {
        self.grammar = grammar;
        self.map = self.registry.get_op_code_map(grammar);
    }

    /// Compile against an externally built map (filter-supplied symbols).
    pub fn set_op_code_map(&mut self, map: Arc<OpCodeMap>) {
        self.grammar = map.grammar();
        self.map = map;
    }

    pub fn op_code_map(&self) -> &Arc<OpCodeMap> {
        &self.map
    }

    /// With reorder on (the default), `IF`/`CHOOSE` compile to a jump
    /// token whose branch offsets are patched in after the branches;
    /// without it they compile like ordinary functions.
    pub fn enable_jump_command_reorder(&mut self, on: bool) {
        self.jump_reorder = on;
    }

    /// With stop-on-error off, syntactic errors are repaired with
    /// sentinel tokens instead of aborting the compile.
    pub fn enable_stop_on_error(&mut self, on: bool) {
        self.stop_on_error = on;
    }

    /// Accumulate a corrected rendition of the input while repairing.
    pub fn set_auto_correction(&mut self, on: bool) {
        self.autocorrect = on;
    }

    /// Whether the last compile had to repair anything.
    pub fn is_corrected(&self) -> bool {
        self.corrected
    }

    /// Corrected rendition of the last compiled formula, without the
    /// leading `=`. Empty unless auto-correction is on.
    pub fn corrected_formula(&self) -> &str {
        &self.corrected_formula
    }

    /// The first unresolvable symbol of the last compile.
    pub fn corrected_symbol(&self) -> &str {
        &self.corrected_symbol
    }

    /// Look up a function name in the English map regardless of the
    /// compiler's own grammar.
    pub fn get_english_op_code(&self, name: &str) -> Option<OpCode> {
        self.registry
            .get_op_code_map(Grammar::ENGLISH)
            .lookup_ident(name)
    }

    /// Compile `formula` into a fresh token array.
    pub fn compile(&mut self, formula: &str) -> Result<FormulaTokenArray> {
        let mut arr = FormulaTokenArray::new();
        self.compile_token_array(formula, &mut arr)?;
        Ok(arr)
    }

    /// Compile `formula` into `arr`, replacing its previous content.
    ///
    /// `Ok(true)` means a clean compile; `Ok(false)` means the input had
    /// errors that were repaired in place (the array carries the error
    /// code). A fatal error leaves the error code on the array and
    /// returns `Err`.
    pub fn compile_token_array(
        &mut self,
        formula: &str,
        arr: &mut FormulaTokenArray,
    ) -> Result<bool> {
        arr.clear();
        self.corrected = false;
        self.corrected_formula.clear();
        self.corrected_symbol.clear();

        let src = formula.trim();
        let src = src.strip_prefix('=').unwrap_or(src);

        let mut parser = Parser {
            lexer: Lexer::new(src, Arc::clone(&self.map), self.grammar.convention),
            map: Arc::clone(&self.map),
            convention: self.grammar.convention,
            resolver: &mut self.resolver,
            out: arr,
            stack: Vec::new(),
            cur: None,
            cur_text: String::new(),
            last_op: OpCode::Push,
            depth: 0,
            jump_depth: 0,
            jump_reorder: self.jump_reorder,
            stop_on_error: self.stop_on_error,
            autocorrect: self.autocorrect,
            corrected: false,
            corrected_formula: String::new(),
            corrected_symbol: String::new(),
            repaired: false,
        };

        let outcome = parser.run();
        let repaired = parser.repaired;
        self.corrected = parser.corrected;
        self.corrected_formula = std::mem::take(&mut parser.corrected_formula);
        self.corrected_symbol = std::mem::take(&mut parser.corrected_symbol);
        drop(parser);

        match outcome {
            Ok(()) => Ok(!repaired),
            Err(err) => {
                arr.set_error(err.error_code());
                Err(err)
            }
        }
    }

    /// Render a compiled token array back into formula text in this
    /// compiler's grammar.
    pub fn create_string_from_token_array(&self, arr: &FormulaTokenArray) -> Result<String> {
        crate::decompiler::render(&self.map, self.grammar.convention, &self.resolver, arr)
    }
}

/// A named-expression body suspended on the array stack while its tokens
/// are replayed into the current output.
struct ArrayFrame {
    body: FormulaTokenArray,
    temporary: bool,
}

/// One compile session. Borrows the output array and the resolver for the
/// duration of the parse.
struct Parser<'s, 'c, R: ReferenceResolver> {
    lexer: Lexer<'s>,
    map: Arc<OpCodeMap>,
    convention: AddressConvention,
    resolver: &'c mut R,
    out: &'c mut FormulaTokenArray,
    stack: Vec<ArrayFrame>,
    cur: Option<Lexeme>,
    cur_text: String,
    last_op: OpCode,
    depth: usize,
    jump_depth: usize,
    jump_reorder: bool,
    stop_on_error: bool,
    autocorrect: bool,
    corrected: bool,
    corrected_formula: String,
    corrected_symbol: String,
    repaired: bool,
}

impl<R: ReferenceResolver> Parser<'_, '_, R> {
    fn run(&mut self) -> Result<()> {
        self.bump()?;
        if self.cur.is_none() {
            // an empty formula compiles to an empty array
            return Ok(());
        }
        self.expression()?;
        while self.cur.is_some() {
            let text = self.cur_text.clone();
            self.err_or_repair(CompileError::UnexpectedToken(text))?;
            self.bump()?;
        }
        if !self.stack.is_empty() {
            return Err(CompileError::UnbalancedArrayStack);
        }
        Ok(())
    }

    /// Consume the current lexeme and scan the next one.
    fn bump(&mut self) -> Result<()> {
        if self.cur.is_some() && self.autocorrect {
            self.corrected_formula.push_str(&self.cur_text);
        }
        self.cur = self.lexer.next_token()?;
        self.cur_text = self.lexer.span().to_string();
        Ok(())
    }

    fn at(&self, op: OpCode) -> bool {
        matches!(self.cur, Some(Lexeme::Op(o)) if o == op)
    }

    fn binary_op(&self, ops: &[OpCode]) -> Option<OpCode> {
        match self.cur {
            Some(Lexeme::Op(op)) if ops.contains(&op) => Some(op),
            _ => None,
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_RECURSION {
            return Err(CompileError::RecursionOverflow);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn put_code(&mut self, token: Token) -> Result<()> {
        self.last_op = token.op;
        self.out
            .push(token)
            .map_err(|_| CompileError::TokenOverflow)
    }

    /// Abort on `err`, or repair: record the error code on the array and
    /// keep parsing. Callers push the sentinel token themselves where one
    /// is needed.
    fn err_or_repair(&mut self, err: CompileError) -> Result<()> {
        if self.stop_on_error || !err.is_recoverable() {
            return Err(err);
        }
        self.repaired = true;
        self.corrected = true;
        self.out.set_error(err.error_code());
        log::debug!("repaired: {err}");
        Ok(())
    }

    fn record_symbol(&mut self, text: &str) {
        if self.corrected_symbol.is_empty() {
            self.corrected_symbol = text.to_owned();
        }
    }

    /// A closing parenthesis that is not there. The corrected formula
    /// gets one appended.
    fn repair_missing_close(&mut self) -> Result<()> {
        if self.stop_on_error {
            return Err(CompileError::MissingClose);
        }
        self.repaired = true;
        self.corrected = true;
        self.out.set_error(ErrorCode::Pair);
        if self.autocorrect {
            self.corrected_formula.push(')');
        }
        log::debug!("repaired missing closing parenthesis");
        Ok(())
    }

    // === The precedence ladder, loosest binding first ===

    fn expression(&mut self) -> Result<()> {
        self.enter()?;
        let r = self.not_line();
        self.leave();
        r
    }

    fn not_line(&mut self) -> Result<()> {
        if self.at(OpCode::Not) {
            self.bump()?;
            self.enter()?;
            let r = self.not_line();
            self.leave();
            r?;
            return self.put_code(Token::function(OpCode::Not, 1));
        }
        self.compare_line()
    }

    fn compare_line(&mut self) -> Result<()> {
        self.concat_line()?;
        while let Some(op) = self.binary_op(&[
            OpCode::Equal,
            OpCode::NotEqual,
            OpCode::LessThan,
            OpCode::LessEqual,
            OpCode::GreaterThan,
            OpCode::GreaterEqual,
        ]) {
            self.bump()?;
            self.concat_line()?;
            self.put_code(Token::op(op))?;
        }
        Ok(())
    }

    fn concat_line(&mut self) -> Result<()> {
        self.add_sub_line()?;
        while self.at(OpCode::Concat) {
            self.bump()?;
            self.add_sub_line()?;
            self.put_code(Token::op(OpCode::Concat))?;
        }
        Ok(())
    }

    fn add_sub_line(&mut self) -> Result<()> {
        self.mul_div_line()?;
        while let Some(op) = self.binary_op(&[OpCode::Add, OpCode::Subtract]) {
            self.bump()?;
            self.mul_div_line()?;
            self.put_code(Token::op(op))?;
        }
        Ok(())
    }

    fn mul_div_line(&mut self) -> Result<()> {
        self.pow_line()?;
        while let Some(op) = self.binary_op(&[OpCode::Multiply, OpCode::Divide]) {
            self.bump()?;
            self.pow_line()?;
            self.put_code(Token::op(op))?;
        }
        Ok(())
    }

    fn pow_line(&mut self) -> Result<()> {
        self.post_op_line()?;
        while self.at(OpCode::Power) {
            self.bump()?;
            self.post_op_line()?;
            self.put_code(Token::op(OpCode::Power))?;
        }
        Ok(())
    }

    fn post_op_line(&mut self) -> Result<()> {
        self.unary_line()?;
        while self.at(OpCode::Percent) {
            self.bump()?;
            self.put_code(Token::op(OpCode::Percent))?;
        }
        Ok(())
    }

    fn unary_line(&mut self) -> Result<()> {
        if self.at(OpCode::Subtract) {
            self.bump()?;
            self.enter()?;
            let r = self.unary_line();
            self.leave();
            r?;
            return self.put_code(Token::op(OpCode::Negate));
        }
        if self.at(OpCode::Add) {
            // unary plus is accepted and dropped
            self.bump()?;
            self.enter()?;
            let r = self.unary_line();
            self.leave();
            return r;
        }
        self.intersection_line()
    }

    fn intersection_line(&mut self) -> Result<()> {
        self.union_line()?;
        while self.at(OpCode::Intersect) {
            self.bump()?;
            self.union_line()?;
            self.put_code(Token::op(OpCode::Intersect))?;
        }
        Ok(())
    }

    fn union_line(&mut self) -> Result<()> {
        self.range_line()?;
        while self.at(OpCode::Union) {
            self.bump()?;
            self.range_line()?;
            self.put_code(Token::op(OpCode::Union))?;
        }
        Ok(())
    }

    fn range_line(&mut self) -> Result<()> {
        self.factor()?;
        while self.at(OpCode::Range) {
            self.bump()?;
            self.factor()?;
            if !self.merge_range_reference()? {
                self.put_code(Token::op(OpCode::Range))?;
            }
        }
        Ok(())
    }

    /// Fold `ref:ref` into one range push so `A1:B2` is a single operand
    /// rather than a binary operation. Adjacent range pushes widen the
    /// existing range.
    fn merge_range_reference(&mut self) -> Result<bool> {
        if self.last_op != OpCode::Push {
            return Ok(false);
        }
        let n = self.out.len();
        if n < 2 {
            return Ok(false);
        }
        let (a, b) = match (self.out.get(n - 2), self.out.get(n - 1)) {
            (Some(a), Some(b)) if a.is_push() && b.is_push() => (a.clone(), b.clone()),
            _ => return Ok(false),
        };
        let merged = match (a.payload, b.payload) {
            (Payload::SingleRef(start), Payload::SingleRef(end)) => {
                let mut r = ComplexRef::from_corners(start, end);
                r.reuse = true;
                r
            }
            (Payload::DoubleRef(mut r), Payload::SingleRef(end)) => {
                r.extend(&end);
                r
            }
            (Payload::SingleRef(start), Payload::DoubleRef(mut r)) => {
                r.extend(&start);
                r
            }
            (Payload::DoubleRef(mut r), Payload::DoubleRef(other)) => {
                r.extend(&other.start);
                r.extend(&other.end);
                r
            }
            _ => return Ok(false),
        };
        self.out.truncate(n - 2);
        self.put_code(Token::double_ref(merged))?;
        Ok(true)
    }

    fn factor(&mut self) -> Result<()> {
        let Some(lexeme) = self.cur.clone() else {
            self.err_or_repair(CompileError::UnexpectedToken("end of formula".into()))?;
            return self.put_code(Token::bad(""));
        };
        match lexeme {
            Lexeme::Number(value) => {
                self.bump()?;
                self.put_code(Token::number(value))
            }
            Lexeme::Str(s) => {
                self.bump()?;
                self.put_code(Token::string(s))
            }
            Lexeme::ErrorConst(code) => {
                self.bump()?;
                self.put_code(Token::error(code))
            }
            Lexeme::Ident(name) => self.ident(name),
            Lexeme::Op(OpCode::Open) => {
                self.bump()?;
                self.expression()?;
                self.expect_close()
            }
            Lexeme::Op(OpCode::ArrayOpen) => self.matrix_literal(),
            Lexeme::Op(OpCode::Not) => {
                // NOT used function-style inside a tighter expression
                self.bump()?;
                if self.at(OpCode::Open) {
                    self.bump()?;
                    self.expression()?;
                    self.expect_close()?;
                    self.put_code(Token::function(OpCode::Not, 1))
                } else {
                    let text = self.cur_text.clone();
                    self.err_or_repair(CompileError::UnexpectedToken(text))?;
                    self.put_code(Token::bad(self.map.symbol(OpCode::Not).to_owned()))
                }
            }
            Lexeme::Op(op) if op.is_jump_command() && self.jump_reorder => self.jump_command(op),
            Lexeme::Op(op) if op.is_function() => self.function_call(op),
            Lexeme::Op(_) => {
                let text = self.cur_text.clone();
                self.bump()?;
                self.record_symbol(&text);
                self.err_or_repair(CompileError::UnexpectedToken(text.clone()))?;
                self.put_code(Token::bad(text))
            }
        }
    }

    fn expect_close(&mut self) -> Result<()> {
        if self.at(OpCode::Close) {
            self.bump()
        } else if self.cur.is_none() {
            self.repair_missing_close()
        } else {
            let text = self.cur_text.clone();
            // leave the stray token for the enclosing context
            self.err_or_repair(CompileError::UnexpectedToken(text))
        }
    }

    fn function_call(&mut self, op: OpCode) -> Result<()> {
        let symbol = self.map.symbol(op).to_owned();
        self.bump()?;
        if op.is_nullary_function() && !self.at(OpCode::Open) {
            return self.put_code(Token::op(op));
        }
        if !self.at(OpCode::Open) {
            let text = self.cur_text.clone();
            self.err_or_repair(CompileError::UnexpectedToken(text))?;
            return self.put_code(Token::bad(symbol));
        }
        self.bump()?;
        let argc = self.parse_arg_list()?;
        let (min, max) = op.arity();
        if argc < min as u16 || argc > max as u16 {
            self.err_or_repair(CompileError::WrongArgCount {
                function: symbol,
                min,
                max,
                got: argc,
            })?;
        }
        self.put_code(Token::function(op, argc.min(u8::MAX as u16) as u8))
    }

    /// Parse `arg (sep arg)* close` after the opening parenthesis was
    /// consumed. Omitted arguments become `Missing` tokens; a missing
    /// closing parenthesis at end of input is repairable. Callers enforce
    /// the arity bound; a count past `u8::MAX` never fits any function.
    fn parse_arg_list(&mut self) -> Result<u16> {
        let mut argc: u16 = 0;
        let mut expect_arg = true;
        loop {
            if self.at(OpCode::Close) {
                if expect_arg && argc > 0 {
                    self.put_code(Token::missing())?;
                    argc += 1;
                }
                self.bump()?;
                break;
            }
            if self.at(OpCode::Sep) {
                if expect_arg {
                    self.put_code(Token::missing())?;
                    argc += 1;
                }
                self.bump()?;
                expect_arg = true;
                continue;
            }
            if self.cur.is_none() {
                if expect_arg && argc > 0 {
                    self.put_code(Token::missing())?;
                    argc += 1;
                }
                self.repair_missing_close()?;
                break;
            }
            if !expect_arg {
                let text = self.cur_text.clone();
                self.err_or_repair(CompileError::UnexpectedToken(text))?;
                self.bump()?;
                continue;
            }
            self.expression()?;
            argc += 1;
            expect_arg = false;
        }
        Ok(argc)
    }

    /// Compile `IF`/`CHOOSE` with branch reordering: condition first, then
    /// a jump token whose offset table is patched once the branch end
    /// positions are known.
    fn jump_command(&mut self, op: OpCode) -> Result<()> {
        let symbol = self.map.symbol(op).to_owned();
        self.bump()?;
        if !self.at(OpCode::Open) {
            let text = self.cur_text.clone();
            self.err_or_repair(CompileError::UnexpectedToken(text))?;
            return self.put_code(Token::bad(symbol));
        }
        self.bump()?;
        self.jump_depth += 1;
        if self.jump_depth > FORMULA_MAXJUMPCOUNT {
            self.jump_depth -= 1;
            return Err(CompileError::JumpOverflow);
        }
        let result = self.jump_body(op, symbol);
        self.jump_depth -= 1;
        result
    }

    fn jump_body(&mut self, op: OpCode, symbol: String) -> Result<()> {
        // condition (IF) or selector (CHOOSE)
        self.expression()?;
        let jump_pos = self.out.len();
        self.put_code(Token {
            op,
            payload: Payload::Jump(Vec::new()),
        })?;

        let mut offsets: Vec<u16> = Vec::new();
        loop {
            if self.at(OpCode::Close) {
                self.bump()?;
                break;
            }
            if self.at(OpCode::Sep) {
                self.bump()?;
                if offsets.len() + 1 >= FORMULA_MAXJUMPCOUNT {
                    return Err(CompileError::JumpOverflow);
                }
                if self.at(OpCode::Sep) || self.at(OpCode::Close) || self.cur.is_none() {
                    self.put_code(Token::missing())?;
                } else {
                    self.expression()?;
                }
                offsets.push(self.out.len() as u16);
                continue;
            }
            if self.cur.is_none() {
                self.repair_missing_close()?;
                // close the construct at the current end
                if let Some(last) = offsets.last_mut() {
                    *last = self.out.len() as u16;
                }
                break;
            }
            let text = self.cur_text.clone();
            self.err_or_repair(CompileError::UnexpectedToken(text))?;
            self.bump()?;
        }

        let argc = offsets.len() + 1;
        let (min, max) = op.arity();
        if argc < min as usize || argc > max as usize {
            self.err_or_repair(CompileError::WrongArgCount {
                function: symbol,
                min,
                max,
                got: argc as u16,
            })?;
        }
        self.out.replace(
            jump_pos,
            Token {
                op,
                payload: Payload::Jump(offsets),
            },
        );
        Ok(())
    }

    fn matrix_literal(&mut self) -> Result<()> {
        self.bump()?;
        let mut rows: Vec<Vec<MatrixValue>> = Vec::new();
        let mut current: Vec<MatrixValue> = Vec::new();
        loop {
            let Some(lexeme) = self.cur.clone() else {
                return Err(CompileError::UnterminatedMatrix);
            };
            match lexeme {
                Lexeme::Op(OpCode::ArrayClose) => {
                    self.bump()?;
                    break;
                }
                Lexeme::Op(OpCode::ArrayColSep) => self.bump()?,
                Lexeme::Op(OpCode::ArrayRowSep) => {
                    self.bump()?;
                    rows.push(std::mem::take(&mut current));
                }
                Lexeme::Number(v) => {
                    self.bump()?;
                    current.push(MatrixValue::Double(v));
                }
                Lexeme::Op(OpCode::Subtract) => {
                    self.bump()?;
                    match self.cur {
                        Some(Lexeme::Number(v)) => {
                            self.bump()?;
                            current.push(MatrixValue::Double(-v));
                        }
                        _ => {
                            let text = self.cur_text.clone();
                            self.err_or_repair(CompileError::UnexpectedToken(text))?;
                        }
                    }
                }
                Lexeme::Str(s) => {
                    self.bump()?;
                    current.push(MatrixValue::Str(s));
                }
                Lexeme::Op(OpCode::True) => {
                    self.bump()?;
                    current.push(MatrixValue::Bool(true));
                }
                Lexeme::Op(OpCode::False) => {
                    self.bump()?;
                    current.push(MatrixValue::Bool(false));
                }
                Lexeme::ErrorConst(code) => {
                    self.bump()?;
                    current.push(MatrixValue::Error(code));
                }
                _ => {
                    let text = self.cur_text.clone();
                    self.err_or_repair(CompileError::UnexpectedToken(text))?;
                    self.bump()?;
                }
            }
        }
        rows.push(current);
        if rows.len() == 1 && rows[0].is_empty() {
            self.err_or_repair(CompileError::UnexpectedToken("{}".into()))?;
            return self.put_code(Token::bad("{}"));
        }
        match Matrix::from_rows(rows) {
            Some(m) => self.put_code(Token::matrix(m)),
            None => Err(CompileError::RaggedMatrix),
        }
    }

    /// Resolve an identifier via the host hooks: single reference, range,
    /// named token array, add-in function, in that order.
    fn ident(&mut self, name: String) -> Result<()> {
        if let Some(r) = self.resolver.handle_single_ref(&name, self.convention) {
            self.bump()?;
            return self.put_code(Token::single_ref(r));
        }
        if let Some(r) = self.resolver.handle_range(&name, self.convention) {
            self.bump()?;
            return self.put_code(Token::double_ref(r));
        }
        if let Some(body) = self.resolver.handle_db_data(&name) {
            self.bump()?;
            return self.expand_token_array(body, true);
        }
        let upper = name.to_uppercase();
        let local_first = !self.map.is_english();
        if let Some(prog) = self.resolver.find_add_in_function(&upper, local_first) {
            return self.external_call(name, prog);
        }
        self.bump()?;
        self.record_symbol(&name);
        self.err_or_repair(CompileError::UnknownName(name.clone()))?;
        self.put_code(Token::bad(name))
    }

    fn external_call(&mut self, display: String, programmatic: String) -> Result<()> {
        self.bump()?;
        if !self.at(OpCode::Open) {
            let text = self.cur_text.clone();
            self.err_or_repair(CompileError::UnexpectedToken(text))?;
            return self.put_code(Token::bad(display));
        }
        self.bump()?;
        let argc = self.parse_arg_list()?;
        if argc > u8::MAX as u16 {
            self.record_symbol(&display);
            self.err_or_repair(CompileError::WrongArgCount {
                function: display.clone(),
                min: 0,
                max: u8::MAX,
                got: argc,
            })?;
        }
        let token = Token {
            op: OpCode::External,
            payload: Payload::External {
                name: programmatic,
                argc: argc.min(u8::MAX as u16) as u8,
            },
        };
        if !self.resolver.handle_external_reference(&token) {
            self.record_symbol(&display);
            self.err_or_repair(CompileError::Reference(display.clone()))?;
            return self.put_code(Token::bad(display));
        }
        self.put_code(token)
    }

    /// Replay a stored token array (named expression body) into the
    /// output, keeping it on the array stack for the duration so nesting
    /// imbalances are detectable. The frame is popped even when a token
    /// fails to append, so a failed compile leaves the stack unwound.
    fn expand_token_array(&mut self, body: FormulaTokenArray, temporary: bool) -> Result<()> {
        self.stack.push(ArrayFrame { body, temporary });
        let frame_idx = self.stack.len() - 1;
        let len = self.stack[frame_idx].body.len();
        let mut result = Ok(());
        for i in 0..len {
            let token = match self.stack[frame_idx].body.get(i) {
                Some(t) => t.clone(),
                None => break,
            };
            if let Err(err) = self.put_code(token) {
                result = Err(err);
                break;
            }
        }
        let frame = self
            .stack
            .pop()
            .ok_or(CompileError::UnbalancedArrayStack)?;
        if frame.temporary {
            log::trace!("dropped temporary token array after expansion");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formulac_core::FORMULA_MAXTOKENS;
    use pretty_assertions::assert_eq;

    fn compiler() -> FormulaCompiler {
        FormulaCompiler::new(Arc::new(OpCodeMapRegistry::new()), Grammar::ENGLISH)
    }

    fn compile(formula: &str) -> FormulaTokenArray {
        compiler().compile(formula).unwrap()
    }

    fn ops(arr: &FormulaTokenArray) -> Vec<OpCode> {
        arr.iter().map(|t| t.op).collect()
    }

    #[test]
    fn rpn_is_post_order() {
        let arr = compile("1+2*3");
        assert_eq!(
            ops(&arr),
            vec![
                OpCode::Push,
                OpCode::Push,
                OpCode::Push,
                OpCode::Multiply,
                OpCode::Add,
            ]
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let arr = compile("(1+2)*3");
        assert_eq!(
            ops(&arr),
            vec![
                OpCode::Push,
                OpCode::Push,
                OpCode::Add,
                OpCode::Push,
                OpCode::Multiply,
            ]
        );
    }

    #[test]
    fn leading_equals_is_stripped() {
        assert!(compile("=1+2").semantically_equal(&compile("1+2")));
    }

    #[test]
    fn unary_minus_binds_tighter_than_power() {
        let arr = compile("-2^2");
        assert_eq!(
            ops(&arr),
            vec![OpCode::Push, OpCode::Negate, OpCode::Push, OpCode::Power]
        );
    }

    #[test]
    fn power_is_left_associative() {
        let arr = compile("2^3^4");
        assert_eq!(
            ops(&arr),
            vec![
                OpCode::Push,
                OpCode::Push,
                OpCode::Power,
                OpCode::Push,
                OpCode::Power,
            ]
        );
    }

    #[test]
    fn percent_is_postfix() {
        let arr = compile("50%");
        assert_eq!(ops(&arr), vec![OpCode::Push, OpCode::Percent]);
    }

    #[test]
    fn range_merges_into_one_push() {
        let arr = compile("A1:B2");
        assert_eq!(arr.len(), 1);
        let r = arr.get(0).unwrap().as_double_ref().unwrap();
        assert!(r.reuse);
        assert_eq!(r.to_a1(), "A1:B2");
    }

    #[test]
    fn chained_range_widens() {
        let arr = compile("A1:B2:C3");
        assert_eq!(arr.len(), 1);
        let r = arr.get(0).unwrap().as_double_ref().unwrap();
        assert_eq!(r.to_a1(), "A1:C3");
    }

    #[test]
    fn union_and_intersection_stay_binary() {
        let arr = compile("A1:A3~B1:B3");
        assert_eq!(ops(&arr), vec![OpCode::Push, OpCode::Push, OpCode::Union]);
        let arr = compile("A1:A3!A2:B2");
        assert_eq!(
            ops(&arr),
            vec![OpCode::Push, OpCode::Push, OpCode::Intersect]
        );
    }

    #[test]
    fn function_argc_is_counted() {
        let arr = compile("SUM(A1:B2;3;4)");
        let last = arr.get(arr.len() - 1).unwrap();
        assert_eq!(last.op, OpCode::Sum);
        assert_eq!(last.argc(), 3);
    }

    #[test]
    fn omitted_arguments_become_missing_tokens() {
        let arr = compile("ROUND(1;)");
        assert_eq!(
            ops(&arr),
            vec![OpCode::Push, OpCode::Missing, OpCode::Round]
        );
        assert_eq!(arr.get(2).unwrap().argc(), 2);

        // omitted jump branch: the missing token sits in the branch slot
        let arr = compile("CHOOSE(1;;2)");
        assert_eq!(
            ops(&arr),
            vec![OpCode::Push, OpCode::Choose, OpCode::Missing, OpCode::Push]
        );
    }

    #[test]
    fn nullary_functions() {
        let arr = compile("PI()");
        assert_eq!(arr.len(), 1);
        assert_eq!(arr.get(0).unwrap().payload, Payload::Byte(0));
        let arr = compile("TRUE");
        assert_eq!(arr.get(0).unwrap().payload, Payload::None);
    }

    #[test]
    fn not_compiles_loosest() {
        let arr = compile("NOT A1>0");
        assert_eq!(
            ops(&arr),
            vec![OpCode::Push, OpCode::Push, OpCode::GreaterThan, OpCode::Not]
        );
        // and still works function-style inside an expression
        let arr = compile("1+NOT(0)");
        assert_eq!(
            ops(&arr),
            vec![OpCode::Push, OpCode::Push, OpCode::Not, OpCode::Add]
        );
    }

    #[test]
    fn jump_command_offsets() {
        let arr = compile("IF(A1;1;2)");
        // condition, jump, then branch, else branch
        assert_eq!(
            ops(&arr),
            vec![OpCode::Push, OpCode::If, OpCode::Push, OpCode::Push]
        );
        match &arr.get(1).unwrap().payload {
            Payload::Jump(offsets) => assert_eq!(offsets, &vec![3, 4]),
            other => panic!("expected jump payload, got {:?}", other),
        }
    }

    #[test]
    fn jump_branches_may_be_whole_expressions() {
        let arr = compile("IF(A1>0;SUM(1;2);3*4)");
        match &arr.get(3).unwrap().payload {
            Payload::Jump(offsets) => {
                assert_eq!(offsets.len(), 2);
                assert_eq!(*offsets.last().unwrap() as usize, arr.len());
            }
            other => panic!("expected jump payload, got {:?}", other),
        }
    }

    #[test]
    fn jump_reorder_can_be_disabled() {
        let mut c = compiler();
        c.enable_jump_command_reorder(false);
        let arr = c.compile("IF(A1;1;2)").unwrap();
        // ordinary function shape: all arguments precede the opcode
        assert_eq!(
            ops(&arr),
            vec![OpCode::Push, OpCode::Push, OpCode::Push, OpCode::If]
        );
        assert_eq!(arr.get(3).unwrap().argc(), 3);
    }

    #[test]
    fn nested_jump_depth_is_bounded() {
        let mut formula = String::new();
        for _ in 0..FORMULA_MAXJUMPCOUNT + 1 {
            formula.push_str("IF(1;");
        }
        formula.push('1');
        let err = compiler().compile(&formula).unwrap_err();
        assert!(matches!(err, CompileError::JumpOverflow));
    }

    #[test]
    fn recursion_depth_is_bounded() {
        let formula = "(".repeat(MAX_RECURSION + 1);
        let err = compiler().compile(&formula).unwrap_err();
        assert!(matches!(err, CompileError::RecursionOverflow));
    }

    #[test]
    fn token_ceiling_is_fatal() {
        let mut formula = String::from("1");
        for _ in 0..FORMULA_MAXTOKENS / 2 {
            formula.push_str("+1");
        }
        let err = compiler().compile(&formula).unwrap_err();
        assert!(matches!(err, CompileError::TokenOverflow));
    }

    #[test]
    fn matrix_literal_payload() {
        let arr = compile("{1;2|3;-4}");
        assert_eq!(arr.len(), 1);
        match &arr.get(0).unwrap().payload {
            Payload::Matrix(m) => {
                assert_eq!((m.rows, m.cols), (2, 2));
                assert_eq!(m.row(1)[1], MatrixValue::Double(-4.0));
            }
            other => panic!("expected matrix payload, got {:?}", other),
        }
    }

    #[test]
    fn ragged_matrix_is_rejected() {
        let err = compiler().compile("{1;2|3}").unwrap_err();
        assert!(matches!(err, CompileError::RaggedMatrix));
    }

    #[test]
    fn stop_on_error_aborts_at_unknown_name() {
        let err = compiler().compile("FOO+1").unwrap_err();
        assert!(matches!(err, CompileError::UnknownName(name) if name == "FOO"));
    }

    #[test]
    fn repair_mode_substitutes_bad_tokens() {
        let mut c = compiler();
        c.enable_stop_on_error(false);
        let mut arr = FormulaTokenArray::new();
        let clean = c.compile_token_array("FOO+1", &mut arr).unwrap();
        assert!(!clean);
        assert_eq!(arr.error(), Some(ErrorCode::Name));
        assert_eq!(arr.get(0).unwrap().op, OpCode::Bad);
        assert_eq!(c.corrected_symbol(), "FOO");
        // the repaired array still has an operator with two operands
        assert_eq!(ops(&arr), vec![OpCode::Bad, OpCode::Push, OpCode::Add]);
    }

    #[test]
    fn auto_correction_appends_missing_close() {
        let mut c = compiler();
        c.enable_stop_on_error(false);
        c.set_auto_correction(true);
        let mut arr = FormulaTokenArray::new();
        let clean = c.compile_token_array("=SUM(1;2", &mut arr).unwrap();
        assert!(!clean);
        assert!(c.is_corrected());
        assert_eq!(c.corrected_formula(), "SUM(1;2)");
        assert_eq!(arr.error(), Some(ErrorCode::Pair));
    }

    #[test]
    fn wrong_arg_count_is_reported() {
        let err = compiler().compile("MOD(1)").unwrap_err();
        match err {
            CompileError::WrongArgCount {
                function,
                min,
                max,
                got,
            } => {
                assert_eq!(function, "MOD");
                assert_eq!((min, max, got), (2, 2, 1));
            }
            other => panic!("expected WrongArgCount, got {:?}", other),
        }
    }

    #[test]
    fn argument_count_past_byte_range_is_rejected() {
        let mut formula = String::from("SUM(1");
        for _ in 0..299 {
            formula.push_str(";1");
        }
        formula.push(')');
        let err = compiler().compile(&formula).unwrap_err();
        match err {
            CompileError::WrongArgCount {
                function, max, got, ..
            } => {
                assert_eq!(function, "SUM");
                assert_eq!((max, got), (255, 300));
            }
            other => panic!("expected WrongArgCount, got {:?}", other),
        }
    }

    #[test]
    fn grammar_changes_argument_separator_not_semantics() {
        let semicolon = compile("SUM(1;2)");
        let mut c = FormulaCompiler::new(Arc::new(OpCodeMapRegistry::new()), Grammar::OOXML);
        let comma = c.compile("SUM(1,2)").unwrap();
        assert!(semicolon.semantically_equal(&comma));
    }

    #[test]
    fn english_op_code_lookup_ignores_grammar() {
        let c = FormulaCompiler::new(Arc::new(OpCodeMapRegistry::new()), Grammar::ODFF);
        assert_eq!(c.get_english_op_code("ERRORTYPE"), Some(OpCode::ErrorType));
        assert_eq!(c.get_english_op_code("sum"), Some(OpCode::Sum));
        assert_eq!(c.get_english_op_code("NOSUCH"), None);
    }

    #[test]
    fn empty_formula_compiles_to_empty_array() {
        let arr = compile("");
        assert!(arr.is_empty());
        assert_eq!(arr.error(), None);
    }

    struct DbResolver;

    impl ReferenceResolver for DbResolver {
        fn handle_single_ref(
            &mut self,
            text: &str,
            convention: AddressConvention,
        ) -> Option<formulac_core::SingleRef> {
            A1Resolver.handle_single_ref(text, convention)
        }

        fn handle_db_data(&mut self, name: &str) -> Option<FormulaTokenArray> {
            (name == "Sales").then(|| {
                let mut body = FormulaTokenArray::new();
                body.push(Token::double_ref(ComplexRef::from_corners(
                    formulac_core::SingleRef::new(0, 0),
                    formulac_core::SingleRef::new(9, 1),
                )))
                .unwrap();
                body
            })
        }
    }

    #[test]
    fn named_token_arrays_expand_inline() {
        let mut c = FormulaCompiler::with_resolver(
            Arc::new(OpCodeMapRegistry::new()),
            Grammar::ENGLISH,
            DbResolver,
        );
        let arr = c.compile("SUM(Sales)").unwrap();
        assert_eq!(ops(&arr), vec![OpCode::Push, OpCode::Sum]);
        assert!(arr.get(0).unwrap().as_double_ref().is_some());
    }

    struct WideBody;

    impl ReferenceResolver for WideBody {
        fn handle_single_ref(
            &mut self,
            text: &str,
            convention: AddressConvention,
        ) -> Option<formulac_core::SingleRef> {
            A1Resolver.handle_single_ref(text, convention)
        }

        fn handle_db_data(&mut self, name: &str) -> Option<FormulaTokenArray> {
            (name == "Wide").then(|| {
                let mut body = FormulaTokenArray::new();
                for _ in 0..8 {
                    body.push(Token::number(1.0)).unwrap();
                }
                body
            })
        }
    }

    #[test]
    fn token_overflow_during_expansion_is_fatal() {
        // fill the output so the ceiling hits mid-way through the replay
        // of the named body
        let mut formula = String::new();
        for _ in 0..FORMULA_MAXTOKENS / 2 - 1 {
            formula.push_str("0+");
        }
        formula.push_str("Wide");
        let mut c = FormulaCompiler::with_resolver(
            Arc::new(OpCodeMapRegistry::new()),
            Grammar::ENGLISH,
            WideBody,
        );
        let err = c.compile(&formula).unwrap_err();
        assert!(matches!(err, CompileError::TokenOverflow));
    }

    struct AddIns;

    impl ReferenceResolver for AddIns {
        fn handle_single_ref(
            &mut self,
            text: &str,
            convention: AddressConvention,
        ) -> Option<formulac_core::SingleRef> {
            A1Resolver.handle_single_ref(text, convention)
        }

        fn find_add_in_function(&self, upper_name: &str, _local_first: bool) -> Option<String> {
            (upper_name == "MYFUNC").then(|| "com.example.addin.MyFunc".to_owned())
        }
    }

    #[test]
    fn add_in_calls_become_external_tokens() {
        let mut c = FormulaCompiler::with_resolver(
            Arc::new(OpCodeMapRegistry::new()),
            Grammar::ENGLISH,
            AddIns,
        );
        let arr = c.compile("MyFunc(1;2)").unwrap();
        let last = arr.get(arr.len() - 1).unwrap();
        assert_eq!(last.op, OpCode::External);
        match &last.payload {
            Payload::External { name, argc } => {
                assert_eq!(name, "com.example.addin.MyFunc");
                assert_eq!(*argc, 2);
            }
            other => panic!("expected external payload, got {:?}", other),
        }
    }
}
