//! Token array to formula text
//!
//! Walks the RPN left to right with a stack of rendered fragments, the
//! mirror image of evaluation. Every fragment carries the precedence of
//! its outermost operator so parentheses are emitted only where the
//! original structure would otherwise be lost: a left operand is wrapped
//! when it binds looser than the operator, a right operand also when it
//! binds equally (operators associate left).

use crate::error::{CompileError, Result};
use crate::grammar::{AddressConvention, SeparatorSet};
use crate::hooks::ReferenceResolver;
use crate::opcode_map::OpCodeMap;
use formulac_core::{FormulaTokenArray, Matrix, MatrixValue, OpCode, Payload, Token};

const PREC_NOT: u8 = 1;
const PREC_COMPARE: u8 = 2;
const PREC_CONCAT: u8 = 3;
const PREC_ADD_SUB: u8 = 4;
const PREC_MUL_DIV: u8 = 5;
const PREC_POW: u8 = 6;
const PREC_POST_OP: u8 = 7;
const PREC_UNARY: u8 = 8;
const PREC_INTERSECT: u8 = 9;
const PREC_UNION: u8 = 10;
const PREC_RANGE: u8 = 11;
const PREC_ATOM: u8 = 12;

fn binary_precedence(op: OpCode) -> u8 {
    match op {
        OpCode::Equal
        | OpCode::NotEqual
        | OpCode::LessThan
        | OpCode::LessEqual
        | OpCode::GreaterThan
        | OpCode::GreaterEqual => PREC_COMPARE,
        OpCode::Concat => PREC_CONCAT,
        OpCode::Add | OpCode::Subtract => PREC_ADD_SUB,
        OpCode::Multiply | OpCode::Divide => PREC_MUL_DIV,
        OpCode::Power => PREC_POW,
        OpCode::Intersect => PREC_INTERSECT,
        OpCode::Union => PREC_UNION,
        OpCode::Range => PREC_RANGE,
        _ => PREC_NOT,
    }
}

/// A rendered subexpression and the precedence of its top operator.
type Fragment = (String, u8);

fn wrap(operand: Fragment, parent: u8, right: bool) -> String {
    if operand.1 < parent || (right && operand.1 == parent) {
        format!("({})", operand.0)
    } else {
        operand.0
    }
}

pub(crate) fn render<R: ReferenceResolver>(
    map: &OpCodeMap,
    convention: AddressConvention,
    resolver: &R,
    arr: &FormulaTokenArray,
) -> Result<String> {
    if arr.is_empty() {
        return Ok(String::new());
    }
    let code = arr.tokens();
    render_segment(map, convention, resolver, code, 0, code.len()).map(|(text, _)| text)
}

/// Render the tokens in `[start, end)` into one expression fragment.
fn render_segment<R: ReferenceResolver>(
    map: &OpCodeMap,
    convention: AddressConvention,
    resolver: &R,
    code: &[Token],
    start: usize,
    end: usize,
) -> Result<Fragment> {
    if start == end {
        // an omitted jump branch renders as nothing between separators
        return Ok((String::new(), PREC_ATOM));
    }
    let seps = map.separators();
    let arg_sep = seps.arg.to_string();
    let mut stack: Vec<Fragment> = Vec::new();
    let mut i = start;
    while i < end {
        let token = &code[i];
        match (&token.payload, token.op) {
            (Payload::Double(value), _) => stack.push((format_number(*value, seps), PREC_ATOM)),
            (Payload::Str(s), OpCode::Push) => stack.push((quote_string(s, seps), PREC_ATOM)),
            (Payload::Str(s), OpCode::Bad) => stack.push((s.clone(), PREC_ATOM)),
            (Payload::Error(e), _) => stack.push((e.as_str().to_owned(), PREC_ATOM)),
            (Payload::SingleRef(r), _) => {
                stack.push((resolver.format_single_ref(r, convention), PREC_ATOM))
            }
            (Payload::DoubleRef(r), _) => {
                stack.push((resolver.format_double_ref(r, convention), PREC_ATOM))
            }
            (Payload::Matrix(m), _) => stack.push((format_matrix(m, map, seps), PREC_ATOM)),
            (Payload::Name(n), _) => stack.push((n.clone(), PREC_ATOM)),
            (Payload::None, OpCode::Missing) => stack.push((String::new(), PREC_ATOM)),
            (Payload::Byte(argc), op) => {
                let args = pop_args(&mut stack, *argc as usize)?;
                stack.push((
                    format!("{}({})", map.symbol(op), args.join(&arg_sep)),
                    PREC_ATOM,
                ));
            }
            (Payload::External { name, argc }, _) => {
                let display = map.external_to_add_in(name).unwrap_or(name.as_str());
                let args = pop_args(&mut stack, *argc as usize)?;
                stack.push((format!("{}({})", display, args.join(&arg_sep)), PREC_ATOM));
            }
            (Payload::Jump(offsets), op) => {
                let cond = stack.pop().ok_or(CompileError::MalformedRpn)?;
                let mut args = vec![cond.0];
                let mut begin = i + 1;
                for &off in offsets {
                    let branch_end = off as usize;
                    if branch_end < begin || branch_end > end {
                        return Err(CompileError::MalformedRpn);
                    }
                    let (text, _) =
                        render_segment(map, convention, resolver, code, begin, branch_end)?;
                    args.push(text);
                    begin = branch_end;
                }
                stack.push((
                    format!("{}({})", map.symbol(op), args.join(&arg_sep)),
                    PREC_ATOM,
                ));
                i = begin;
                continue;
            }
            (Payload::None, OpCode::Negate) => {
                let a = stack.pop().ok_or(CompileError::MalformedRpn)?;
                stack.push((format!("-{}", wrap(a, PREC_UNARY, false)), PREC_UNARY));
            }
            (Payload::None, OpCode::Percent) => {
                let a = stack.pop().ok_or(CompileError::MalformedRpn)?;
                stack.push((format!("{}%", wrap(a, PREC_POST_OP, false)), PREC_POST_OP));
            }
            (Payload::None, op) if op.is_binary_operator() => {
                let b = stack.pop().ok_or(CompileError::MalformedRpn)?;
                let a = stack.pop().ok_or(CompileError::MalformedRpn)?;
                let prec = binary_precedence(op);
                stack.push((
                    format!(
                        "{}{}{}",
                        wrap(a, prec, false),
                        map.symbol(op),
                        wrap(b, prec, true)
                    ),
                    prec,
                ));
            }
            (Payload::None, op) if op.is_function() => {
                // nullary function written without parentheses
                stack.push((map.symbol(op).to_owned(), PREC_ATOM));
            }
            _ => return Err(CompileError::MalformedRpn),
        }
        i += 1;
    }
    let result = stack.pop().ok_or(CompileError::MalformedRpn)?;
    if !stack.is_empty() {
        return Err(CompileError::MalformedRpn);
    }
    Ok(result)
}

fn pop_args(stack: &mut Vec<Fragment>, argc: usize) -> Result<Vec<String>> {
    if stack.len() < argc {
        return Err(CompileError::MalformedRpn);
    }
    Ok(stack
        .split_off(stack.len() - argc)
        .into_iter()
        .map(|(text, _)| text)
        .collect())
}

fn format_number(value: f64, seps: &SeparatorSet) -> String {
    let text = format!("{}", value);
    if seps.decimal != '.' {
        text.replace('.', &seps.decimal.to_string())
    } else {
        text
    }
}

fn quote_string(s: &str, seps: &SeparatorSet) -> String {
    let q = seps.string_quote;
    let doubled = format!("{q}{q}");
    format!("{q}{}{q}", s.replace(q, &doubled))
}

fn format_matrix(m: &Matrix, map: &OpCodeMap, seps: &SeparatorSet) -> String {
    let mut out = String::from("{");
    for r in 0..m.rows {
        if r > 0 {
            out.push(seps.array_row);
        }
        for (c, value) in m.row(r).iter().enumerate() {
            if c > 0 {
                out.push(seps.array_col);
            }
            match value {
                MatrixValue::Double(x) => out.push_str(&format_number(*x, seps)),
                MatrixValue::Str(s) => out.push_str(&quote_string(s, seps)),
                MatrixValue::Bool(b) => {
                    out.push_str(map.symbol(if *b { OpCode::True } else { OpCode::False }))
                }
                MatrixValue::Error(e) => out.push_str(e.as_str()),
            }
        }
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::FormulaCompiler;
    use crate::grammar::Grammar;
    use crate::opcode_map::OpCodeMapRegistry;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn round_trip(formula: &str) -> String {
        let mut c = FormulaCompiler::new(Arc::new(OpCodeMapRegistry::new()), Grammar::ENGLISH);
        let arr = c.compile(formula).unwrap();
        c.create_string_from_token_array(&arr).unwrap()
    }

    #[test]
    fn renders_without_redundant_parentheses() {
        for formula in [
            "1+2*3",
            "(1+2)*3",
            "1-(2-3)",
            "2^3^4",
            "-2^2",
            "2^-3",
            "50%",
            "1&\"x\"&2",
            "NOT(A1>0)",
            "A1:B2",
            "SUM(A1:B2;3)",
            "IF(A1;1;2)",
            "ROUND(1;)",
            "{1;2|3;4}",
            "\"He said \"\"hi\"\"\"",
            "#DIV/0!",
            "TRUE",
            "PI()",
        ] {
            assert_eq!(round_trip(formula), formula);
        }
    }

    #[test]
    fn round_trip_is_semantically_stable() {
        let mut c = FormulaCompiler::new(Arc::new(OpCodeMapRegistry::new()), Grammar::ENGLISH);
        for formula in ["1+2*3", "IF(A1>0;SUM(1;2);3*4)", "-(1+2)%", "A1:A3~B1:B3"] {
            let first = c.compile(formula).unwrap();
            let text = c.create_string_from_token_array(&first).unwrap();
            let second = c.compile(&text).unwrap();
            assert!(
                first.semantically_equal(&second),
                "unstable round trip for {}: {}",
                formula,
                text
            );
        }
    }

    #[test]
    fn grammar_controls_rendering_only() {
        let registry = Arc::new(OpCodeMapRegistry::new());
        let mut english = FormulaCompiler::new(Arc::clone(&registry), Grammar::ENGLISH);
        let arr = english.compile("IF(ERRORTYPE(A1)=2;1;2)").unwrap();

        let ooxml = FormulaCompiler::new(Arc::clone(&registry), Grammar::OOXML);
        assert_eq!(
            ooxml.create_string_from_token_array(&arr).unwrap(),
            "IF(ERROR.TYPE(A1)=2,1,2)"
        );
        let odff = FormulaCompiler::new(registry, Grammar::ODFF);
        assert_eq!(
            odff.create_string_from_token_array(&arr).unwrap(),
            "IF(ERROR.TYPE(A1)=2;1;2)"
        );
    }

    #[test]
    fn bad_tokens_render_their_original_text() {
        let mut c = FormulaCompiler::new(Arc::new(OpCodeMapRegistry::new()), Grammar::ENGLISH);
        c.enable_stop_on_error(false);
        let mut arr = FormulaTokenArray::new();
        c.compile_token_array("FOO+1", &mut arr).unwrap();
        assert_eq!(c.create_string_from_token_array(&arr).unwrap(), "FOO+1");
    }

    #[test]
    fn external_names_localize_through_the_add_in_table() {
        let registry = Arc::new(OpCodeMapRegistry::new());
        let base = registry.get_op_code_map(Grammar::ENGLISH);
        let mut map = OpCodeMap::for_filter(Grammar::ENGLISH, *base.separators());
        map.copy_from(&base, false);
        map.put_external("com.example.addin.MyFunc", "MEINEFUNKTION");

        let mut arr = FormulaTokenArray::new();
        arr.push(Token::number(1.0)).unwrap();
        arr.push(Token {
            op: OpCode::External,
            payload: Payload::External {
                name: "com.example.addin.MyFunc".into(),
                argc: 1,
            },
        })
        .unwrap();

        let mut c = FormulaCompiler::new(Arc::clone(&registry), Grammar::ENGLISH);
        c.set_op_code_map(Arc::new(map));
        assert_eq!(
            c.create_string_from_token_array(&arr).unwrap(),
            "MEINEFUNKTION(1)"
        );

        // without a translation entry the stored name renders as-is
        let plain = FormulaCompiler::new(registry, Grammar::ENGLISH);
        assert_eq!(
            plain.create_string_from_token_array(&arr).unwrap(),
            "com.example.addin.MyFunc(1)"
        );
    }

    #[test]
    fn malformed_arrays_are_rejected() {
        let mut arr = FormulaTokenArray::new();
        arr.push(Token::op(OpCode::Add)).unwrap();
        let c = FormulaCompiler::new(Arc::new(OpCodeMapRegistry::new()), Grammar::ENGLISH);
        assert!(matches!(
            c.create_string_from_token_array(&arr),
            Err(CompileError::MalformedRpn)
        ));
    }

    #[test]
    fn empty_array_renders_empty() {
        let c = FormulaCompiler::new(Arc::new(OpCodeMapRegistry::new()), Grammar::ENGLISH);
        let arr = FormulaTokenArray::new();
        assert_eq!(c.create_string_from_token_array(&arr).unwrap(), "");
    }
}
