//! Built-in symbol tables
//!
//! One base table spells every mappable opcode the way the English UI
//! does; per-language delta tables override the spellings that differ.
//! Separator symbols (`;`, matrix separators) are not listed here, they
//! come from the grammar's [`SeparatorSet`](crate::grammar::SeparatorSet)
//! when a map is loaded.

use crate::grammar::FormulaLanguage;
use formulac_core::OpCode;

/// English base spellings. Opcodes missing here are reserved/internal and
/// keep an empty reverse entry.
pub(crate) const SYMBOLS_ENGLISH: &[(OpCode, &str)] = &[
    (OpCode::Open, "("),
    (OpCode::Close, ")"),
    (OpCode::ArrayOpen, "{"),
    (OpCode::ArrayClose, "}"),
    (OpCode::If, "IF"),
    (OpCode::Choose, "CHOOSE"),
    (OpCode::Add, "+"),
    (OpCode::Subtract, "-"),
    (OpCode::Multiply, "*"),
    (OpCode::Divide, "/"),
    (OpCode::Power, "^"),
    (OpCode::Concat, "&"),
    (OpCode::Equal, "="),
    (OpCode::NotEqual, "<>"),
    (OpCode::LessThan, "<"),
    (OpCode::LessEqual, "<="),
    (OpCode::GreaterThan, ">"),
    (OpCode::GreaterEqual, ">="),
    (OpCode::Intersect, "!"),
    (OpCode::Union, "~"),
    (OpCode::Range, ":"),
    (OpCode::Not, "NOT"),
    (OpCode::Negate, "-"),
    (OpCode::Percent, "%"),
    (OpCode::Pi, "PI"),
    (OpCode::Rand, "RAND"),
    (OpCode::True, "TRUE"),
    (OpCode::False, "FALSE"),
    (OpCode::Abs, "ABS"),
    (OpCode::Int, "INT"),
    (OpCode::Sqrt, "SQRT"),
    (OpCode::Exp, "EXP"),
    (OpCode::Ln, "LN"),
    (OpCode::Log10, "LOG10"),
    (OpCode::Sin, "SIN"),
    (OpCode::Cos, "COS"),
    (OpCode::Tan, "TAN"),
    (OpCode::Len, "LEN"),
    (OpCode::Upper, "UPPER"),
    (OpCode::Lower, "LOWER"),
    (OpCode::Trim, "TRIM"),
    (OpCode::IsError, "ISERROR"),
    (OpCode::ErrorType, "ERRORTYPE"),
    (OpCode::Round, "ROUND"),
    (OpCode::Log, "LOG"),
    (OpCode::Mod, "MOD"),
    (OpCode::Left, "LEFT"),
    (OpCode::Right, "RIGHT"),
    (OpCode::Mid, "MID"),
    (OpCode::Concatenate, "CONCATENATE"),
    (OpCode::Sum, "SUM"),
    (OpCode::Average, "AVERAGE"),
    (OpCode::Min, "MIN"),
    (OpCode::Max, "MAX"),
    (OpCode::Count, "COUNT"),
    (OpCode::And, "AND"),
    (OpCode::Or, "OR"),
    (OpCode::EasterSunday, "EASTERSUNDAY"),
];

/// ODF 1.2 / OpenFormula deltas.
const DELTA_ODFF: &[(OpCode, &str)] = &[
    (OpCode::ErrorType, "ERROR.TYPE"),
    (OpCode::EasterSunday, "ORG.OPENOFFICE.EASTERSUNDAY"),
];

/// ODF 1.1 compatibility deltas. `ERRORTYPE` is the historically misnamed
/// spelling this family keeps for backward compatibility.
const DELTA_PODF: &[(OpCode, &str)] = &[];

/// Excel English / OOXML deltas. Excel spells range intersection as
/// whitespace between the references; `!` is its sheet separator.
const DELTA_EXCEL: &[(OpCode, &str)] = &[
    (OpCode::ErrorType, "ERROR.TYPE"),
    (OpCode::Intersect, " "),
];

/// Extra OOXML deltas on top of the Excel spellings. Functions OOXML has
/// no own name for travel as extension names.
const DELTA_OOXML: &[(OpCode, &str)] = &[(
    OpCode::EasterSunday,
    "_xlfn.ORG.OPENOFFICE.EASTERSUNDAY",
)];

/// Opcodes with historically misnamed spellings in some grammars; the
/// `copy_from` known-bad override is restricted to these.
pub(crate) const KNOWN_BAD: &[OpCode] = &[OpCode::ErrorType, OpCode::EasterSunday];

/// The base table plus the per-language deltas, in application order.
pub(crate) fn symbol_tables(language: FormulaLanguage) -> Vec<&'static [(OpCode, &'static str)]> {
    match language {
        FormulaLanguage::Native | FormulaLanguage::English => vec![SYMBOLS_ENGLISH],
        FormulaLanguage::Podf => vec![SYMBOLS_ENGLISH, DELTA_PODF],
        FormulaLanguage::Odff => vec![SYMBOLS_ENGLISH, DELTA_ODFF],
        FormulaLanguage::EnglishXl => vec![SYMBOLS_ENGLISH, DELTA_EXCEL],
        FormulaLanguage::Ooxml => vec![SYMBOLS_ENGLISH, DELTA_EXCEL, DELTA_OOXML],
    }
}
