//! Formula grammars and separator tables
//!
//! A [`Grammar`] combines a symbol-naming convention (which language or
//! file format spells the function names) with a reference-address
//! convention. It is the sole axis of variability for symbol spelling and
//! separator characters: everything character-level that differs between
//! grammars lives in an explicit [`SeparatorSet`] rather than scattered
//! character literals.

use crate::error::{CompileError, Result};

/// Symbol-naming convention of a grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormulaLanguage {
    /// Native UI language symbols (host-localizable)
    Native,
    /// English function names as shown in the UI
    English,
    /// ODF 1.1 compatibility names ("PODF")
    Podf,
    /// ODF 1.2 / OpenFormula names ("ODFF")
    Odff,
    /// English Excel names (A1 references)
    EnglishXl,
    /// OOXML file format names
    Ooxml,
}

impl FormulaLanguage {
    /// Number of language slots, for per-language caches.
    pub(crate) const COUNT: usize = 6;

    /// Map a `FormulaLanguage` API constant to a language. Unknown ids
    /// yield `None`, which callers surface as a null map handle.
    pub fn from_api(id: i32) -> Option<FormulaLanguage> {
        match id {
            0 => Some(FormulaLanguage::Odff),
            1 => Some(FormulaLanguage::Podf),
            2 => Some(FormulaLanguage::English),
            3 => Some(FormulaLanguage::Native),
            4 => Some(FormulaLanguage::EnglishXl),
            5 => Some(FormulaLanguage::Ooxml),
            _ => None,
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            FormulaLanguage::Native => 0,
            FormulaLanguage::English => 1,
            FormulaLanguage::Podf => 2,
            FormulaLanguage::Odff => 3,
            FormulaLanguage::EnglishXl => 4,
            FormulaLanguage::Ooxml => 5,
        }
    }
}

/// Reference-address convention of a grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressConvention {
    /// `Sheet1.A1` style
    CalcA1,
    /// `Sheet1!A1` style
    ExcelA1,
    /// `[.A1]` / `Sheet1.A1` ODF style (sheet separator `.`)
    OdfA1,
}

impl AddressConvention {
    /// Character separating a sheet name from the cell part.
    pub fn sheet_separator(self) -> char {
        match self {
            AddressConvention::CalcA1 | AddressConvention::OdfA1 => '.',
            AddressConvention::ExcelA1 => '!',
        }
    }
}

/// Symbol-naming convention plus reference-address convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Grammar {
    pub language: FormulaLanguage,
    pub convention: AddressConvention,
}

impl Grammar {
    pub const NATIVE: Grammar = Grammar {
        language: FormulaLanguage::Native,
        convention: AddressConvention::CalcA1,
    };
    pub const ENGLISH: Grammar = Grammar {
        language: FormulaLanguage::English,
        convention: AddressConvention::CalcA1,
    };
    pub const PODF: Grammar = Grammar {
        language: FormulaLanguage::Podf,
        convention: AddressConvention::OdfA1,
    };
    pub const ODFF: Grammar = Grammar {
        language: FormulaLanguage::Odff,
        convention: AddressConvention::OdfA1,
    };
    pub const ENGLISH_XL: Grammar = Grammar {
        language: FormulaLanguage::EnglishXl,
        convention: AddressConvention::ExcelA1,
    };
    pub const OOXML: Grammar = Grammar {
        language: FormulaLanguage::Ooxml,
        convention: AddressConvention::ExcelA1,
    };

    /// English symbols and external names, as opposed to native language
    /// (which may spell like English but is still the native table).
    pub fn is_english(self) -> bool {
        self.language != FormulaLanguage::Native
    }

    pub fn is_podf(self) -> bool {
        self.language == FormulaLanguage::Podf
    }

    pub fn is_odff(self) -> bool {
        self.language == FormulaLanguage::Odff
    }

    pub fn is_ooxml(self) -> bool {
        self.language == FormulaLanguage::Ooxml
    }
}

/// Which separator family a symbol table is loaded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparatorType {
    /// `;` argument separator, `;`/`|` matrix separators (ODF family)
    SemicolonBase,
    /// `,` argument separator, `,`/`;` matrix separators (Excel family)
    CommaBase,
}

/// The grammar-dependent characters of the lexer and decompiler.
///
/// Invariant: the decimal separator and the argument separator must never
/// be the same character; [`SeparatorSet::validate`] enforces this and the
/// matrix-separator equivalents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeparatorSet {
    /// Decimal point of numeric literals
    pub decimal: char,
    /// Function argument separator
    pub arg: char,
    /// Matrix literal column separator (inside `{}` only)
    pub array_col: char,
    /// Matrix literal row separator (inside `{}` only)
    pub array_row: char,
    /// String literal quote, escaped by doubling
    pub string_quote: char,
    /// Characters beyond alphanumerics that may continue an unquoted
    /// identifier or reference token
    pub ident_chars: &'static str,
}

impl SeparatorSet {
    /// Separator family of the ODF grammars.
    pub const fn semicolon_base() -> Self {
        Self {
            decimal: '.',
            arg: ';',
            array_col: ';',
            array_row: '|',
            string_quote: '"',
            ident_chars: "_$.",
        }
    }

    /// Separator family of the Excel grammars.
    pub const fn comma_base() -> Self {
        Self {
            decimal: '.',
            arg: ',',
            array_col: ',',
            array_row: ';',
            string_quote: '"',
            ident_chars: "_$.",
        }
    }

    /// The built-in separator set of a grammar.
    pub fn for_grammar(grammar: Grammar) -> Self {
        match separator_type(grammar.language) {
            SeparatorType::SemicolonBase => Self::semicolon_base(),
            SeparatorType::CommaBase => Self::comma_base(),
        }
    }

    /// Reject separator sets where distinct roles share a character.
    pub fn validate(&self) -> Result<()> {
        if self.decimal == self.arg {
            return Err(CompileError::SeparatorClash(
                self.decimal,
                "decimal separator",
                "argument separator",
            ));
        }
        if self.decimal == self.array_col || self.decimal == self.array_row {
            return Err(CompileError::SeparatorClash(
                self.decimal,
                "decimal separator",
                "matrix separator",
            ));
        }
        if self.array_col == self.array_row {
            return Err(CompileError::SeparatorClash(
                self.array_col,
                "matrix column separator",
                "matrix row separator",
            ));
        }
        if self.string_quote == self.arg || self.string_quote == self.decimal {
            return Err(CompileError::SeparatorClash(
                self.string_quote,
                "string quote",
                "separator",
            ));
        }
        Ok(())
    }

    /// Whether `c` may continue an identifier or reference token.
    pub fn is_ident_char(&self, c: char) -> bool {
        c.is_alphanumeric() || self.ident_chars.contains(c)
    }
}

/// Separator family used when loading a grammar's symbols.
pub fn separator_type(language: FormulaLanguage) -> SeparatorType {
    match language {
        FormulaLanguage::Native
        | FormulaLanguage::English
        | FormulaLanguage::Podf
        | FormulaLanguage::Odff => SeparatorType::SemicolonBase,
        FormulaLanguage::EnglishXl | FormulaLanguage::Ooxml => SeparatorType::CommaBase,
    }
}
