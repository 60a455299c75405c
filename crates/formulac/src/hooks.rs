//! Host document hooks
//!
//! Reference resolution and add-in name lookup are document-specific, so
//! the compiler core only depends on the [`ReferenceResolver`] trait. A
//! host document engine implements it; [`A1Resolver`] is a standalone
//! fallback that understands plain A1-style addressing and nothing else.

use crate::grammar::AddressConvention;
use formulac_core::{ComplexRef, FormulaTokenArray, SingleRef, Token};

/// Strip one level of single quotes from a sheet-name fragment, undoing
/// the doubled-quote escape. Returns `None` if `s` is not quoted.
pub fn dequote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

/// Quote a sheet name for rendering when it contains characters that would
/// not survive unquoted.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_owned()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Document-side resolution and rendering hooks.
///
/// `handle_*` methods are called by the parser when it recognizes a
/// reference-class token; returning `None`/`false` makes the fragment an
/// unresolved name. `format_*` methods are the decompile direction.
pub trait ReferenceResolver {
    /// Resolve a single cell reference written as `text`.
    fn handle_single_ref(
        &mut self,
        text: &str,
        convention: AddressConvention,
    ) -> Option<SingleRef>;

    /// Resolve `text` as a whole range (range-valued named expressions,
    /// database ranges rendered as one identifier).
    fn handle_range(&mut self, text: &str, convention: AddressConvention) -> Option<ComplexRef> {
        let _ = (text, convention);
        None
    }

    /// Resolve `name` as a stored token array to expand inline (named
    /// formulas, database range definitions).
    fn handle_db_data(&mut self, name: &str) -> Option<FormulaTokenArray> {
        let _ = name;
        None
    }

    /// Validate an external (add-in) call token after its arguments were
    /// compiled. Returning `false` fails the compile with a reference
    /// error.
    fn handle_external_reference(&mut self, token: &Token) -> bool {
        let _ = token;
        true
    }

    /// Look up an add-in function by uppercased name; `local_first`
    /// prefers the localized name over the programmatic one. Returns the
    /// programmatic name to store in the token.
    fn find_add_in_function(&self, upper_name: &str, local_first: bool) -> Option<String> {
        let _ = (upper_name, local_first);
        None
    }

    /// Render a single reference in the grammar's address syntax.
    fn format_single_ref(&self, r: &SingleRef, convention: AddressConvention) -> String {
        match &r.sheet {
            Some(sheet) => format!(
                "{}{}{}",
                quote_sheet_name(sheet),
                convention.sheet_separator(),
                r.to_a1()
            ),
            None => r.to_a1(),
        }
    }

    /// Render a range reference in the grammar's address syntax.
    fn format_double_ref(&self, r: &ComplexRef, convention: AddressConvention) -> String {
        format!(
            "{}:{}",
            self.format_single_ref(&r.start, convention),
            // the end sheet repeats only when it differs
            if r.end.sheet.is_some() && r.end.sheet != r.start.sheet {
                self.format_single_ref(&r.end, convention)
            } else {
                r.end.to_a1()
            }
        )
    }
}

/// Resolver for plain A1-style addressing without any document behind it.
///
/// Accepts `A1`, `$B$2`, `Sheet1.A1` / `Sheet1!A1` (per convention) and
/// quoted sheet names; knows no named expressions and no add-ins.
#[derive(Debug, Default, Clone, Copy)]
pub struct A1Resolver;

impl ReferenceResolver for A1Resolver {
    fn handle_single_ref(
        &mut self,
        text: &str,
        convention: AddressConvention,
    ) -> Option<SingleRef> {
        let sep = convention.sheet_separator();
        match text.rfind(sep) {
            Some(pos) => {
                let (sheet_part, cell_part) = (&text[..pos], &text[pos + sep.len_utf8()..]);
                let sheet = match dequote(sheet_part) {
                    Some(name) => name,
                    None if !sheet_part.is_empty() && !sheet_part.contains('\'') => {
                        sheet_part.to_owned()
                    }
                    _ => return None,
                };
                Some(SingleRef::parse_a1(cell_part).ok()?.on_sheet(sheet))
            }
            None => SingleRef::parse_a1(text).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dequote_undoes_doubling() {
        assert_eq!(dequote("'My Sheet'"), Some("My Sheet".into()));
        assert_eq!(dequote("'It''s'"), Some("It's".into()));
        assert_eq!(dequote("Sheet1"), None);
    }

    #[test]
    fn quoting_only_when_needed() {
        assert_eq!(quote_sheet_name("Sheet1"), "Sheet1");
        assert_eq!(quote_sheet_name("My Sheet"), "'My Sheet'");
        assert_eq!(quote_sheet_name("2024"), "'2024'");
    }

    #[test]
    fn resolve_bare_and_qualified() {
        let mut r = A1Resolver;
        let plain = r.handle_single_ref("A1", AddressConvention::CalcA1).unwrap();
        assert_eq!(plain.sheet, None);

        let calc = r
            .handle_single_ref("Sheet1.B2", AddressConvention::CalcA1)
            .unwrap();
        assert_eq!(calc.sheet.as_deref(), Some("Sheet1"));
        assert_eq!(calc.row, 1);

        let excel = r
            .handle_single_ref("'My Sheet'!C3", AddressConvention::ExcelA1)
            .unwrap();
        assert_eq!(excel.sheet.as_deref(), Some("My Sheet"));

        assert!(r
            .handle_single_ref("Sheet1!B2", AddressConvention::CalcA1)
            .is_none());
    }

    #[test]
    fn formatting_round_trips_qualified_refs() {
        let mut r = A1Resolver;
        for (text, convention) in [
            ("Sheet1.B2", AddressConvention::CalcA1),
            ("'My Sheet'!C3", AddressConvention::ExcelA1),
            ("$A$1", AddressConvention::CalcA1),
        ] {
            let resolved = r.handle_single_ref(text, convention).unwrap();
            assert_eq!(r.format_single_ref(&resolved, convention), text);
        }
    }
}
