//! Symbol tables: bidirectional symbol/opcode mapping per grammar
//!
//! An [`OpCodeMap`] owns the forward (symbol string to opcode) hash map,
//! the reverse dense symbol table, and the add-in name translation maps of
//! one grammar. Maps are built once per grammar by an
//! [`OpCodeMapRegistry`] and shared immutably behind `Arc` from then on;
//! the registry is caller-owned, there is no process-global state.

use crate::error::{CompileError, Result};
use crate::grammar::{FormulaLanguage, Grammar, SeparatorSet};
use crate::symbols::{symbol_tables, KNOWN_BAD};
use ahash::AHashMap;
use formulac_core::OpCode;
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};

/// Bidirectional symbol/opcode mapping for one grammar.
#[derive(Debug, Clone)]
pub struct OpCodeMap {
    /// Symbol string -> OpCode. For English maps the keys are uppercase and
    /// callers must uppercase before lookup.
    hash: AHashMap<String, OpCode>,
    /// OpCode ordinal -> symbol string; empty only for reserved/internal
    /// opcodes.
    table: Vec<String>,
    /// ocExternal: filter-internal name -> add-in name
    external: AHashMap<String, String>,
    /// ocExternal: add-in name -> filter-internal name
    reverse_external: AHashMap<String, String>,
    grammar: Grammar,
    seps: SeparatorSet,
    /// Set up by the core, not by filters
    core: bool,
}

impl OpCodeMap {
    fn new(grammar: Grammar, seps: SeparatorSet, core: bool) -> Self {
        Self {
            hash: AHashMap::new(),
            table: vec![String::new(); OpCode::COUNT],
            external: AHashMap::new(),
            reverse_external: AHashMap::new(),
            grammar,
            seps,
            core,
        }
    }

    /// Build an empty, filter-supplied map.
    pub fn for_filter(grammar: Grammar, seps: SeparatorSet) -> Self {
        Self::new(grammar, seps, false)
    }

    /// The symbol string matching an opcode; empty for reserved opcodes.
    pub fn symbol(&self, op: OpCode) -> &str {
        &self.table[op.index()]
    }

    /// Forward lookup. Keys of English maps are uppercase; callers
    /// uppercase before calling so the hot lexer path stays free of
    /// locale-sensitive case folding. A miss is not an error here.
    pub fn opcode(&self, symbol: &str) -> Option<OpCode> {
        self.hash.get(symbol).copied()
    }

    /// Identifier lookup for the lexer: exact match first, uppercase
    /// fallback for case-insensitive function names.
    pub fn lookup_ident(&self, ident: &str) -> Option<OpCode> {
        self.opcode(ident)
            .or_else(|| self.opcode(&ident.to_uppercase()))
    }

    /// Insert one symbol/opcode pair. The reverse entry is always set; the
    /// forward entry keeps the first mapping for a symbol (two opcodes may
    /// share a spelling, like binary and unary minus, and the parser
    /// disambiguates positionally).
    pub fn put_op_code(&mut self, symbol: &str, op: OpCode) {
        self.table[op.index()] = symbol.to_owned();
        self.hash.entry(symbol.to_owned()).or_insert(op);
    }

    /// Insert overwriting the forward entry; only `copy_from` may do this.
    fn put_op_code_forced(&mut self, symbol: &str, op: OpCode) {
        self.table[op.index()] = symbol.to_owned();
        self.hash.insert(symbol.to_owned(), op);
    }

    /// Insert a filter-internal/add-in name pair.
    pub fn put_external(&mut self, symbol: &str, add_in: &str) {
        self.external.insert(symbol.to_owned(), add_in.to_owned());
        self.reverse_external
            .insert(add_in.to_owned(), symbol.to_owned());
    }

    /// Like [`put_external`](Self::put_external) but failing silently if
    /// the add-in name already exists.
    pub fn put_external_softly(&mut self, symbol: &str, add_in: &str) {
        if !self.reverse_external.contains_key(add_in) {
            self.put_external(symbol, add_in);
        }
    }

    /// Translate a filter-internal external name to the add-in name.
    pub fn external_to_add_in(&self, symbol: &str) -> Option<&str> {
        self.external.get(symbol).map(String::as_str)
    }

    /// Translate an add-in name back to the filter-internal name.
    pub fn add_in_to_external(&self, add_in: &str) -> Option<&str> {
        self.reverse_external.get(add_in).map(String::as_str)
    }

    /// Whether the add-in translation tables are populated; the decompiler
    /// consults them before falling back to the bare symbol.
    pub fn has_externals(&self) -> bool {
        !self.external.is_empty()
    }

    /// Copy all mappings from `other` into this map, effectively replacing
    /// it.
    ///
    /// With `override_known_bad`, spellings of historically misnamed
    /// functions already present in this map survive the copy - except
    /// when the old spelling collides with a symbol `other` assigns to a
    /// different opcode, in which case the newer, correct spelling wins.
    /// The override never happens unconditionally.
    pub fn copy_from(&mut self, other: &OpCodeMap, override_known_bad: bool) {
        for &op in OpCode::ALL {
            let incoming = other.symbol(op);
            if incoming.is_empty() {
                continue;
            }
            if override_known_bad && KNOWN_BAD.contains(&op) {
                let old = self.symbol(op).to_owned();
                if !old.is_empty() && !old.eq_ignore_ascii_case(incoming) {
                    let collides = other
                        .opcode(&old.to_uppercase())
                        .is_some_and(|o| o != op);
                    if !collides {
                        // keep the legacy spelling for backward compatibility
                        self.put_op_code_forced(&old, op);
                        continue;
                    }
                    log::debug!(
                        "copy_from: replacing colliding legacy spelling '{}' of {:?} with '{}'",
                        old,
                        op,
                        incoming
                    );
                }
            }
            self.put_op_code_forced(incoming, op);
        }
        for (k, v) in &other.external {
            self.put_external(k, v);
        }
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    /// Separator characters this map was loaded with.
    pub fn separators(&self) -> &SeparatorSet {
        &self.seps
    }

    /// Size of the reverse symbol table.
    pub fn symbol_count(&self) -> usize {
        self.table.len()
    }

    /// Internal core mapping, or set up by filters?
    pub fn is_core(&self) -> bool {
        self.core
    }

    /// English symbols and external names, as opposed to native language?
    pub fn is_english(&self) -> bool {
        self.grammar.is_english()
    }

    pub fn is_podf(&self) -> bool {
        self.grammar.is_podf()
    }

    pub fn is_odff(&self) -> bool {
        self.grammar.is_odff()
    }

    pub fn is_ooxml(&self) -> bool {
        self.grammar.is_ooxml()
    }
}

/// Loads the built-in symbols of one language into a fresh core map.
fn load_symbols(grammar: Grammar, seps: SeparatorSet) -> OpCodeMap {
    let mut map = OpCodeMap::new(grammar, seps, true);
    for table in symbol_tables(grammar.language) {
        for &(op, symbol) in table {
            map.put_op_code_forced(symbol, op);
        }
    }
    // separator opcodes take their spelling from the separator set
    map.put_op_code_forced(&seps.arg.to_string(), OpCode::Sep);
    map.put_op_code_forced(&seps.array_col.to_string(), OpCode::ArrayColSep);
    map.put_op_code_forced(&seps.array_row.to_string(), OpCode::ArrayRowSep);
    map
}

/// Host-supplied add-in names, merged into core maps as they are built.
pub trait AddInProvider: Send + Sync {
    /// Populate `map` with add-in symbol translations for `language`.
    fn fill(&self, map: &mut OpCodeMap, language: FormulaLanguage);
}

/// Caller-owned cache of the per-grammar opcode maps.
///
/// Construct once, read many: each language's map is built on first
/// request (guarded, so concurrent first access builds exactly once) and
/// shared immutably afterwards. Native symbols may be replaced or rebuilt
/// with different separators; already-cached maps of other grammars are
/// unaffected.
pub struct OpCodeMapRegistry {
    cells: [OnceCell<Arc<OpCodeMap>>; FormulaLanguage::COUNT],
    native: Mutex<NativeState>,
    provider: Option<Box<dyn AddInProvider>>,
}

struct NativeState {
    seps: SeparatorSet,
    map: Option<Arc<OpCodeMap>>,
}

impl Default for OpCodeMapRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OpCodeMapRegistry {
    pub fn new() -> Self {
        Self {
            cells: Default::default(),
            native: Mutex::new(NativeState {
                seps: SeparatorSet::for_grammar(Grammar::NATIVE),
                map: None,
            }),
            provider: None,
        }
    }

    /// A registry whose core maps are augmented with host add-in names.
    pub fn with_add_ins(provider: Box<dyn AddInProvider>) -> Self {
        Self {
            provider: Some(provider),
            ..Self::new()
        }
    }

    /// The shared map for a grammar, built and cached on first use.
    pub fn get_op_code_map(&self, grammar: Grammar) -> Arc<OpCodeMap> {
        let language = grammar.language;
        if language == FormulaLanguage::Native {
            let mut state = self.native.lock().expect("native symbol lock");
            if let Some(map) = &state.map {
                return Arc::clone(map);
            }
            let map = Arc::new(self.build(Grammar::NATIVE, state.seps));
            state.map = Some(Arc::clone(&map));
            return map;
        }
        let canonical = canonical_grammar(language);
        Arc::clone(self.cells[language.slot()].get_or_init(|| {
            Arc::new(self.build(canonical, SeparatorSet::for_grammar(canonical)))
        }))
    }

    /// Map lookup by `FormulaLanguage` API constant; unknown ids yield
    /// `None`.
    pub fn get_op_code_map_for_language(&self, id: i32) -> Option<Arc<OpCodeMap>> {
        FormulaLanguage::from_api(id)
            .map(|language| self.get_op_code_map(canonical_grammar(language)))
    }

    /// Build a map from an externally supplied opcode/symbol table,
    /// validating that every opcode value is in range.
    ///
    /// With `english_number_format` the map carries English (period
    /// decimal, comma argument) separators instead of the native ones.
    pub fn create_op_code_map(
        &self,
        mapping: &[(&str, u16)],
        english_number_format: bool,
    ) -> Result<Arc<OpCodeMap>> {
        let seps = if english_number_format {
            SeparatorSet::comma_base()
        } else {
            self.native.lock().expect("native symbol lock").seps
        };
        let grammar = if english_number_format {
            Grammar::ENGLISH
        } else {
            Grammar::NATIVE
        };
        let mut map = OpCodeMap::for_filter(grammar, seps);
        for &(symbol, value) in mapping {
            let op = OpCode::from_u16(value).ok_or(CompileError::InvalidOpCode(value))?;
            map.put_op_code(symbol, op);
        }
        Ok(Arc::new(map))
    }

    /// Override the native separators; takes effect for native maps built
    /// afterwards (the cached native map is dropped).
    pub fn update_separators_native(
        &self,
        arg: char,
        array_col: char,
        array_row: char,
    ) -> Result<()> {
        let mut state = self.native.lock().expect("native symbol lock");
        let mut seps = state.seps;
        seps.arg = arg;
        seps.array_col = array_col;
        seps.array_row = array_row;
        seps.validate()?;
        state.seps = seps;
        state.map = None;
        Ok(())
    }

    /// Drop native overrides and fall back to the built-in native table.
    pub fn reset_native_symbols(&self) {
        let mut state = self.native.lock().expect("native symbol lock");
        state.seps = SeparatorSet::for_grammar(Grammar::NATIVE);
        state.map = None;
    }

    /// Replace the native symbol map wholesale (localized host tables).
    pub fn set_native_symbols(&self, map: Arc<OpCodeMap>) {
        let mut state = self.native.lock().expect("native symbol lock");
        state.seps = *map.separators();
        state.map = Some(map);
    }

    fn build(&self, grammar: Grammar, seps: SeparatorSet) -> OpCodeMap {
        let mut map = load_symbols(grammar, seps);
        if let Some(provider) = &self.provider {
            provider.fill(&mut map, grammar.language);
        }
        map
    }
}

fn canonical_grammar(language: FormulaLanguage) -> Grammar {
    match language {
        FormulaLanguage::Native => Grammar::NATIVE,
        FormulaLanguage::English => Grammar::ENGLISH,
        FormulaLanguage::Podf => Grammar::PODF,
        FormulaLanguage::Odff => Grammar::ODFF,
        FormulaLanguage::EnglishXl => Grammar::ENGLISH_XL,
        FormulaLanguage::Ooxml => Grammar::OOXML,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reverse_table_covers_every_opcode() {
        let registry = OpCodeMapRegistry::new();
        let map = registry.get_op_code_map(Grammar::ENGLISH);
        assert_eq!(map.symbol_count(), OpCode::COUNT);
        // reserved/internal opcodes are the only ones allowed an empty entry
        for &op in OpCode::ALL {
            if op.is_function() || op.is_binary_operator() || op.is_unary_operator() {
                assert!(!map.symbol(op).is_empty(), "no symbol for {:?}", op);
            }
        }
    }

    #[test]
    fn map_construction_is_cached() {
        let registry = OpCodeMapRegistry::new();
        let a = registry.get_op_code_map(Grammar::ODFF);
        let b = registry.get_op_code_map(Grammar::ODFF);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.symbol(OpCode::Sum), b.symbol(OpCode::Sum));
    }

    #[test]
    fn unknown_language_id_yields_no_map() {
        let registry = OpCodeMapRegistry::new();
        assert!(registry.get_op_code_map_for_language(42).is_none());
        assert!(registry.get_op_code_map_for_language(0).is_some());
    }

    #[test]
    fn grammar_specific_spellings() {
        let registry = OpCodeMapRegistry::new();
        let english = registry.get_op_code_map(Grammar::ENGLISH);
        let odff = registry.get_op_code_map(Grammar::ODFF);
        let ooxml = registry.get_op_code_map(Grammar::OOXML);

        assert_eq!(english.symbol(OpCode::ErrorType), "ERRORTYPE");
        assert_eq!(odff.symbol(OpCode::ErrorType), "ERROR.TYPE");
        assert_eq!(
            odff.symbol(OpCode::EasterSunday),
            "ORG.OPENOFFICE.EASTERSUNDAY"
        );
        assert_eq!(
            ooxml.symbol(OpCode::EasterSunday),
            "_xlfn.ORG.OPENOFFICE.EASTERSUNDAY"
        );
        // separator opcodes follow the grammar family
        assert_eq!(english.symbol(OpCode::Sep), ";");
        assert_eq!(ooxml.symbol(OpCode::Sep), ",");
    }

    #[test]
    fn shared_minus_spelling_is_deterministic() {
        let registry = OpCodeMapRegistry::new();
        let map = registry.get_op_code_map(Grammar::ENGLISH);
        // binary and unary minus share "-"; the parser disambiguates
        // positionally, the forward entry just has to be deterministic
        assert_eq!(map.opcode("-"), Some(OpCode::Negate));
        assert_eq!(map.symbol(OpCode::Subtract), "-");
        assert_eq!(map.symbol(OpCode::Negate), "-");
    }

    #[test]
    fn create_map_validates_opcode_range() {
        let registry = OpCodeMapRegistry::new();
        let ok = registry
            .create_op_code_map(&[("SUMME", OpCode::Sum as u16)], true)
            .unwrap();
        assert_eq!(ok.opcode("SUMME"), Some(OpCode::Sum));
        assert!(!ok.is_core());

        let err = registry
            .create_op_code_map(&[("X", u16::MAX)], true)
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidOpCode(u16::MAX)));
    }

    #[test]
    fn native_separator_override_rebuilds_native_only() {
        let registry = OpCodeMapRegistry::new();
        let english_before = registry.get_op_code_map(Grammar::ENGLISH);
        let native_before = registry.get_op_code_map(Grammar::NATIVE);
        registry.update_separators_native(',', ',', ';').unwrap();
        let native_after = registry.get_op_code_map(Grammar::NATIVE);
        let english_after = registry.get_op_code_map(Grammar::ENGLISH);

        assert!(!Arc::ptr_eq(&native_before, &native_after));
        assert_eq!(native_after.separators().arg, ',');
        assert!(Arc::ptr_eq(&english_before, &english_after));

        registry.reset_native_symbols();
        assert_eq!(
            registry.get_op_code_map(Grammar::NATIVE).separators().arg,
            ';'
        );
    }

    #[test]
    fn invalid_native_separator_override_rejected() {
        let registry = OpCodeMapRegistry::new();
        // argument separator colliding with the decimal point
        assert!(registry.update_separators_native('.', ';', '|').is_err());
    }

    #[test]
    fn externals_round_trip() {
        let registry = OpCodeMapRegistry::new();
        let mut map =
            OpCodeMap::for_filter(Grammar::ENGLISH, SeparatorSet::semicolon_base());
        assert!(!map.has_externals());
        map.put_external("com.sun.star.sheet.addin.x", "MYFUNC");
        map.put_external_softly("other.addin", "MYFUNC"); // silently ignored
        assert!(map.has_externals());
        assert_eq!(
            map.external_to_add_in("com.sun.star.sheet.addin.x"),
            Some("MYFUNC")
        );
        assert_eq!(
            map.add_in_to_external("MYFUNC"),
            Some("com.sun.star.sheet.addin.x")
        );
        drop(registry);
    }

    #[test]
    fn copy_from_overrides_known_bad_only_on_collision() {
        let seps = SeparatorSet::semicolon_base();
        // newer map: correct spelling, where the legacy one now names a
        // different function
        let mut newer = OpCodeMap::for_filter(Grammar::ENGLISH, seps);
        newer.put_op_code("ERROR.TYPE", OpCode::ErrorType);
        newer.put_op_code("ERRORTYPE", OpCode::IsError);

        let mut old = OpCodeMap::for_filter(Grammar::ENGLISH, seps);
        old.put_op_code("ERRORTYPE", OpCode::ErrorType);
        old.copy_from(&newer, true);
        // legacy spelling collides -> corrected spelling replaces it
        assert_eq!(old.symbol(OpCode::ErrorType), "ERROR.TYPE");

        // no collision -> the legacy spelling survives the copy
        let mut newer2 = OpCodeMap::for_filter(Grammar::ENGLISH, seps);
        newer2.put_op_code("ERROR.TYPE", OpCode::ErrorType);
        let mut old2 = OpCodeMap::for_filter(Grammar::ENGLISH, seps);
        old2.put_op_code("ERRORTYPE", OpCode::ErrorType);
        old2.copy_from(&newer2, true);
        assert_eq!(old2.symbol(OpCode::ErrorType), "ERRORTYPE");
    }
}
