//! Spreadsheet formula compilation
//!
//! This crate turns formula text into the RPN token arrays of
//! [`formulac_core`] and renders them back, across several formula
//! grammars (UI languages and file formats). The moving parts:
//!
//! - [`Grammar`] selects the symbol spelling and address convention.
//! - [`OpCodeMapRegistry`] owns the shared per-grammar symbol tables.
//! - [`FormulaCompiler`] compiles and decompiles; host documents plug in
//!   through the [`ReferenceResolver`] trait.
//!
//! ```
//! use formulac::{FormulaCompiler, Grammar, OpCodeMapRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(OpCodeMapRegistry::new());
//! let mut compiler = FormulaCompiler::new(registry, Grammar::ENGLISH);
//! let rpn = compiler.compile("=SUM(A1:B2;3)*2")?;
//! assert_eq!(
//!     compiler.create_string_from_token_array(&rpn)?,
//!     "SUM(A1:B2;3)*2"
//! );
//! # Ok::<(), formulac::CompileError>(())
//! ```

pub mod compiler;
mod decompiler;
pub mod error;
pub mod grammar;
pub mod hooks;
mod lexer;
pub mod opcode_map;
mod symbols;

pub use compiler::FormulaCompiler;
pub use error::{CompileError, Result};
pub use grammar::{
    separator_type, AddressConvention, FormulaLanguage, Grammar, SeparatorSet, SeparatorType,
};
pub use hooks::{dequote, quote_sheet_name, A1Resolver, ReferenceResolver};
pub use opcode_map::{AddInProvider, OpCodeMap, OpCodeMapRegistry};

// the data model this crate compiles into
pub use formulac_core::{
    ComplexRef, ErrorCode, FormulaTokenArray, Matrix, MatrixValue, OpCode, Payload, SingleRef,
    Token, FORMULA_MAXJUMPCOUNT, FORMULA_MAXTOKENS, MAX_RECURSION,
};
