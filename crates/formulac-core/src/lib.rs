//! # formulac-core
//!
//! Core data model for the formulac spreadsheet formula compiler.
//!
//! This crate provides the fundamental types shared by the compiler and any
//! host document engine:
//! - [`OpCode`] - the closed enumeration of operators, functions and
//!   pseudo-instructions
//! - [`Token`] and [`Payload`] - one element of a compiled formula
//! - [`FormulaTokenArray`] - the stack-evaluable RPN sequence
//! - [`SingleRef`] and [`ComplexRef`] - cell/range reference payloads
//!
//! ## Example
//!
//! ```rust
//! use formulac_core::{FormulaTokenArray, OpCode, Token};
//!
//! let mut arr = FormulaTokenArray::new();
//! arr.push(Token::number(1.0)).unwrap();
//! arr.push(Token::number(2.0)).unwrap();
//! arr.push(Token::op(OpCode::Add)).unwrap();
//! assert_eq!(arr.len(), 3);
//! ```

pub mod array;
pub mod error;
pub mod opcode;
pub mod refs;
pub mod token;

// Re-exports for convenience
pub use array::{FormulaTokenArray, FORMULA_MAXJUMPCOUNT, FORMULA_MAXTOKENS, MAX_RECURSION};
pub use error::{CoreError, ErrorCode, Result};
pub use opcode::OpCode;
pub use refs::{ComplexRef, SingleRef, MAX_COLS, MAX_ROWS};
pub use token::{Matrix, MatrixValue, Payload, Token};
