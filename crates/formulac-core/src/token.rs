//! Formula tokens
//!
//! A [`Token`] pairs an [`OpCode`] with the operand payload its class
//! requires. Tokens are plain values; cloning one copies the payload, so a
//! token array can be duplicated or shared without any reference counting.

use crate::error::ErrorCode;
use crate::opcode::OpCode;
use crate::refs::{ComplexRef, SingleRef};

/// Operand payload of a token. Which variant is legal depends on the
/// opcode's class.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No operand (operators, parser symbols)
    None,
    /// Function argument count
    Byte(u8),
    /// Numeric literal
    Double(f64),
    /// String literal
    Str(String),
    /// Single cell reference
    SingleRef(SingleRef),
    /// Range reference
    DoubleRef(ComplexRef),
    /// Matrix (array) literal
    Matrix(Matrix),
    /// Add-in function call: programmatic name plus argument count
    External { name: String, argc: u8 },
    /// Named expression
    Name(String),
    /// Jump table: absolute offsets into the finished RPN array, one past
    /// the end of each branch; the last entry is the end of the construct
    Jump(Vec<u16>),
    /// Error constant
    Error(ErrorCode),
}

/// An atomic element of a compiled formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub op: OpCode,
    pub payload: Payload,
}

impl Token {
    /// A bare token without operand.
    pub fn op(op: OpCode) -> Self {
        Self {
            op,
            payload: Payload::None,
        }
    }

    /// Push a numeric literal.
    pub fn number(value: f64) -> Self {
        Self {
            op: OpCode::Push,
            payload: Payload::Double(value),
        }
    }

    /// Push a string literal.
    pub fn string<S: Into<String>>(value: S) -> Self {
        Self {
            op: OpCode::Push,
            payload: Payload::Str(value.into()),
        }
    }

    /// Push an error constant.
    pub fn error(code: ErrorCode) -> Self {
        Self {
            op: OpCode::Push,
            payload: Payload::Error(code),
        }
    }

    /// Push a single cell reference.
    pub fn single_ref(r: SingleRef) -> Self {
        Self {
            op: OpCode::Push,
            payload: Payload::SingleRef(r),
        }
    }

    /// Push a range reference.
    pub fn double_ref(r: ComplexRef) -> Self {
        Self {
            op: OpCode::Push,
            payload: Payload::DoubleRef(r),
        }
    }

    /// Push a matrix literal.
    pub fn matrix(m: Matrix) -> Self {
        Self {
            op: OpCode::Push,
            payload: Payload::Matrix(m),
        }
    }

    /// Function call with a resolved argument count.
    pub fn function(op: OpCode, argc: u8) -> Self {
        Self {
            op,
            payload: Payload::Byte(argc),
        }
    }

    /// Omitted-argument placeholder.
    pub fn missing() -> Self {
        Self {
            op: OpCode::Missing,
            payload: Payload::None,
        }
    }

    /// Error sentinel carrying the unparsable source fragment.
    pub fn bad<S: Into<String>>(text: S) -> Self {
        Self {
            op: OpCode::Bad,
            payload: Payload::Str(text.into()),
        }
    }

    /// Whether this token pushes an operand (as opposed to applying an
    /// operator or function).
    pub fn is_push(&self) -> bool {
        self.op == OpCode::Push
    }

    /// Argument count for function-class tokens.
    pub fn argc(&self) -> u8 {
        match self.payload {
            Payload::Byte(n) => n,
            Payload::External { argc, .. } => argc,
            _ => 0,
        }
    }

    /// The single reference payload, if any.
    pub fn as_single_ref(&self) -> Option<&SingleRef> {
        match &self.payload {
            Payload::SingleRef(r) => Some(r),
            _ => None,
        }
    }

    /// The range reference payload, if any.
    pub fn as_double_ref(&self) -> Option<&ComplexRef> {
        match &self.payload {
            Payload::DoubleRef(r) => Some(r),
            _ => None,
        }
    }
}

/// A matrix (array) literal, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub cols: usize,
    pub rows: usize,
    pub values: Vec<MatrixValue>,
}

impl Matrix {
    /// Build from rows of values; all rows must have equal length.
    pub fn from_rows(rows: Vec<Vec<MatrixValue>>) -> Option<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != ncols) {
            return None;
        }
        Some(Self {
            cols: ncols,
            rows: nrows,
            values: rows.into_iter().flatten().collect(),
        })
    }

    /// Iterate one row of the matrix.
    pub fn row(&self, r: usize) -> &[MatrixValue] {
        &self.values[r * self.cols..(r + 1) * self.cols]
    }
}

/// One element of a matrix literal.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixValue {
    Double(f64),
    Str(String),
    Bool(bool),
    Error(ErrorCode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_plain_values() {
        let t = Token::string("abc");
        let u = t.clone();
        assert_eq!(t, u);
        assert!(t.is_push());
    }

    #[test]
    fn argc_reads_byte_and_external() {
        assert_eq!(Token::function(OpCode::Sum, 3).argc(), 3);
        let ext = Token {
            op: OpCode::External,
            payload: Payload::External {
                name: "com.example.func".into(),
                argc: 2,
            },
        };
        assert_eq!(ext.argc(), 2);
        assert_eq!(Token::number(1.0).argc(), 0);
    }

    #[test]
    fn matrix_rejects_ragged_rows() {
        let ok = Matrix::from_rows(vec![
            vec![MatrixValue::Double(1.0), MatrixValue::Double(2.0)],
            vec![MatrixValue::Double(3.0), MatrixValue::Double(4.0)],
        ])
        .unwrap();
        assert_eq!(ok.rows, 2);
        assert_eq!(ok.cols, 2);
        assert_eq!(ok.row(1)[0], MatrixValue::Double(3.0));

        assert!(Matrix::from_rows(vec![
            vec![MatrixValue::Double(1.0)],
            vec![MatrixValue::Double(2.0), MatrixValue::Double(3.0)],
        ])
        .is_none());
    }
}
