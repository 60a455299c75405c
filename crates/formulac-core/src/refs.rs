//! Cell and range reference payloads
//!
//! These carry the resolved form of `A1` / `$B$2` / `Sheet1.A1:C3` style
//! references inside tokens. The compiler core never interprets them against
//! a document; resolution and rendering of document-specific address syntax
//! happen in the host's reference resolver.

use crate::error::{CoreError, Result};
use std::fmt::Write as _;

/// Maximum number of rows addressable in a reference (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns addressable in a reference (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// A single cell reference with absolute/relative flags and an optional
/// sheet name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SingleRef {
    /// Row index (0-based internally, 1-based in display)
    pub row: u32,
    /// Column index (0-based, A=0, B=1, ..., XFD=16383)
    pub col: u16,
    /// Whether the row reference is absolute ($)
    pub row_absolute: bool,
    /// Whether the column reference is absolute ($)
    pub col_absolute: bool,
    /// Sheet name, if the reference was sheet-qualified
    pub sheet: Option<String>,
}

impl SingleRef {
    /// Create a relative reference without a sheet.
    pub fn new(row: u32, col: u16) -> Self {
        Self {
            row,
            col,
            row_absolute: false,
            col_absolute: false,
            sheet: None,
        }
    }

    /// Attach a sheet name.
    pub fn on_sheet<S: Into<String>>(mut self, sheet: S) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    /// Parse the cell part of an A1-style reference (`A1`, `$B$2`).
    ///
    /// The input must not contain a sheet prefix; callers split that off
    /// first (the separator between sheet and cell is grammar-dependent).
    pub fn parse_a1(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoreError::InvalidAddress("empty address".into()));
        }

        let bytes = s.as_bytes();
        let mut pos = 0;

        let col_absolute = if bytes.get(pos) == Some(&b'$') {
            pos += 1;
            true
        } else {
            false
        };

        let col_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        if pos == col_start {
            return Err(CoreError::InvalidAddress(format!(
                "no column letters in '{}'",
                s
            )));
        }
        let col = letters_to_column(&s[col_start..pos])?;

        let row_absolute = if bytes.get(pos) == Some(&b'$') {
            pos += 1;
            true
        } else {
            false
        };

        let row_str = &s[pos..];
        if row_str.is_empty() || !row_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidAddress(format!(
                "invalid row number in '{}'",
                s
            )));
        }
        let row_display: u32 = row_str
            .parse()
            .map_err(|_| CoreError::InvalidAddress(format!("invalid row number in '{}'", s)))?;
        if row_display == 0 || row_display > MAX_ROWS {
            return Err(CoreError::RowOutOfBounds(row_display, MAX_ROWS));
        }

        Ok(Self {
            row: row_display - 1,
            col,
            row_absolute,
            col_absolute,
            sheet: None,
        })
    }

    /// Render the cell part in A1 notation, without any sheet prefix.
    pub fn to_a1(&self) -> String {
        let mut out = String::new();
        if self.col_absolute {
            out.push('$');
        }
        out.push_str(&column_to_letters(self.col));
        if self.row_absolute {
            out.push('$');
        }
        let _ = write!(out, "{}", self.row + 1);
        out
    }
}

/// A rectangular range reference between two corners.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComplexRef {
    pub start: SingleRef,
    pub end: SingleRef,
    /// Whether the 2-D range may be reinterpreted as two 1-D edges for
    /// implicit intersection. Set for ranges written out directly; cleared
    /// when a range is synthesized by the compiler.
    pub reuse: bool,
}

impl ComplexRef {
    /// Build a range from two single references, normalizing corner order.
    pub fn from_corners(a: SingleRef, b: SingleRef) -> Self {
        let (mut start, mut end) = (a, b);
        if (end.row, end.col) < (start.row, start.col) {
            std::mem::swap(&mut start, &mut end);
        }
        Self {
            start,
            end,
            reuse: false,
        }
    }

    /// Extend this range so it also covers `other`, keeping the reuse flag.
    pub fn extend(&mut self, other: &SingleRef) {
        self.start.row = self.start.row.min(other.row);
        self.start.col = self.start.col.min(other.col);
        self.end.row = self.end.row.max(other.row);
        self.end.col = self.end.col.max(other.col);
    }

    /// Render the range in A1 notation (`A1:B2`), without sheet prefixes.
    pub fn to_a1(&self) -> String {
        format!("{}:{}", self.start.to_a1(), self.end.to_a1())
    }
}

/// Convert column letters to a 0-based column index (`A`=0, `AA`=26).
pub fn letters_to_column(letters: &str) -> Result<u16> {
    if letters.is_empty() {
        return Err(CoreError::InvalidAddress("empty column letters".into()));
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return Err(CoreError::InvalidAddress(format!(
                "invalid column letter '{}'",
                c
            )));
        }
        col = col
            .saturating_mul(26)
            .saturating_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    if col > MAX_COLS as u32 {
        return Err(CoreError::ColumnOutOfBounds(col - 1, MAX_COLS));
    }
    Ok((col - 1) as u16)
}

/// Convert a 0-based column index to column letters (`0`=A, `26`=AA).
pub fn column_to_letters(col: u16) -> String {
    let mut n = col as u32 + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).expect("ASCII letters")
}
