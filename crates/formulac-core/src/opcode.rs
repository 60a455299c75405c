//! The closed opcode enumeration
//!
//! Every operator, function and pseudo-instruction the compiler understands
//! is one variant of [`OpCode`]. Variant order matters: classification
//! helpers test ordinal ranges, and the reverse symbol table of an opcode
//! map is a dense array indexed by [`OpCode::index`].

/// One operator, function or pseudo-instruction.
///
/// The enumeration is closed; adding a variant requires touching the symbol
/// tables and [`OpCode::ALL`] as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum OpCode {
    // === Pseudo-instructions ===
    /// Push a literal or reference operand
    Push,
    /// End of token stream
    Stop,
    /// Add-in (external) function call
    External,
    /// Named expression
    Name,
    /// Database range
    DbArea,
    /// Error sentinel substituted for an unparsable fragment
    Bad,
    /// Omitted (empty) function argument
    Missing,

    // === Parser-only symbols (never appear in finished RPN) ===
    /// Opening parenthesis
    Open,
    /// Closing parenthesis
    Close,
    /// Function argument separator
    Sep,
    /// Matrix literal open brace
    ArrayOpen,
    /// Matrix literal close brace
    ArrayClose,
    /// Matrix literal row separator
    ArrayRowSep,
    /// Matrix literal column separator
    ArrayColSep,

    // === Jump commands ===
    If,
    Choose,

    // === Binary operators ===
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Concat,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Intersect,
    Union,
    Range,

    // === Unary operators ===
    Not,
    Negate,
    Percent,

    // === Functions without parameters ===
    Pi,
    Rand,
    True,
    False,

    // === Functions with one parameter ===
    Abs,
    Int,
    Sqrt,
    Exp,
    Ln,
    Log10,
    Sin,
    Cos,
    Tan,
    Len,
    Upper,
    Lower,
    Trim,
    IsError,
    ErrorType,

    // === Functions with more parameters ===
    Round,
    Log,
    Mod,
    Left,
    Right,
    Mid,
    Concatenate,
    Sum,
    Average,
    Min,
    Max,
    Count,
    And,
    Or,
    EasterSunday,
}

impl OpCode {
    /// Number of opcode ordinals; size of a reverse symbol table.
    pub const COUNT: usize = OpCode::EasterSunday as usize + 1;

    /// Every variant, in ordinal order.
    pub const ALL: &'static [OpCode] = &[
        OpCode::Push,
        OpCode::Stop,
        OpCode::External,
        OpCode::Name,
        OpCode::DbArea,
        OpCode::Bad,
        OpCode::Missing,
        OpCode::Open,
        OpCode::Close,
        OpCode::Sep,
        OpCode::ArrayOpen,
        OpCode::ArrayClose,
        OpCode::ArrayRowSep,
        OpCode::ArrayColSep,
        OpCode::If,
        OpCode::Choose,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::Power,
        OpCode::Concat,
        OpCode::Equal,
        OpCode::NotEqual,
        OpCode::LessThan,
        OpCode::LessEqual,
        OpCode::GreaterThan,
        OpCode::GreaterEqual,
        OpCode::Intersect,
        OpCode::Union,
        OpCode::Range,
        OpCode::Not,
        OpCode::Negate,
        OpCode::Percent,
        OpCode::Pi,
        OpCode::Rand,
        OpCode::True,
        OpCode::False,
        OpCode::Abs,
        OpCode::Int,
        OpCode::Sqrt,
        OpCode::Exp,
        OpCode::Ln,
        OpCode::Log10,
        OpCode::Sin,
        OpCode::Cos,
        OpCode::Tan,
        OpCode::Len,
        OpCode::Upper,
        OpCode::Lower,
        OpCode::Trim,
        OpCode::IsError,
        OpCode::ErrorType,
        OpCode::Round,
        OpCode::Log,
        OpCode::Mod,
        OpCode::Left,
        OpCode::Right,
        OpCode::Mid,
        OpCode::Concatenate,
        OpCode::Sum,
        OpCode::Average,
        OpCode::Min,
        OpCode::Max,
        OpCode::Count,
        OpCode::And,
        OpCode::Or,
        OpCode::EasterSunday,
    ];

    /// Ordinal of this opcode; index into a reverse symbol table.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a variant by its ordinal, for validating externally supplied
    /// opcode values.
    pub fn from_u16(value: u16) -> Option<OpCode> {
        OpCode::ALL.get(value as usize).copied()
    }

    /// Whether this opcode implements conditional branching with jump
    /// offsets in the RPN stream.
    #[inline]
    pub fn is_jump_command(self) -> bool {
        matches!(self, OpCode::If | OpCode::Choose)
    }

    /// Whether this is a binary operator (two operands popped, one pushed).
    #[inline]
    pub fn is_binary_operator(self) -> bool {
        (OpCode::Add as u16..=OpCode::Range as u16).contains(&(self as u16))
    }

    /// Whether this is a unary operator.
    #[inline]
    pub fn is_unary_operator(self) -> bool {
        matches!(self, OpCode::Not | OpCode::Negate | OpCode::Percent)
    }

    /// Whether this opcode is a callable function (including jump commands).
    #[inline]
    pub fn is_function(self) -> bool {
        self.is_jump_command() || (self as u16) >= OpCode::Pi as u16
    }

    /// Whether this function takes no arguments at all.
    #[inline]
    pub fn is_nullary_function(self) -> bool {
        (OpCode::Pi as u16..=OpCode::False as u16).contains(&(self as u16))
    }

    /// Minimum and maximum accepted argument count for a function opcode.
    ///
    /// Non-function opcodes report `(0, 0)`.
    pub fn arity(self) -> (u8, u8) {
        match self {
            OpCode::If => (1, 3),
            OpCode::Choose => (2, 31),
            op if op.is_nullary_function() => (0, 0),
            op if (OpCode::Abs as u16..=OpCode::ErrorType as u16).contains(&(op as u16)) => (1, 1),
            OpCode::Round | OpCode::Log => (1, 2),
            OpCode::Mod => (2, 2),
            OpCode::Left | OpCode::Right => (1, 2),
            OpCode::Mid => (3, 3),
            OpCode::EasterSunday => (1, 1),
            op if op.is_function() => (1, 255),
            _ => (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_covers_every_ordinal() {
        assert_eq!(OpCode::ALL.len(), OpCode::COUNT);
        for (i, op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(op.index(), i);
        }
    }

    #[test]
    fn from_u16_round_trips() {
        for &op in OpCode::ALL {
            assert_eq!(OpCode::from_u16(op as u16), Some(op));
        }
        assert_eq!(OpCode::from_u16(OpCode::COUNT as u16), None);
    }

    #[test]
    fn classification() {
        assert!(OpCode::If.is_jump_command());
        assert!(OpCode::Choose.is_jump_command());
        assert!(!OpCode::Sum.is_jump_command());

        assert!(OpCode::Add.is_binary_operator());
        assert!(OpCode::Range.is_binary_operator());
        assert!(!OpCode::Negate.is_binary_operator());

        assert!(OpCode::Sum.is_function());
        assert!(OpCode::If.is_function());
        assert!(!OpCode::Add.is_function());

        assert!(OpCode::Pi.is_nullary_function());
        assert!(!OpCode::Abs.is_nullary_function());
    }

    #[test]
    fn arity_bounds() {
        assert_eq!(OpCode::If.arity(), (1, 3));
        assert_eq!(OpCode::Abs.arity(), (1, 1));
        assert_eq!(OpCode::Mod.arity(), (2, 2));
        assert_eq!(OpCode::Sum.arity(), (1, 255));
        assert_eq!(OpCode::Pi.arity(), (0, 0));
        assert_eq!(OpCode::Add.arity(), (0, 0));
    }
}
