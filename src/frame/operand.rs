/// One item of a command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Encoded as its low byte.
    Int(i64),
    /// Encoded as `1` or `0`.
    Bool(bool),
    /// Encoded as Latin-1, one byte per character, no terminator.
    Text(String),
    /// Appended verbatim.
    Block(Vec<u8>),
}

impl From<u8> for Operand {
    fn from(value: u8) -> Self {
        Operand::Int(value.into())
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Int(value.into())
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Int(value)
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::Bool(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Text(value.to_string())
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Operand::Text(value)
    }
}

impl From<Vec<u8>> for Operand {
    fn from(value: Vec<u8>) -> Self {
        Operand::Block(value)
    }
}

impl From<&[u8]> for Operand {
    fn from(value: &[u8]) -> Self {
        Operand::Block(value.to_vec())
    }
}

/// Builds a `Vec<Operand>` from a list of values that convert into `Operand`.
///
/// ```
/// use printclaim::operands;
/// use printclaim::frame::Operand;
///
/// let ops = operands![0x1b, 0x40, "hi", true];
/// assert_eq!(ops[2], Operand::Text("hi".to_string()));
/// ```
#[macro_export]
macro_rules! operands {
    ($($operand:expr),* $(,)?) => {
        vec![$($crate::frame::Operand::from($operand)),*]
    };
}
