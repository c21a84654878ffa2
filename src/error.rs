//! The closed error taxonomy of Microsoft BASIC (spec §7).
//!
//! Every failure mode in the interpreter, tokenizer, evaluator, or
//! statement dispatcher reduces to one of these. There is no
//! `ON ERROR` recovery in the core; errors unwind to direct mode.

use std::fmt;

/// One of the fifteen BASIC error kinds, each with its two-letter short
/// code and long name from the reference dialect.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BasicError {
    #[error("SYNTAX")]
    SyntaxError,
    #[error("NEXT WITHOUT FOR")]
    NextWithoutFor,
    #[error("RETURN WITHOUT GOSUB")]
    ReturnWithoutGosub,
    #[error("OUT OF DATA")]
    OutOfData,
    #[error("ILLEGAL QUANTITY")]
    IllegalQuantity,
    #[error("OVERFLOW")]
    Overflow,
    #[error("OUT OF MEMORY")]
    OutOfMemory,
    #[error("UNDEFINED LINE")]
    UndefinedLine(u16),
    #[error("SUBSCRIPT OUT OF RANGE")]
    SubscriptOutOfRange,
    #[error("DIVISION BY ZERO")]
    DivisionByZero,
    #[error("ILLEGAL DIRECT")]
    IllegalDirect,
    #[error("TYPE MISMATCH")]
    TypeMismatch,
    #[error("STRING TOO LONG")]
    StringTooLong,
    #[error("UNDEFINED FUNCTION")]
    UndefinedFunction,
    #[error("REDIMENSIONED ARRAY")]
    RedimensionedArray,
    #[error("BREAK")]
    Break,
}

impl BasicError {
    /// The two-letter short code from spec §7.
    pub fn short_code(&self) -> &'static str {
        match self {
            BasicError::SyntaxError => "SN",
            BasicError::NextWithoutFor => "NF",
            BasicError::ReturnWithoutGosub => "RG",
            BasicError::OutOfData => "OD",
            BasicError::IllegalQuantity => "FC",
            BasicError::Overflow => "OV",
            BasicError::OutOfMemory => "OM",
            BasicError::UndefinedLine(_) => "UL",
            BasicError::SubscriptOutOfRange => "BS",
            BasicError::DivisionByZero => "DZ",
            BasicError::IllegalDirect => "ID",
            BasicError::TypeMismatch => "TM",
            BasicError::StringTooLong => "LS",
            BasicError::UndefinedFunction => "UF",
            BasicError::RedimensionedArray => "RD",
            BasicError::Break => "BK",
        }
    }
}

/// A `BasicError` tagged with the line active when it fired (direct-mode
/// errors carry `None`). `Display` renders `?<LONG NAME> ERROR IN <line>`,
/// matching §8 scenario 5's worked example (`?DIVISION BY ZERO ERROR IN 30`).
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: BasicError,
    pub line: Option<u16>,
}

impl RuntimeError {
    pub fn new(kind: BasicError, line: Option<u16>) -> Self {
        RuntimeError { kind, line }
    }

    pub fn direct(kind: BasicError) -> Self {
        RuntimeError { kind, line: None }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "?{} ERROR IN {}", self.kind, line),
            None => write!(f, "?{} ERROR", self.kind),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<BasicError> for RuntimeError {
    fn from(kind: BasicError) -> Self {
        RuntimeError::direct(kind)
    }
}

pub type Result<T> = std::result::Result<T, BasicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_the_long_name_not_the_short_code() {
        let err = RuntimeError::new(BasicError::DivisionByZero, Some(30));
        assert_eq!(err.to_string(), "?DIVISION BY ZERO ERROR IN 30");
    }

    #[test]
    fn display_without_a_line_omits_the_in_clause() {
        let err = RuntimeError::direct(BasicError::SyntaxError);
        assert_eq!(err.to_string(), "?SYNTAX ERROR");
    }
}
