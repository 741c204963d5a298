//! Evaluation errors

use thiserror::Error;

/// Reasons an expression cannot be evaluated
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("empty expression")]
    Empty,

    #[error("invalid character '{0}'")]
    InvalidCharacter(char),

    #[error("unexpected '{token}' at position {position}")]
    UnexpectedToken { token: char, position: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("missing ')' at position {0}")]
    UnclosedParenthesis(usize),

    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;
