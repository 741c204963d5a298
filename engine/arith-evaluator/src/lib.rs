//! # Arithmetic Evaluator
//!
//! Evaluates `+ - * /` expressions with parentheses over non-negative integer
//! literals, in either 64-bit integer or floating-point arithmetic.
//!
//! The `calc-evaluator` binary wraps [`evaluate`] as a stdin/stdout process so
//! the calculation gateway can run it in isolation.
//!
//! ```rust
//! use arith_evaluator::evaluate;
//! use calc_protocol::Mode;
//!
//! assert_eq!(evaluate("3 + 2 * (5 - 1)", Mode::Integer).unwrap(), "11");
//! assert_eq!(evaluate("3 / 2", Mode::Float).unwrap(), "1.5");
//! assert!(evaluate("3 / 0", Mode::Integer).is_err());
//! ```

pub mod error;
pub mod parser;

pub use error::{EvalError, EvalResult};
pub use parser::{Arith, Parser, MAX_DEPTH};

use calc_protocol::Mode;

/// Characters an expression may contain
pub fn is_allowed(c: char) -> bool {
    c.is_ascii_digit() || c.is_ascii_whitespace() || matches!(c, '(' | ')' | '*' | '+' | '/' | '-')
}

/// Evaluate `input` in the given mode and render the result as text
pub fn evaluate(input: &str, mode: Mode) -> EvalResult<String> {
    let expression = input.trim();
    if expression.is_empty() {
        return Err(EvalError::Empty);
    }

    if let Some(c) = expression.chars().find(|c| !is_allowed(*c)) {
        return Err(EvalError::InvalidCharacter(c));
    }

    let parser = Parser::new(expression);
    match mode {
        Mode::Integer => parser.parse::<i64>().map(|v| v.to_string()),
        Mode::Float => parser.parse::<f64>().map(|v| v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_integer_and_float_rendering() {
        assert_eq!(evaluate("3 + 2", Mode::Integer).unwrap(), "5");
        assert_eq!(evaluate("3 / 2", Mode::Integer).unwrap(), "1");
        assert_eq!(evaluate("3 / 2", Mode::Float).unwrap(), "1.5");
        assert_eq!(evaluate("4 / 2", Mode::Float).unwrap(), "2");
        assert_eq!(evaluate("1 - 3", Mode::Integer).unwrap(), "-2");
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert_eq!(evaluate("\n  7 * 6 \n", Mode::Integer).unwrap(), "42");
    }

    #[test]
    fn test_empty_input_rejected() {
        assert_eq!(evaluate("", Mode::Integer), Err(EvalError::Empty));
        assert_eq!(evaluate("   \n", Mode::Float), Err(EvalError::Empty));
    }

    #[test]
    fn test_invalid_characters_rejected() {
        assert_eq!(evaluate("2 ^ 3", Mode::Integer), Err(EvalError::InvalidCharacter('^')));
        assert_eq!(evaluate("1.5 + 1", Mode::Float), Err(EvalError::InvalidCharacter('.')));
        assert_eq!(evaluate("x", Mode::Integer), Err(EvalError::InvalidCharacter('x')));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(evaluate("1 / 0", Mode::Integer).unwrap_err().to_string(), "division by zero");
        assert_eq!(
            evaluate("2 ^ 3", Mode::Integer).unwrap_err().to_string(),
            "invalid character '^'"
        );
    }

    proptest! {
        #[test]
        fn prop_integer_addition_matches_native(a in 0i64..1_000_000, b in 0i64..1_000_000) {
            prop_assert_eq!(evaluate(&format!("{a} + {b}"), Mode::Integer).unwrap(), (a + b).to_string());
        }

        #[test]
        fn prop_integer_division_truncates(a in 0i64..1_000_000, b in 1i64..1_000) {
            prop_assert_eq!(evaluate(&format!("{a} / {b}"), Mode::Integer).unwrap(), (a / b).to_string());
        }

        #[test]
        fn prop_precedence(a in 0i64..1000, b in 0i64..1000, c in 0i64..1000) {
            let expected = a - b * c;
            prop_assert_eq!(evaluate(&format!("{a} - {b} * {c}"), Mode::Integer).unwrap(), expected.to_string());
            let grouped = (a - b) * c;
            prop_assert_eq!(evaluate(&format!("({a} - {b}) * {c}"), Mode::Integer).unwrap(), grouped.to_string());
        }

        #[test]
        fn prop_float_division_matches_native(a in 0u32..1_000_000, b in 1u32..1_000) {
            let expected = (a as f64 / b as f64).to_string();
            prop_assert_eq!(evaluate(&format!("{a} / {b}"), Mode::Float).unwrap(), expected);
        }

        #[test]
        fn prop_never_panics(input in "[0-9()*+/ -]{0,64}") {
            let _ = evaluate(&input, Mode::Integer);
            let _ = evaluate(&input, Mode::Float);
        }
    }
}
