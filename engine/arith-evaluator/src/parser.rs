//! Recursive-descent parser for `+ - * /` expressions with parentheses
//!
//! Grammar:
//!
//! ```text
//! expr   = term   (('+' | '-') term)*
//! term   = factor (('*' | '/') factor)*
//! factor = number | '(' expr ')'
//! ```
//!
//! Unary signs are not part of the grammar.

use crate::error::{EvalError, EvalResult};

/// Maximum parenthesis nesting
pub const MAX_DEPTH: usize = 256;

/// Number domain the parser evaluates in
pub trait Arith: Sized + Copy {
    fn from_digits(digits: &str) -> EvalResult<Self>;
    fn add(self, rhs: Self) -> EvalResult<Self>;
    fn sub(self, rhs: Self) -> EvalResult<Self>;
    fn mul(self, rhs: Self) -> EvalResult<Self>;
    fn div(self, rhs: Self) -> EvalResult<Self>;
}

impl Arith for i64 {
    fn from_digits(digits: &str) -> EvalResult<Self> {
        digits.parse().map_err(|_| EvalError::Overflow)
    }

    fn add(self, rhs: Self) -> EvalResult<Self> {
        self.checked_add(rhs).ok_or(EvalError::Overflow)
    }

    fn sub(self, rhs: Self) -> EvalResult<Self> {
        self.checked_sub(rhs).ok_or(EvalError::Overflow)
    }

    fn mul(self, rhs: Self) -> EvalResult<Self> {
        self.checked_mul(rhs).ok_or(EvalError::Overflow)
    }

    // Truncates toward zero
    fn div(self, rhs: Self) -> EvalResult<Self> {
        if rhs == 0 {
            return Err(EvalError::DivisionByZero);
        }
        self.checked_div(rhs).ok_or(EvalError::Overflow)
    }
}

impl Arith for f64 {
    fn from_digits(digits: &str) -> EvalResult<Self> {
        digits.parse().map_err(|_| EvalError::Overflow)
    }

    fn add(self, rhs: Self) -> EvalResult<Self> {
        finite(self + rhs)
    }

    fn sub(self, rhs: Self) -> EvalResult<Self> {
        finite(self - rhs)
    }

    fn mul(self, rhs: Self) -> EvalResult<Self> {
        finite(self * rhs)
    }

    fn div(self, rhs: Self) -> EvalResult<Self> {
        if rhs == 0.0 {
            return Err(EvalError::DivisionByZero);
        }
        finite(self / rhs)
    }
}

fn finite(value: f64) -> EvalResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::Overflow)
    }
}

pub struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input: input.as_bytes(), pos: 0, depth: 0 }
    }

    /// Parse the whole input as one expression
    pub fn parse<T: Arith>(mut self) -> EvalResult<T> {
        let value = self.expression()?;
        self.skip_spaces();

        match self.peek() {
            None => Ok(value),
            Some(c) => Err(EvalError::UnexpectedToken { token: c as char, position: self.pos }),
        }
    }

    fn expression<T: Arith>(&mut self) -> EvalResult<T> {
        let mut value: T = self.term()?;

        loop {
            self.skip_spaces();
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    value = value.add(self.term()?)?;
                }
                Some(b'-') => {
                    self.pos += 1;
                    value = value.sub(self.term()?)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term<T: Arith>(&mut self) -> EvalResult<T> {
        let mut value: T = self.factor()?;

        loop {
            self.skip_spaces();
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    value = value.mul(self.factor()?)?;
                }
                Some(b'/') => {
                    self.pos += 1;
                    value = value.div(self.factor()?)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor<T: Arith>(&mut self) -> EvalResult<T> {
        self.skip_spaces();

        match self.peek() {
            Some(b'(') => {
                self.depth += 1;
                if self.depth > MAX_DEPTH {
                    return Err(EvalError::TooDeep(MAX_DEPTH));
                }

                self.pos += 1;
                let value = self.expression()?;
                self.skip_spaces();

                if self.peek() != Some(b')') {
                    return Err(EvalError::UnclosedParenthesis(self.pos));
                }
                self.pos += 1;
                self.depth -= 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() => self.number(),
            Some(c) => Err(EvalError::UnexpectedToken { token: c as char, position: self.pos }),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn number<T: Arith>(&mut self) -> EvalResult<T> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }

        // Only ASCII digits were consumed
        let digits = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| EvalError::UnexpectedEnd)?;
        T::from_digits(digits)
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }
}
