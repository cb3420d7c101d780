//! Error types for the query engine.
//!
//! Two failure domains exist and they never mix:
//!
//! - [`ParseError`] covers everything that is a property of the expression text:
//!   lexing, parsing, binding and compiling. It always carries the byte offset of
//!   the offending token.
//! - [`ExecError`] covers data-dependent failures raised while a compiled query is
//!   enumerated, such as a `Cast` hitting an element of the wrong type.

use thiserror::Error;

/// A lexical, syntactic, binding or compile-time failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (at index {position})")]
pub struct ParseError {
    /// Human readable description
    pub message: String,
    /// Byte offset into the expression text
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        ParseError {
            message: message.into(),
            position,
        }
    }
}

/// A failure raised while enumerating or evaluating a compiled query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    #[error("Unable to cast object of type '{from}' to type '{to}'")]
    InvalidCast { from: String, to: String },

    #[error("Null reference while accessing '{member}'")]
    NullReference { member: String },

    #[error("Index {index} is out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("Division by zero")]
    DivideByZero,

    #[error("Arithmetic overflow in {0}")]
    Overflow(String),

    #[error("Sequence contains no elements")]
    NoElements,

    #[error("Sequence contains more than one element")]
    MoreThanOneElement,

    #[error("Query provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Optimizer returned a {actual} where a {expected} was expected")]
    OptimizerVariant {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Error type of the fluent [`Queryable`](crate::Queryable) API, which both compiles
/// and executes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),
}

pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ParseError::new("Expression expected", 7);
        assert_eq!(err.to_string(), "Expression expected (at index 7)");

        let err = ExecError::InvalidCast {
            from: "Person".into(),
            to: "Worker".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unable to cast object of type 'Person' to type 'Worker'"
        );

        let err: QueryError = ExecError::NoElements.into();
        assert_eq!(err.to_string(), "Execution error: Sequence contains no elements");
    }
}
