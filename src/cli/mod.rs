//! CLI support for dynaquery
//!
//! Runs filter, ordering and projection expressions against JSON rows so
//! expressions can be tried out without writing a host program.

mod check;
mod convert;

pub use check::{CheckOptions, CheckResult, execute_check};
pub use convert::{infer_type, json_to_value, json_to_value_as, value_to_json};

use std::io;

use thiserror::Error;

use crate::error::{ExecError, ParseError, QueryError};

/// Errors that can occur during CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("No input provided. Use --input or pipe JSON to stdin.")]
    NoInput,

    #[error("Nothing to check. Pass --filter, --order-by or --select.")]
    NoExpression,
}
