//! Run dynamic expressions against JSON rows

use super::{CliError, infer_type, json_to_value, json_to_value_as, value_to_json};
use crate::{Parser, ParsingConfig, Queryable, Value};

/// Options for the check command
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Boolean expression rows must satisfy
    pub filter: Option<String>,
    /// Ordering clause, e.g. `Name, Price DESC`
    pub order_by: Option<String>,
    /// Projection applied last
    pub select: Option<String>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    /// JSON values bound to `@0`, `@1`, ...
    pub args: Vec<String>,
    /// JSON input string
    pub input: Option<String>,
    /// Pretty-print the output
    pub pretty: bool,
    /// Only validate syntax, don't execute
    pub syntax_only: bool,
}

impl CheckOptions {
    fn has_expression(&self) -> bool {
        self.filter.is_some() || self.order_by.is_some() || self.select.is_some()
    }
}

/// Result of a check operation
#[derive(Debug)]
pub enum CheckResult {
    /// Syntax validation passed
    SyntaxValid,
    /// Query executed successfully with JSON output
    Success(serde_json::Value),
}

/// Execute a check operation
pub fn execute_check(options: &CheckOptions) -> Result<CheckResult, CliError> {
    let config = ParsingConfig::default_config();

    if options.syntax_only {
        if !options.has_expression() {
            return Err(CliError::NoExpression);
        }
        for expression in [&options.filter, &options.select].into_iter().flatten() {
            Parser::from_source(expression, &config)?.parse()?;
        }
        if let Some(ordering) = &options.order_by {
            Parser::from_source(ordering, &config)?.parse_ordering()?;
        }
        return Ok(CheckResult::SyntaxValid);
    }

    let json_str = options.input.as_ref().ok_or(CliError::NoInput)?;
    let json: serde_json::Value = serde_json::from_str(json_str)?;

    // a single object is a one-row input
    let rows: Vec<&serde_json::Value> = match &json {
        serde_json::Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let element_type = infer_type("Row", &rows);
    let items = rows
        .iter()
        .map(|row| json_to_value_as(row, &element_type))
        .collect();

    let args = options
        .args
        .iter()
        .enumerate()
        .map(|(i, arg)| {
            let json: serde_json::Value = serde_json::from_str(arg)?;
            Ok(json_to_value(&format!("Arg{}", i), &json))
        })
        .collect::<Result<Vec<Value>, CliError>>()?;

    tracing::debug!(rows = rows.len(), element = %element_type, "loaded input");

    let mut query = Queryable::from_vec(element_type, items);
    if let Some(filter) = &options.filter {
        query = query.filter(filter, &args)?;
    }
    if let Some(ordering) = &options.order_by {
        query = query.order_by(ordering, &args)?;
    }
    if let Some(count) = options.skip {
        query = query.skip(count)?;
    }
    if let Some(count) = options.take {
        query = query.take(count)?;
    }
    if let Some(selector) = &options.select {
        query = query.select(selector, &args)?;
    }

    let results = query.to_vec()?;
    let output = serde_json::Value::Array(results.iter().map(value_to_json).collect());
    Ok(CheckResult::Success(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(options: CheckOptions) -> serde_json::Value {
        match execute_check(&options).unwrap() {
            CheckResult::Success(output) => output,
            CheckResult::SyntaxValid => panic!("expected output"),
        }
    }

    #[test]
    fn test_filter_order_and_project() {
        let output = run(CheckOptions {
            filter: Some("Price > 2".into()),
            order_by: Some("Price DESC".into()),
            select: Some("new(Name, Price * 2 as Twice)".into()),
            input: Some(r#"[{"Name":"pen","Price":1.5},{"Name":"ink","Price":9},{"Name":"pad","Price":4}]"#.into()),
            ..Default::default()
        });
        assert_eq!(
            output,
            json!([{"Name": "ink", "Twice": 18.0}, {"Name": "pad", "Twice": 8.0}])
        );
    }

    #[test]
    fn test_external_arguments() {
        let output = run(CheckOptions {
            filter: Some("@0.Contains(Name)".into()),
            args: vec![r#"["a","c"]"#.into()],
            input: Some(r#"[{"Name":"a"},{"Name":"b"},{"Name":"c"}]"#.into()),
            ..Default::default()
        });
        assert_eq!(output, json!([{"Name": "a"}, {"Name": "c"}]));
    }

    #[test]
    fn test_syntax_only() {
        let options = CheckOptions {
            filter: Some("Name == \"x\"".into()),
            order_by: Some("Name DESC".into()),
            syntax_only: true,
            ..Default::default()
        };
        assert!(matches!(execute_check(&options), Ok(CheckResult::SyntaxValid)));

        let options = CheckOptions {
            filter: Some("Name ===".into()),
            syntax_only: true,
            ..Default::default()
        };
        assert!(matches!(execute_check(&options), Err(CliError::Parse(_))));
    }

    #[test]
    fn test_missing_input() {
        let options = CheckOptions {
            filter: Some("true".into()),
            ..Default::default()
        };
        assert!(matches!(execute_check(&options), Err(CliError::NoInput)));
    }
}
