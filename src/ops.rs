//! Runtime value operations shared by compiled programs: arithmetic, comparison,
//! implicit conversion, type tests and aggregates.
//!
//! The binder has already brought operands to a common kind, so the arms here only
//! see matching pairs. Mixed pairs can still reach [`compare_values`] when values
//! are typed `Object`; those compare numerically through `f64`.

use std::cmp::Ordering;

use rust_decimal::{Decimal, prelude::ToPrimitive};

use crate::{ast::BinOp, error::ExecError, types::Type, value::Value};

fn overflow(kind: &str, op: BinOp) -> ExecError {
    ExecError::Overflow(format!("{} {}", kind, op_name(op)))
}

fn op_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "addition",
        BinOp::Subtract => "subtraction",
        BinOp::Multiply => "multiplication",
        BinOp::Divide => "division",
        BinOp::Modulo => "remainder",
        _ => "operation",
    }
}

macro_rules! checked_integer {
    ($kind:literal, $op:expr, $a:expr, $b:expr, $variant:path) => {{
        let (a, b) = ($a, $b);
        let result = match $op {
            BinOp::Add => a.checked_add(b),
            BinOp::Subtract => a.checked_sub(b),
            BinOp::Multiply => a.checked_mul(b),
            BinOp::Divide | BinOp::Modulo if b == 0 => return Err(ExecError::DivideByZero),
            BinOp::Divide => a.checked_div(b),
            BinOp::Modulo => a.checked_rem(b),
            _ => None,
        };
        result.map($variant).ok_or_else(|| overflow($kind, $op))
    }};
}

/// Applies an arithmetic operator. A null operand yields null (lifted operators).
pub fn apply_arithmetic(op: BinOp, left: &Value, right: &Value) -> Result<Value, ExecError> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int32(a), Value::Int32(b)) => checked_integer!("Int32", op, *a, *b, Value::Int32),
        (Value::Int64(a), Value::Int64(b)) => checked_integer!("Int64", op, *a, *b, Value::Int64),
        (Value::Decimal(a), Value::Decimal(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Subtract => a.checked_sub(b),
                BinOp::Multiply => a.checked_mul(b),
                BinOp::Divide | BinOp::Modulo if b.is_zero() => {
                    return Err(ExecError::DivideByZero);
                }
                BinOp::Divide => a.checked_div(b),
                BinOp::Modulo => a.checked_rem(b),
                _ => None,
            };
            result.map(Value::Decimal).ok_or_else(|| overflow("Decimal", op))
        }
        (Value::Double(a), Value::Double(b)) => {
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Subtract => a - b,
                BinOp::Multiply => a * b,
                BinOp::Divide => a / b,
                BinOp::Modulo => a % b,
                _ => return Err(overflow("Double", op)),
            };
            Ok(Value::Double(result))
        }
        (a, b) => Err(ExecError::InvalidCast {
            from: b.type_name(),
            to: a.type_name(),
        }),
    }
}

pub fn negate(value: &Value) -> Result<Value, ExecError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int32(n) => n
            .checked_neg()
            .map(Value::Int32)
            .ok_or_else(|| ExecError::Overflow("Int32 negation".into())),
        Value::Int64(n) => n
            .checked_neg()
            .map(Value::Int64)
            .ok_or_else(|| ExecError::Overflow("Int64 negation".into())),
        Value::Decimal(d) => Ok(Value::Decimal(-*d)),
        Value::Double(n) => Ok(Value::Double(-n)),
        other => Err(ExecError::InvalidCast {
            from: other.type_name(),
            to: "Double".into(),
        }),
    }
}

/// String concatenation; null operands contribute nothing.
pub fn concat(left: &Value, right: &Value) -> Value {
    let mut result = String::new();
    for value in [left, right] {
        if !value.is_null() {
            result.push_str(&value.to_string());
        }
    }
    Value::String(result)
}

/// Total order used for sorting: nulls first, numbers numerically, strings ordinally.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
        (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
        (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Char(a), Value::Char(b)) => a.cmp(b),
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        (a, b) => match (as_f64(a), as_f64(b)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int32(n) => Some(f64::from(*n)),
        Value::Int64(n) => n.to_f64(),
        Value::Decimal(d) => d.to_f64(),
        Value::Double(n) => Some(*n),
        _ => None,
    }
}

/// Relational operators. Any comparison involving null is false.
pub fn apply_relational(op: BinOp, left: &Value, right: &Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Boolean(false);
    }
    let ordering = compare_values(left, right);
    let result = match op {
        BinOp::LessThan => ordering == Ordering::Less,
        BinOp::LessEqual => ordering != Ordering::Greater,
        BinOp::GreaterThan => ordering == Ordering::Greater,
        BinOp::GreaterEqual => ordering != Ordering::Less,
        _ => false,
    };
    Value::Boolean(result)
}

/// Implicit conversion to `target`: numeric widening, nullable lifting is a no-op.
pub fn convert(value: Value, target: &Type) -> Value {
    match (value, target.non_nullable()) {
        (Value::Int32(n), Type::Int64) => Value::Int64(i64::from(n)),
        (Value::Int32(n), Type::Decimal) => Value::Decimal(Decimal::from(n)),
        (Value::Int32(n), Type::Double) => Value::Double(f64::from(n)),
        (Value::Int64(n), Type::Decimal) => Value::Decimal(Decimal::from(n)),
        (Value::Int64(n), Type::Double) => Value::Double(n as f64),
        (value, _) => value,
    }
}

/// Runtime type test behind `is`, `as`, `OfType` and `Cast`. Null is never an instance.
pub fn is_instance(value: &Value, target: &Type) -> bool {
    !value.is_null() && value.runtime_type().is_assignable_to(target)
}

/// Checked conversion behind `Cast`. Null passes for targets that admit it.
pub fn cast(value: &Value, target: &Type) -> Result<Value, ExecError> {
    if is_instance(value, target) || (value.is_null() && target.is_nullable()) {
        return Ok(value.clone());
    }
    Err(ExecError::InvalidCast {
        from: value.type_name(),
        to: target.to_string(),
    })
}

pub(crate) fn count_value(count: usize) -> Result<Value, ExecError> {
    i32::try_from(count)
        .map(Value::Int32)
        .map_err(|_| ExecError::Overflow("Int32 count".into()))
}

fn zero_of(ty: &Type) -> Value {
    match ty.non_nullable() {
        Type::Int64 => Value::Int64(0),
        Type::Decimal => Value::Decimal(Decimal::ZERO),
        Type::Double => Value::Double(0.0),
        _ => Value::Int32(0),
    }
}

/// Sum of the non-null values; an empty input sums to zero.
pub fn sum<I>(values: I, ty: &Type) -> Result<Value, ExecError>
where
    I: IntoIterator<Item = Value>,
{
    values
        .into_iter()
        .filter(|v| !v.is_null())
        .try_fold(zero_of(ty), |total, v| apply_arithmetic(BinOp::Add, &total, &v))
}

/// Mean of the non-null values in the kind of `result`.
pub fn average<I>(values: I, result: &Type) -> Result<Value, ExecError>
where
    I: IntoIterator<Item = Value>,
{
    let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    if values.is_empty() {
        return if result.is_value_type() {
            Err(ExecError::NoElements)
        } else {
            Ok(Value::Null)
        };
    }
    let count = values.len();

    match result.non_nullable() {
        Type::Decimal => {
            let total = sum(values, &Type::Decimal)?;
            let divisor = Decimal::from(count);
            apply_arithmetic(BinOp::Divide, &total, &Value::Decimal(divisor))
        }
        _ => {
            let total: f64 = values.iter().filter_map(as_f64).sum();
            Ok(Value::Double(total / count as f64))
        }
    }
}

/// Smallest (`wanted == Less`) or largest (`Greater`) non-null value.
pub fn extreme<I>(values: I, ty: &Type, wanted: Ordering) -> Result<Value, ExecError>
where
    I: IntoIterator<Item = Value>,
{
    let best = values
        .into_iter()
        .filter(|v| !v.is_null())
        .reduce(|best, v| {
            if compare_values(&v, &best) == wanted {
                v
            } else {
                best
            }
        });
    match best {
        Some(value) => Ok(value),
        None if ty.is_value_type() => Err(ExecError::NoElements),
        None => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_overflow_is_reported() {
        let err = apply_arithmetic(BinOp::Add, &Value::Int32(i32::MAX), &Value::Int32(1));
        assert_eq!(err, Err(ExecError::Overflow("Int32 addition".into())));
    }

    #[test]
    fn test_division_by_zero() {
        let err = apply_arithmetic(BinOp::Divide, &Value::Int64(1), &Value::Int64(0));
        assert_eq!(err, Err(ExecError::DivideByZero));
        let ok = apply_arithmetic(BinOp::Divide, &Value::Double(1.0), &Value::Double(0.0));
        assert_eq!(ok, Ok(Value::Double(f64::INFINITY)));
    }

    #[test]
    fn test_nulls_sort_first() {
        let mut values = vec![Value::Int32(2), Value::Null, Value::Int32(1)];
        values.sort_by(compare_values);
        assert_eq!(values, vec![Value::Null, Value::Int32(1), Value::Int32(2)]);
    }

    #[test]
    fn test_average_of_integers_is_double() {
        let values = [1, 2].map(Value::Int32);
        assert_eq!(average(values, &Type::Double), Ok(Value::Double(1.5)));
        assert_eq!(average(Vec::new(), &Type::Double), Err(ExecError::NoElements));
        assert_eq!(average(Vec::new(), &Type::Double.nullable()), Ok(Value::Null));
    }

    #[test]
    fn test_widening_conversion() {
        assert_eq!(convert(Value::Int32(3), &Type::Int64), Value::Int64(3));
        assert_eq!(convert(Value::Int32(3), &Type::Decimal.nullable()), Value::Decimal(Decimal::from(3)));
        assert_eq!(convert(Value::Null, &Type::Int64.nullable()), Value::Null);
    }
}
