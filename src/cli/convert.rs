//! JSON <-> Value conversion utilities
//!
//! JSON carries no schema, so element types are inferred from the rows
//! themselves: every object key becomes a member whose type fits all values seen
//! under that key.

use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Number};

use crate::{
    types::{EntityType, Type},
    value::Value,
};

/// Infers one type that every value in `values` converts to. Objects become entity
/// types named after `name`, nested keys extending the name with `.Key`.
pub fn infer_type(name: &str, values: &[&serde_json::Value]) -> Type {
    let mut inferred: Option<Type> = None;
    let mut saw_null = false;

    for value in values {
        let ty = match value {
            serde_json::Value::Null => {
                saw_null = true;
                continue;
            }
            serde_json::Value::Bool(_) => Type::Boolean,
            serde_json::Value::Number(n) => number_type(n),
            serde_json::Value::String(_) => Type::String,
            serde_json::Value::Array(_) => Type::list(Type::Object),
            serde_json::Value::Object(_) => Type::Object,
        };
        inferred = Some(match inferred {
            None => ty,
            Some(previous) => merge(previous, ty),
        });
    }

    let ty = match inferred {
        None => return Type::Object,
        Some(Type::List(_)) => {
            let items: Vec<&serde_json::Value> = values
                .iter()
                .filter_map(|v| v.as_array())
                .flatten()
                .collect();
            Type::list(infer_type(name, &items))
        }
        Some(Type::Object) if values.iter().all(|v| v.is_object() || v.is_null()) => {
            infer_entity(name, values)
        }
        Some(ty) => ty,
    };

    if saw_null && ty.is_value_type() {
        ty.nullable()
    } else {
        ty
    }
}

fn number_type(n: &Number) -> Type {
    match n.as_i64() {
        Some(i) if i32::try_from(i).is_ok() => Type::Int32,
        Some(_) => Type::Int64,
        None => Type::Double,
    }
}

fn merge(a: Type, b: Type) -> Type {
    match (a, b) {
        (a, b) if a == b => a,
        (Type::Int32, Type::Int64) | (Type::Int64, Type::Int32) => Type::Int64,
        (a, b) if a.is_numeric() && b.is_numeric() => Type::Double,
        (Type::List(_), Type::List(_)) => Type::list(Type::Object),
        _ => Type::Object,
    }
}

fn infer_entity(name: &str, values: &[&serde_json::Value]) -> Type {
    let objects: Vec<&Map<String, serde_json::Value>> =
        values.iter().filter_map(|v| v.as_object()).collect();

    let mut keys: Vec<&str> = Vec::new();
    for object in &objects {
        for key in object.keys() {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
    }

    let mut builder = EntityType::builder(name);
    for key in keys {
        let column: Vec<&serde_json::Value> = objects
            .iter()
            .map(|o| o.get(key).unwrap_or(&serde_json::Value::Null))
            .collect();
        // a key missing from some rows reads as null there
        let ty = infer_type(&format!("{}.{}", name, key), &column);
        builder = builder.member(key, ty);
    }
    Type::entity(&builder.build())
}

/// Converts JSON to a value typed by [`infer_type`] over that single value.
pub fn json_to_value(name: &str, json: &serde_json::Value) -> Value {
    let ty = infer_type(name, &[json]);
    json_to_value_as(json, &ty)
}

/// Converts JSON to a value of `ty`, so numbers land in the kind the binder expects.
pub fn json_to_value_as(json: &serde_json::Value, ty: &Type) -> Value {
    match (json, ty.non_nullable()) {
        (serde_json::Value::Null, _) => Value::Null,
        (serde_json::Value::Bool(b), _) => Value::Boolean(*b),
        (serde_json::Value::Number(n), target) => number_value(n, target),
        (serde_json::Value::String(s), _) => Value::String(s.clone()),
        (serde_json::Value::Array(items), target) => {
            let element = target.element_type().cloned().unwrap_or(Type::Object);
            Value::list(items.iter().map(|v| json_to_value_as(v, &element)).collect())
        }
        (serde_json::Value::Object(object), Type::Entity(entity)) => {
            let fields = entity.members().into_iter().map(|(name, member_ty)| {
                let value = object
                    .get(name)
                    .map(|v| json_to_value_as(v, member_ty))
                    .unwrap_or(Value::Null);
                (name.to_string(), value)
            });
            Value::entity(entity, fields.collect::<Vec<_>>())
        }
        (serde_json::Value::Object(_), _) => json_to_value("Object", json),
    }
}

fn number_value(n: &Number, target: &Type) -> Value {
    let int = n.as_i64();
    match (target, int) {
        (Type::Int32, Some(i)) => i32::try_from(i).map(Value::Int32).unwrap_or(Value::Int64(i)),
        (Type::Int64, Some(i)) => Value::Int64(i),
        (Type::Object, Some(i)) => match i32::try_from(i) {
            Ok(small) => Value::Int32(small),
            Err(_) => Value::Int64(i),
        },
        _ => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
    }
}

/// Converts a query result back to JSON. Entities and records become objects in
/// member order.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Int32(n) => serde_json::Value::Number((*n).into()),
        Value::Int64(n) => serde_json::Value::Number((*n).into()),
        Value::Decimal(d) => d
            .to_f64()
            .and_then(Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(d.to_string())),
        Value::Double(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Char(c) => serde_json::Value::String(c.to_string()),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Entity(instance) => serde_json::Value::Object(
            instance
                .fields()
                .map(|(k, v)| (k.to_string(), value_to_json(v)))
                .collect(),
        ),
        Value::Record(record) => serde_json::Value::Object(
            record
                .iter()
                .map(|(k, v)| (k.to_string(), value_to_json(v)))
                .collect(),
        ),
    }
}
