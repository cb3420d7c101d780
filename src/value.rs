use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::{
    record::DynamicRecord,
    types::{EntityType, Type},
};

/// A runtime value flowing through compiled queries.
///
/// Numeric kinds are kept apart (`Int32`, `Int64`, `Decimal`, `Double`) so the
/// binder's promotion rules survive into evaluation: by the time two values meet in
/// an operator they have already been converted to the same kind.
///
/// # Examples
///
/// ```
/// use dynaquery::{EntityType, Type, Value};
///
/// let user = EntityType::builder("App.User")
///     .member("Name", Type::String)
///     .member("Age", Type::Int32)
///     .build();
///
/// let alice = Value::entity(&user, [("Name", Value::from("Alice")), ("Age", Value::from(31))]);
/// assert_eq!(alice.runtime_type(), Type::entity(&user));
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Decimal(Decimal),
    Double(f64),
    Char(char),
    String(String),
    List(Arc<Vec<Value>>),
    Entity(Arc<EntityInstance>),
    Record(DynamicRecord),
}

/// An instance of a host-declared [`EntityType`].
#[derive(Debug, Clone)]
pub struct EntityInstance {
    ty: Arc<EntityType>,
    fields: IndexMap<String, Value>,
}

impl EntityInstance {
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.ty
    }

    /// Field value by declared name; unset fields read as null.
    pub fn get(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&Value::Null)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for EntityInstance {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.fields == other.fields
    }
}

impl Value {
    /// Builds an entity instance value.
    pub fn entity<I, K>(ty: &Arc<EntityType>, fields: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Entity(Arc::new(EntityInstance {
            ty: Arc::clone(ty),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(items))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The dynamic type of this value. Lists report the type of their first
    /// non-null element, or `Object` when that cannot be determined.
    pub fn runtime_type(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Boolean(_) => Type::Boolean,
            Value::Int32(_) => Type::Int32,
            Value::Int64(_) => Type::Int64,
            Value::Decimal(_) => Type::Decimal,
            Value::Double(_) => Type::Double,
            Value::Char(_) => Type::Char,
            Value::String(_) => Type::String,
            Value::List(items) => {
                let element = items
                    .iter()
                    .find(|v| !v.is_null())
                    .map(Value::runtime_type)
                    .unwrap_or(Type::Object);
                Type::list(element)
            }
            Value::Entity(instance) => Type::entity(instance.entity_type()),
            Value::Record(record) => Type::Record(Arc::clone(record.record_type())),
        }
    }

    /// Human readable runtime type name, used in error messages.
    pub fn type_name(&self) -> String {
        self.runtime_type().to_string()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (String(a), String(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Entity(a), Entity(b)) => Arc::ptr_eq(a, b) || a == b,
            (Record(a), Record(b)) => a == b,
            _ => false,
        }
    }
}

// Doubles compare by IEEE equality; NaN keys simply never match.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int32(n) => n.hash(state),
            Value::Int64(n) => n.hash(state),
            Value::Decimal(d) => d.normalize().hash(state),
            // -0.0 and 0.0 are equal and must hash alike
            Value::Double(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                n.to_bits().hash(state)
            }
            Value::Char(c) => c.hash(state),
            Value::String(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            Value::Entity(instance) => {
                instance.ty.hash(state);
                for (name, value) in &instance.fields {
                    name.hash(state);
                    value.hash(state);
                }
            }
            Value::Record(record) => record.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int32(n) => write!(f, "{}", n),
            Value::Int64(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Double(n) => write!(f, "{}", n),
            Value::Char(c) => write!(f, "{}", c),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Entity(instance) => {
                write!(f, "{} {{", instance.ty.name())?;
                for (i, (name, value)) in instance.fields().enumerate() {
                    let sep = if i > 0 { "," } else { "" };
                    write!(f, "{} {} = {}", sep, name, value)?;
                }
                write!(f, " }}")
            }
            Value::Record(record) => write!(f, "{}", record),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
