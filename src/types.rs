//! Type descriptors for bound expressions.
//!
//! The engine never inspects host types through reflection. Instead the host
//! describes its element types up front: primitives are built in, domain types are
//! declared as [`EntityType`]s (optionally deriving from a base), and the binder
//! resolves textual type names through a [`TypeRegistry`] the host populates.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use indexmap::IndexMap;

use crate::record::RecordType;

/// Static type of an expression or a sequence element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Top type; every value is assignable to it
    Object,
    /// Type of the `null` literal
    Null,
    Boolean,
    Int32,
    Int64,
    Decimal,
    Double,
    Char,
    String,
    /// Nullable wrapper around a value type (`Int32?`)
    Nullable(Box<Type>),
    /// Homogeneous list (`List<T>`)
    List(Box<Type>),
    /// Host-declared nominal type
    Entity(Arc<EntityType>),
    /// Dynamic record synthesized for a `new(...)` projection
    Record(Arc<RecordType>),
}

/// How a value of one type is converted to another without an explicit cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Identity,
    /// Numeric widening (`Int32` to `Int64`, ...)
    Numeric,
    /// Wrapping into a nullable, possibly after numeric widening
    Lift,
    /// Entity up-cast or conversion to `Object`
    Reference,
    /// The `null` literal to a reference or nullable type
    NullLiteral,
}

impl Type {
    pub fn list(element: Type) -> Type {
        Type::List(Box::new(element))
    }

    pub fn entity(entity: &Arc<EntityType>) -> Type {
        Type::Entity(Arc::clone(entity))
    }

    /// Nullable form of this type. Reference types are already nullable.
    pub fn nullable(self) -> Type {
        if self.is_value_type() {
            Type::Nullable(Box::new(self))
        } else {
            self
        }
    }

    /// Strips one `Nullable` layer, if any.
    pub fn non_nullable(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Type::Boolean | Type::Int32 | Type::Int64 | Type::Decimal | Type::Double | Type::Char
        )
    }

    /// True when a value of this type may be null.
    pub fn is_nullable(&self) -> bool {
        !self.is_value_type()
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int32 | Type::Int64 | Type::Decimal | Type::Double)
    }

    /// Element type of a list.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(inner) => Some(inner),
            _ => None,
        }
    }

    /// True for types whose values can be ordered.
    pub fn is_comparable(&self) -> bool {
        matches!(
            self.non_nullable(),
            Type::Boolean
                | Type::Int32
                | Type::Int64
                | Type::Decimal
                | Type::Double
                | Type::Char
                | Type::String
                | Type::Object
                | Type::Null
        )
    }

    /// Implicit conversion from `self` to `target`, if one exists.
    pub fn conversion_to(&self, target: &Type) -> Option<Conversion> {
        if self == target {
            return Some(Conversion::Identity);
        }
        match (self, target) {
            (_, Type::Object) => Some(Conversion::Reference),
            (Type::Null, t) if t.is_nullable() => Some(Conversion::NullLiteral),
            (Type::Nullable(from), Type::Nullable(to)) => {
                widens_numeric(from, to).then_some(Conversion::Lift)
            }
            (from, Type::Nullable(to)) => {
                (from == to.as_ref() || widens_numeric(from, to)).then_some(Conversion::Lift)
            }
            (Type::Entity(from), Type::Entity(to)) => {
                from.is_subtype_of(to).then_some(Conversion::Reference)
            }
            (from, to) if widens_numeric(from, to) => Some(Conversion::Numeric),
            _ => None,
        }
    }

    pub fn converts_to(&self, target: &Type) -> bool {
        self.conversion_to(target).is_some()
    }

    /// A runtime value of type `self` may be used where `target` is expected.
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        match (self, target) {
            (Type::Null, _) => false,
            (from, Type::Nullable(to)) => from == to.as_ref(),
            (from, to) => matches!(
                from.conversion_to(to),
                Some(Conversion::Identity | Conversion::Reference)
            ),
        }
    }

    /// True when `self` is a strictly better conversion target than `other`, i.e.
    /// `self` converts implicitly to `other` but not the other way around.
    pub fn is_better_target_than(&self, other: &Type) -> bool {
        self.converts_to(other) && !other.converts_to(self)
    }

    /// Predefined type names that resolve without a registry entry.
    pub fn predefined(name: &str) -> Option<Type> {
        if let Some(inner) = name.strip_suffix('?') {
            return Type::predefined(inner.trim_end()).map(Type::nullable);
        }
        let ty = match name {
            "bool" | "Boolean" | "System.Boolean" => Type::Boolean,
            "int" | "Int32" | "System.Int32" => Type::Int32,
            "long" | "Int64" | "System.Int64" => Type::Int64,
            "decimal" | "Decimal" | "System.Decimal" => Type::Decimal,
            "double" | "Double" | "System.Double" | "float" | "Single" => Type::Double,
            "char" | "Char" | "System.Char" => Type::Char,
            "string" | "String" | "System.String" => Type::String,
            "object" | "Object" | "System.Object" => Type::Object,
            _ => return None,
        };
        Some(ty)
    }
}

fn numeric_rank(ty: &Type) -> Option<u8> {
    match ty {
        Type::Int32 => Some(0),
        Type::Int64 => Some(1),
        Type::Decimal => Some(2),
        Type::Double => Some(3),
        _ => None,
    }
}

/// Implicit numeric widening. Decimal and Double never convert into each other.
fn widens_numeric(from: &Type, to: &Type) -> bool {
    match (numeric_rank(from), numeric_rank(to)) {
        (Some(2), Some(3)) => false,
        (Some(f), Some(t)) => f < t,
        _ => false,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Object => write!(f, "Object"),
            Type::Null => write!(f, "null"),
            Type::Boolean => write!(f, "Boolean"),
            Type::Int32 => write!(f, "Int32"),
            Type::Int64 => write!(f, "Int64"),
            Type::Decimal => write!(f, "Decimal"),
            Type::Double => write!(f, "Double"),
            Type::Char => write!(f, "Char"),
            Type::String => write!(f, "String"),
            Type::Nullable(inner) => write!(f, "{}?", inner),
            Type::List(inner) => write!(f, "List<{}>", inner),
            Type::Entity(entity) => write!(f, "{}", entity.name()),
            Type::Record(record) => write!(f, "{}", record.name()),
        }
    }
}

/// A host-declared nominal type with named, typed members.
///
/// Entity types are compared by their full name. A derived type sees the members of
/// its base chain and is assignable to every type in it.
#[derive(Debug)]
pub struct EntityType {
    full_name: String,
    base: Option<Arc<EntityType>>,
    members: IndexMap<String, Type>,
}

impl EntityType {
    pub fn builder(full_name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder {
            full_name: full_name.into(),
            base: None,
            members: IndexMap::new(),
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Simple name: the last dot-separated segment of the full name.
    pub fn name(&self) -> &str {
        simple_name(&self.full_name)
    }

    pub fn base(&self) -> Option<&Arc<EntityType>> {
        self.base.as_ref()
    }

    /// Looks up a member on this type or its bases, returning the declared name.
    pub fn member(&self, name: &str, case_sensitive: bool) -> Option<(&str, &Type)> {
        let mut current = Some(self);
        while let Some(entity) = current {
            let found = if case_sensitive {
                entity.members.get_key_value(name)
            } else {
                entity
                    .members
                    .iter()
                    .find(|(member, _)| member.eq_ignore_ascii_case(name))
            };
            if let Some((member, ty)) = found {
                return Some((member.as_str(), ty));
            }
            current = entity.base.as_deref();
        }
        None
    }

    /// All members, base members first.
    pub fn members(&self) -> Vec<(&str, &Type)> {
        let mut all = match &self.base {
            Some(base) => base.members(),
            None => Vec::new(),
        };
        all.extend(self.members.iter().map(|(n, t)| (n.as_str(), t)));
        all
    }

    /// True when `self` is `other` or derives from it.
    pub fn is_subtype_of(&self, other: &EntityType) -> bool {
        let mut current = Some(self);
        while let Some(entity) = current {
            if entity == other {
                return true;
            }
            current = entity.base.as_deref();
        }
        false
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.full_name == other.full_name
    }
}

impl Eq for EntityType {}

impl Hash for EntityType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_name.hash(state);
    }
}

pub struct EntityTypeBuilder {
    full_name: String,
    base: Option<Arc<EntityType>>,
    members: IndexMap<String, Type>,
}

impl EntityTypeBuilder {
    pub fn extends(mut self, base: &Arc<EntityType>) -> Self {
        self.base = Some(Arc::clone(base));
        self
    }

    pub fn member(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.members.insert(name.into(), ty);
        self
    }

    pub fn build(self) -> Arc<EntityType> {
        Arc::new(EntityType {
            full_name: self.full_name,
            base: self.base,
            members: self.members,
        })
    }
}

fn simple_name(full_name: &str) -> &str {
    full_name.rsplit('.').next().unwrap_or(full_name)
}

/// Name to type mapping used to resolve type literals such as `OfType("Worker")`.
///
/// Entries are keyed by full name. Simple-name lookup scans all entries and reports
/// every match so the caller can detect ambiguity.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, Type>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type under its full name.
    pub fn register(&mut self, entity: &Arc<EntityType>) -> &mut Self {
        self.types
            .insert(entity.full_name().to_string(), Type::entity(entity));
        self
    }

    /// Registers any type under an explicit full name.
    pub fn register_as(&mut self, full_name: impl Into<String>, ty: Type) -> &mut Self {
        self.types.insert(full_name.into(), ty);
        self
    }

    pub fn with(mut self, entity: &Arc<EntityType>) -> Self {
        self.register(entity);
        self
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Exact full-name lookup.
    pub fn get(&self, full_name: &str, case_sensitive: bool) -> Option<&Type> {
        if case_sensitive {
            return self.types.get(full_name);
        }
        self.types
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(full_name))
            .map(|(_, ty)| ty)
    }

    /// Every registered type whose simple name matches `name`.
    pub fn find_by_simple_name(&self, name: &str, case_sensitive: bool) -> Vec<(&str, &Type)> {
        self.types
            .iter()
            .filter(|(full_name, _)| {
                let simple = simple_name(full_name);
                if case_sensitive {
                    simple == name
                } else {
                    simple.eq_ignore_ascii_case(name)
                }
            })
            .map(|(full_name, ty)| (full_name.as_str(), ty))
            .collect()
    }
}
