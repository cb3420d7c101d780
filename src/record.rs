//! Dynamic records: structural types synthesized for `new(...)` projections.
//!
//! A projection such as `new(Name as Name, Age * 2 as Double)` has no host type to
//! land in, so the binder asks the process-wide [`RecordTypeRegistry`] for the record
//! type of the signature `[(Name, String), (Double, Int32)]`. Equal signatures always
//! yield the same `Arc<RecordType>`, which makes record types comparable by identity
//! and record values comparable structurally.

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use once_cell::sync::Lazy;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::{types::Type, value::Value};

/// Ordered `(property name, property type)` pairs identifying a record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordSignature(Vec<(String, Type)>);

impl RecordSignature {
    pub fn new(fields: Vec<(String, Type)>) -> Self {
        RecordSignature(fields)
    }

    pub fn fields(&self) -> &[(String, Type)] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<(S, Type)> for RecordSignature {
    fn from_iter<I: IntoIterator<Item = (S, Type)>>(iter: I) -> Self {
        RecordSignature(iter.into_iter().map(|(n, t)| (n.into(), t)).collect())
    }
}

/// A synthesized record type. Two record types are equal only if they are the same
/// registry entry.
#[derive(Debug)]
pub struct RecordType {
    id: u64,
    name: String,
    signature: RecordSignature,
    index: HashMap<String, usize>,
}

impl RecordType {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &RecordSignature {
        &self.signature
    }

    pub fn fields(&self) -> &[(String, Type)] {
        self.signature.fields()
    }

    /// Position and type of a property.
    pub fn field(&self, name: &str, case_sensitive: bool) -> Option<(usize, &str, &Type)> {
        let slot = if case_sensitive {
            self.index.get(name).copied()
        } else {
            self.fields()
                .iter()
                .position(|(field, _)| field.eq_ignore_ascii_case(name))
        }?;
        let (field, ty) = &self.fields()[slot];
        Some((slot, field.as_str(), ty))
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RecordType {}

impl Hash for RecordType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Process-wide interning table from signature to record type.
///
/// Entries are never evicted. Creating a new entry takes the write lock after an
/// upgradable-read double check, so concurrent requests for one novel signature
/// converge on a single type.
pub struct RecordTypeRegistry {
    types: RwLock<HashMap<RecordSignature, Arc<RecordType>>>,
    next_id: AtomicU64,
}

static GLOBAL_RECORD_TYPES: Lazy<RecordTypeRegistry> = Lazy::new(RecordTypeRegistry::new);

impl RecordTypeRegistry {
    fn new() -> Self {
        RecordTypeRegistry {
            types: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn global() -> &'static RecordTypeRegistry {
        &GLOBAL_RECORD_TYPES
    }

    /// Returns the record type for `signature`, creating it on first request.
    pub fn get_or_create(&self, signature: RecordSignature) -> Arc<RecordType> {
        if let Some(existing) = self.types.read().get(&signature) {
            return Arc::clone(existing);
        }

        let guard = self.types.upgradable_read();
        if let Some(existing) = guard.get(&signature) {
            return Arc::clone(existing);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let index = signature
            .fields()
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        let record = Arc::new(RecordType {
            id,
            name: format!("DynamicClass{}", id),
            signature: signature.clone(),
            index,
        });
        tracing::trace!(record = %record.name, fields = signature.fields().len(), "registered dynamic record type");

        let mut types = RwLockUpgradableReadGuard::upgrade(guard);
        types.insert(signature, Arc::clone(&record));
        record
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An instance of a [`RecordType`]. Values are stored in declared order.
#[derive(Debug, Clone)]
pub struct DynamicRecord {
    ty: Arc<RecordType>,
    values: Arc<[Value]>,
}

impl DynamicRecord {
    /// Creates a record. `values` must line up with the type's fields.
    pub fn new(ty: Arc<RecordType>, values: Vec<Value>) -> Self {
        debug_assert_eq!(ty.fields().len(), values.len());
        DynamicRecord {
            ty,
            values: values.into(),
        }
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.ty
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get_index(&self, slot: usize) -> &Value {
        self.values.get(slot).unwrap_or(&Value::Null)
    }

    /// Property value by exact name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.ty.index.get(name).map(|slot| &self.values[*slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.ty
            .fields()
            .iter()
            .map(|(name, _)| name.as_str())
            .zip(self.values.iter())
    }
}

impl PartialEq for DynamicRecord {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.ty, &other.ty) && self.values == other.values
    }
}

impl Eq for DynamicRecord {}

impl Hash for DynamicRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.id.hash(state);
        for value in self.values.iter() {
            value.hash(state);
        }
    }
}

impl fmt::Display for DynamicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            let sep = if i > 0 { "," } else { "" };
            write!(f, "{} {}={}", sep, name, value)?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_signature_same_type() {
        let registry = RecordTypeRegistry::new();
        let a = registry.get_or_create([("Id", Type::Int32), ("Label", Type::String)].into_iter().collect());
        let b = registry.get_or_create([("Id", Type::Int32), ("Label", Type::String)].into_iter().collect());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_field_order_matters() {
        let registry = RecordTypeRegistry::new();
        let a = registry.get_or_create([("Id", Type::Int32), ("Label", Type::String)].into_iter().collect());
        let b = registry.get_or_create([("Label", Type::String), ("Id", Type::Int32)].into_iter().collect());
        assert_ne!(a, b);
    }

    #[test]
    fn test_structural_equality() {
        let registry = RecordTypeRegistry::new();
        let ty = registry.get_or_create([("Id", Type::Int32)].into_iter().collect());
        let a = DynamicRecord::new(Arc::clone(&ty), vec![Value::Int32(1)]);
        let b = DynamicRecord::new(Arc::clone(&ty), vec![Value::Int32(1)]);
        let c = DynamicRecord::new(ty, vec![Value::Int32(2)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get("Id"), Some(&Value::Int32(1)));
    }
}
