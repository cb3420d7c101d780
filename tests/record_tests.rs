// tests/record_tests.rs

use std::collections::HashSet;
use std::sync::Arc;

use dynaquery::{
    DynamicRecord, EntityType, RecordSignature, RecordTypeRegistry, Type, Value, compile_projection,
};
use pretty_assertions::assert_eq;

fn book() -> Arc<EntityType> {
    EntityType::builder("Library.Book")
        .member("Title", Type::String)
        .member("Pages", Type::Int32)
        .build()
}

fn project(expression: &str, item: &Value) -> DynamicRecord {
    let selector = compile_projection(expression, &Type::entity(&book()), &[], None)
        .unwrap_or_else(|e| panic!("Failed to compile '{}': {}", expression, e));
    match selector.select(item).unwrap() {
        Value::Record(record) => record,
        other => panic!("Expected record, got: {:?}", other),
    }
}

fn dune() -> Value {
    Value::entity(
        &book(),
        [("Title", Value::from("Dune")), ("Pages", Value::from(412))],
    )
}

// ============================================================================
// Type interning
// ============================================================================

#[test]
fn test_equal_signatures_share_one_type() {
    let signature: RecordSignature = [("Isbn", Type::String), ("Copies", Type::Int64)]
        .into_iter()
        .collect();
    let registry = RecordTypeRegistry::global();
    let a = registry.get_or_create(signature.clone());
    let b = registry.get_or_create(signature);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(a.name().starts_with("DynamicClass"));
}

#[test]
fn test_field_order_and_types_distinguish_records() {
    let registry = RecordTypeRegistry::global();
    let base = registry.get_or_create([("Shelf", Type::Int32), ("Row", Type::Int32)].into_iter().collect());
    let swapped = registry.get_or_create([("Row", Type::Int32), ("Shelf", Type::Int32)].into_iter().collect());
    let widened = registry.get_or_create([("Shelf", Type::Int64), ("Row", Type::Int32)].into_iter().collect());
    assert_ne!(base.id(), swapped.id());
    assert_ne!(base.id(), widened.id());
}

#[test]
fn test_projections_reuse_registered_types() {
    let a = project("new(Title, Pages * 2 as Sides)", &dune());
    let b = project("new(Title as Title, Pages + Pages as Sides)", &dune());
    assert!(Arc::ptr_eq(a.record_type(), b.record_type()));
    assert_eq!(a, b);
}

#[test]
fn test_concurrent_requests_converge() {
    let handles: Vec<_> = (0..8)
        .map(|_| {
            std::thread::spawn(|| {
                RecordTypeRegistry::global()
                    .get_or_create([("Racer", Type::Char), ("Lap", Type::Int32)].into_iter().collect())
                    .id()
            })
        })
        .collect();
    let ids: HashSet<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 1);
}

// ============================================================================
// Record values
// ============================================================================

#[test]
fn test_record_access_and_display() {
    let record = project("new(Title, Pages)", &dune());
    assert_eq!(record.get("Pages"), Some(&Value::Int32(412)));
    assert_eq!(record.get("pages"), None);
    let names: Vec<&str> = record.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["Title", "Pages"]);
    assert_eq!(record.to_string(), "{ Title=Dune, Pages=412 }");
}

#[test]
fn test_records_hash_structurally() {
    let first = Value::Record(project("new(Title)", &dune()));
    let second = Value::Record(project("new(Title)", &dune()));
    let set: HashSet<Value> = [first, second].into_iter().collect();
    assert_eq!(set.len(), 1);
}

#[test]
fn test_record_runtime_type() {
    let record = project("new(Pages as Count)", &dune());
    let Type::Record(ty) = Value::Record(record.clone()).runtime_type() else {
        panic!("Expected record type");
    };
    assert!(Arc::ptr_eq(&ty, record.record_type()));
    assert_eq!(ty.field("count", false).map(|(slot, name, _)| (slot, name)), Some((0, "Count")));
}
