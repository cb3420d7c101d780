// tests/config_tests.rs

use std::sync::Arc;
use std::time::Duration;

use dynaquery::config::DEFAULT_TOKENIZE_TIMEOUT;
use dynaquery::{
    EntityType, ExtensibilityPoint, ParsingConfig, Queryable, Type, TypeRegistry, Value,
    compile_filter,
};
use pretty_assertions::assert_eq;

fn pet() -> Arc<EntityType> {
    EntityType::builder("Zoo.Pet")
        .member("Name", Type::String)
        .member("Owner", Type::String)
        .build()
}

// ============================================================================
// Builder
// ============================================================================

#[test]
fn test_builder_defaults() {
    let config = ParsingConfig::builder().build();
    assert!(!config.resolve_types_by_simple_name());
    assert!(!config.null_propagation());
    assert!(!config.case_sensitive());
    assert_eq!(config.tokenize_timeout(), DEFAULT_TOKENIZE_TIMEOUT);
    assert!(config.type_registry().is_empty());
}

#[test]
fn test_zero_timeout_falls_back() {
    let config = ParsingConfig::builder().tokenize_timeout(Duration::ZERO).build();
    assert_eq!(config.tokenize_timeout(), DEFAULT_TOKENIZE_TIMEOUT);

    let config = ParsingConfig::builder()
        .tokenize_timeout(Duration::from_millis(250))
        .build();
    assert_eq!(config.tokenize_timeout(), Duration::from_millis(250));
}

#[test]
fn test_to_builder_keeps_settings() {
    let original = ParsingConfig::builder()
        .case_sensitive(true)
        .type_registry(TypeRegistry::new().with(&pet()))
        .build();
    let derived = original.to_builder().null_propagation(true).build();
    assert!(derived.case_sensitive());
    assert!(derived.null_propagation());
    assert_eq!(derived.type_registry().len(), 1);
    assert!(!original.null_propagation());
}

#[test]
fn test_identity_optimizer_by_default() {
    let config = ParsingConfig::default();
    assert!(format!("{:?}", config.extensibility()).contains("identity"));

    let custom = ExtensibilityPoint::with_optimizer(|query| query);
    assert!(format!("{:?}", custom).contains("custom"));
}

// ============================================================================
// Process-wide default
// ============================================================================

// The only test in this binary that touches the process default.
#[test]
fn test_configure_and_reset_default() {
    let stray = Value::entity(&pet(), [("Name", Value::from("Rex")), ("Owner", Value::Null)]);
    let pets = Queryable::from_vec(Type::entity(&pet()), vec![stray.clone()]);

    assert!(pets.filter("Owner.Length > 0", &[]).unwrap().to_vec().is_err());

    ParsingConfig::configure_default(|builder| builder.null_propagation(true));
    assert!(ParsingConfig::default_config().null_propagation());
    let filtered = pets.filter("Owner.Length > 0", &[]).unwrap().to_vec().unwrap();
    assert_eq!(filtered, Vec::<Value>::new());

    ParsingConfig::configure_default(|builder| builder.tokenize_timeout(Duration::ZERO));
    assert_eq!(ParsingConfig::default_config().tokenize_timeout(), DEFAULT_TOKENIZE_TIMEOUT);
    assert!(ParsingConfig::default_config().null_propagation());

    ParsingConfig::reset_default();
    assert!(!ParsingConfig::default_config().null_propagation());
    let predicate = compile_filter("Owner == null", &Type::entity(&pet()), &[], None).unwrap();
    assert!(predicate.test(&stray).unwrap());
}
