// tests/query_tests.rs

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use dynaquery::{
    CompiledQuery, EntityType, ExecError, ExtensibilityPoint, Predicate, QueryError,
    QueryOperation, QueryProvider, Queryable, QueryableAnalyzer, ParsingConfig, Selector, Type,
    TypeRegistry, Value, compile_filter,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;

// ============================================================================
// Fixtures
// ============================================================================

fn product_type() -> Arc<EntityType> {
    EntityType::builder("Shop.Product")
        .member("ProductId", Type::Int32)
        .member("Name", Type::String)
        .member("Price", Type::Decimal)
        .member("Quantity", Type::Int32)
        .build()
}

fn product(ty: &Arc<EntityType>, id: i32, name: &str, cents: i64, quantity: i32) -> Value {
    Value::entity(
        ty,
        [
            ("ProductId", Value::from(id)),
            ("Name", Value::from(name)),
            ("Price", Value::from(Decimal::new(cents, 2))),
            ("Quantity", Value::from(quantity)),
        ],
    )
}

fn products() -> Queryable {
    let ty = product_type();
    let items = vec![
        product(&ty, 3, "pen", 150, 10),
        product(&ty, 1, "ink", 900, 0),
        product(&ty, 2, "pen", 175, 4),
        product(&ty, 4, "pad", 420, 7),
    ];
    Queryable::from_vec(Type::entity(&ty), items)
}

fn field(value: &Value, name: &str) -> Value {
    match value {
        Value::Entity(instance) => instance.get(name).clone(),
        Value::Record(record) => record.get(name).cloned().unwrap_or(Value::Null),
        other => panic!("Expected entity or record, got: {:?}", other),
    }
}

fn ids(values: &[Value]) -> Vec<i32> {
    values
        .iter()
        .map(|v| match field(v, "ProductId") {
            Value::Int32(id) => id,
            other => panic!("Expected Int32 id, got: {:?}", other),
        })
        .collect()
}

// ============================================================================
// Filtering
// ============================================================================

fn price(v: &Value) -> Decimal {
    match field(v, "Price") {
        Value::Decimal(d) => d,
        other => panic!("Expected Decimal price, got: {:?}", other),
    }
}

fn quantity(v: &Value) -> i32 {
    match field(v, "Quantity") {
        Value::Int32(n) => n,
        other => panic!("Expected Int32 quantity, got: {:?}", other),
    }
}

fn name(v: &Value) -> String {
    field(v, "Name").to_string()
}

fn pricier_than_two(v: &Value) -> bool {
    price(v) > Decimal::from(2)
}

fn sold_out_or_p(v: &Value) -> bool {
    quantity(v) == 0 || name(v).starts_with('p')
}

fn short_name_and_stock_value(v: &Value) -> bool {
    name(v).len() == 3 && price(v) * Decimal::from(quantity(v)) >= Decimal::from(10)
}

fn conditional_price(v: &Value) -> bool {
    if quantity(v) > 5 {
        price(v) < Decimal::from(2)
    } else {
        price(v) > Decimal::from(4)
    }
}

#[rstest]
#[case("Price > 2", pricier_than_two)]
#[case("Quantity == 0 || Name.StartsWith(\"p\")", sold_out_or_p)]
#[case("Name.Length == 3 && Price * Quantity >= 10", short_name_and_stock_value)]
#[case("iif(Quantity > 5, Price < 2, Price > 4)", conditional_price)]
fn test_compiled_filter_matches_native(#[case] expression: &str, #[case] native: fn(&Value) -> bool) {
    let source = products();
    let compiled = compile_filter(expression, source.element_type(), &[], None).unwrap();

    let mut matched = 0;
    for item in source.to_vec().unwrap() {
        let expected = native(&item);
        assert_eq!(compiled.test(&item).unwrap(), expected, "{} on {}", expression, item);
        matched += usize::from(expected);
    }
    assert_eq!(source.filter(expression, &[]).unwrap().count().unwrap(), matched);
}

#[test]
fn test_filter_keeps_element_type() {
    let source = products();
    let cheap = source.filter("Price < 2", &[]).unwrap();
    assert_eq!(cheap.element_type(), source.element_type());
    assert_eq!(ids(&cheap.to_vec().unwrap()), vec![3, 2]);
}

#[test]
fn test_external_parameter_list() {
    let names = Value::list(vec![Value::from("ink"), Value::from("pad")]);
    let found = products().filter("@0.Contains(Name)", &[names]).unwrap();
    assert_eq!(ids(&found.to_vec().unwrap()), vec![1, 4]);
}

#[test]
fn test_external_record_list() {
    let pairs = |expression: &str| products().select(expression, &[]).unwrap().to_vec().unwrap();
    let picked = pairs("new(Name as N, Quantity as Q)");

    let wanted = Value::list(vec![picked[1].clone(), picked[3].clone()]);
    let found = products()
        .filter("@0.Contains(new(Name as N, Quantity as Q))", &[wanted])
        .unwrap();
    assert_eq!(ids(&found.to_vec().unwrap()), vec![1, 4]);

    let shifted = Value::list(pairs("new(Name as N, Quantity + 100 as Q)"));
    let found = products()
        .filter("@0.Contains(new(Name as N, Quantity as Q))", &[shifted])
        .unwrap();
    assert_eq!(found.count().unwrap(), 0);

    let swapped = Value::list(pairs("new(Quantity as Q, Name as N)"));
    let err = products()
        .filter("@0.Contains(new(Name as N, Quantity as Q))", &[swapped])
        .unwrap_err();
    assert!(err.to_string().contains("No applicable overload of method 'Contains'"));

    let reordered = products().select("new(Quantity as Q, Name as N)", &[]).unwrap();
    assert!(!reordered.contains(&picked[1]).unwrap());
}

#[test]
fn test_filter_must_be_boolean() {
    let err = products().filter("Price", &[]).unwrap_err();
    let QueryError::Parse(err) = err else {
        panic!("Expected parse error, got: {:?}", err);
    };
    assert_eq!(err.message, "Expression of type 'Boolean' expected, found 'Decimal'");
}

#[rstest]
#[case("Name ===", 7)]
#[case("Foo.Bar.Baz", 0)]
#[case("Price > \"x\"", 6)]
fn test_errors_carry_positions(#[case] expression: &str, #[case] position: usize) {
    match products().filter(expression, &[]) {
        Err(QueryError::Parse(err)) => assert_eq!(err.position, position, "{}", err),
        other => panic!("Expected parse error, got: {:?}", other.map(|_| ())),
    }
}

// ============================================================================
// Ordering and partitioning
// ============================================================================

#[test]
fn test_multi_key_ordering() {
    let ordered = products().order_by("Name, ProductId", &[]).unwrap();
    assert_eq!(ids(&ordered.to_vec().unwrap()), vec![1, 4, 2, 3]);

    let ordered = products().order_by("Name desc, Price", &[]).unwrap();
    assert_eq!(ids(&ordered.to_vec().unwrap()), vec![3, 2, 4, 1]);
}

#[test]
fn test_ordering_is_stable() {
    let ordered = products().order_by("Name.Length", &[]).unwrap();
    assert_eq!(ids(&ordered.to_vec().unwrap()), vec![3, 1, 2, 4]);
}

#[test]
fn test_skip_take_reverse() {
    let source = products();
    let page = source
        .order_by("ProductId", &[])
        .unwrap()
        .skip(1)
        .unwrap()
        .take(2)
        .unwrap();
    assert_eq!(page.element_type(), source.element_type());
    assert_eq!(ids(&page.to_vec().unwrap()), vec![2, 3]);
    assert_eq!(ids(&page.reverse().unwrap().to_vec().unwrap()), vec![3, 2]);
}

// ============================================================================
// Projection
// ============================================================================

#[test]
fn test_projection_to_scalar() {
    let names = products().select("Name.ToUpper()", &[]).unwrap();
    assert_eq!(names.element_type(), &Type::String);
    assert_eq!(
        names.to_vec().unwrap(),
        vec!["PEN", "INK", "PEN", "PAD"].into_iter().map(Value::from).collect::<Vec<_>>()
    );
}

#[test]
fn test_projection_to_record() {
    let projected = products()
        .select("new(Name, Price * Quantity as Total)", &[])
        .unwrap();
    let Type::Record(record_type) = projected.element_type() else {
        panic!("Expected record type, got: {}", projected.element_type());
    };
    let fields: Vec<(&str, &Type)> = record_type
        .fields()
        .iter()
        .map(|(n, t)| (n.as_str(), t))
        .collect();
    assert_eq!(fields, vec![("Name", &Type::String), ("Total", &Type::Decimal)]);

    let rows = projected.to_vec().unwrap();
    assert_eq!(field(&rows[0], "Total"), Value::from(Decimal::new(1500, 2)));

    let again = products()
        .select("new(Name, Price * Quantity as Total)", &[])
        .unwrap();
    assert_eq!(again.element_type(), projected.element_type());
    assert!(again.contains(&rows[3]).unwrap());
}

#[test]
fn test_overflow_surfaces_at_enumeration() {
    let scaled = products().select("Quantity * 1000000000", &[]).unwrap();
    assert_eq!(
        scaled.to_vec(),
        Err(ExecError::Overflow("Int32 multiplication".into()))
    );
}

// ============================================================================
// Terminal operators
// ============================================================================

#[test]
fn test_element_operators() {
    let source = products();
    assert_eq!(field(&source.first(Some("Name == \"pen\""), &[]).unwrap(), "ProductId"), Value::from(3));
    assert_eq!(field(&source.last(Some("Name == \"pen\""), &[]).unwrap(), "ProductId"), Value::from(2));
    assert_eq!(field(&source.single(Some("Quantity == 0"), &[]).unwrap(), "ProductId"), Value::from(1));

    assert_eq!(source.first_or_default(Some("Price > 100"), &[]).unwrap(), None);
    assert_eq!(
        source.first(Some("Price > 100"), &[]),
        Err(QueryError::Exec(ExecError::NoElements))
    );
    assert_eq!(
        source.single(Some("Name == \"pen\""), &[]),
        Err(QueryError::Exec(ExecError::MoreThanOneElement))
    );
}

#[test]
fn test_count_any_contains() {
    let source = products();
    assert_eq!(source.count().unwrap(), 4);
    assert!(source.any().unwrap());
    assert!(!source.filter("Price > 100", &[]).unwrap().any().unwrap());

    let ink = source.single(Some("ProductId == 1"), &[]).unwrap();
    assert!(source.contains(&ink).unwrap());
    assert!(!source.contains(&Value::Null).unwrap());
}

#[test]
fn test_pipelines_are_lazy_and_repeatable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let source = Queryable::from_fn(Type::Int32, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        (1..=5).map(Value::from).collect()
    });

    let evens = source.filter("it % 2 == 0", &[]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(evens.to_vec().unwrap(), vec![Value::from(2), Value::from(4)]);
    assert_eq!(evens.count().unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Null propagation
// ============================================================================

fn orders_with_customers() -> Queryable {
    let customer = EntityType::builder("Shop.Customer")
        .member("Name", Type::String)
        .build();
    let order = EntityType::builder("Shop.Order")
        .member("Id", Type::Int32)
        .member("Customer", Type::entity(&customer))
        .build();
    let items = vec![
        Value::entity(&order, [("Id", Value::from(1)), ("Customer", Value::entity(&customer, [("Name", Value::from("Ann"))]))]),
        Value::entity(&order, [("Id", Value::from(2)), ("Customer", Value::Null)]),
    ];
    Queryable::from_vec(Type::entity(&order), items)
}

#[test]
fn test_null_member_access_fails_without_propagation() {
    let named = orders_with_customers()
        .filter("Customer.Name == \"Ann\"", &[])
        .unwrap();
    assert_eq!(
        named.to_vec(),
        Err(ExecError::NullReference {
            member: "Name".into()
        })
    );
}

#[test]
fn test_null_propagation() {
    let named = orders_with_customers()
        .filter("np(Customer.Name) == \"Ann\"", &[])
        .unwrap();
    assert_eq!(named.count().unwrap(), 1);

    let config = ParsingConfig::builder().null_propagation(true).build();
    let names = orders_with_customers()
        .with_config(config)
        .select("Customer.Name ?? \"(none)\"", &[])
        .unwrap();
    assert_eq!(
        names.to_vec().unwrap(),
        vec![Value::from("Ann"), Value::from("(none)")]
    );
}

// ============================================================================
// OfType and Cast
// ============================================================================

fn people() -> Queryable {
    let person = EntityType::builder("Hr.Person")
        .member("Name", Type::String)
        .build();
    let worker = EntityType::builder("Hr.Worker")
        .extends(&person)
        .member("Salary", Type::Int32)
        .build();
    let items = vec![
        Value::entity(&person, [("Name", Value::from("Ann"))]),
        Value::entity(&worker, [("Name", Value::from("Bob")), ("Salary", Value::from(100))]),
        Value::entity(&worker, [("Name", Value::from("Cid")), ("Salary", Value::from(300))]),
    ];
    let config = ParsingConfig::builder()
        .type_registry(TypeRegistry::new().with(&person).with(&worker))
        .resolve_types_by_simple_name(true)
        .build();
    Queryable::from_vec(Type::entity(&person), items).with_config(config)
}

#[test]
fn test_of_type_narrows_element_type() {
    let workers = people().of_type("Worker").unwrap();
    assert_eq!(workers.element_type().to_string(), "Worker");

    let rich = workers.filter("Salary > 200", &[]).unwrap();
    assert_eq!(rich.select("Name", &[]).unwrap().to_vec().unwrap(), vec![Value::from("Cid")]);
}

#[test]
fn test_cast_fails_during_enumeration() {
    let cast = people().cast("Hr.Worker").unwrap();
    assert_eq!(
        cast.to_vec(),
        Err(ExecError::InvalidCast {
            from: "Person".into(),
            to: "Worker".into()
        })
    );

    let workers = people().skip(1).unwrap().cast("Worker").unwrap();
    assert_eq!(workers.count().unwrap(), 2);
}

#[test]
fn test_type_tests_in_expressions() {
    let source = people();
    assert_eq!(source.filter("it is Worker", &[]).unwrap().count().unwrap(), 2);
    assert_eq!(source.filter("is(\"Worker\")", &[]).unwrap().count().unwrap(), 2);
    assert_eq!(source.filter("as(Worker) == null", &[]).unwrap().count().unwrap(), 1);
}

#[test]
fn test_unknown_type_name() {
    let err = people().of_type("Robot").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Parse error: Type 'Robot' could not be resolved (at index 0)"
    );
}

// ============================================================================
// GroupJoin
// ============================================================================

fn customers_and_orders() -> (Queryable, Queryable) {
    let customer = EntityType::builder("Crm.Customer")
        .member("Id", Type::Int32)
        .member("Name", Type::String)
        .build();
    let order = EntityType::builder("Crm.Order")
        .member("CustomerId", Type::Int64)
        .member("Amount", Type::Int32)
        .build();
    let customers = vec![
        Value::entity(&customer, [("Id", Value::from(1)), ("Name", Value::from("Ann"))]),
        Value::entity(&customer, [("Id", Value::from(2)), ("Name", Value::from("Bob"))]),
    ];
    let orders = vec![
        Value::entity(&order, [("CustomerId", Value::from(1i64)), ("Amount", Value::from(5))]),
        Value::entity(&order, [("CustomerId", Value::from(1i64)), ("Amount", Value::from(7))]),
        Value::entity(&order, [("CustomerId", Value::Null), ("Amount", Value::from(1))]),
    ];
    (
        Queryable::from_vec(Type::entity(&customer), customers),
        Queryable::from_vec(Type::entity(&order), orders),
    )
}

#[test]
fn test_group_join() {
    let (customers, orders) = customers_and_orders();
    let joined = customers
        .group_join(
            &orders,
            "Id",
            "CustomerId",
            "new(outer.Name as Name, inner.Count() as Orders, inner.Sum(Amount) as Total)",
            &[],
        )
        .unwrap();

    let rows = joined.to_vec().unwrap();
    let summary: Vec<(Value, Value, Value)> = rows
        .iter()
        .map(|r| (field(r, "Name"), field(r, "Orders"), field(r, "Total")))
        .collect();
    assert_eq!(
        summary,
        vec![
            (Value::from("Ann"), Value::from(2), Value::from(12)),
            (Value::from("Bob"), Value::from(0), Value::from(0)),
        ]
    );
}

#[test]
fn test_group_join_key_types_must_match() {
    let (customers, orders) = customers_and_orders();
    let err = customers
        .group_join(&orders, "Name", "CustomerId", "it", &[])
        .unwrap_err();
    let QueryError::Parse(err) = err else {
        panic!("Expected parse error, got: {:?}", err);
    };
    assert_eq!(
        err.message,
        "The outer key type 'String' is not compatible with the inner key type 'Int64'"
    );
    assert_eq!(err.position, 0);
}

#[rstest]
#[case("null", "CustomerId", 0)]
#[case("Id", "  null", 2)]
fn test_group_join_rejects_null_keys(
    #[case] outer_key: &str,
    #[case] inner_key: &str,
    #[case] position: usize,
) {
    let (customers, orders) = customers_and_orders();
    let err = customers
        .group_join(&orders, outer_key, inner_key, "it", &[])
        .unwrap_err();
    let QueryError::Parse(err) = err else {
        panic!("Expected parse error, got: {:?}", err);
    };
    assert_eq!(err.message, "A GroupJoin key cannot be the null literal");
    assert_eq!(err.position, position);
}

// ============================================================================
// Optimizer and providers
// ============================================================================

#[test]
fn test_optimizer_can_replace_predicate() {
    let config = ParsingConfig::builder()
        .extensibility(ExtensibilityPoint::with_optimizer(|query| match query {
            CompiledQuery::Predicate(_) => CompiledQuery::Predicate(Predicate::from_fn(|item| {
                Ok(matches!(item, Value::Int32(n) if *n > 3))
            })),
            other => other,
        }))
        .build();
    let source = Queryable::from_vec(Type::Int32, (1..=5).map(Value::from).collect()).with_config(config);
    let filtered = source.filter("true", &[]).unwrap();
    assert_eq!(filtered.to_vec().unwrap(), vec![Value::from(4), Value::from(5)]);
}

#[test]
fn test_optimizer_must_keep_variant() {
    let config = ParsingConfig::builder()
        .extensibility(ExtensibilityPoint::with_optimizer(|_| {
            CompiledQuery::Selector(Selector::from_fn(Type::Int32, |item| Ok(item.clone())))
        }))
        .build();
    let source = Queryable::from_vec(Type::Int32, vec![Value::from(1)]).with_config(config);
    assert_eq!(
        source.filter("it > 0", &[]).unwrap_err(),
        QueryError::Exec(ExecError::OptimizerVariant {
            expected: "Predicate",
            actual: "Selector"
        })
    );
}

#[derive(Default)]
struct RecordingProvider {
    seen: Mutex<Vec<String>>,
}

impl QueryProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_in_memory(&self) -> bool {
        false
    }

    fn translate(&self, source: &Queryable, operation: &QueryOperation) -> Result<Queryable, ExecError> {
        let label = match operation {
            QueryOperation::Where { predicate, .. } => format!("where {}", predicate),
            QueryOperation::Take(count) => format!("take {}", count),
            other => format!("{:?}", other),
        };
        self.seen.lock().push(label);
        Ok(source.clone())
    }
}

#[test]
fn test_remote_sources_go_to_provider() {
    let provider = Arc::new(RecordingProvider::default());
    let source = Queryable::from_vec(Type::Int32, vec![Value::from(1), Value::from(2)])
        .with_provider(provider.clone());

    // Operations are handed over verbatim, even ones that would not bind.
    let translated = source
        .filter("NoSuchMember > 1", &[])
        .unwrap()
        .take(1)
        .unwrap();
    assert_eq!(
        *provider.seen.lock(),
        vec!["where NoSuchMember > 1".to_string(), "take 1".to_string()]
    );
    assert_eq!(translated.count().unwrap(), 2);
}

#[derive(Debug)]
struct NothingInMemory;

impl QueryableAnalyzer for NothingInMemory {
    fn supports_in_memory(&self, _source: &Queryable) -> bool {
        false
    }
}

#[test]
fn test_analyzer_routes_to_provider() {
    let config = ParsingConfig::builder()
        .queryable_analyzer(Some(Arc::new(NothingInMemory)))
        .build();
    let source = Queryable::from_vec(Type::Int32, (1..=4).map(Value::from).collect()).with_config(config);

    // The in-memory provider evaluates what it is handed.
    let evens = source.filter("it % 2 == 0", &[]).unwrap();
    assert_eq!(evens.to_vec().unwrap(), vec![Value::from(2), Value::from(4)]);

    let err = source.filter("it +", &[]).unwrap_err();
    assert!(matches!(err, QueryError::Exec(ExecError::Provider { ref provider, .. }) if provider == "in-memory"));
}
