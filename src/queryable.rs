//! # Queryable
//!
//! Lazy, re-enumerable query pipelines over element sequences.
//!
//! A [`Queryable`] pairs a source with its static element type. Shaping operators
//! (`filter`, `select`, `order_by`, ...) compile their expression immediately, so
//! a bad expression fails at the call, but nothing is evaluated until the pipeline
//! is enumerated. Every enumeration re-runs the pipeline from the source.
//!
//! ```
//! use dynaquery::{EntityType, Queryable, Type, Value};
//!
//! let product = EntityType::builder("Shop.Product")
//!     .member("Name", Type::String)
//!     .member("Price", Type::Decimal)
//!     .build();
//! let items = vec![
//!     Value::entity(&product, [("Name", Value::from("pen")), ("Price", Value::from(rust_decimal::Decimal::new(150, 2)))]),
//!     Value::entity(&product, [("Name", Value::from("ink")), ("Price", Value::from(rust_decimal::Decimal::new(900, 2)))]),
//! ];
//!
//! let cheap = Queryable::from_vec(Type::entity(&product), items)
//!     .filter("Price < 5", &[])
//!     .unwrap()
//!     .select("Name", &[])
//!     .unwrap();
//! assert_eq!(cheap.to_vec().unwrap(), vec![Value::from("pen")]);
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    binder::resolve_type,
    compiler::{
        CompiledQuery, JoinSpec, OrderSpec, Predicate, Selector, compile_filter,
        compile_group_join, compile_ordering, compile_projection,
    },
    config::ParsingConfig,
    error::{ExecError, QueryError},
    ops,
    types::Type,
    value::Value,
};

/// Lazily produced elements. Failures are yielded in place of the element.
pub type Rows<'a> = Box<dyn Iterator<Item = Result<Value, ExecError>> + 'a>;

/// A re-enumerable element source.
pub trait Enumerable: Send + Sync {
    fn enumerate(&self) -> Rows<'_>;
}

/// Decides whether a source is evaluated in memory or handed to its provider.
pub trait QueryableAnalyzer: Send + Sync + fmt::Debug {
    fn supports_in_memory(&self, source: &Queryable) -> bool;
}

/// Analyzer that trusts the provider's own answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultQueryableAnalyzer;

impl QueryableAnalyzer for DefaultQueryableAnalyzer {
    fn supports_in_memory(&self, source: &Queryable) -> bool {
        source.provider().is_in_memory()
    }
}

/// The owner of a queryable source. Providers that are not in memory receive each
/// operation untouched and translate it themselves.
pub trait QueryProvider: Send + Sync {
    fn name(&self) -> &str;

    fn is_in_memory(&self) -> bool;

    fn translate(&self, source: &Queryable, operation: &QueryOperation)
    -> Result<Queryable, ExecError>;
}

/// Provider for sources evaluated by this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryProvider;

impl QueryProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn is_in_memory(&self) -> bool {
        true
    }

    fn translate(
        &self,
        source: &Queryable,
        operation: &QueryOperation,
    ) -> Result<Queryable, ExecError> {
        tracing::warn!(?operation, "analyzer rejected in-memory evaluation; running it in memory anyway");
        Executor::apply_in_memory(source, operation.clone()).map_err(|err| ExecError::Provider {
            provider: self.name().to_string(),
            message: err.to_string(),
        })
    }
}

/// A shaping operation, in the form handed to providers.
#[derive(Debug, Clone)]
pub enum QueryOperation {
    Where {
        predicate: String,
        args: Vec<Value>,
    },
    Select {
        selector: String,
        args: Vec<Value>,
    },
    OrderBy {
        ordering: String,
        args: Vec<Value>,
    },
    GroupJoin {
        inner: Queryable,
        outer_key: String,
        inner_key: String,
        result: String,
        args: Vec<Value>,
    },
    OfType(String),
    Cast(String),
    Skip(usize),
    Take(usize),
    Reverse,
}

/// A lazily evaluated sequence of elements of one static type.
#[derive(Clone)]
pub struct Queryable {
    element_type: Type,
    source: Arc<dyn Enumerable>,
    provider: Arc<dyn QueryProvider>,
    config: Option<Arc<ParsingConfig>>,
}

impl fmt::Debug for Queryable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queryable")
            .field("element_type", &self.element_type.to_string())
            .field("provider", &self.provider.name())
            .finish()
    }
}

struct VecSource(Arc<Vec<Value>>);

impl Enumerable for VecSource {
    fn enumerate(&self) -> Rows<'_> {
        Box::new(self.0.iter().cloned().map(Ok))
    }
}

struct FnSource<F>(F);

impl<F> Enumerable for FnSource<F>
where
    F: Fn() -> Vec<Value> + Send + Sync,
{
    fn enumerate(&self) -> Rows<'_> {
        Box::new((self.0)().into_iter().map(Ok))
    }
}

impl Queryable {
    pub fn from_vec(element_type: Type, items: Vec<Value>) -> Self {
        Queryable::from_source(element_type, VecSource(Arc::new(items)))
    }

    /// A source that calls `produce` on every enumeration.
    pub fn from_fn<F>(element_type: Type, produce: F) -> Self
    where
        F: Fn() -> Vec<Value> + Send + Sync + 'static,
    {
        Queryable::from_source(element_type, FnSource(produce))
    }

    pub fn from_source<E>(element_type: Type, source: E) -> Self
    where
        E: Enumerable + 'static,
    {
        Queryable {
            element_type,
            source: Arc::new(source),
            provider: Arc::new(InMemoryProvider),
            config: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn QueryProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_config(mut self, config: ParsingConfig) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    /// A copy of this queryable owned by the in-memory provider.
    pub fn in_memory(&self) -> Self {
        self.clone().with_provider(Arc::new(InMemoryProvider))
    }

    pub fn element_type(&self) -> &Type {
        &self.element_type
    }

    pub fn provider(&self) -> &Arc<dyn QueryProvider> {
        &self.provider
    }

    /// The config this queryable compiles with: its own, or the process default.
    pub fn config(&self) -> Arc<ParsingConfig> {
        match &self.config {
            Some(config) => Arc::clone(config),
            None => ParsingConfig::default_config(),
        }
    }

    /// A new stage over this one, sharing provider and config.
    fn derive<E>(&self, element_type: Type, stage: E) -> Queryable
    where
        E: Enumerable + 'static,
    {
        Queryable {
            element_type,
            source: Arc::new(stage),
            provider: Arc::clone(&self.provider),
            config: self.config.clone(),
        }
    }

    pub fn iter(&self) -> Rows<'_> {
        self.source.enumerate()
    }

    pub fn to_vec(&self) -> Result<Vec<Value>, ExecError> {
        self.iter().collect()
    }

    pub fn filter(&self, predicate: &str, args: &[Value]) -> Result<Queryable, QueryError> {
        Executor::apply(
            self,
            QueryOperation::Where {
                predicate: predicate.to_string(),
                args: args.to_vec(),
            },
        )
    }

    pub fn select(&self, selector: &str, args: &[Value]) -> Result<Queryable, QueryError> {
        Executor::apply(
            self,
            QueryOperation::Select {
                selector: selector.to_string(),
                args: args.to_vec(),
            },
        )
    }

    pub fn order_by(&self, ordering: &str, args: &[Value]) -> Result<Queryable, QueryError> {
        Executor::apply(
            self,
            QueryOperation::OrderBy {
                ordering: ordering.to_string(),
                args: args.to_vec(),
            },
        )
    }

    /// Pairs every element with the group of `inner` elements whose key matches.
    pub fn group_join(
        &self,
        inner: &Queryable,
        outer_key: &str,
        inner_key: &str,
        result: &str,
        args: &[Value],
    ) -> Result<Queryable, QueryError> {
        Executor::apply(
            self,
            QueryOperation::GroupJoin {
                inner: inner.clone(),
                outer_key: outer_key.to_string(),
                inner_key: inner_key.to_string(),
                result: result.to_string(),
                args: args.to_vec(),
            },
        )
    }

    pub fn of_type(&self, type_name: &str) -> Result<Queryable, QueryError> {
        Executor::apply(self, QueryOperation::OfType(type_name.to_string()))
    }

    pub fn cast(&self, type_name: &str) -> Result<Queryable, QueryError> {
        Executor::apply(self, QueryOperation::Cast(type_name.to_string()))
    }

    pub fn skip(&self, count: usize) -> Result<Queryable, QueryError> {
        Executor::apply(self, QueryOperation::Skip(count))
    }

    pub fn take(&self, count: usize) -> Result<Queryable, QueryError> {
        Executor::apply(self, QueryOperation::Take(count))
    }

    pub fn reverse(&self) -> Result<Queryable, QueryError> {
        Executor::apply(self, QueryOperation::Reverse)
    }

    fn filtered(&self, predicate: Option<&str>, args: &[Value]) -> Result<Queryable, QueryError> {
        match predicate {
            Some(predicate) => self.filter(predicate, args),
            None => Ok(self.clone()),
        }
    }

    pub fn first(&self, predicate: Option<&str>, args: &[Value]) -> Result<Value, QueryError> {
        self.first_or_default(predicate, args)?
            .ok_or(QueryError::Exec(ExecError::NoElements))
    }

    pub fn first_or_default(
        &self,
        predicate: Option<&str>,
        args: &[Value],
    ) -> Result<Option<Value>, QueryError> {
        let source = self.filtered(predicate, args)?;
        let first = source.iter().next().transpose()?;
        Ok(first)
    }

    pub fn last(&self, predicate: Option<&str>, args: &[Value]) -> Result<Value, QueryError> {
        self.last_or_default(predicate, args)?
            .ok_or(QueryError::Exec(ExecError::NoElements))
    }

    pub fn last_or_default(
        &self,
        predicate: Option<&str>,
        args: &[Value],
    ) -> Result<Option<Value>, QueryError> {
        let source = self.filtered(predicate, args)?;
        let mut last = None;
        for item in source.iter() {
            last = Some(item?);
        }
        Ok(last)
    }

    pub fn single(&self, predicate: Option<&str>, args: &[Value]) -> Result<Value, QueryError> {
        self.single_or_default(predicate, args)?
            .ok_or(QueryError::Exec(ExecError::NoElements))
    }

    /// Fails with [`ExecError::MoreThanOneElement`] when several elements match.
    pub fn single_or_default(
        &self,
        predicate: Option<&str>,
        args: &[Value],
    ) -> Result<Option<Value>, QueryError> {
        let source = self.filtered(predicate, args)?;
        let mut rows = source.iter();
        let Some(first) = rows.next().transpose()? else {
            return Ok(None);
        };
        if rows.next().transpose()?.is_some() {
            return Err(ExecError::MoreThanOneElement.into());
        }
        Ok(Some(first))
    }

    pub fn count(&self) -> Result<usize, ExecError> {
        let mut count = 0;
        for item in self.iter() {
            item?;
            count += 1;
        }
        Ok(count)
    }

    pub fn any(&self) -> Result<bool, ExecError> {
        self.iter().next().transpose().map(|first| first.is_some())
    }

    /// Structural membership test; records compare field by field.
    pub fn contains(&self, value: &Value) -> Result<bool, ExecError> {
        for item in self.iter() {
            if &item? == value {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

struct Filtered {
    source: Arc<dyn Enumerable>,
    predicate: Predicate,
}

impl Enumerable for Filtered {
    fn enumerate(&self) -> Rows<'_> {
        Box::new(self.source.enumerate().filter_map(move |row| match row {
            Ok(item) => match self.predicate.test(&item) {
                Ok(true) => Some(Ok(item)),
                Ok(false) => None,
                Err(err) => Some(Err(err)),
            },
            Err(err) => Some(Err(err)),
        }))
    }
}

struct Projected {
    source: Arc<dyn Enumerable>,
    selector: Selector,
}

impl Enumerable for Projected {
    fn enumerate(&self) -> Rows<'_> {
        Box::new(
            self.source
                .enumerate()
                .map(move |row| row.and_then(|item| self.selector.select(&item))),
        )
    }
}

/// Buffers its input when enumerated, then sorts.
struct Ordered {
    source: Arc<dyn Enumerable>,
    spec: OrderSpec,
}

impl Enumerable for Ordered {
    fn enumerate(&self) -> Rows<'_> {
        let sorted = self
            .source
            .enumerate()
            .collect::<Result<Vec<_>, _>>()
            .and_then(|items| self.spec.sort(items));
        match sorted {
            Ok(items) => Box::new(items.into_iter().map(Ok)),
            Err(err) => Box::new(std::iter::once(Err(err))),
        }
    }
}

struct GroupJoined {
    outer: Arc<dyn Enumerable>,
    inner: Arc<dyn Enumerable>,
    spec: JoinSpec,
}

impl GroupJoined {
    /// Inner elements grouped by key, in source order. Null keys never match.
    fn lookup(&self) -> Result<HashMap<Value, Vec<Value>>, ExecError> {
        let mut groups: HashMap<Value, Vec<Value>> = HashMap::new();
        for row in self.inner.enumerate() {
            let item = row?;
            let key = self.spec.inner_key(&item)?;
            if !key.is_null() {
                groups.entry(key).or_default().push(item);
            }
        }
        Ok(groups)
    }
}

impl Enumerable for GroupJoined {
    fn enumerate(&self) -> Rows<'_> {
        let groups = match self.lookup() {
            Ok(groups) => groups,
            Err(err) => return Box::new(std::iter::once(Err(err))),
        };
        Box::new(self.outer.enumerate().map(move |row| {
            let outer = row?;
            let key = self.spec.outer_key(&outer)?;
            let group = match key {
                Value::Null => Vec::new(),
                key => groups.get(&key).cloned().unwrap_or_default(),
            };
            self.spec.result(&outer, &Value::list(group))
        }))
    }
}

struct TypeFiltered {
    source: Arc<dyn Enumerable>,
    target: Type,
}

impl Enumerable for TypeFiltered {
    fn enumerate(&self) -> Rows<'_> {
        Box::new(self.source.enumerate().filter(move |row| match row {
            Ok(item) => ops::is_instance(item, &self.target),
            Err(_) => true,
        }))
    }
}

/// Yields an [`ExecError::InvalidCast`] in place of each element of the wrong type.
struct Casted {
    source: Arc<dyn Enumerable>,
    target: Type,
}

impl Enumerable for Casted {
    fn enumerate(&self) -> Rows<'_> {
        Box::new(
            self.source
                .enumerate()
                .map(move |row| row.and_then(|item| ops::cast(&item, &self.target))),
        )
    }
}

struct Skipped {
    source: Arc<dyn Enumerable>,
    count: usize,
}

impl Enumerable for Skipped {
    fn enumerate(&self) -> Rows<'_> {
        Box::new(self.source.enumerate().skip(self.count))
    }
}

struct Taken {
    source: Arc<dyn Enumerable>,
    count: usize,
}

impl Enumerable for Taken {
    fn enumerate(&self) -> Rows<'_> {
        Box::new(self.source.enumerate().take(self.count))
    }
}

struct Reversed {
    source: Arc<dyn Enumerable>,
}

impl Enumerable for Reversed {
    fn enumerate(&self) -> Rows<'_> {
        let buffered: Vec<_> = self.source.enumerate().collect();
        Box::new(buffered.into_iter().rev())
    }
}

/// Compiles operations, runs the optimizer and builds pipeline stages.
pub struct Executor;

impl Executor {
    /// Applies `operation` to `source`. Sources the analyzer rejects for in-memory
    /// evaluation go to their provider instead.
    pub fn apply(source: &Queryable, operation: QueryOperation) -> Result<Queryable, QueryError> {
        let config = source.config();
        if !config.queryable_analyzer().supports_in_memory(source) {
            tracing::debug!(provider = source.provider.name(), ?operation, "delegating to query provider");
            return source
                .provider
                .translate(source, &operation)
                .map_err(QueryError::from);
        }
        Executor::apply_in_memory(source, operation)
    }

    fn apply_in_memory(
        source: &Queryable,
        operation: QueryOperation,
    ) -> Result<Queryable, QueryError> {
        let config = source.config();
        let config = config.as_ref();
        let element_type = &source.element_type;
        let upstream = Arc::clone(&source.source);

        let queryable = match operation {
            QueryOperation::Where { predicate, args } => {
                let predicate = compile_filter(&predicate, element_type, &args, Some(config))?;
                let predicate = match optimize(config, CompiledQuery::Predicate(predicate))? {
                    CompiledQuery::Predicate(predicate) => predicate,
                    other => return Err(variant_error("Predicate", &other)),
                };
                source.derive(
                    element_type.clone(),
                    Filtered {
                        source: upstream,
                        predicate,
                    },
                )
            }
            QueryOperation::Select { selector, args } => {
                let selector = compile_projection(&selector, element_type, &args, Some(config))?;
                let selector = match optimize(config, CompiledQuery::Selector(selector))? {
                    CompiledQuery::Selector(selector) => selector,
                    other => return Err(variant_error("Selector", &other)),
                };
                source.derive(
                    selector.output_type().clone(),
                    Projected {
                        source: upstream,
                        selector,
                    },
                )
            }
            QueryOperation::OrderBy { ordering, args } => {
                let spec = compile_ordering(&ordering, element_type, &args, Some(config))?;
                let spec = match optimize(config, CompiledQuery::Order(spec))? {
                    CompiledQuery::Order(spec) => spec,
                    other => return Err(variant_error("Order", &other)),
                };
                source.derive(
                    element_type.clone(),
                    Ordered {
                        source: upstream,
                        spec,
                    },
                )
            }
            QueryOperation::GroupJoin {
                inner,
                outer_key,
                inner_key,
                result,
                args,
            } => {
                let spec = compile_group_join(
                    &outer_key,
                    &inner_key,
                    &result,
                    element_type,
                    &inner.element_type,
                    &args,
                    Some(config),
                )?;
                let spec = match optimize(config, CompiledQuery::Join(spec))? {
                    CompiledQuery::Join(spec) => spec,
                    other => return Err(variant_error("Join", &other)),
                };
                source.derive(
                    spec.result_type().clone(),
                    GroupJoined {
                        outer: upstream,
                        inner: Arc::clone(&inner.source),
                        spec,
                    },
                )
            }
            QueryOperation::OfType(type_name) => {
                let target = resolve_type(&type_name, 0, config)?;
                source.derive(
                    target.clone(),
                    TypeFiltered {
                        source: upstream,
                        target,
                    },
                )
            }
            QueryOperation::Cast(type_name) => {
                let target = resolve_type(&type_name, 0, config)?;
                source.derive(
                    target.clone(),
                    Casted {
                        source: upstream,
                        target,
                    },
                )
            }
            QueryOperation::Skip(count) => source.derive(
                element_type.clone(),
                Skipped {
                    source: upstream,
                    count,
                },
            ),
            QueryOperation::Take(count) => source.derive(
                element_type.clone(),
                Taken {
                    source: upstream,
                    count,
                },
            ),
            QueryOperation::Reverse => {
                source.derive(element_type.clone(), Reversed { source: upstream })
            }
        };
        Ok(queryable)
    }
}

/// Runs the configured optimizer. Changing the artifact's variant is a failure.
fn optimize(config: &ParsingConfig, query: CompiledQuery) -> Result<CompiledQuery, QueryError> {
    let expected = query.variant_name();
    let optimized = config.extensibility().optimize(query);
    if optimized.variant_name() != expected {
        return Err(variant_error(expected, &optimized));
    }
    Ok(optimized)
}

fn variant_error(expected: &'static str, actual: &CompiledQuery) -> QueryError {
    QueryError::Exec(ExecError::OptimizerVariant {
        expected,
        actual: actual.variant_name(),
    })
}
