//! Engine configuration and the optimizer extension point.

use std::{fmt, sync::Arc, time::Duration};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::{
    compiler::CompiledQuery,
    queryable::{DefaultQueryableAnalyzer, QueryableAnalyzer},
    types::TypeRegistry,
};

/// Default budget for tokenizing one expression.
pub const DEFAULT_TOKENIZE_TIMEOUT: Duration = Duration::from_secs(1);

static DEFAULT_CONFIG: Lazy<RwLock<Arc<ParsingConfig>>> =
    Lazy::new(|| RwLock::new(Arc::new(ParsingConfig::builder().build())));

/// Immutable set of engine behaviour toggles.
///
/// Build one with [`ParsingConfig::builder`]; calls that take `Option<&ParsingConfig>`
/// fall back to the process-wide [`ParsingConfig::default_config`].
///
/// ```
/// use dynaquery::{ParsingConfig, TypeRegistry};
///
/// let config = ParsingConfig::builder()
///     .resolve_types_by_simple_name(true)
///     .null_propagation(true)
///     .type_registry(TypeRegistry::new())
///     .build();
/// assert!(config.null_propagation());
/// ```
#[derive(Clone)]
pub struct ParsingConfig {
    resolve_types_by_simple_name: bool,
    null_propagation: bool,
    case_sensitive: bool,
    queryable_analyzer: Arc<dyn QueryableAnalyzer>,
    tokenize_timeout: Duration,
    type_registry: Arc<TypeRegistry>,
    extensibility: ExtensibilityPoint,
}

impl ParsingConfig {
    pub fn builder() -> ParsingConfigBuilder {
        ParsingConfigBuilder::default()
    }

    /// A builder seeded with this config's values.
    pub fn to_builder(&self) -> ParsingConfigBuilder {
        ParsingConfigBuilder {
            resolve_types_by_simple_name: self.resolve_types_by_simple_name,
            null_propagation: self.null_propagation,
            case_sensitive: self.case_sensitive,
            queryable_analyzer: Some(Arc::clone(&self.queryable_analyzer)),
            tokenize_timeout: self.tokenize_timeout,
            type_registry: Some(Arc::clone(&self.type_registry)),
            extensibility: self.extensibility.clone(),
        }
    }

    /// The process-wide default configuration.
    pub fn default_config() -> Arc<ParsingConfig> {
        Arc::clone(&DEFAULT_CONFIG.read())
    }

    /// Rebuilds the process-wide default. Unset or invalid fields fall back to the
    /// built-in defaults rather than being stored.
    pub fn configure_default<F>(configure: F)
    where
        F: FnOnce(ParsingConfigBuilder) -> ParsingConfigBuilder,
    {
        let mut slot = DEFAULT_CONFIG.write();
        let rebuilt = configure(slot.to_builder()).build();
        *slot = Arc::new(rebuilt);
    }

    /// Restores the built-in default configuration.
    pub fn reset_default() {
        *DEFAULT_CONFIG.write() = Arc::new(ParsingConfig::builder().build());
    }

    pub fn resolve_types_by_simple_name(&self) -> bool {
        self.resolve_types_by_simple_name
    }

    pub fn null_propagation(&self) -> bool {
        self.null_propagation
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn queryable_analyzer(&self) -> &Arc<dyn QueryableAnalyzer> {
        &self.queryable_analyzer
    }

    pub fn tokenize_timeout(&self) -> Duration {
        self.tokenize_timeout
    }

    pub fn type_registry(&self) -> &TypeRegistry {
        &self.type_registry
    }

    pub fn extensibility(&self) -> &ExtensibilityPoint {
        &self.extensibility
    }

    /// Compares identifiers under this config's case rule.
    pub(crate) fn names_equal(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }
}

impl Default for ParsingConfig {
    fn default() -> Self {
        ParsingConfig::builder().build()
    }
}

impl fmt::Debug for ParsingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsingConfig")
            .field("resolve_types_by_simple_name", &self.resolve_types_by_simple_name)
            .field("null_propagation", &self.null_propagation)
            .field("case_sensitive", &self.case_sensitive)
            .field("queryable_analyzer", &self.queryable_analyzer)
            .field("tokenize_timeout", &self.tokenize_timeout)
            .field("type_registry", &self.type_registry.len())
            .field("extensibility", &self.extensibility)
            .finish()
    }
}

#[derive(Clone)]
pub struct ParsingConfigBuilder {
    resolve_types_by_simple_name: bool,
    null_propagation: bool,
    case_sensitive: bool,
    queryable_analyzer: Option<Arc<dyn QueryableAnalyzer>>,
    tokenize_timeout: Duration,
    type_registry: Option<Arc<TypeRegistry>>,
    extensibility: ExtensibilityPoint,
}

impl Default for ParsingConfigBuilder {
    fn default() -> Self {
        ParsingConfigBuilder {
            resolve_types_by_simple_name: false,
            null_propagation: false,
            case_sensitive: false,
            queryable_analyzer: None,
            tokenize_timeout: DEFAULT_TOKENIZE_TIMEOUT,
            type_registry: None,
            extensibility: ExtensibilityPoint::default(),
        }
    }
}

impl ParsingConfigBuilder {
    pub fn resolve_types_by_simple_name(mut self, enabled: bool) -> Self {
        self.resolve_types_by_simple_name = enabled;
        self
    }

    pub fn null_propagation(mut self, enabled: bool) -> Self {
        self.null_propagation = enabled;
        self
    }

    pub fn case_sensitive(mut self, enabled: bool) -> Self {
        self.case_sensitive = enabled;
        self
    }

    /// `None` selects the built-in analyzer.
    pub fn queryable_analyzer(mut self, analyzer: Option<Arc<dyn QueryableAnalyzer>>) -> Self {
        self.queryable_analyzer = analyzer;
        self
    }

    /// A zero timeout selects [`DEFAULT_TOKENIZE_TIMEOUT`].
    pub fn tokenize_timeout(mut self, timeout: Duration) -> Self {
        self.tokenize_timeout = timeout;
        self
    }

    pub fn type_registry(mut self, registry: TypeRegistry) -> Self {
        self.type_registry = Some(Arc::new(registry));
        self
    }

    pub fn shared_type_registry(mut self, registry: Option<Arc<TypeRegistry>>) -> Self {
        self.type_registry = registry;
        self
    }

    pub fn extensibility(mut self, extensibility: ExtensibilityPoint) -> Self {
        self.extensibility = extensibility;
        self
    }

    pub fn build(self) -> ParsingConfig {
        let tokenize_timeout = if self.tokenize_timeout.is_zero() {
            DEFAULT_TOKENIZE_TIMEOUT
        } else {
            self.tokenize_timeout
        };
        ParsingConfig {
            resolve_types_by_simple_name: self.resolve_types_by_simple_name,
            null_propagation: self.null_propagation,
            case_sensitive: self.case_sensitive,
            queryable_analyzer: self
                .queryable_analyzer
                .unwrap_or_else(|| Arc::new(DefaultQueryableAnalyzer)),
            tokenize_timeout,
            type_registry: self.type_registry.unwrap_or_default(),
            extensibility: self.extensibility,
        }
    }
}

pub type Optimizer = Arc<dyn Fn(CompiledQuery) -> CompiledQuery + Send + Sync>;

/// Hook consulted by the executor after compilation and before execution.
///
/// The default optimizer is the identity function.
#[derive(Clone, Default)]
pub struct ExtensibilityPoint {
    optimizer: Option<Optimizer>,
}

impl ExtensibilityPoint {
    pub fn with_optimizer<F>(optimizer: F) -> Self
    where
        F: Fn(CompiledQuery) -> CompiledQuery + Send + Sync + 'static,
    {
        ExtensibilityPoint {
            optimizer: Some(Arc::new(optimizer)),
        }
    }

    pub fn optimize(&self, query: CompiledQuery) -> CompiledQuery {
        match &self.optimizer {
            Some(optimizer) => optimizer(query),
            None => query,
        }
    }
}

impl fmt::Debug for ExtensibilityPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let optimizer = if self.optimizer.is_some() { "custom" } else { "identity" };
        f.debug_struct("ExtensibilityPoint")
            .field("optimizer", &optimizer)
            .finish()
    }
}
