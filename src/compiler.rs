//! # Compiler
//!
//! Lowers a bound tree into a [`Program`]: a tree of shared closures evaluated
//! against a [`Frame`]. The public entry points run the whole pipeline (tokenize,
//! parse, bind, compile) and wrap the result in one of the [`CompiledQuery`]
//! artifacts.
//!
//! ```
//! use dynaquery::{EntityType, Type, Value, compile_filter};
//!
//! let user = EntityType::builder("App.User")
//!     .member("Name", Type::String)
//!     .member("Age", Type::Int32)
//!     .build();
//! let adults = compile_filter("Age >= 18", &Type::entity(&user), &[], None).unwrap();
//!
//! let bob = Value::entity(&user, [("Name", Value::from("Bob")), ("Age", Value::from(40))]);
//! assert!(adults.test(&bob).unwrap());
//! ```

use std::{cmp::Ordering, fmt, sync::Arc};

use crate::{
    ast::{BinOp, ImplicitParam, UnaryOp},
    binder::{BindContext, Bound, BoundKind, Member, Method},
    config::ParsingConfig,
    error::{ExecError, ParseError, ParseResult},
    ops,
    parser::Parser,
    record::DynamicRecord,
    types::Type,
    value::Value,
};

/// A compiled expression.
pub type Program = Arc<dyn Fn(&Frame<'_>) -> Result<Value, ExecError> + Send + Sync>;

/// Values of the implicit parameters during one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    it: &'a Value,
    outer: Option<&'a Value>,
    inner: Option<&'a Value>,
}

impl<'a> Frame<'a> {
    pub fn new(it: &'a Value) -> Self {
        Frame {
            it,
            outer: None,
            inner: None,
        }
    }

    /// Frame of a GroupJoin result selector.
    pub fn join(outer: &'a Value, inner: &'a Value) -> Self {
        Frame {
            it: outer,
            outer: Some(outer),
            inner: Some(inner),
        }
    }

    pub fn it(&self) -> &'a Value {
        self.it
    }

    /// Rebinds `it` for a lambda body, keeping `outer` and `inner`.
    fn with_it<'b>(&self, it: &'b Value) -> Frame<'b>
    where
        'a: 'b,
    {
        Frame {
            it,
            outer: self.outer,
            inner: self.inner,
        }
    }
}

fn program<F>(f: F) -> Program
where
    F: Fn(&Frame<'_>) -> Result<Value, ExecError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Lowers a bound tree into closures.
pub fn compile(bound: &Bound) -> Program {
    match &bound.kind {
        BoundKind::Constant(value) => {
            let value = value.clone();
            program(move |_| Ok(value.clone()))
        }
        BoundKind::Param(ImplicitParam::It) => program(|frame| Ok(frame.it.clone())),
        BoundKind::Param(ImplicitParam::Outer) => {
            program(|frame| Ok(frame.outer.cloned().unwrap_or(Value::Null)))
        }
        BoundKind::Param(ImplicitParam::Inner) => {
            program(|frame| Ok(frame.inner.cloned().unwrap_or(Value::Null)))
        }
        BoundKind::Member {
            target,
            member,
            name,
            propagate_null,
        } => {
            let target = compile(target);
            let member = member.clone();
            let name = name.clone();
            let propagate_null = *propagate_null;
            program(move |frame| {
                let value = target(frame)?;
                read_member(&value, &member, &name, propagate_null)
            })
        }
        BoundKind::Index {
            target,
            index,
            propagate_null,
        } => {
            let target = compile(target);
            let index = compile(index);
            let propagate_null = *propagate_null;
            program(move |frame| {
                let value = target(frame)?;
                if value.is_null() {
                    return null_target(propagate_null, "[]");
                }
                let index = index(frame)?;
                read_index(&value, &index)
            })
        }
        BoundKind::Unary { op, operand } => {
            let operand = compile(operand);
            match op {
                UnaryOp::Not => program(move |frame| {
                    Ok(match operand(frame)? {
                        Value::Boolean(b) => Value::Boolean(!b),
                        other => other,
                    })
                }),
                UnaryOp::Negate => program(move |frame| ops::negate(&operand(frame)?)),
            }
        }
        BoundKind::Binary { op, left, right } => {
            compile_binary(*op, compile(left), compile(right), &bound.ty)
        }
        BoundKind::Conditional {
            test,
            if_true,
            if_false,
        } => {
            let test = compile(test);
            let if_true = compile(if_true);
            let if_false = compile(if_false);
            program(move |frame| {
                if test(frame)?.as_bool().unwrap_or(false) {
                    if_true(frame)
                } else {
                    if_false(frame)
                }
            })
        }
        BoundKind::Convert { operand } => {
            let operand = compile(operand);
            let target = bound.ty.clone();
            program(move |frame| Ok(ops::convert(operand(frame)?, &target)))
        }
        BoundKind::New { record, fields } => {
            let record = Arc::clone(record);
            let fields: Vec<Program> = fields.iter().map(compile).collect();
            program(move |frame| {
                let values = fields
                    .iter()
                    .map(|field| field(frame))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Record(DynamicRecord::new(Arc::clone(&record), values)))
            })
        }
        BoundKind::TypeIs { operand, target } => {
            let operand = compile(operand);
            let target = target.clone();
            program(move |frame| Ok(Value::Boolean(ops::is_instance(&operand(frame)?, &target))))
        }
        BoundKind::TypeAs { operand, target } => {
            let operand = compile(operand);
            let target = target.clone();
            program(move |frame| {
                let value = operand(frame)?;
                Ok(if ops::is_instance(&value, &target) {
                    value
                } else {
                    Value::Null
                })
            })
        }
        BoundKind::Call {
            method,
            target,
            args,
            propagate_null,
        } => {
            let target = compile(target);
            let args: Vec<Program> = args.iter().map(compile).collect();
            let method = method.clone();
            let result_type = bound.ty.clone();
            let propagate_null = *propagate_null;
            program(move |frame| {
                let value = target(frame)?;
                if value.is_null() {
                    return null_target(propagate_null, &format!("{:?}", method));
                }
                invoke(&method, &value, &args, &result_type, frame)
            })
        }
    }
}

fn null_target(propagate_null: bool, member: &str) -> Result<Value, ExecError> {
    if propagate_null {
        Ok(Value::Null)
    } else {
        Err(ExecError::NullReference {
            member: member.to_string(),
        })
    }
}

fn mismatch(value: &Value, expected: &str) -> ExecError {
    ExecError::InvalidCast {
        from: value.type_name(),
        to: expected.to_string(),
    }
}

fn read_member(
    value: &Value,
    member: &Member,
    name: &str,
    propagate_null: bool,
) -> Result<Value, ExecError> {
    match (member, value) {
        (Member::HasValue, value) => Ok(Value::Boolean(!value.is_null())),
        (_, Value::Null) => null_target(propagate_null, name),
        (Member::NullableValue, value) => Ok(value.clone()),
        (Member::Field(field), Value::Entity(instance)) => Ok(instance.get(field).clone()),
        (Member::Slot(slot), Value::Record(record)) => Ok(record.get_index(*slot).clone()),
        (Member::StringLength, Value::String(s)) => ops::count_value(s.chars().count()),
        (Member::ListCount, Value::List(items)) => ops::count_value(items.len()),
        (_, other) => Err(mismatch(other, name)),
    }
}

fn read_index(value: &Value, index: &Value) -> Result<Value, ExecError> {
    let position = index.as_i64().ok_or_else(|| mismatch(index, "Int32"))?;
    let out_of_range = |len: usize| ExecError::IndexOutOfRange {
        index: position,
        len,
    };
    match value {
        Value::List(items) => usize::try_from(position)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| out_of_range(items.len())),
        Value::String(s) => usize::try_from(position)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(Value::Char)
            .ok_or_else(|| out_of_range(s.chars().count())),
        other => Err(mismatch(other, "List")),
    }
}

fn compile_binary(op: BinOp, left: Program, right: Program, ty: &Type) -> Program {
    match op {
        BinOp::And => program(move |frame| {
            if !left(frame)?.as_bool().unwrap_or(false) {
                return Ok(Value::Boolean(false));
            }
            Ok(Value::Boolean(right(frame)?.as_bool().unwrap_or(false)))
        }),
        BinOp::Or => program(move |frame| {
            if left(frame)?.as_bool().unwrap_or(false) {
                return Ok(Value::Boolean(true));
            }
            Ok(Value::Boolean(right(frame)?.as_bool().unwrap_or(false)))
        }),
        BinOp::NullCoalesce => program(move |frame| match left(frame)? {
            Value::Null => right(frame),
            value => Ok(value),
        }),
        BinOp::Equal => program(move |frame| Ok(Value::Boolean(left(frame)? == right(frame)?))),
        BinOp::NotEqual => program(move |frame| Ok(Value::Boolean(left(frame)? != right(frame)?))),
        BinOp::Add if *ty == Type::String => {
            program(move |frame| Ok(ops::concat(&left(frame)?, &right(frame)?)))
        }
        op if op.is_comparison() => {
            program(move |frame| Ok(ops::apply_relational(op, &left(frame)?, &right(frame)?)))
        }
        op => program(move |frame| ops::apply_arithmetic(op, &left(frame)?, &right(frame)?)),
    }
}

fn invoke(
    method: &Method,
    target: &Value,
    args: &[Program],
    result_type: &Type,
    frame: &Frame<'_>,
) -> Result<Value, ExecError> {
    if let Value::String(s) = target {
        return invoke_string(method, s, args, frame);
    }
    let items = target.as_list().ok_or_else(|| mismatch(target, "List"))?;

    let lambda = |item: &Value| match args.first() {
        Some(body) => body(&frame.with_it(item)),
        None => Ok(item.clone()),
    };
    let matches = |item: &Value| -> Result<bool, ExecError> {
        match args.first() {
            Some(body) => Ok(body(&frame.with_it(item))?.as_bool().unwrap_or(false)),
            None => Ok(true),
        }
    };
    let mapped = || items.iter().map(lambda).collect::<Result<Vec<_>, _>>();

    match method {
        Method::Contains => {
            let needle = args
                .first()
                .map(|arg| arg(frame))
                .transpose()?
                .unwrap_or(Value::Null);
            Ok(Value::Boolean(items.contains(&needle)))
        }
        Method::OfType(ty) => Ok(Value::list(
            items
                .iter()
                .filter(|item| ops::is_instance(item, ty))
                .cloned()
                .collect(),
        )),
        Method::Cast(ty) => {
            let cast = items
                .iter()
                .map(|item| ops::cast(item, ty))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::list(cast))
        }
        Method::First | Method::FirstOrDefault => {
            let found = first_match(items.iter(), &matches)?;
            element_or_default(found, *method == Method::FirstOrDefault)
        }
        Method::Last | Method::LastOrDefault => {
            let found = first_match(items.iter().rev(), &matches)?;
            element_or_default(found, *method == Method::LastOrDefault)
        }
        Method::Single | Method::SingleOrDefault => {
            let mut found = None;
            for item in items {
                if matches(item)? {
                    if found.is_some() {
                        return Err(ExecError::MoreThanOneElement);
                    }
                    found = Some(item.clone());
                }
            }
            element_or_default(found, *method == Method::SingleOrDefault)
        }
        Method::Where => {
            let mut kept = Vec::new();
            for item in items {
                if matches(item)? {
                    kept.push(item.clone());
                }
            }
            Ok(Value::list(kept))
        }
        Method::Select => Ok(Value::list(mapped()?)),
        Method::OrderBy | Method::OrderByDescending => {
            let keys = mapped()?;
            let mut order: Vec<usize> = (0..items.len()).collect();
            let descending = *method == Method::OrderByDescending;
            order.sort_by(|&a, &b| {
                let ordering = ops::compare_values(&keys[a], &keys[b]);
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
            Ok(Value::list(order.into_iter().map(|i| items[i].clone()).collect()))
        }
        Method::Skip | Method::Take => {
            let count = match args.first() {
                Some(arg) => arg(frame)?.as_i64().unwrap_or(0),
                None => 0,
            };
            let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
            let part: Vec<Value> = if *method == Method::Skip {
                items.iter().skip(count).cloned().collect()
            } else {
                items.iter().take(count).cloned().collect()
            };
            Ok(Value::list(part))
        }
        Method::Reverse => Ok(Value::list(items.iter().rev().cloned().collect())),
        Method::Any => {
            for item in items {
                if matches(item)? {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }
        Method::All => {
            for item in items {
                if !matches(item)? {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }
        Method::Count => {
            let mut count = 0;
            for item in items {
                if matches(item)? {
                    count += 1;
                }
            }
            ops::count_value(count)
        }
        Method::Sum => ops::sum(mapped()?, result_type),
        Method::Average => ops::average(mapped()?, result_type),
        Method::Min => ops::extreme(mapped()?, result_type, Ordering::Less),
        Method::Max => ops::extreme(mapped()?, result_type, Ordering::Greater),
        other => Err(ExecError::InvalidCast {
            from: target.type_name(),
            to: format!("{:?}", other),
        }),
    }
}

fn first_match<'v, I, F>(items: I, matches: &F) -> Result<Option<Value>, ExecError>
where
    I: Iterator<Item = &'v Value>,
    F: Fn(&Value) -> Result<bool, ExecError>,
{
    for item in items {
        if matches(item)? {
            return Ok(Some(item.clone()));
        }
    }
    Ok(None)
}

fn element_or_default(found: Option<Value>, or_default: bool) -> Result<Value, ExecError> {
    match found {
        Some(value) => Ok(value),
        None if or_default => Ok(Value::Null),
        None => Err(ExecError::NoElements),
    }
}

fn invoke_string(
    method: &Method,
    s: &str,
    args: &[Program],
    frame: &Frame<'_>,
) -> Result<Value, ExecError> {
    let arg = match args.first() {
        Some(arg) => arg(frame)?,
        None => Value::Null,
    };
    let needs_arg = matches!(
        method,
        Method::StringContains | Method::StartsWith | Method::EndsWith | Method::IndexOf
    );
    if needs_arg && arg.is_null() {
        return Err(ExecError::NullReference {
            member: format!("{:?}", method),
        });
    }

    let result = match (method, &arg) {
        (Method::StringContains, Value::String(needle)) => Value::Boolean(s.contains(needle.as_str())),
        (Method::StringContains, Value::Char(c)) => Value::Boolean(s.contains(*c)),
        (Method::StartsWith, Value::String(prefix)) => Value::Boolean(s.starts_with(prefix.as_str())),
        (Method::EndsWith, Value::String(suffix)) => Value::Boolean(s.ends_with(suffix.as_str())),
        (Method::IndexOf, needle) => {
            let found = match needle {
                Value::Char(c) => s.find(*c),
                Value::String(needle) => s.find(needle.as_str()),
                _ => None,
            };
            match found {
                Some(byte) => ops::count_value(s[..byte].chars().count())?,
                None => Value::Int32(-1),
            }
        }
        (Method::ToUpper, _) => Value::String(s.to_uppercase()),
        (Method::ToLower, _) => Value::String(s.to_lowercase()),
        (Method::Trim, _) => Value::String(s.trim().to_string()),
        (other, arg) => return Err(mismatch(arg, &format!("{:?}", other))),
    };
    Ok(result)
}

/// A compiled filter.
#[derive(Clone)]
pub struct Predicate {
    program: Program,
    expression: Arc<str>,
}

impl Predicate {
    /// Wraps a native closure, for optimizers that replace a compiled predicate.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<bool, ExecError> + Send + Sync + 'static,
    {
        Predicate {
            program: program(move |frame| f(frame.it).map(Value::Boolean)),
            expression: Arc::from("<native>"),
        }
    }

    /// Evaluates the predicate. A null result counts as false.
    pub fn test(&self, item: &Value) -> Result<bool, ExecError> {
        Ok((self.program)(&Frame::new(item))?
            .as_bool()
            .unwrap_or(false))
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.expression).finish()
    }
}

/// A compiled projection together with its output type.
#[derive(Clone)]
pub struct Selector {
    program: Program,
    output_type: Type,
    expression: Arc<str>,
}

impl Selector {
    pub fn from_fn<F>(output_type: Type, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        Selector {
            program: program(move |frame| f(frame.it)),
            output_type,
            expression: Arc::from("<native>"),
        }
    }

    pub fn select(&self, item: &Value) -> Result<Value, ExecError> {
        (self.program)(&Frame::new(item))
    }

    pub fn output_type(&self) -> &Type {
        &self.output_type
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("expression", &self.expression)
            .field("output_type", &self.output_type.to_string())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct OrderKey {
    pub selector: Selector,
    pub ascending: bool,
}

/// A compiled multi-key ordering.
#[derive(Debug, Clone)]
pub struct OrderSpec {
    keys: Vec<OrderKey>,
}

impl OrderSpec {
    pub fn new(keys: Vec<OrderKey>) -> Self {
        OrderSpec { keys }
    }

    pub fn keys(&self) -> &[OrderKey] {
        &self.keys
    }

    /// Stable sort by every key in turn; nulls sort first.
    pub fn sort(&self, items: Vec<Value>) -> Result<Vec<Value>, ExecError> {
        let mut keyed = items
            .into_iter()
            .map(|item| {
                let keys = self
                    .keys
                    .iter()
                    .map(|key| key.selector.select(&item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((keys, item))
            })
            .collect::<Result<Vec<_>, ExecError>>()?;

        keyed.sort_by(|(a, _), (b, _)| self.compare_keys(a, b));
        Ok(keyed.into_iter().map(|(_, item)| item).collect())
    }

    fn compare_keys(&self, a: &[Value], b: &[Value]) -> Ordering {
        for ((key, a), b) in self.keys.iter().zip(a).zip(b) {
            let ordering = ops::compare_values(a, b);
            let ordering = if key.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Compiled GroupJoin: key selectors for both sides and the result selector.
#[derive(Clone)]
pub struct JoinSpec {
    outer_key: Selector,
    inner_key: Selector,
    result: Program,
    result_type: Type,
}

impl JoinSpec {
    pub fn outer_key(&self, outer: &Value) -> Result<Value, ExecError> {
        self.outer_key.select(outer)
    }

    pub fn inner_key(&self, inner: &Value) -> Result<Value, ExecError> {
        self.inner_key.select(inner)
    }

    /// Evaluates the result selector for one outer element and its group.
    pub fn result(&self, outer: &Value, group: &Value) -> Result<Value, ExecError> {
        (self.result)(&Frame::join(outer, group))
    }

    pub fn result_type(&self) -> &Type {
        &self.result_type
    }
}

impl fmt::Debug for JoinSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinSpec")
            .field("outer_key", &self.outer_key.expression)
            .field("inner_key", &self.inner_key.expression)
            .field("result_type", &self.result_type.to_string())
            .finish()
    }
}

/// Artifact handed to the optimizer before execution.
#[derive(Debug, Clone)]
pub enum CompiledQuery {
    Predicate(Predicate),
    Selector(Selector),
    Order(OrderSpec),
    Join(JoinSpec),
}

impl CompiledQuery {
    pub fn variant_name(&self) -> &'static str {
        match self {
            CompiledQuery::Predicate(_) => "Predicate",
            CompiledQuery::Selector(_) => "Selector",
            CompiledQuery::Order(_) => "Order",
            CompiledQuery::Join(_) => "Join",
        }
    }
}

fn with_config<T>(config: Option<&ParsingConfig>, f: impl FnOnce(&ParsingConfig) -> T) -> T {
    match config {
        Some(config) => f(config),
        None => f(ParsingConfig::default_config().as_ref()),
    }
}

/// Compiles a boolean expression over `element_type`.
pub fn compile_filter(
    expression: &str,
    element_type: &Type,
    args: &[Value],
    config: Option<&ParsingConfig>,
) -> ParseResult<Predicate> {
    with_config(config, |config| {
        let ast = Parser::from_source(expression, config)?.parse()?;
        let bound = BindContext::new(config, element_type.clone(), args).bind(&ast)?;
        if bound.ty.non_nullable() != &Type::Boolean {
            return Err(ParseError::new(
                format!("Expression of type 'Boolean' expected, found '{}'", bound.ty),
                ast.pos,
            ));
        }

        tracing::debug!(expression, element = %element_type, "compiled filter");
        Ok(Predicate {
            program: compile(&bound),
            expression: Arc::from(expression),
        })
    })
}

/// Compiles a projection over `element_type`.
pub fn compile_projection(
    expression: &str,
    element_type: &Type,
    args: &[Value],
    config: Option<&ParsingConfig>,
) -> ParseResult<Selector> {
    with_config(config, |config| {
        let ast = Parser::from_source(expression, config)?.parse()?;
        let bound = BindContext::new(config, element_type.clone(), args).bind(&ast)?;

        tracing::debug!(expression, element = %element_type, output = %bound.ty, "compiled projection");
        Ok(Selector {
            program: compile(&bound),
            output_type: bound.ty,
            expression: Arc::from(expression),
        })
    })
}

/// Compiles an ordering clause such as `Name, Price DESC`.
pub fn compile_ordering(
    expression: &str,
    element_type: &Type,
    args: &[Value],
    config: Option<&ParsingConfig>,
) -> ParseResult<OrderSpec> {
    with_config(config, |config| {
        let items = Parser::from_source(expression, config)?.parse_ordering()?;
        let context = BindContext::new(config, element_type.clone(), args);

        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let bound = context.bind(&item.expr)?;
            if !bound.ty.is_comparable() {
                return Err(ParseError::new(
                    format!(
                        "Expression of type '{}' cannot be used as an ordering key",
                        bound.ty
                    ),
                    item.expr.pos,
                ));
            }
            keys.push(OrderKey {
                selector: Selector {
                    program: compile(&bound),
                    output_type: bound.ty,
                    expression: Arc::from(expression),
                },
                ascending: item.ascending,
            });
        }

        tracing::debug!(expression, keys = keys.len(), "compiled ordering");
        Ok(OrderSpec { keys })
    })
}

/// Compiles the three expressions of a GroupJoin. The outer key must have the inner
/// key's type or convert to it implicitly.
pub fn compile_group_join(
    outer_key: &str,
    inner_key: &str,
    result: &str,
    outer_type: &Type,
    inner_type: &Type,
    args: &[Value],
    config: Option<&ParsingConfig>,
) -> ParseResult<JoinSpec> {
    with_config(config, |config| {
        let outer_ast = Parser::from_source(outer_key, config)?.parse()?;
        let inner_ast = Parser::from_source(inner_key, config)?.parse()?;
        let result_ast = Parser::from_source(result, config)?.parse()?;

        let outer_context = BindContext::new(config, outer_type.clone(), args);
        let outer_bound = outer_context.bind(&outer_ast)?;
        let inner_bound = BindContext::new(config, inner_type.clone(), args).bind(&inner_ast)?;

        for (bound, pos) in [(&outer_bound, outer_ast.pos), (&inner_bound, inner_ast.pos)] {
            if bound.ty == Type::Null {
                return Err(ParseError::new("A GroupJoin key cannot be the null literal", pos));
            }
        }
        if !outer_bound.ty.converts_to(&inner_bound.ty) {
            return Err(ParseError::new(
                format!(
                    "The outer key type '{}' is not compatible with the inner key type '{}'",
                    outer_bound.ty, inner_bound.ty
                ),
                outer_ast.pos,
            ));
        }
        let outer_bound = outer_context.convert_or_error(outer_bound, &inner_bound.ty, outer_ast.pos)?;

        let result_bound =
            BindContext::for_join_result(config, outer_type.clone(), inner_type.clone(), args)
                .bind(&result_ast)?;

        tracing::debug!(outer_key, inner_key, result, output = %result_bound.ty, "compiled group join");
        Ok(JoinSpec {
            outer_key: Selector {
                program: compile(&outer_bound),
                output_type: outer_bound.ty,
                expression: Arc::from(outer_key),
            },
            inner_key: Selector {
                program: compile(&inner_bound),
                output_type: inner_bound.ty,
                expression: Arc::from(inner_key),
            },
            result: compile(&result_bound),
            result_type: result_bound.ty,
        })
    })
}
