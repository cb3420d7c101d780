//! # Binder
//!
//! Turns a parsed [`Expr`] into a typed [`Bound`] tree. The binder resolves names
//! against the element type, picks operator and method overloads, inserts implicit
//! conversions and substitutes external parameters as constants. Anything it
//! cannot make sense of is a [`ParseError`] pointing at the offending token, so a
//! bound tree never fails for type reasons at run time.
//!
//! ## Scopes
//!
//! - `it` is the element the expression is evaluated against; bare identifiers are
//!   members of `it`.
//! - Lambda arguments of sequence methods (`Orders.Where(Amount > 10)`) rebind `it`
//!   to the sequence element.
//! - `outer` and `inner` exist only in a GroupJoin result selector.

pub mod methods;

use std::sync::Arc;

use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};

use crate::{
    ast::{BinOp, Expr, ExprKind, ImplicitParam, Literal, Projection, TypeTestOp, UnaryOp},
    config::ParsingConfig,
    error::{ParseError, ParseResult},
    record::{RecordSignature, RecordType, RecordTypeRegistry},
    types::{Conversion, Type},
    value::Value,
};

pub use methods::{Method, Overload, OverloadError, resolve_overload};

use methods::{no_method, numeric_overloads};

/// A typed expression node.
#[derive(Debug, Clone)]
pub struct Bound {
    pub kind: BoundKind,
    pub ty: Type,
}

impl Bound {
    pub fn new(kind: BoundKind, ty: Type) -> Self {
        Bound { kind, ty }
    }

    fn constant(value: Value, ty: Type) -> Self {
        Bound::new(BoundKind::Constant(value), ty)
    }

    fn is_param(&self) -> bool {
        matches!(self.kind, BoundKind::Param(_))
    }
}

#[derive(Debug, Clone)]
pub enum BoundKind {
    /// Literal or substituted external parameter
    Constant(Value),

    /// `it`, `outer` or `inner`
    Param(ImplicitParam),

    Member {
        target: Box<Bound>,
        member: Member,
        name: String,
        propagate_null: bool,
    },

    Index {
        target: Box<Bound>,
        index: Box<Bound>,
        propagate_null: bool,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Bound>,
    },

    /// Operands already share the operator's parameter type
    Binary {
        op: BinOp,
        left: Box<Bound>,
        right: Box<Bound>,
    },

    Conditional {
        test: Box<Bound>,
        if_true: Box<Bound>,
        if_false: Box<Bound>,
    },

    /// Implicit conversion of `operand` to the node's type
    Convert {
        operand: Box<Bound>,
    },

    New {
        record: Arc<RecordType>,
        fields: Vec<Bound>,
    },

    TypeIs {
        operand: Box<Bound>,
        target: Type,
    },

    TypeAs {
        operand: Box<Bound>,
        target: Type,
    },

    /// Catalog method call. For lambda methods `args[0]` is evaluated per element.
    Call {
        method: Method,
        target: Box<Bound>,
        args: Vec<Bound>,
        propagate_null: bool,
    },
}

/// How a member access reads its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    /// Entity field, by declared name
    Field(String),
    /// Dynamic record slot
    Slot(usize),
    StringLength,
    ListCount,
    HasValue,
    NullableValue,
}

/// Everything the binder needs to resolve names: the types of the implicit
/// parameters, the external argument list and the config.
#[derive(Clone)]
pub struct BindContext<'a> {
    config: &'a ParsingConfig,
    it: Type,
    outer: Option<Type>,
    inner: Option<Type>,
    args: &'a [Value],
    propagate_null: bool,
}

impl<'a> BindContext<'a> {
    pub fn new(config: &'a ParsingConfig, it: Type, args: &'a [Value]) -> Self {
        BindContext {
            config,
            it,
            outer: None,
            inner: None,
            args,
            propagate_null: config.null_propagation(),
        }
    }

    /// Context of a GroupJoin result selector: `it` and `outer` are the outer element,
    /// `inner` is the list of matching inner elements.
    pub fn for_join_result(
        config: &'a ParsingConfig,
        outer: Type,
        inner: Type,
        args: &'a [Value],
    ) -> Self {
        BindContext {
            outer: Some(outer.clone()),
            inner: Some(Type::list(inner)),
            ..BindContext::new(config, outer, args)
        }
    }

    pub fn config(&self) -> &ParsingConfig {
        self.config
    }

    fn scoped(&self, it: Type) -> Self {
        BindContext {
            it,
            ..self.clone()
        }
    }

    fn with_null_propagation(&self) -> Self {
        BindContext {
            propagate_null: true,
            ..self.clone()
        }
    }

    pub fn bind(&self, expr: &Expr) -> ParseResult<Bound> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Identifier(name) => {
                let it = self.param(ImplicitParam::It, pos)?;
                self.bind_member(it, name, pos)
            }
            ExprKind::Literal(literal) => Ok(bind_literal(literal)),
            ExprKind::MemberAccess { target, name } => {
                let target = self.bind(target)?;
                self.bind_member(target, name, pos)
            }
            ExprKind::Indexer { target, index } => self.bind_index(target, index, pos),
            ExprKind::MethodCall { target, name, args } => {
                self.bind_call(target.as_deref(), name, args, pos)
            }
            ExprKind::Unary { op, operand } => self.bind_unary(*op, operand, pos),
            ExprKind::Binary { op, left, right } => {
                let left = self.bind(left)?;
                let right = self.bind(right)?;
                self.bind_binary(*op, left, right, pos)
            }
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => self.bind_conditional(test, if_true, if_false, pos),
            ExprKind::NewProjection(members) => self.bind_new(members),
            ExprKind::TypeLiteral(name) => Err(ParseError::new(
                format!("Type name '{}' is not valid in this context", name),
                pos,
            )),
            ExprKind::TypeTest {
                op,
                operand,
                target,
            } => {
                let operand = self.bind(operand)?;
                let target = self.bind_type_literal(target)?;
                Ok(type_test(*op, operand, target))
            }
            ExprKind::ExternalParam(index) => self
                .args
                .get(*index)
                .map(|value| Bound::constant(value.clone(), value.runtime_type()))
                .ok_or_else(|| {
                    ParseError::new(format!("No value supplied for parameter '@{}'", index), pos)
                }),
            ExprKind::ImplicitParam(param) => match self.param(*param, pos) {
                // Outside a join `outer`/`inner` may still name a member of `it`
                Err(err) => {
                    let it = self.param(ImplicitParam::It, pos)?;
                    self.bind_member(it, param_name(*param), pos).map_err(|_| err)
                }
                bound => bound,
            },
        }
    }

    fn param(&self, param: ImplicitParam, pos: usize) -> ParseResult<Bound> {
        let ty = match param {
            ImplicitParam::It => Some(self.it.clone()),
            ImplicitParam::Outer => self.outer.clone(),
            ImplicitParam::Inner => self.inner.clone(),
        };
        let ty = ty.ok_or_else(|| {
            ParseError::new(
                format!(
                    "'{}' is only valid in a GroupJoin result selector",
                    param_name(param)
                ),
                pos,
            )
        })?;
        Ok(Bound::new(BoundKind::Param(param), ty))
    }

    /// Member accesses on a null target yield null instead of failing. The implicit
    /// parameters themselves are never null.
    fn propagates_through(&self, target: &Bound) -> bool {
        self.propagate_null && target.ty.is_nullable() && !target.is_param()
    }

    fn bind_member(&self, target: Bound, name: &str, pos: usize) -> ParseResult<Bound> {
        let names_equal = |expected: &str| self.config.names_equal(expected, name);
        let case_sensitive = self.config.case_sensitive();

        let resolved = match &target.ty {
            Type::Entity(entity) => entity
                .member(name, case_sensitive)
                .map(|(declared, ty)| (Member::Field(declared.to_string()), ty.clone())),
            Type::Record(record) => record
                .field(name, case_sensitive)
                .map(|(slot, _, ty)| (Member::Slot(slot), ty.clone())),
            Type::String if names_equal("Length") => Some((Member::StringLength, Type::Int32)),
            Type::List(_) if names_equal("Count") => Some((Member::ListCount, Type::Int32)),
            Type::Nullable(_) if names_equal("HasValue") => Some((Member::HasValue, Type::Boolean)),
            Type::Nullable(inner) if names_equal("Value") => {
                Some((Member::NullableValue, (**inner).clone()))
            }
            _ => None,
        };
        let Some((member, ty)) = resolved else {
            return Err(ParseError::new(
                format!("No property or field '{}' exists in type '{}'", name, target.ty),
                pos,
            ));
        };

        let propagate_null = member != Member::HasValue && self.propagates_through(&target);
        let ty = if propagate_null { ty.nullable() } else { ty };
        Ok(Bound::new(
            BoundKind::Member {
                target: Box::new(target),
                member,
                name: name.to_string(),
                propagate_null,
            },
            ty,
        ))
    }

    fn bind_index(&self, target: &Expr, index: &Expr, pos: usize) -> ParseResult<Bound> {
        let target = self.bind(target)?;
        let element = match &target.ty {
            Type::List(element) => (**element).clone(),
            Type::String => Type::Char,
            other => {
                return Err(ParseError::new(
                    format!("Cannot apply indexing with [] to an expression of type '{}'", other),
                    pos,
                ));
            }
        };
        let index_pos = index.pos;
        let index = self.bind(index)?;
        let index = self.convert_or_error(index, &Type::Int32, index_pos)?;

        let propagate_null = self.propagates_through(&target);
        let ty = if propagate_null { element.nullable() } else { element };
        Ok(Bound::new(
            BoundKind::Index {
                target: Box::new(target),
                index: Box::new(index),
                propagate_null,
            },
            ty,
        ))
    }

    fn bind_call(
        &self,
        target: Option<&Expr>,
        name: &str,
        args: &[Expr],
        pos: usize,
    ) -> ParseResult<Bound> {
        if target.is_none()
            && let Some(bound) = self.bind_function(name, args, pos)?
        {
            return Ok(bound);
        }

        // A bare call such as `Any()` is a method of `it`
        let target = match target {
            Some(target) => self.bind(target)?,
            None => self.param(ImplicitParam::It, pos)?,
        };
        let propagate = self.propagates_through(&target);

        let mut call = match &target.ty {
            Type::List(element) => {
                let element = (**element).clone();
                self.bind_sequence_method(target, element, name, args, pos)?
            }
            Type::String => self.bind_string_method(target, name, args, pos)?,
            other => return Err(no_method(name, other, pos)),
        };

        if propagate && let BoundKind::Call { propagate_null, .. } = &mut call.kind {
            *propagate_null = true;
            call.ty = call.ty.nullable();
        }
        Ok(call)
    }

    /// Target-less functions: `iif`, `np`, `is`, `as`. Returns `None` for any other name.
    fn bind_function(&self, name: &str, args: &[Expr], pos: usize) -> ParseResult<Option<Bound>> {
        let arity_error = |expected: &str| {
            ParseError::new(
                format!("Function '{}' expects {} arguments, found {}", name, expected, args.len()),
                pos,
            )
        };

        if self.config.names_equal("iif", name) {
            let [test, if_true, if_false] = args else {
                return Err(arity_error("3"));
            };
            return self.bind_conditional(test, if_true, if_false, pos).map(Some);
        }

        if self.config.names_equal("np", name) {
            let (value, default) = match args {
                [value] => (value, None),
                [value, default] => (value, Some(default)),
                _ => return Err(arity_error("1 or 2")),
            };
            let value = self.with_null_propagation().bind(value)?;
            return match default {
                Some(default) if value.ty.is_nullable() => {
                    let default = self.bind(default)?;
                    self.bind_coalesce(value, default, pos).map(Some)
                }
                _ => Ok(Some(value)),
            };
        }

        let op = if self.config.names_equal("is", name) {
            TypeTestOp::Is
        } else if self.config.names_equal("as", name) {
            TypeTestOp::As
        } else {
            return Ok(None);
        };
        let (operand, target) = match args {
            [target] => (self.param(ImplicitParam::It, pos)?, target),
            [operand, target] => (self.bind(operand)?, target),
            _ => return Err(arity_error("1 or 2")),
        };
        let target = self.bind_type_literal(target)?;
        Ok(Some(type_test(op, operand, target)))
    }

    fn bind_type_literal(&self, expr: &Expr) -> ParseResult<Type> {
        match &expr.kind {
            ExprKind::TypeLiteral(name) => resolve_type(name, expr.pos, self.config),
            _ => Err(ParseError::new("Type name expected", expr.pos)),
        }
    }

    fn bind_unary(&self, op: UnaryOp, operand: &Expr, pos: usize) -> ParseResult<Bound> {
        let operand = self.bind(operand)?;
        let incompatible = || {
            ParseError::new(
                format!("Operator '{}' incompatible with operand type '{}'", op, operand.ty),
                pos,
            )
        };

        let (operand, ty) = match op {
            UnaryOp::Not => {
                if operand.ty.non_nullable() != &Type::Boolean {
                    return Err(incompatible());
                }
                let ty = operand.ty.clone();
                (operand, ty)
            }
            UnaryOp::Negate => {
                let candidates = numeric_overloads(1, Type::clone);
                let chosen = resolve_overload(&candidates, std::slice::from_ref(&operand.ty))
                    .map_err(|_| incompatible())?;
                let ty = chosen.value.clone();
                (self.convert(operand, &ty), ty)
            }
        };
        Ok(Bound::new(
            BoundKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        ))
    }

    fn bind_binary(&self, op: BinOp, left: Bound, right: Bound, pos: usize) -> ParseResult<Bound> {
        let left = self.reconcile_literal(left, &right.ty);
        let right = self.reconcile_literal(right, &left.ty);
        let incompatible = |left: &Bound, right: &Bound| {
            ParseError::new(
                format!(
                    "Operator '{}' incompatible with operand types '{}' and '{}'",
                    op, left.ty, right.ty
                ),
                pos,
            )
        };

        match op {
            BinOp::And | BinOp::Or => {
                if left.ty != Type::Boolean || right.ty != Type::Boolean {
                    return Err(incompatible(&left, &right));
                }
                Ok(binary(op, left, right, Type::Boolean))
            }
            BinOp::NullCoalesce => self.bind_coalesce(left, right, pos),
            BinOp::Add if left.ty == Type::String || right.ty == Type::String => {
                Ok(binary(op, left, right, Type::String))
            }
            BinOp::Equal | BinOp::NotEqual => {
                let (left, right) = self
                    .unify_for_equality(left, right)
                    .map_err(|(left, right)| incompatible(&left, &right))?;
                Ok(binary(op, left, right, Type::Boolean))
            }
            _ => {
                let candidates = if op.is_arithmetic() {
                    numeric_overloads(2, Type::clone)
                } else {
                    relational_overloads()
                };
                let arg_types = [left.ty.clone(), right.ty.clone()];
                let Ok(chosen) = resolve_overload(&candidates, &arg_types) else {
                    return Err(incompatible(&left, &right));
                };
                let left = self.convert(left, &chosen.params[0]);
                let right = self.convert(right, &chosen.params[1]);
                Ok(binary(op, left, right, chosen.value.clone()))
            }
        }
    }

    /// Brings both sides of `==`/`!=` to a common type. Hands the operands back on
    /// failure so the caller can report them.
    fn unify_for_equality(&self, left: Bound, right: Bound) -> Result<(Bound, Bound), (Bound, Bound)> {
        if left.ty == right.ty {
            return Ok((left, right));
        }
        if left.ty.non_nullable().is_numeric() && right.ty.non_nullable().is_numeric() {
            let candidates = numeric_overloads(2, Type::clone);
            return match resolve_overload(&candidates, &[left.ty.clone(), right.ty.clone()]) {
                Ok(chosen) => {
                    let target = chosen.value.clone();
                    Ok((self.convert(left, &target), self.convert(right, &target)))
                }
                Err(_) => Err((left, right)),
            };
        }
        if left.ty.converts_to(&right.ty) {
            let target = right.ty.clone();
            return Ok((self.convert(left, &target), right));
        }
        if right.ty.converts_to(&left.ty) {
            let target = left.ty.clone();
            return Ok((left, self.convert(right, &target)));
        }
        Err((left, right))
    }

    fn bind_coalesce(&self, left: Bound, right: Bound, pos: usize) -> ParseResult<Bound> {
        let right = self.reconcile_literal(right, &left.ty);
        let incompatible = |left: &Bound, right: &Bound| {
            ParseError::new(
                format!(
                    "Operator '??' incompatible with operand types '{}' and '{}'",
                    left.ty, right.ty
                ),
                pos,
            )
        };
        if left.ty.is_value_type() {
            return Err(incompatible(&left, &right));
        }

        let (left, right, ty) = match &left.ty {
            Type::Nullable(inner) if right.ty.converts_to(inner) => {
                let ty = (**inner).clone();
                let right = self.convert(right, &ty);
                (left, right, ty)
            }
            _ if right.ty.converts_to(&left.ty) => {
                let ty = left.ty.clone();
                let right = self.convert(right, &ty);
                (left, right, ty)
            }
            _ if left.ty.non_nullable().converts_to(&right.ty) => {
                let ty = right.ty.clone();
                let left = self.convert(left, &ty.clone().nullable());
                (left, right, ty)
            }
            _ => return Err(incompatible(&left, &right)),
        };
        Ok(binary(BinOp::NullCoalesce, left, right, ty))
    }

    fn bind_conditional(
        &self,
        test: &Expr,
        if_true: &Expr,
        if_false: &Expr,
        pos: usize,
    ) -> ParseResult<Bound> {
        let test_pos = test.pos;
        let test = self.bind(test)?;
        let test = self.convert_or_error(test, &Type::Boolean, test_pos)?;

        let if_true = self.bind(if_true)?;
        let if_false = self.bind(if_false)?;
        let if_true = self.reconcile_literal(if_true, &if_false.ty);
        let if_false = self.reconcile_literal(if_false, &if_true.ty);

        let ty = match (&if_true.ty, &if_false.ty) {
            (a, b) if a == b => a.clone(),
            (Type::Null, other) | (other, Type::Null) if other.is_value_type() => {
                other.clone().nullable()
            }
            (a, b) if a.converts_to(b) => b.clone(),
            (a, b) if b.converts_to(a) => a.clone(),
            (a, b) => {
                return Err(ParseError::new(
                    format!("Neither of the types '{}' and '{}' converts to the other", a, b),
                    pos,
                ));
            }
        };
        let if_true = self.convert(if_true, &ty);
        let if_false = self.convert(if_false, &ty);
        Ok(Bound::new(
            BoundKind::Conditional {
                test: Box::new(test),
                if_true: Box::new(if_true),
                if_false: Box::new(if_false),
            },
            ty,
        ))
    }

    fn bind_new(&self, members: &[Projection]) -> ParseResult<Bound> {
        let mut signature: Vec<(String, Type)> = Vec::with_capacity(members.len());
        let mut fields = Vec::with_capacity(members.len());

        for member in members {
            if signature
                .iter()
                .any(|(name, _)| self.config.names_equal(name, &member.name))
            {
                return Err(ParseError::new(
                    format!("Duplicate property name '{}' in projection", member.name),
                    member.name_pos,
                ));
            }
            let bound = self.bind(&member.expr)?;
            let ty = match bound.ty {
                Type::Null => Type::Object,
                ref ty => ty.clone(),
            };
            fields.push(self.convert(bound, &ty));
            signature.push((member.name.clone(), ty));
        }

        let record = RecordTypeRegistry::global().get_or_create(RecordSignature::new(signature));
        Ok(Bound::new(
            BoundKind::New {
                record: Arc::clone(&record),
                fields,
            },
            Type::Record(record),
        ))
    }

    /// Lets a Double literal meet a Decimal operand (and the reverse) by converting
    /// the literal.
    fn reconcile_literal(&self, bound: Bound, other: &Type) -> Bound {
        let BoundKind::Constant(value) = &bound.kind else {
            return bound;
        };
        let converted = match (value, other.non_nullable()) {
            (Value::Double(d), Type::Decimal) => Decimal::from_f64(*d).map(Value::Decimal),
            (Value::Decimal(d), Type::Double) => d.to_f64().map(Value::Double),
            _ => None,
        };
        match converted {
            Some(value) => {
                let ty = value.runtime_type();
                Bound::constant(value, ty)
            }
            None => bound,
        }
    }

    /// Wraps `bound` in an implicit conversion to `target`. Callers have already
    /// checked the conversion exists.
    fn convert(&self, bound: Bound, target: &Type) -> Bound {
        match bound.ty.conversion_to(target) {
            Some(Conversion::Identity) => bound,
            Some(Conversion::NullLiteral) if matches!(bound.kind, BoundKind::Constant(_)) => {
                Bound::constant(Value::Null, target.clone())
            }
            _ => Bound::new(
                BoundKind::Convert {
                    operand: Box::new(bound),
                },
                target.clone(),
            ),
        }
    }

    pub(crate) fn convert_or_error(&self, bound: Bound, target: &Type, pos: usize) -> ParseResult<Bound> {
        if !bound.ty.converts_to(target) {
            return Err(ParseError::new(
                format!("Expression of type '{}' expected, found '{}'", target, bound.ty),
                pos,
            ));
        }
        Ok(self.convert(bound, target))
    }
}

/// Resolves a type name: predefined names first, then an exact full-name match in
/// the registry, then (when enabled) a unique simple-name match.
pub fn resolve_type(name: &str, pos: usize, config: &ParsingConfig) -> ParseResult<Type> {
    if let Some(ty) = Type::predefined(name) {
        return Ok(ty);
    }
    let registry = config.type_registry();
    if let Some(ty) = registry.get(name, config.case_sensitive()) {
        return Ok(ty.clone());
    }

    if config.resolve_types_by_simple_name() {
        let matches = registry.find_by_simple_name(name, config.case_sensitive());
        match matches.as_slice() {
            [] => {}
            [(_, ty)] => return Ok((*ty).clone()),
            many => {
                let candidates: Vec<&str> = many.iter().map(|(full_name, _)| *full_name).collect();
                return Err(ParseError::new(
                    format!(
                        "Ambiguous type name '{}' matches {}",
                        name,
                        candidates.join(", ")
                    ),
                    pos,
                ));
            }
        }
    }

    Err(ParseError::new(
        format!("Type '{}' could not be resolved", name),
        pos,
    ))
}

fn bind_literal(literal: &Literal) -> Bound {
    let (value, ty) = match literal {
        Literal::Null => (Value::Null, Type::Null),
        Literal::Boolean(b) => (Value::Boolean(*b), Type::Boolean),
        Literal::Int32(n) => (Value::Int32(*n), Type::Int32),
        Literal::Int64(n) => (Value::Int64(*n), Type::Int64),
        Literal::Decimal(d) => (Value::Decimal(*d), Type::Decimal),
        Literal::Double(n) => (Value::Double(*n), Type::Double),
        Literal::Char(c) => (Value::Char(*c), Type::Char),
        Literal::String(s) => (Value::String(s.clone()), Type::String),
    };
    Bound::constant(value, ty)
}

fn binary(op: BinOp, left: Bound, right: Bound, ty: Type) -> Bound {
    Bound::new(
        BoundKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        ty,
    )
}

fn type_test(op: TypeTestOp, operand: Bound, target: Type) -> Bound {
    match op {
        TypeTestOp::Is => Bound::new(
            BoundKind::TypeIs {
                operand: Box::new(operand),
                target,
            },
            Type::Boolean,
        ),
        TypeTestOp::As => {
            let ty = target.clone().nullable();
            Bound::new(
                BoundKind::TypeAs {
                    operand: Box::new(operand),
                    target,
                },
                ty,
            )
        }
    }
}

/// Relational operator candidates: the numeric kinds plus ordinal string, char and
/// boolean comparison, with lifted forms for value types.
fn relational_overloads() -> Vec<Overload<Type>> {
    let mut candidates = numeric_overloads(2, |_| Type::Boolean);
    candidates.push(Overload::new(vec![Type::String, Type::String], Type::Boolean));
    for ty in [Type::Char, Type::Boolean] {
        candidates.push(Overload::new(vec![ty.clone(), ty.clone()], Type::Boolean));
        let lifted = ty.nullable();
        candidates.push(Overload::new(vec![lifted.clone(), lifted], Type::Boolean));
    }
    candidates
}

fn param_name(param: ImplicitParam) -> &'static str {
    match param {
        ImplicitParam::It => "it",
        ImplicitParam::Outer => "outer",
        ImplicitParam::Inner => "inner",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::types::EntityType;

    fn bind_with(expr: &str, it: Type, config: &ParsingConfig) -> ParseResult<Bound> {
        let ast = Parser::from_source(expr, config)?.parse()?;
        BindContext::new(config, it, &[]).bind(&ast)
    }

    fn person() -> Type {
        let entity = EntityType::builder("App.Person")
            .member("Name", Type::String)
            .member("Age", Type::Int32)
            .member("Score", Type::Double)
            .member("Balance", Type::Decimal)
            .build();
        Type::entity(&entity)
    }

    #[test]
    fn test_numeric_promotion() {
        let config = ParsingConfig::default();
        assert_eq!(bind_with("Age + 1L", person(), &config).unwrap().ty, Type::Int64);
        assert_eq!(bind_with("Age * Score", person(), &config).unwrap().ty, Type::Double);
        assert_eq!(bind_with("Age + Balance", person(), &config).unwrap().ty, Type::Decimal);
    }

    #[test]
    fn test_decimal_double_literal_exception() {
        let config = ParsingConfig::default();
        assert!(bind_with("Balance + Score", person(), &config).is_err());
        assert_eq!(bind_with("Balance + 1.5", person(), &config).unwrap().ty, Type::Decimal);
        assert_eq!(bind_with("Score > 2.5m", person(), &config).unwrap().ty, Type::Boolean);
    }

    #[test]
    fn test_conditional_with_null_branch() {
        let config = ParsingConfig::default();
        let bound = bind_with("Age > 3 ? Age : null", person(), &config).unwrap();
        assert_eq!(bound.ty, Type::Int32.nullable());
    }

    #[test]
    fn test_null_propagation_widens_member_type() {
        let address = EntityType::builder("App.Address")
            .member("Zip", Type::Int32)
            .build();
        let customer = EntityType::builder("App.Customer")
            .member("Address", Type::entity(&address))
            .build();
        let it = Type::entity(&customer);

        let config = ParsingConfig::default();
        assert_eq!(bind_with("Address.Zip", it.clone(), &config).unwrap().ty, Type::Int32);
        assert_eq!(
            bind_with("np(Address.Zip)", it.clone(), &config).unwrap().ty,
            Type::Int32.nullable()
        );
        assert_eq!(bind_with("np(Address.Zip, 0)", it, &config).unwrap().ty, Type::Int32);
    }
}
