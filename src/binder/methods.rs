//! Method catalog and overload resolution.

use crate::{
    ast::Expr,
    binder::{BindContext, Bound, BoundKind},
    error::{ParseError, ParseResult},
    types::Type,
};

/// A resolved catalog method. Type-carrying variants hold their resolved target.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    // Sequence methods
    Contains,
    OfType(Type),
    Cast(Type),
    First,
    FirstOrDefault,
    Last,
    LastOrDefault,
    Single,
    SingleOrDefault,
    Where,
    Select,
    OrderBy,
    OrderByDescending,
    Skip,
    Take,
    Reverse,
    Any,
    All,
    Count,
    Sum,
    Min,
    Max,
    Average,

    // String methods
    StringContains,
    StartsWith,
    EndsWith,
    IndexOf,
    ToUpper,
    ToLower,
    Trim,
}

impl Method {
    /// True when the first argument is evaluated once per element with `it` rebound.
    pub fn takes_lambda(&self) -> bool {
        matches!(
            self,
            Method::First
                | Method::FirstOrDefault
                | Method::Last
                | Method::LastOrDefault
                | Method::Single
                | Method::SingleOrDefault
                | Method::Where
                | Method::Select
                | Method::OrderBy
                | Method::OrderByDescending
                | Method::Any
                | Method::All
                | Method::Count
                | Method::Sum
                | Method::Min
                | Method::Max
                | Method::Average
        )
    }
}

/// One candidate signature together with the value it stands for.
#[derive(Debug, Clone)]
pub struct Overload<T> {
    pub params: Vec<Type>,
    pub value: T,
}

impl<T> Overload<T> {
    pub fn new(params: Vec<Type>, value: T) -> Self {
        Overload { params, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverloadError {
    NoneApplicable,
    Ambiguous,
}

/// True when converting `arg` to `t1` is better than converting it to `t2`.
fn better_conversion(arg: &Type, t1: &Type, t2: &Type) -> bool {
    if t1 == t2 || arg == t2 {
        return false;
    }
    arg == t1 || t1.is_better_target_than(t2)
}

fn is_applicable<T>(candidate: &Overload<T>, args: &[Type]) -> bool {
    candidate.params.len() == args.len()
        && args
            .iter()
            .zip(&candidate.params)
            .all(|(arg, param)| arg.converts_to(param))
}

/// Picks the candidate that is at least as good as every other applicable candidate
/// on every argument.
pub fn resolve_overload<'c, T>(
    candidates: &'c [Overload<T>],
    args: &[Type],
) -> Result<&'c Overload<T>, OverloadError> {
    let applicable: Vec<&Overload<T>> = candidates
        .iter()
        .filter(|candidate| is_applicable(candidate, args))
        .collect();
    if applicable.is_empty() {
        return Err(OverloadError::NoneApplicable);
    }

    let not_worse = |a: &Overload<T>, b: &Overload<T>| {
        args.iter()
            .enumerate()
            .all(|(i, arg)| !better_conversion(arg, &b.params[i], &a.params[i]))
    };
    let mut best = applicable.iter().filter(|a| {
        applicable
            .iter()
            .all(|b| std::ptr::eq(**a, *b) || not_worse(**a, *b))
    });

    match (best.next(), best.next()) {
        (Some(winner), None) => Ok(*winner),
        _ => Err(OverloadError::Ambiguous),
    }
}

/// `T` and `T?` candidates for each numeric kind, mapped through `result`.
pub(crate) fn numeric_overloads(arity: usize, result: impl Fn(&Type) -> Type) -> Vec<Overload<Type>> {
    let mut candidates = Vec::new();
    for kind in [Type::Int32, Type::Int64, Type::Decimal, Type::Double] {
        for ty in [kind.clone(), kind.nullable()] {
            candidates.push(Overload::new(vec![ty.clone(); arity], result(&ty)));
        }
    }
    candidates
}

fn sum_overloads() -> Vec<Overload<Type>> {
    numeric_overloads(1, Type::clone)
}

fn average_overloads() -> Vec<Overload<Type>> {
    numeric_overloads(1, |ty| {
        let result = match ty.non_nullable() {
            Type::Decimal => Type::Decimal,
            _ => Type::Double,
        };
        if ty.is_value_type() {
            result
        } else {
            result.nullable()
        }
    })
}

const SEQUENCE_METHODS: [(&str, SequenceMethod); 23] = [
    ("Contains", SequenceMethod::Contains),
    ("OfType", SequenceMethod::OfType),
    ("Cast", SequenceMethod::Cast),
    ("First", SequenceMethod::Element(ElementKind::First, false)),
    ("FirstOrDefault", SequenceMethod::Element(ElementKind::First, true)),
    ("Last", SequenceMethod::Element(ElementKind::Last, false)),
    ("LastOrDefault", SequenceMethod::Element(ElementKind::Last, true)),
    ("Single", SequenceMethod::Element(ElementKind::Single, false)),
    ("SingleOrDefault", SequenceMethod::Element(ElementKind::Single, true)),
    ("Where", SequenceMethod::Where),
    ("Select", SequenceMethod::Select),
    ("OrderBy", SequenceMethod::OrderBy(true)),
    ("OrderByDescending", SequenceMethod::OrderBy(false)),
    ("Skip", SequenceMethod::Partition(true)),
    ("Take", SequenceMethod::Partition(false)),
    ("Reverse", SequenceMethod::Reverse),
    ("Any", SequenceMethod::Any),
    ("All", SequenceMethod::All),
    ("Count", SequenceMethod::Count),
    ("Sum", SequenceMethod::Aggregate(Aggregate::Sum)),
    ("Min", SequenceMethod::Aggregate(Aggregate::Min)),
    ("Max", SequenceMethod::Aggregate(Aggregate::Max)),
    ("Average", SequenceMethod::Aggregate(Aggregate::Average)),
];

#[derive(Clone, Copy)]
enum ElementKind {
    First,
    Last,
    Single,
}

#[derive(Clone, Copy)]
enum Aggregate {
    Sum,
    Min,
    Max,
    Average,
}

#[derive(Clone, Copy)]
enum SequenceMethod {
    Contains,
    OfType,
    Cast,
    Element(ElementKind, bool),
    Where,
    Select,
    OrderBy(bool),
    Partition(bool),
    Reverse,
    Any,
    All,
    Count,
    Aggregate(Aggregate),
}

fn string_overloads(name: &str) -> Option<Vec<Overload<Method>>> {
    let candidates = match name {
        "Contains" => vec![
            Overload::new(vec![Type::String], Method::StringContains),
            Overload::new(vec![Type::Char], Method::StringContains),
        ],
        "StartsWith" => vec![Overload::new(vec![Type::String], Method::StartsWith)],
        "EndsWith" => vec![Overload::new(vec![Type::String], Method::EndsWith)],
        "IndexOf" => vec![
            Overload::new(vec![Type::String], Method::IndexOf),
            Overload::new(vec![Type::Char], Method::IndexOf),
        ],
        "ToUpper" => vec![Overload::new(vec![], Method::ToUpper)],
        "ToLower" => vec![Overload::new(vec![], Method::ToLower)],
        "Trim" => vec![Overload::new(vec![], Method::Trim)],
        _ => return None,
    };
    Some(candidates)
}

const STRING_METHODS: [&str; 7] = [
    "Contains",
    "StartsWith",
    "EndsWith",
    "IndexOf",
    "ToUpper",
    "ToLower",
    "Trim",
];

impl BindContext<'_> {
    /// Binds `target.name(args)` where `target` is a list.
    pub(super) fn bind_sequence_method(
        &self,
        target: Bound,
        element: Type,
        name: &str,
        args: &[Expr],
        pos: usize,
    ) -> ParseResult<Bound> {
        let Some((canonical, method)) = SEQUENCE_METHODS
            .iter()
            .find(|(candidate, _)| self.config.names_equal(candidate, name))
        else {
            return Err(no_method(name, &target.ty, pos));
        };
        let list = Type::list(element.clone());

        let (method, bound_args, ty) = match *method {
            SequenceMethod::Contains => {
                expect_arity(canonical, args, 1..=1, pos)?;
                let arg = self.bind(&args[0])?;
                let arg = self.reconcile_literal(arg, &element);
                let candidates = [Overload::new(vec![element.clone()], ())];
                let arg = match resolve_overload(&candidates, std::slice::from_ref(&arg.ty)) {
                    Ok(_) => self.convert(arg, &element),
                    Err(_) => return Err(no_applicable(canonical, &list, pos)),
                };
                (Method::Contains, vec![arg], Type::Boolean)
            }
            SequenceMethod::OfType | SequenceMethod::Cast => {
                expect_arity(canonical, args, 1..=1, pos)?;
                let target_ty = self.bind_type_literal(&args[0])?;
                let method = match *method {
                    SequenceMethod::OfType => Method::OfType(target_ty.clone()),
                    _ => Method::Cast(target_ty.clone()),
                };
                (method, vec![], Type::list(target_ty))
            }
            SequenceMethod::Element(kind, or_default) => {
                expect_arity(canonical, args, 0..=1, pos)?;
                let predicate = self.bind_optional_predicate(&element, args)?;
                let method = match (kind, or_default) {
                    (ElementKind::First, false) => Method::First,
                    (ElementKind::First, true) => Method::FirstOrDefault,
                    (ElementKind::Last, false) => Method::Last,
                    (ElementKind::Last, true) => Method::LastOrDefault,
                    (ElementKind::Single, false) => Method::Single,
                    (ElementKind::Single, true) => Method::SingleOrDefault,
                };
                let ty = if or_default {
                    element.clone().nullable()
                } else {
                    element.clone()
                };
                (method, predicate, ty)
            }
            SequenceMethod::Where => {
                expect_arity(canonical, args, 1..=1, pos)?;
                let predicate = self.bind_optional_predicate(&element, args)?;
                (Method::Where, predicate, list)
            }
            SequenceMethod::Select => {
                expect_arity(canonical, args, 1..=1, pos)?;
                let selector = self.scoped(element).bind(&args[0])?;
                let ty = Type::list(selector.ty.clone());
                (Method::Select, vec![selector], ty)
            }
            SequenceMethod::OrderBy(ascending) => {
                expect_arity(canonical, args, 1..=1, pos)?;
                let key = self.scoped(element).bind(&args[0])?;
                if !key.ty.is_comparable() {
                    return Err(ParseError::new(
                        format!("Expression of type '{}' cannot be used as an ordering key", key.ty),
                        args[0].pos,
                    ));
                }
                let method = if ascending {
                    Method::OrderBy
                } else {
                    Method::OrderByDescending
                };
                (method, vec![key], list)
            }
            SequenceMethod::Partition(skip) => {
                expect_arity(canonical, args, 1..=1, pos)?;
                let count = self.bind(&args[0])?;
                let count = self.convert_or_error(count, &Type::Int32, args[0].pos)?;
                let method = if skip { Method::Skip } else { Method::Take };
                (method, vec![count], list)
            }
            SequenceMethod::Reverse => {
                expect_arity(canonical, args, 0..=0, pos)?;
                (Method::Reverse, vec![], list)
            }
            SequenceMethod::Any => {
                expect_arity(canonical, args, 0..=1, pos)?;
                let predicate = self.bind_optional_predicate(&element, args)?;
                (Method::Any, predicate, Type::Boolean)
            }
            SequenceMethod::All => {
                expect_arity(canonical, args, 1..=1, pos)?;
                let predicate = self.bind_optional_predicate(&element, args)?;
                (Method::All, predicate, Type::Boolean)
            }
            SequenceMethod::Count => {
                expect_arity(canonical, args, 0..=1, pos)?;
                let predicate = self.bind_optional_predicate(&element, args)?;
                (Method::Count, predicate, Type::Int32)
            }
            SequenceMethod::Aggregate(aggregate) => {
                expect_arity(canonical, args, 0..=1, pos)?;
                let selector = match args.first() {
                    Some(arg) => self.scoped(element.clone()).bind(arg)?,
                    None => Bound::new(BoundKind::Param(crate::ast::ImplicitParam::It), element),
                };
                self.bind_aggregate(aggregate, canonical, selector, &list, pos)?
            }
        };

        Ok(Bound::new(
            BoundKind::Call {
                method,
                target: Box::new(target),
                args: bound_args,
                propagate_null: false,
            },
            ty,
        ))
    }

    fn bind_aggregate(
        &self,
        aggregate: Aggregate,
        name: &str,
        selector: Bound,
        list: &Type,
        pos: usize,
    ) -> ParseResult<(Method, Vec<Bound>, Type)> {
        match aggregate {
            Aggregate::Min | Aggregate::Max => {
                if !selector.ty.is_comparable() {
                    return Err(no_applicable(name, list, pos));
                }
                let method = match aggregate {
                    Aggregate::Min => Method::Min,
                    _ => Method::Max,
                };
                let ty = selector.ty.clone();
                Ok((method, vec![selector], ty))
            }
            Aggregate::Sum | Aggregate::Average => {
                let (candidates, method) = match aggregate {
                    Aggregate::Sum => (sum_overloads(), Method::Sum),
                    _ => (average_overloads(), Method::Average),
                };
                let chosen = resolve_overload(&candidates, std::slice::from_ref(&selector.ty))
                    .map_err(|_| no_applicable(name, list, pos))?;
                let selector = self.convert(selector, &chosen.params[0]);
                Ok((method, vec![selector], chosen.value.clone()))
            }
        }
    }

    /// Binds an optional predicate lambda over `element`.
    fn bind_optional_predicate(&self, element: &Type, args: &[Expr]) -> ParseResult<Vec<Bound>> {
        let Some(arg) = args.first() else {
            return Ok(vec![]);
        };
        let predicate = self.scoped(element.clone()).bind(arg)?;
        let predicate = self.convert_or_error(predicate, &Type::Boolean, arg.pos)?;
        Ok(vec![predicate])
    }

    /// Binds `target.name(args)` where `target` is a string.
    pub(super) fn bind_string_method(
        &self,
        target: Bound,
        name: &str,
        args: &[Expr],
        pos: usize,
    ) -> ParseResult<Bound> {
        let Some(canonical) = STRING_METHODS
            .iter()
            .find(|candidate| self.config.names_equal(candidate, name))
        else {
            return Err(no_method(name, &Type::String, pos));
        };
        let candidates = string_overloads(canonical).unwrap_or_default();

        let bound_args = args
            .iter()
            .map(|arg| self.bind(arg))
            .collect::<ParseResult<Vec<_>>>()?;
        let arg_types: Vec<Type> = bound_args.iter().map(|arg| arg.ty.clone()).collect();
        let chosen = resolve_overload(&candidates, &arg_types).map_err(|err| match err {
            OverloadError::NoneApplicable => no_applicable(canonical, &Type::String, pos),
            OverloadError::Ambiguous => ParseError::new(
                format!("Ambiguous invocation of method '{}' in type 'String'", canonical),
                pos,
            ),
        })?;

        let ty = match chosen.value {
            Method::IndexOf => Type::Int32,
            Method::ToUpper | Method::ToLower | Method::Trim => Type::String,
            _ => Type::Boolean,
        };
        let bound_args = bound_args
            .into_iter()
            .zip(&chosen.params)
            .map(|(arg, param)| self.convert(arg, param))
            .collect();

        Ok(Bound::new(
            BoundKind::Call {
                method: chosen.value.clone(),
                target: Box::new(target),
                args: bound_args,
                propagate_null: false,
            },
            ty,
        ))
    }
}

fn expect_arity(
    name: &str,
    args: &[Expr],
    range: std::ops::RangeInclusive<usize>,
    pos: usize,
) -> ParseResult<()> {
    if range.contains(&args.len()) {
        return Ok(());
    }
    Err(ParseError::new(
        format!("No overload of method '{}' takes {} arguments", name, args.len()),
        pos,
    ))
}

pub(super) fn no_method(name: &str, ty: &Type, pos: usize) -> ParseError {
    ParseError::new(
        format!("No applicable method '{}' exists in type '{}'", name, ty),
        pos,
    )
}

fn no_applicable(name: &str, ty: &Type, pos: usize) -> ParseError {
    ParseError::new(
        format!(
            "No applicable overload of method '{}' in type '{}' matches the arguments",
            name, ty
        ),
        pos,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_wins() {
        let candidates = numeric_overloads(2, Type::clone);
        let chosen = resolve_overload(&candidates, &[Type::Int32, Type::Int32]).unwrap();
        assert_eq!(chosen.value, Type::Int32);
    }

    #[test]
    fn test_better_target_wins() {
        let candidates = numeric_overloads(2, Type::clone);
        let chosen = resolve_overload(&candidates, &[Type::Int32, Type::Int64]).unwrap();
        assert_eq!(chosen.value, Type::Int64);

        let chosen = resolve_overload(&candidates, &[Type::Int32.nullable(), Type::Int32]).unwrap();
        assert_eq!(chosen.value, Type::Int32.nullable());
    }

    #[test]
    fn test_decimal_and_double_do_not_mix() {
        let candidates = numeric_overloads(2, Type::clone);
        let err = resolve_overload(&candidates, &[Type::Decimal, Type::Double]).unwrap_err();
        assert_eq!(err, OverloadError::NoneApplicable);
    }

    #[test]
    fn test_ambiguous_candidates() {
        // Int32 widens to both, neither Decimal nor Double is better
        let candidates = vec![
            Overload::new(vec![Type::Decimal], "decimal"),
            Overload::new(vec![Type::Double], "double"),
        ];
        let err = resolve_overload(&candidates, &[Type::Int32]).unwrap_err();
        assert_eq!(err, OverloadError::Ambiguous);

        let chosen = resolve_overload(&candidates, &[Type::Double]).unwrap();
        assert_eq!(chosen.value, "double");
    }
}
