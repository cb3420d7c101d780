use rust_decimal::Decimal;

use crate::ast::{BinOp, UnaryOp};

/// Abstract Syntax Tree node representing a parsed expression.
///
/// Every node records the byte offset of the token that introduced it, so binding
/// errors can point at the offending part of the text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: usize,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: usize) -> Self {
        Expr { kind, pos }
    }

    /// Last member name of a path like `a.b.c`, used to name projected properties.
    pub fn path_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            ExprKind::MemberAccess { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Bare name, resolved against `it` by the binder
    ///
    /// # Example
    /// ```text
    /// Name
    /// ```
    Identifier(String),

    /// Literal value
    Literal(Literal),

    /// Member access
    ///
    /// # Examples
    /// ```text
    /// Address.City
    /// it.Name.Length
    /// ```
    MemberAccess { target: Box<Expr>, name: String },

    /// Indexer access
    ///
    /// # Example
    /// ```text
    /// Tags[0]
    /// ```
    Indexer { target: Box<Expr>, index: Box<Expr> },

    /// Method or function call. Functions such as `iif(...)` have no target.
    ///
    /// # Examples
    /// ```text
    /// Orders.Where(Amount > 10).Count()
    /// @0.Contains(UserName)
    /// iif(Age > 18, "adult", "minor")
    /// ```
    MethodCall {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },

    /// Unary operation
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Binary operation (arithmetic, comparison, logical, coalescing)
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Ternary conditional
    ///
    /// # Example
    /// ```text
    /// Age >= 18 ? "adult" : "minor"
    /// ```
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },

    /// Object construction projection; property order is the written order
    ///
    /// # Example
    /// ```text
    /// new(Name as UserName, Age * 12 as Months)
    /// ```
    NewProjection(Vec<Projection>),

    /// Raw type name, resolved by the binder
    ///
    /// # Examples
    /// ```text
    /// OfType("Worker")
    /// it is App.Models.Worker
    /// ```
    TypeLiteral(String),

    /// Infix type test or conversion (`e is T`, `e as T`); `target` is a `TypeLiteral`
    TypeTest {
        op: TypeTestOp,
        operand: Box<Expr>,
        target: Box<Expr>,
    },

    /// Caller-supplied positional argument (`@0`, `@1`, ...)
    ExternalParam(usize),

    /// `it`, `outer` or `inner`
    ImplicitParam(ImplicitParam),
}

/// Literal values. Numeric literals already carry their narrowest kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Decimal(Decimal),
    Double(f64),
    Char(char),
    String(String),
}

/// One `expr as Name` entry of a `new(...)` projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub name: String,
    pub expr: Expr,
    /// Offset of the property name (or of the expression when the name is inferred)
    pub name_pos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTestOp {
    Is,
    As,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplicitParam {
    /// Current element
    It,
    /// Outer element of a GroupJoin result selector
    Outer,
    /// Inner group of a GroupJoin result selector
    Inner,
}

/// One key of an ordering clause.
///
/// # Example
/// ```text
/// Name, Price DESC
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingItem {
    pub expr: Expr,
    pub ascending: bool,
}
