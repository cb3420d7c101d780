//! # Abstract Syntax Tree
//!
//! This module defines the tokens and syntax tree of the dynamic expression
//! language: small, C#-flavoured expressions evaluated against one element at a
//! time.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (literals, access, calls, operations, projections)
//! - **[operators]** - Unary and binary operators
//!
//! ## Quick Start
//!
//! ```text
//! Age >= 18 && Name.StartsWith("A")
//! ```
//!
//! Keeps the elements whose `Age` is at least 18 and whose `Name` starts with "A".
//!
//! ## Core Concepts
//!
//! ### The Implicit Element
//!
//! Bare identifiers are members of the current element, which can also be named
//! explicitly as `it`: `Name` and `it.Name` are the same expression.
//!
//! ### External Parameters
//!
//! `@0`, `@1`, ... refer to values the caller passes alongside the expression:
//!
//! ```text
//! @0.Contains(UserName)
//! ```
//!
//! ### Projections
//!
//! `new(...)` builds a dynamic record whose property order is the written order:
//!
//! ```text
//! new(Name as UserName, Orders.Count() as OrderCount)
//! ```
//!
//! ### Type Tests
//!
//! ```text
//! it is "Worker"
//! as("Worker") != null
//! ```
//!
//! ### Reserved Words
//!
//! `new it outer inner is as null true false and or not` are keywords, matched
//! case-insensitively unless the config is case-sensitive. A member spelled like
//! one of them is reached through `it`: `it.Or`, `it.New`. Outside a GroupJoin
//! result selector a bare `Outer` or `Inner` falls back to the member of that name.
//!
//! ### Ordering Clauses
//!
//! ```text
//! Name, Price DESC
//! ```
pub mod expressions;
pub mod operators;
pub mod tokens;

pub use expressions::{
    Expr, ExprKind, ImplicitParam, Literal, OrderingItem, Projection, TypeTestOp,
};
pub use operators::{BinOp, UnaryOp};
pub use tokens::{Keyword, Token, TokenKind};
