//! Dynamic query expressions over typed in-memory sequences.
//!
//! Expressions arrive as text (`Age >= 18 && Name.StartsWith("A")`), are lexed,
//! parsed, bound against a described element type and compiled into closures.
//!
//! ```
//! use dynaquery::{EntityType, Type, Value, compile_filter};
//!
//! let user = EntityType::builder("App.User")
//!     .member("Name", Type::String)
//!     .member("Age", Type::Int32)
//!     .build();
//! let bob = Value::entity(&user, [("Name", Value::from("Bob")), ("Age", Value::from(17))]);
//!
//! let adult = compile_filter("Age >= 18", &Type::entity(&user), &[], None).unwrap();
//! assert!(!adult.test(&bob).unwrap());
//! ```
pub mod ast;
pub mod binder;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod queryable;
pub mod record;
pub mod types;
pub mod value;

pub use ast::{BinOp, Expr, ExprKind, OrderingItem, Token, TokenKind};
pub use binder::{BindContext, Bound, BoundKind, resolve_type};
pub use compiler::{
    CompiledQuery, JoinSpec, OrderKey, OrderSpec, Predicate, Selector, compile_filter,
    compile_group_join, compile_ordering, compile_projection,
};
pub use config::{ExtensibilityPoint, ParsingConfig, ParsingConfigBuilder};
pub use error::{ExecError, ParseError, ParseResult, QueryError};
pub use lexer::{Lexer, tokenize};
pub use parser::Parser;
pub use queryable::{
    DefaultQueryableAnalyzer, Enumerable, Executor, InMemoryProvider, QueryOperation,
    QueryProvider, Queryable, QueryableAnalyzer, Rows,
};
pub use record::{DynamicRecord, RecordSignature, RecordType, RecordTypeRegistry};
pub use types::{EntityType, Type, TypeRegistry};
pub use value::Value;
