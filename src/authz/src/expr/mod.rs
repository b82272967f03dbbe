//! Matcher expression language
//!
//! Matchers are boolean expressions over the request (`r.*`) and one policy
//! rule (`p.*`). They are parsed once into an [`Expr`] tree, cached by the
//! [`Engine`], and interpreted against an [`EvalContext`] per rule.
//!
//! Supported syntax:
//! - literals: `'text'`, `"text"`, numbers, `true`, `false`
//! - references: `r.sub`, `p.obj`, attribute paths such as `r.sub.age`
//! - operators: `!`, `-`, `+`, `==`, `!=`, `<`, `<=`, `>`, `>=`, `in`, `&&`, `||`
//! - tuples for membership: `r.act in ('read', 'write')`
//! - calls: built-ins from [`FunctionMap`], role graphs (`g(r.sub, p.sub)`),
//!   `hasLink('g', a, b)` and `eval(p.rule)`

pub mod ast;
pub mod context;
pub mod engine;
pub mod error;
pub mod functions;
pub mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use context::EvalContext;
pub use engine::{CacheStats, Engine, Program};
pub use error::ExprError;
pub use functions::{Function, FunctionMap};
pub use parser::parse;
