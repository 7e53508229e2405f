//! The Logica rule AST (§3).

pub mod annotation;
pub mod expr;
pub mod fold;
pub mod ident;
pub mod literal;
pub mod rule;
pub mod span;

pub use annotation::Annotation;
pub use expr::{Aggregation, Conjunct, Expr, ExprKind, Field, FieldValue, PredicateCall, Record};
pub use fold::AstFold;
pub use ident::PredicateName;
pub use literal::{Literal, Number};
pub use rule::Rule;
pub use span::{Buffer, SourceMap, Span};
