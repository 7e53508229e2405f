//! Program annotations (§6 "Program annotations").
//!
//! Every annotation is parsed uniformly as `@Keyword(call)`, where `call`
//! reuses the ordinary [`PredicateCall`] grammar — `@Limit(Foo, 10)` is
//! exactly as if `Limit` were a predicate named `Foo` called with a single
//! positional argument `10`. This mirrors how the rest of §4.2's grammar
//! already parses calls, so the annotation grammar doesn't need a second,
//! bespoke parser.

use serde::{Deserialize, Serialize};

use super::expr::PredicateCall;
use super::span::Span;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub keyword: String,
    pub call: PredicateCall,
    pub span: Span,
}

impl Annotation {
    pub fn subject(&self) -> &str {
        self.call.name.name()
    }
}

/// The fixed annotation vocabulary from §6. An annotation using any other
/// keyword is an [`crate::error::Reason::BadAnnotation`].
pub const KNOWN_ANNOTATIONS: &[&str] = &[
    "DefineFlag",
    "ResetFlagValue",
    "Engine",
    "Dataset",
    "AttachDatabase",
    "Ground",
    "Limit",
    "OrderBy",
    "NoInject",
    "With",
    "NoWith",
    "CompileAsTvf",
    "CompileAsUdf",
    "Make",
    "Iteration",
];
