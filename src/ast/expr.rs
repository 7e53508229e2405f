//! Expressions, predicate calls and records (§3).

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use super::ident::PredicateName;
use super::literal::Literal;
use super::rule::Rule;
use super::span::Span;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    pub fn variable(name: impl ToString, span: Span) -> Self {
        Expr::new(ExprKind::Variable(name.to_string()), span)
    }

    pub fn literal(lit: Literal, span: Span) -> Self {
        Expr::new(ExprKind::Literal(lit), span)
    }

    pub fn as_variable(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Variable(name) => Some(name),
            _ => None,
        }
    }

    /// True for record *literals* per §4.2: a bare `{...}` value, as opposed
    /// to the record carried inside a [`crate::ast::expr::PredicateCall`].
    pub fn as_record_literal(&self) -> Option<&Record> {
        match &self.kind {
            ExprKind::Record(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    Call(PredicateCall),
    Subscript(Box<Expr>, String),
    Record(Record),
    /// An inlined aggregation sub-rule (`combine Op= expr :- body`).
    Combine(Box<Rule>),
    /// `if C1 then V1 else if C2 then V2 else V3`, flattened to a list of
    /// `(condition, value)` arms plus a mandatory final `else`.
    Implication(Vec<(Expr, Expr)>, Box<Expr>),
    /// `a -> b`, used by `ArgMin=`/`ArgMax=` to pair a sort key with a
    /// result expression.
    Arrow(Box<Expr>, Box<Expr>),
}

/// A field selector: either the ordinal position of an unnamed call argument,
/// or an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Positional(u32),
    Named(String),
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Positional(i) => write!(f, "{i}"),
            Field::Named(s) => write!(f, "{s}"),
        }
    }
}

/// Reserved field name carrying a predicate's scalar return value, used by
/// function-rules (`Head --> Expr`) and by function-call inlining.
pub const LOGICA_VALUE: &str = "logica_value";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Operator name pre-desugaring (`"Sum"`, `"Max"`, `"+"`, `"++"`, …).
    pub op: String,
    pub arg: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum FieldValue {
    Expression(Expr),
    /// Present only pre-desugaring; eliminated by §4.3 step 3.
    Aggregation(Aggregation),
}

impl FieldValue {
    pub fn span(&self) -> Span {
        match self {
            FieldValue::Expression(e) => e.span,
            FieldValue::Aggregation(a) => a.span,
        }
    }
}

/// An ordered field -> value sequence, as carried by a predicate call or a
/// record literal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub fields: Vec<(Field, FieldValue)>,
    /// `{..rest}`: only legal as the last field of a record appearing inside
    /// a predicate call (§4.2 Records).
    pub rest: bool,
}

impl Record {
    pub fn get(&self, field: &Field) -> Option<&FieldValue> {
        self.fields.iter().find(|(f, _)| f == field).map(|(_, v)| v)
    }

    pub fn get_named(&self, name: &str) -> Option<&FieldValue> {
        self.get(&Field::Named(name.to_string()))
    }

    pub fn next_positional_index(&self) -> u32 {
        self.fields
            .iter()
            .filter(|(f, _)| matches!(f, Field::Positional(_)))
            .count() as u32
    }

    pub fn push_positional(&mut self, value: FieldValue) {
        let idx = self.next_positional_index();
        self.fields.push((Field::Positional(idx), value));
    }

    pub fn push_named(&mut self, name: impl ToString, value: FieldValue) {
        self.fields.push((Field::Named(name.to_string()), value));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateCall {
    pub name: PredicateName,
    pub record: Record,
    pub span: Span,
}

impl PredicateCall {
    pub fn field_names(&self) -> Vec<Field> {
        self.record.fields.iter().map(|(f, _)| f.clone()).collect()
    }
}

/// A conjunct in a rule body. `Disjunction` only appears pre-desugaring
/// (§4.3 step 1 removes it); `Negation` only appears pre-desugaring (rewritten
/// to `IsNull(combine …)` by the negation pass run before DNF rewrite).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Conjunct {
    Predicate(PredicateCall),
    Unification(Expr, Expr),
    Inclusion(Expr, Expr),
    Negation(Box<Conjunct>, Span),
    Disjunction(Vec<Conjunct>, Vec<Conjunct>),
}

impl Conjunct {
    pub fn span(&self) -> Span {
        match self {
            Conjunct::Predicate(c) => c.span,
            Conjunct::Unification(l, r) => l.span.merge(r.span),
            Conjunct::Inclusion(e, l) => e.span.merge(l.span),
            Conjunct::Negation(_, span) => *span,
            Conjunct::Disjunction(a, b) => {
                let left = a.first().map(|c| c.span());
                let right = b.last().map(|c| c.span());
                match (left, right) {
                    (Some(l), Some(r)) => l.merge(r),
                    (Some(l), None) => l,
                    (None, Some(r)) => r,
                    (None, None) => unreachable!("empty disjunction side"),
                }
            }
        }
    }
}
