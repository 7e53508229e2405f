//! Minimal type inferencer (§4.11). A single pass assigns atomic kinds to
//! literals and unifies them across `==`/unification and record/list
//! construction. Its only consumer is diagnostics — nothing downstream of
//! this module depends on its result, so a unification conflict is
//! reported and compilation otherwise proceeds unaffected.

use std::collections::HashMap;

use crate::ast::{Conjunct, Expr, ExprKind, FieldValue, Literal, Number, Rule};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Str,
    Num,
    Bool,
    /// A record or list kind isn't tracked field-by-field (open/closed
    /// record unification is explicitly out of scope for a minimum-viable
    /// pass); it only prevents a record value unifying with an atomic one.
    Record,
    List,
}

impl Kind {
    fn of_literal(lit: &Literal) -> Option<Kind> {
        match lit {
            Literal::Number(_) => Some(Kind::Num),
            Literal::String(_) => Some(Kind::Str),
            Literal::Bool(_) => Some(Kind::Bool),
            Literal::List(_) => Some(Kind::List),
            Literal::Null | Literal::PredicateSymbol(_) => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Kind::Str => "Str",
            Kind::Num => "Num",
            Kind::Bool => "Bool",
            Kind::Record => "Record",
            Kind::List => "List",
        }
    }
}

/// One rule's worth of variable kind bindings, built up by walking its
/// conjuncts. Kept per-rule since Logica variables don't carry meaning
/// across rule boundaries.
#[derive(Debug, Default)]
struct Bindings {
    kinds: HashMap<String, Kind>,
}

impl Bindings {
    fn unify_var(&mut self, name: &str, kind: Kind, span: crate::ast::Span, errors: &mut Vec<Error>) {
        match self.kinds.get(name) {
            Some(existing) if *existing != kind => {
                errors.push(Error::type_error(
                    format!("variable {name} is implied to be {} and {}, which is impossible", existing.name(), kind.name()),
                    span,
                ));
            }
            Some(_) => {}
            None => {
                self.kinds.insert(name.to_string(), kind);
            }
        }
    }
}

/// Infers and checks literal/variable kinds across every rule, returning
/// one diagnostic per unification conflict found. An empty result does not
/// mean the program is well-typed in any strong sense — only that this
/// pass's narrow checks found nothing wrong.
pub fn infer(rules: &[Rule]) -> Vec<Error> {
    let mut errors = Vec::new();
    for rule in rules {
        let mut bindings = Bindings::default();
        if let Some(body) = &rule.body {
            for conjunct in body {
                walk_conjunct(conjunct, &mut bindings, &mut errors);
            }
        }
        for (_, value) in &rule.head.record.fields {
            walk_field_value(value, &mut bindings, &mut errors);
        }
    }
    errors
}

fn walk_conjunct(conjunct: &Conjunct, bindings: &mut Bindings, errors: &mut Vec<Error>) {
    match conjunct {
        Conjunct::Predicate(call) => {
            for (_, v) in &call.record.fields {
                walk_field_value(v, bindings, errors);
            }
        }
        Conjunct::Unification(l, r) => unify_exprs(l, r, bindings, errors),
        Conjunct::Inclusion(element, _list) => {
            walk_expr(element, bindings, errors);
        }
        Conjunct::Negation(inner, _) => walk_conjunct(inner, bindings, errors),
        Conjunct::Disjunction(a, b) => {
            for c in a.iter().chain(b.iter()) {
                walk_conjunct(c, bindings, errors);
            }
        }
    }
}

fn walk_field_value(value: &FieldValue, bindings: &mut Bindings, errors: &mut Vec<Error>) {
    match value {
        FieldValue::Expression(e) => walk_expr(e, bindings, errors),
        FieldValue::Aggregation(a) => walk_expr(&a.arg, bindings, errors),
    }
}

fn walk_expr(expr: &Expr, bindings: &mut Bindings, errors: &mut Vec<Error>) {
    match &expr.kind {
        ExprKind::Literal(lit) => {
            if let Literal::List(items) = lit {
                for item in items {
                    walk_expr(item, bindings, errors);
                }
            }
        }
        ExprKind::Variable(_) => {}
        ExprKind::Call(call) => {
            if call.name.name() == "==" && call.record.fields.len() == 2 {
                let l = call.record.fields[0].1.as_expression();
                let r = call.record.fields[1].1.as_expression();
                if let (Some(l), Some(r)) = (l, r) {
                    unify_exprs(l, r, bindings, errors);
                }
            }
            for (_, v) in &call.record.fields {
                walk_field_value(v, bindings, errors);
            }
        }
        ExprKind::Subscript(inner, _) => walk_expr(inner, bindings, errors),
        ExprKind::Record(r) => {
            for (_, v) in &r.fields {
                walk_field_value(v, bindings, errors);
            }
        }
        ExprKind::Combine(rule) => {
            if let Some(body) = &rule.body {
                for c in body {
                    walk_conjunct(c, bindings, errors);
                }
            }
        }
        ExprKind::Implication(arms, otherwise) => {
            for (c, v) in arms {
                walk_expr(c, bindings, errors);
                walk_expr(v, bindings, errors);
            }
            walk_expr(otherwise, bindings, errors);
        }
        ExprKind::Arrow(a, b) => {
            walk_expr(a, bindings, errors);
            walk_expr(b, bindings, errors);
        }
    }
}

fn unify_exprs(l: &Expr, r: &Expr, bindings: &mut Bindings, errors: &mut Vec<Error>) {
    walk_expr(l, bindings, errors);
    walk_expr(r, bindings, errors);

    let l_kind = literal_kind(l);
    let r_kind = literal_kind(r);
    match (l.as_variable(), r.as_variable(), l_kind, r_kind) {
        (Some(name), _, _, Some(kind)) => bindings.unify_var(name, kind, r.span, errors),
        (_, Some(name), Some(kind), _) => bindings.unify_var(name, kind, l.span, errors),
        _ => {}
    }
}

fn literal_kind(expr: &Expr) -> Option<Kind> {
    match &expr.kind {
        ExprKind::Literal(lit) => Kind::of_literal(lit),
        ExprKind::Record(_) => Some(Kind::Record),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Conjunct, Field, PredicateCall, PredicateName, Record, Span};

    fn unify_rule(lhs: Expr, rhs: Expr, span: Span) -> Rule {
        Rule {
            head: PredicateCall { name: PredicateName::from_name("P"), record: Record::default(), span },
            body: Some(vec![Conjunct::Unification(lhs, rhs)]),
            distinct_denoted: false,
            full_text: span,
        }
    }

    #[test]
    fn consistent_literal_unification_has_no_errors() {
        let span = Span::synthetic(0);
        let rule = unify_rule(
            Expr::variable("x", span),
            Expr::literal(Literal::Number(Number::Integer(1)), span),
            span,
        );
        assert!(infer(&[rule]).is_empty());
    }

    #[test]
    fn conflicting_literal_unification_is_reported() {
        let span = Span::synthetic(0);
        let mut record = Record::default();
        record.fields.push((Field::Named("v".to_string()), FieldValue::Expression(Expr::variable("x", span))));
        let rule1 =
            unify_rule(Expr::variable("x", span), Expr::literal(Literal::Number(Number::Integer(1)), span), span);
        let rule2 = Rule {
            head: PredicateCall { name: PredicateName::from_name("Q"), record, span },
            body: Some(vec![Conjunct::Unification(
                Expr::variable("x", span),
                Expr::literal(Literal::String("s".to_string()), span),
            )]),
            distinct_denoted: false,
            full_text: span,
        };
        // Different rules don't share bindings, so run both conflicting
        // unifications inside one rule's body to actually trigger the error.
        let combined = Rule {
            head: rule2.head.clone(),
            body: Some(
                rule1
                    .body
                    .unwrap()
                    .into_iter()
                    .chain(rule2.body.unwrap())
                    .collect(),
            ),
            distinct_denoted: false,
            full_text: span,
        };
        let errors = infer(&[combined]);
        assert_eq!(errors.len(), 1);
    }
}
