//! Function-call inlining (§4.3 step 5). A call to a user-defined function
//! rule (`Head --> Expr`, desugared into an ordinary predicate with a
//! `logica_value` field) can't be evaluated in expression position by SQL —
//! it has to become a join. Every non-builtin `Call` appearing in value
//! position is replaced by a fresh variable, with a new body conjunct added
//! that binds the call's `logica_value` output to that variable.

use anyhow::Result;

use crate::ast::fold;
use crate::ast::{AstFold, Conjunct, Expr, ExprKind, FieldValue, Rule};
use crate::ast::expr::LOGICA_VALUE;
use crate::error::Error;
use crate::utils::NameGenerator;

const BUILTINS: &[&str] = &[
    "+", "-", "*", "/", "%", "^", "++", "++?", "==", "!=", "<=", ">=", "<", ">", "in",
    "And", "Or", "In", "Not", "Minus", "IsNull", "Cast",
];

fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name) || name.starts_with("Agg")
}

pub fn rewrite(rules: Vec<Rule>, gen: &mut NameGenerator) -> Result<Vec<Rule>, Error> {
    rules
        .into_iter()
        .map(|r| rewrite_rule(r, gen))
        .collect::<Result<Vec<_>, anyhow::Error>>()
        .map_err(|e| Error::simple(e.to_string()))
}

fn rewrite_rule(rule: Rule, gen: &mut NameGenerator) -> Result<Rule> {
    let mut pass = FunctionInlining { gen, extra: Vec::new() };
    let mut folded = pass.fold_rule(rule)?;
    if !pass.extra.is_empty() {
        let mut body = folded.body.take().unwrap_or_default();
        body.extend(pass.extra);
        folded.body = Some(body);
    }
    Ok(folded)
}

struct FunctionInlining<'a> {
    gen: &'a mut NameGenerator,
    extra: Vec<Conjunct>,
}

impl<'a> AstFold for FunctionInlining<'a> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        match expr.kind {
            ExprKind::Call(call) if !is_builtin(call.name.name()) => {
                let mut inlined = self.fold_predicate_call(call)?;
                let fresh = self.gen.gen();
                inlined.record.push_named(
                    LOGICA_VALUE,
                    FieldValue::Expression(Expr::variable(&fresh, expr.span)),
                );
                self.extra.push(Conjunct::Predicate(inlined));
                Ok(Expr::variable(&fresh, expr.span))
            }
            other => fold::fold_expr(self, Expr::new(other, expr.span)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PredicateCall, PredicateName, Record, Span};

    #[test]
    fn non_builtin_call_in_value_position_becomes_join_conjunct() {
        let span = Span::synthetic(0);
        let mut gen = NameGenerator::new("f");

        let mut inner_record = Record::default();
        inner_record.push_positional(FieldValue::Expression(Expr::variable("x", span)));
        let call_expr = Expr::new(
            ExprKind::Call(PredicateCall { name: PredicateName::from_name("Double"), record: inner_record, span }),
            span,
        );

        let mut head_record = Record::default();
        head_record.push_positional(FieldValue::Expression(call_expr));
        let rule = Rule {
            head: PredicateCall { name: PredicateName::from_name("P"), record: head_record, span },
            body: Some(vec![Conjunct::Predicate(PredicateCall {
                name: PredicateName::from_name("Src"),
                record: {
                    let mut r = Record::default();
                    r.push_positional(FieldValue::Expression(Expr::variable("x", span)));
                    r
                },
                span,
            })]),
            distinct_denoted: false,
            full_text: span,
        };

        let out = rewrite_rule(rule, &mut gen).unwrap();
        match &out.head.record.fields[0].1 {
            FieldValue::Expression(e) => assert!(matches!(&e.kind, ExprKind::Variable(_))),
            _ => panic!(),
        }
        let body = out.body.unwrap();
        assert_eq!(body.len(), 2);
        match &body[1] {
            Conjunct::Predicate(call) => {
                assert_eq!(call.name.name(), "Double");
                assert!(call.record.fields.iter().any(|(_, v)| matches!(v, FieldValue::Expression(e) if matches!(&e.kind, ExprKind::Variable(_)))));
            }
            _ => panic!("expected predicate conjunct"),
        }
    }

    #[test]
    fn builtin_call_is_left_in_place() {
        let span = Span::synthetic(0);
        let mut gen = NameGenerator::new("f");
        let mut record = Record::default();
        record.push_positional(FieldValue::Expression(Expr::variable("x", span)));
        record.push_positional(FieldValue::Expression(Expr::variable("y", span)));
        let call_expr = Expr::new(
            ExprKind::Call(PredicateCall { name: PredicateName::from_name("+"), record, span }),
            span,
        );
        let mut head_record = Record::default();
        head_record.push_positional(FieldValue::Expression(call_expr));
        let rule = Rule {
            head: PredicateCall { name: PredicateName::from_name("P"), record: head_record, span },
            body: None,
            distinct_denoted: false,
            full_text: span,
        };
        let out = rewrite_rule(rule, &mut gen).unwrap();
        match &out.head.record.fields[0].1 {
            FieldValue::Expression(e) => match &e.kind {
                ExprKind::Call(c) => assert_eq!(c.name.name(), "+"),
                _ => panic!(),
            },
            _ => panic!(),
        }
        assert!(out.body.is_none());
    }
}
