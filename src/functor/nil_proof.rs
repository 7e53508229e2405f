//! Nil proof (§4.4, post-make pass). After functor expansion, a predicate
//! whose every defining rule references the built-in always-empty `nil`
//! predicate is itself empty; propagating that fact (replace its references
//! elsewhere with `nil`, drop its own rules, repeat) is how recursion's
//! vertical-unfolding base case (`P_r0 := P_recursive_head(P_recursive: nil)`)
//! eventually terminates the unfolded chain.

use std::collections::HashMap;

use crate::ast::{AstFold, Conjunct, PredicateCall, PredicateName, Rule, Span};
use crate::error::Error;

const NIL: &str = "nil";

pub fn prove_nil(mut rules: Vec<Rule>) -> Result<Vec<Rule>, Error> {
    loop {
        let mut by_name: HashMap<String, Vec<&Rule>> = HashMap::new();
        for r in &rules {
            by_name.entry(r.predicate_name().to_string()).or_default().push(r);
        }

        let newly_empty: Vec<String> = by_name
            .iter()
            .filter(|(name, _)| name.as_str() != NIL)
            .filter(|(_, rs)| rs.iter().all(|r| rule_references_nil(r)))
            .map(|(name, _)| name.clone())
            .collect();

        if newly_empty.is_empty() {
            return Ok(rules);
        }

        for name in &newly_empty {
            if !name.contains('_') {
                return Err(Error::functor(
                    PredicateName::from_name(name.clone()),
                    "recursion base case missing: predicate is provably empty",
                    rules
                        .iter()
                        .find(|r| r.predicate_name() == name)
                        .map(|r| r.full_text)
                        .unwrap_or_else(|| Span::synthetic(0)),
                ));
            }
        }

        let mut renamer = NilRenamer { targets: newly_empty.iter().cloned().collect() };
        rules = rules
            .into_iter()
            .filter(|r| !newly_empty.contains(&r.predicate_name().to_string()))
            .map(|r| renamer.fold_rule(r))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(|e| Error::simple(e.to_string()))?;
    }
}

fn rule_references_nil(rule: &Rule) -> bool {
    match &rule.body {
        None => false,
        Some(body) => body.iter().any(conjunct_references_nil),
    }
}

fn conjunct_references_nil(conjunct: &Conjunct) -> bool {
    match conjunct {
        Conjunct::Predicate(call) => call_references_nil(call),
        Conjunct::Unification(l, r) | Conjunct::Inclusion(l, r) => {
            expr_references_nil(l) || expr_references_nil(r)
        }
        Conjunct::Negation(inner, _) => conjunct_references_nil(inner),
        Conjunct::Disjunction(a, b) => {
            a.iter().any(conjunct_references_nil) || b.iter().any(conjunct_references_nil)
        }
    }
}

fn call_references_nil(call: &PredicateCall) -> bool {
    if call.name.name() == NIL {
        return true;
    }
    call.record.fields.iter().any(|(_, v)| match v {
        crate::ast::FieldValue::Expression(e) => expr_references_nil(e),
        crate::ast::FieldValue::Aggregation(a) => expr_references_nil(&a.arg),
    })
}

fn expr_references_nil(expr: &crate::ast::Expr) -> bool {
    use crate::ast::ExprKind;
    match &expr.kind {
        ExprKind::Literal(crate::ast::Literal::PredicateSymbol(name)) => name.name() == NIL,
        ExprKind::Call(c) => call_references_nil(c),
        ExprKind::Subscript(inner, _) => expr_references_nil(inner),
        ExprKind::Record(r) => r.fields.iter().any(|(_, v)| match v {
            crate::ast::FieldValue::Expression(e) => expr_references_nil(e),
            crate::ast::FieldValue::Aggregation(a) => expr_references_nil(&a.arg),
        }),
        ExprKind::Combine(rule) => rule_references_nil(rule),
        ExprKind::Implication(arms, otherwise) => {
            arms.iter().any(|(c, v)| expr_references_nil(c) || expr_references_nil(v))
                || expr_references_nil(otherwise)
        }
        ExprKind::Arrow(a, b) => expr_references_nil(a) || expr_references_nil(b),
        ExprKind::Literal(_) | ExprKind::Variable(_) => false,
    }
}

struct NilRenamer {
    targets: std::collections::HashSet<String>,
}

impl AstFold for NilRenamer {
    fn fold_predicate_call(&mut self, mut call: PredicateCall) -> anyhow::Result<PredicateCall> {
        if call.name.parts.len() == 1 && self.targets.contains(call.name.name()) {
            call.name = PredicateName::from_name(NIL);
        }
        crate::ast::fold::fold_predicate_call(self, call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PredicateCall as PC, Record, Span};

    fn nil_call(span: Span) -> Conjunct {
        Conjunct::Predicate(PC { name: PredicateName::from_name(NIL), record: Record::default(), span })
    }

    #[test]
    fn synthetic_predicate_proven_empty_vanishes_and_renames_callers() {
        let span = Span::synthetic(0);
        let base = Rule {
            head: PC { name: PredicateName::from_name("P_r0"), record: Record::default(), span },
            body: Some(vec![nil_call(span)]),
            distinct_denoted: false,
            full_text: span,
        };
        let caller = Rule {
            head: PC { name: PredicateName::from_name("P"), record: Record::default(), span },
            body: Some(vec![Conjunct::Predicate(PC {
                name: PredicateName::from_name("P_r0"),
                record: Record::default(),
                span,
            })]),
            distinct_denoted: false,
            full_text: span,
        };
        let out = prove_nil(vec![base, caller]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].predicate_name(), "P");
        match &out[0].body.as_ref().unwrap()[0] {
            Conjunct::Predicate(call) => assert_eq!(call.name.name(), "nil"),
            _ => panic!(),
        }
    }

    #[test]
    fn user_named_predicate_proven_empty_is_an_error() {
        let span = Span::synthetic(0);
        let base = Rule {
            head: PC { name: PredicateName::from_name("Base"), record: Record::default(), span },
            body: Some(vec![nil_call(span)]),
            distinct_denoted: false,
            full_text: span,
        };
        assert!(prove_nil(vec![base]).is_err());
    }
}
