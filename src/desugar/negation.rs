//! Negation rewriting, run before DNF so DNF never has to distribute `&&`
//! through a negated disjunct. `~C` becomes a nonexistence check: "the count
//! of rows satisfying `C` is null", expressed as an inlined `combine` the
//! same way `ArgMax=`/`ArgMin=` sugar already does.

use crate::ast::{
    Aggregation, Conjunct, Expr, ExprKind, FieldValue, Literal, Number, PredicateCall,
    PredicateName, Record, Rule, Span,
};

pub fn rewrite(rules: Vec<Rule>) -> Vec<Rule> {
    rules.into_iter().map(rewrite_rule).collect()
}

fn rewrite_rule(rule: Rule) -> Rule {
    Rule {
        body: rule.body.map(rewrite_body),
        ..rule
    }
}

fn rewrite_body(body: Vec<Conjunct>) -> Vec<Conjunct> {
    body.into_iter().map(rewrite_conjunct).collect()
}

fn rewrite_conjunct(conjunct: Conjunct) -> Conjunct {
    match conjunct {
        Conjunct::Negation(inner, span) => negate(rewrite_conjunct(*inner), span),
        Conjunct::Disjunction(a, b) => Conjunct::Disjunction(rewrite_body(a), rewrite_body(b)),
        other => other,
    }
}

fn negate(inner: Conjunct, span: Span) -> Conjunct {
    let one = Expr::literal(Literal::Number(Number::Integer(1)), span);
    let mut record = Record::default();
    record.push_named(
        crate::ast::expr::LOGICA_VALUE,
        FieldValue::Aggregation(Aggregation {
            op: "Count".to_string(),
            arg: Box::new(one),
            span,
        }),
    );
    let combine_rule = Rule {
        head: PredicateCall {
            name: PredicateName::from_name("combine"),
            record,
            span,
        },
        body: Some(vec![inner]),
        distinct_denoted: true,
        full_text: span,
    };
    let combine_expr = Expr::new(ExprKind::Combine(Box::new(combine_rule)), span);
    let is_null = unary_builtin("IsNull", combine_expr, span);
    Conjunct::Unification(is_null, Expr::literal(Literal::Bool(true), span))
}

fn unary_builtin(name: &str, arg: Expr, span: Span) -> Expr {
    let mut record = Record::default();
    record.push_positional(FieldValue::Expression(arg));
    Expr::new(
        ExprKind::Call(PredicateCall {
            name: PredicateName::from_name(name),
            record,
            span,
        }),
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PredicateCall as PC;

    fn fact_call(name: &str) -> Conjunct {
        Conjunct::Predicate(PC {
            name: PredicateName::from_name(name),
            record: Record::default(),
            span: Span::synthetic(0),
        })
    }

    #[test]
    fn negation_becomes_is_null_unification() {
        let body = vec![Conjunct::Negation(Box::new(fact_call("Banned")), Span::synthetic(0))];
        let rewritten = rewrite_body(body);
        assert_eq!(rewritten.len(), 1);
        assert!(matches!(rewritten[0], Conjunct::Unification(_, _)));
    }
}
