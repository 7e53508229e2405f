//! Property checks over the desugaring pipeline: idempotence of the
//! disjunction-free and negation-free passes, and the "no Disjunction after
//! desugaring" invariant the structuring pass depends on.

use logica::ast::{Conjunct, FieldValue, PredicateCall, PredicateName, Record, Rule, Span};
use logica::desugar::{dnf, negation};
use logica::utils::NameGenerator;

fn call(name: &str) -> Conjunct {
    Conjunct::Predicate(PredicateCall { name: PredicateName::from_name(name), record: Record::default(), span: Span::synthetic(0) })
}

fn rule_with_body(body: Vec<Conjunct>) -> Rule {
    Rule {
        head: PredicateCall { name: PredicateName::from_name("P"), record: Record::default(), span: Span::synthetic(0) },
        body: Some(body),
        distinct_denoted: false,
        full_text: Span::synthetic(0),
    }
}

fn no_disjunctions(rules: &[Rule]) -> bool {
    rules.iter().all(|r| {
        r.body.as_ref().map(|b| b.iter().all(|c| !matches!(c, Conjunct::Disjunction(..)))).unwrap_or(true)
    })
}

fn no_negations(rules: &[Rule]) -> bool {
    rules.iter().all(|r| {
        r.body.as_ref().map(|b| b.iter().all(|c| !matches!(c, Conjunct::Negation(..)))).unwrap_or(true)
    })
}

#[test]
fn dnf_rewrite_eliminates_every_disjunction() {
    let body = vec![
        call("A"),
        Conjunct::Disjunction(vec![call("B")], vec![call("C"), Conjunct::Disjunction(vec![call("D")], vec![call("E")])]),
    ];
    let out = dnf::rewrite(vec![rule_with_body(body)]);
    assert!(no_disjunctions(&out));
    // A,(B | (C,(D|E))) expands to three alternatives: (A,B), (A,C,D), (A,C,E).
    assert_eq!(out.len(), 3);
}

#[test]
fn dnf_rewrite_is_idempotent_once_disjunction_free() {
    let body = vec![call("A"), call("B")];
    let once = dnf::rewrite(vec![rule_with_body(body)]);
    let twice = dnf::rewrite(once.clone());
    assert_eq!(once.len(), twice.len());
    assert!(no_disjunctions(&twice));
}

#[test]
fn dnf_rewrite_applied_twice_matches_applied_once_on_already_split_rules() {
    let body = vec![call("A"), Conjunct::Disjunction(vec![call("B")], vec![call("C")])];
    let once = dnf::rewrite(vec![rule_with_body(body)]);
    let twice = dnf::rewrite(once.clone());
    assert_eq!(once.len(), twice.len());
}

#[test]
fn negation_rewrite_leaves_no_negation_conjunct() {
    let body = vec![call("A"), Conjunct::Negation(Box::new(call("B")), Span::synthetic(0))];
    let out = negation::rewrite(vec![rule_with_body(body)]);
    assert!(no_negations(&out));
}

#[test]
fn negation_rewrite_is_idempotent() {
    let body = vec![call("A"), Conjunct::Negation(Box::new(call("B")), Span::synthetic(0))];
    let once = negation::rewrite(vec![rule_with_body(body)]);
    let twice = negation::rewrite(once.clone());
    assert_eq!(once.len(), twice.len());
    assert!(no_negations(&twice));
}

#[test]
fn full_pipeline_leaves_no_disjunction_or_negation_in_any_rule_body() {
    let body = vec![
        call("A"),
        Conjunct::Negation(Box::new(call("B")), Span::synthetic(0)),
        Conjunct::Disjunction(vec![call("C")], vec![call("D")]),
    ];
    let mut gen = NameGenerator::default();
    let out = logica::desugar::desugar(vec![rule_with_body(body)], &mut gen).unwrap();
    assert!(no_disjunctions(&out));
    assert!(no_negations(&out));
}

#[test]
fn multi_body_aggregation_requires_identical_head_signatures() {
    use logica::ast::{Aggregation, Field};

    let mut head_a = Record::default();
    head_a.fields.push((Field::Positional(0), FieldValue::Aggregation(Aggregation {
        op: "Sum".to_string(),
        arg: Box::new(logica::ast::Expr::variable("x", Span::synthetic(0))),
        span: Span::synthetic(0),
    })));
    let mut head_b = Record::default();
    head_b.fields.push((Field::Named("total".to_string()), FieldValue::Aggregation(Aggregation {
        op: "Sum".to_string(),
        arg: Box::new(logica::ast::Expr::variable("y", Span::synthetic(0))),
        span: Span::synthetic(0),
    })));

    let rule_a = Rule {
        head: PredicateCall { name: PredicateName::from_name("Total"), record: head_a, span: Span::synthetic(0) },
        body: Some(vec![call("A")]),
        distinct_denoted: true,
        full_text: Span::synthetic(0),
    };
    let rule_b = Rule {
        head: PredicateCall { name: PredicateName::from_name("Total"), record: head_b, span: Span::synthetic(0) },
        body: Some(vec![call("B")]),
        distinct_denoted: true,
        full_text: Span::synthetic(0),
    };

    let mut gen = NameGenerator::default();
    let result = logica::desugar::multi_body_agg::rewrite(vec![rule_a, rule_b], &mut gen);
    assert!(result.is_err());
}
