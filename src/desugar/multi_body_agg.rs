//! Multi-body aggregation (§4.3 step 2). When a predicate is defined by more
//! than one distinct-denoted rule, each body can't aggregate independently —
//! `Total() += x :- A(x); Total() += y :- B(y);` must aggregate over the
//! union of both bodies' rows, not produce two separate totals. Each body is
//! split off into a `<Name>_MultBodyAggAux` rule that evaluates the
//! pre-aggregation values, and a single aggregator rule re-aggregates over
//! all of them.

use std::collections::HashMap;

use crate::ast::{Conjunct, Expr, Field, FieldValue, PredicateCall, PredicateName, Record, Rule};
use crate::error::Error;
use crate::utils::NameGenerator;

pub fn rewrite(rules: Vec<Rule>, gen: &mut NameGenerator) -> Result<Vec<Rule>, Error> {
    let mut groups: Vec<(String, Vec<Rule>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for rule in rules {
        let name = rule.predicate_name().to_string();
        match index.get(&name) {
            Some(&i) => groups[i].1.push(rule),
            None => {
                index.insert(name.clone(), groups.len());
                groups.push((name, vec![rule]));
            }
        }
    }

    let mut out = Vec::new();
    for (name, group) in groups {
        let aggregated = group.iter().filter(|r| r.distinct_denoted && r.body.is_some()).count();
        if group.len() > 1 && aggregated > 1 {
            out.extend(split_group(&name, group, gen)?);
        } else {
            out.extend(group);
        }
    }
    Ok(out)
}

fn split_group(name: &str, group: Vec<Rule>, gen: &mut NameGenerator) -> Result<Vec<Rule>, Error> {
    let aux_name = PredicateName::from_name(format!("{name}_MultBodyAggAux"));
    let signature: Vec<Field> = group[0].head.record.fields.iter().map(|(f, _)| f.clone()).collect();
    for rule in &group {
        let sig: Vec<Field> = rule.head.record.fields.iter().map(|(f, _)| f.clone()).collect();
        if sig != signature {
            return Err(Error::rule_compile(
                PredicateName::from_name(name),
                "multi-body aggregation rules disagree on field signature",
                rule.full_text,
            ));
        }
    }

    let mut out = Vec::with_capacity(group.len() + 1);
    for rule in &group {
        let mut aux_record = Record::default();
        for (field, value) in &rule.head.record.fields {
            let expr = match value {
                FieldValue::Expression(e) => e.clone(),
                FieldValue::Aggregation(a) => (*a.arg).clone(),
            };
            push_field(&mut aux_record, field, FieldValue::Expression(expr));
        }
        out.push(Rule {
            head: PredicateCall { name: aux_name.clone(), record: aux_record, span: rule.head.span },
            body: rule.body.clone(),
            distinct_denoted: false,
            full_text: rule.full_text,
        });
    }

    let span = group
        .iter()
        .skip(1)
        .fold(group[0].full_text, |acc, r| acc.merge(r.full_text));
    let mut call_record = Record::default();
    let mut head_record = Record::default();
    for (field, value) in &group[0].head.record.fields {
        let fresh = gen.gen();
        push_field(&mut call_record, field, FieldValue::Expression(Expr::variable(&fresh, span)));
        let head_value = match value {
            FieldValue::Expression(_) => FieldValue::Expression(Expr::variable(&fresh, span)),
            FieldValue::Aggregation(a) => FieldValue::Aggregation(crate::ast::Aggregation {
                op: a.op.clone(),
                arg: Box::new(Expr::variable(&fresh, span)),
                span,
            }),
        };
        push_field(&mut head_record, field, head_value);
    }
    out.push(Rule {
        head: PredicateCall { name: PredicateName::from_name(name), record: head_record, span },
        body: Some(vec![Conjunct::Predicate(PredicateCall { name: aux_name, record: call_record, span })]),
        distinct_denoted: true,
        full_text: span,
    });
    Ok(out)
}

fn push_field(record: &mut Record, field: &Field, value: FieldValue) {
    match field {
        Field::Positional(_) => record.push_positional(value),
        Field::Named(n) => record.push_named(n.clone(), value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Aggregation, Span};

    fn body_rule(name: &str, op: &str, span_start: u32) -> Rule {
        let span = crate::ast::Span::new(0, span_start, span_start + 1);
        let mut head_record = Record::default();
        head_record.push_named(
            "logica_value",
            FieldValue::Aggregation(Aggregation {
                op: op.to_string(),
                arg: Box::new(Expr::variable("x", span)),
                span,
            }),
        );
        Rule {
            head: PredicateCall { name: PredicateName::from_name(name), record: head_record, span },
            body: Some(vec![Conjunct::Predicate(PredicateCall {
                name: PredicateName::from_name("Src"),
                record: Record::default(),
                span,
            })]),
            distinct_denoted: true,
            full_text: span,
        }
    }

    #[test]
    fn splits_two_bodies_into_aux_plus_aggregator() {
        let mut gen = NameGenerator::new("x_");
        let rules = vec![body_rule("Total", "+", 0), body_rule("Total", "+", 10)];
        let out = rewrite(rules, &mut gen).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0].predicate_name().ends_with("_MultBodyAggAux"));
        assert!(out[1].predicate_name().ends_with("_MultBodyAggAux"));
        assert_eq!(out[2].predicate_name(), "Total");
    }

    #[test]
    fn leaves_single_body_untouched() {
        let mut gen = NameGenerator::new("x_");
        let rules = vec![body_rule("Total", "+", 0)];
        let out = rewrite(rules, &mut gen).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].predicate_name(), "Total");
        let _ = Span::synthetic(0);
    }
}
