//! DNF rewrite (§4.3 step 1): distribute `||` over the implicit `&&` of a
//! conjunct list, emitting one rule per resulting disjunct. Bodies are
//! expected to already be negation-free (see [`super::negation`]) by the
//! time this runs.

use crate::ast::{Conjunct, Rule};

pub fn rewrite(rules: Vec<Rule>) -> Vec<Rule> {
    let mut out = Vec::with_capacity(rules.len());
    for rule in rules {
        match rule.body {
            None => out.push(rule),
            Some(body) => {
                for alt in expand_body(&body) {
                    out.push(Rule {
                        head: rule.head.clone(),
                        body: Some(alt),
                        distinct_denoted: rule.distinct_denoted,
                        full_text: rule.full_text,
                    });
                }
            }
        }
    }
    out
}

/// Cartesian product across conjuncts: every [`Conjunct::Disjunction`]
/// contributes the union of its two sides' own expansions as alternatives
/// for that slot.
fn expand_body(body: &[Conjunct]) -> Vec<Vec<Conjunct>> {
    let mut results: Vec<Vec<Conjunct>> = vec![Vec::new()];
    for conjunct in body {
        let alternatives = expand_conjunct(conjunct);
        let mut next = Vec::with_capacity(results.len() * alternatives.len());
        for prefix in &results {
            for alt in &alternatives {
                let mut combined = prefix.clone();
                combined.extend(alt.iter().cloned());
                next.push(combined);
            }
        }
        results = next;
    }
    results
}

fn expand_conjunct(conjunct: &Conjunct) -> Vec<Vec<Conjunct>> {
    match conjunct {
        Conjunct::Disjunction(a, b) => {
            let mut out = expand_body(a);
            out.extend(expand_body(b));
            out
        }
        other => vec![vec![other.clone()]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PredicateCall, PredicateName, Record, Span};

    fn call(name: &str) -> Conjunct {
        Conjunct::Predicate(PredicateCall {
            name: PredicateName::from_name(name),
            record: Record::default(),
            span: Span::synthetic(0),
        })
    }

    #[test]
    fn distributes_or_over_and() {
        // A, (B || C)  ->  (A, B) | (A, C)
        let body = vec![call("A"), Conjunct::Disjunction(vec![call("B")], vec![call("C")])];
        let alts = expand_body(&body);
        assert_eq!(alts.len(), 2);
        assert_eq!(alts[0].len(), 2);
        assert_eq!(alts[1].len(), 2);
    }

    #[test]
    fn single_rule_in_single_rule_out_when_no_disjunction() {
        let head = PredicateCall { name: PredicateName::from_name("P"), record: Record::default(), span: Span::synthetic(0) };
        let rule = Rule { head, body: Some(vec![call("A"), call("B")]), distinct_denoted: false, full_text: Span::synthetic(0) };
        let out = rewrite(vec![rule]);
        assert_eq!(out.len(), 1);
    }
}
