//! Rule desugaring (§4.3). A parsed rule still contains syntactic sugar —
//! negation, `||`, multiple aggregating bodies, bare aggregations, unscoped
//! `combine` variables, function calls in value position — that the
//! structuring pass (§4.5) doesn't want to think about. Each pass below
//! strips away exactly one of those, in a fixed order: later passes can rely
//! on earlier ones having already run.

pub mod agg_as_expr;
pub mod combine_disambiguation;
pub mod dnf;
pub mod function_inlining;
pub mod multi_body_agg;
pub mod negation;

use crate::ast::Rule;
use crate::error::Error;
use crate::utils::NameGenerator;

/// Runs the full desugaring pipeline over a file's rules, in the order each
/// pass depends on: negation first (so DNF never has to distribute through a
/// negated disjunct), then DNF (so multi-body grouping sees one disjunct per
/// rule), then multi-body aggregation, then aggregations-as-expressions,
/// then combine disambiguation, and finally function-call inlining.
pub fn desugar(rules: Vec<Rule>, gen: &mut NameGenerator) -> Result<Vec<Rule>, Error> {
    let before = rules.len();
    let rules = negation::rewrite(rules);

    let before_dnf = rules.len();
    let rules = dnf::rewrite(rules);
    if rules.len() != before_dnf {
        log::debug!("desugar: dnf::rewrite expanded {before_dnf} rule(s) into {}", rules.len());
    }

    let before_multi_body = rules.len();
    let rules = multi_body_agg::rewrite(rules, gen)?;
    if rules.len() != before_multi_body {
        log::debug!("desugar: multi_body_agg::rewrite merged {before_multi_body} rule(s) into {}", rules.len());
    }

    let rules = agg_as_expr::rewrite(rules)?;
    let rules = combine_disambiguation::rewrite(rules, gen)?;
    let rules = function_inlining::rewrite(rules, gen)?;
    log::debug!("desugar: {before} input rule(s) desugared to {} rule(s)", rules.len());
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Conjunct, PredicateCall, PredicateName, Record, Span};

    #[test]
    fn pipeline_runs_end_to_end_on_a_fact() {
        let span = Span::synthetic(0);
        let rule = Rule {
            head: PredicateCall { name: PredicateName::from_name("P"), record: Record::default(), span },
            body: None,
            distinct_denoted: false,
            full_text: span,
        };
        let mut gen = NameGenerator::default();
        let out = desugar(vec![rule], &mut gen).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].predicate_name(), "P");
    }

    #[test]
    fn pipeline_distributes_disjunction_and_leaves_two_rules() {
        let span = Span::synthetic(0);
        let call = |n: &str| {
            Conjunct::Predicate(PredicateCall { name: PredicateName::from_name(n), record: Record::default(), span })
        };
        let rule = Rule {
            head: PredicateCall { name: PredicateName::from_name("P"), record: Record::default(), span },
            body: Some(vec![Conjunct::Disjunction(vec![call("A")], vec![call("B")])]),
            distinct_denoted: false,
            full_text: span,
        };
        let mut gen = NameGenerator::default();
        let out = desugar(vec![rule], &mut gen).unwrap();
        assert_eq!(out.len(), 2);
    }
}
