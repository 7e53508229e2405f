//! §4.8 step 4: deciding which table references get spliced inline as a
//! subquery versus routed through a `WITH` clause.

use crate::program::annotations::AnnotationTable;
use crate::ast::Rule;

/// A predicate is a candidate for inlining at its call site when it has
/// exactly one non-`distinct`-denoted defining rule and none of the
/// annotations that demand its own standalone statement. `@NoWith` overrides
/// the decision the other way: it forces injection even where the default
/// multi-use heuristic would otherwise promote the predicate to `WITH`
/// (see DESIGN.md for why this crate doesn't track caller multiplicity).
pub fn is_injectible(name: &str, rules: &[Rule], annotations: &AnnotationTable) -> bool {
    if annotations.forces_inject(name) {
        return true;
    }
    if annotations.is_ground(name)
        || annotations.forces_with(name)
        || annotations.is_no_inject(name)
        || annotations.has_limit_or_order(name)
        || annotations.compile_as_udf(name)
        || annotations.compile_as_tvf(name)
    {
        return false;
    }
    rules.len() == 1 && !rules[0].distinct_denoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PredicateCall, PredicateName, Record, Span};

    fn fact(name: &str) -> Rule {
        let span = Span::synthetic(0);
        Rule {
            head: PredicateCall { name: PredicateName::from_name(name), record: Record::default(), span },
            body: None,
            distinct_denoted: false,
            full_text: span,
        }
    }

    #[test]
    fn single_plain_rule_is_injectible() {
        let rules = vec![fact("P")];
        let anns = AnnotationTable::default();
        assert!(is_injectible("P", &rules, &anns));
    }

    #[test]
    fn multi_rule_predicate_is_not_injectible_by_default() {
        let rules = vec![fact("P"), fact("P")];
        let anns = AnnotationTable::default();
        assert!(!is_injectible("P", &rules, &anns));
    }
}
