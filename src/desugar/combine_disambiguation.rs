//! Combine disambiguation (§4.3 step 4). A variable first bound inside a
//! `combine` sub-expression is local to that aggregation, not to the
//! enclosing rule; renaming it `<name> # disambiguated with <fresh>` keeps it
//! from colliding (in the structuring pass's shared variable vocabulary,
//! §4.5) with a same-named variable in the enclosing scope, while variables
//! that genuinely refer outward are left untouched.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::ast::fold;
use crate::ast::{
    AstFold, Conjunct, Expr, ExprKind, FieldValue, PredicateCall, Record, Rule,
};
use crate::error::Error;
use crate::utils::NameGenerator;

pub fn rewrite(rules: Vec<Rule>, gen: &mut NameGenerator) -> Result<Vec<Rule>, Error> {
    rules
        .into_iter()
        .map(|r| rewrite_rule(r, gen))
        .collect::<Result<Vec<_>, anyhow::Error>>()
        .map_err(|e| Error::simple(e.to_string()))
}

fn rewrite_rule(rule: Rule, gen: &mut NameGenerator) -> Result<Rule> {
    let mut outer = HashSet::new();
    collect_outer_names(&rule, &mut outer);
    let mut pass = Disambiguator { gen, outer, local: HashMap::new() };
    pass.fold_rule(rule)
}

struct Disambiguator<'a> {
    gen: &'a mut NameGenerator,
    outer: HashSet<String>,
    local: HashMap<String, String>,
}

impl<'a> AstFold for Disambiguator<'a> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        match expr.kind {
            ExprKind::Combine(rule) => {
                let saved_local = std::mem::take(&mut self.local);
                let folded_rule = self.fold_rule(*rule)?;
                for renamed in self.local.values() {
                    self.outer.insert(renamed.clone());
                }
                self.local = saved_local;
                Ok(Expr::new(ExprKind::Combine(Box::new(folded_rule)), expr.span))
            }
            ExprKind::Variable(name) => {
                if self.outer.contains(&name) {
                    return Ok(Expr::new(ExprKind::Variable(name), expr.span));
                }
                if let Some(renamed) = self.local.get(&name) {
                    return Ok(Expr::new(ExprKind::Variable(renamed.clone()), expr.span));
                }
                let fresh = self.gen.gen();
                let renamed = format!("{name} # disambiguated with {fresh}");
                self.local.insert(name, renamed.clone());
                Ok(Expr::new(ExprKind::Variable(renamed), expr.span))
            }
            other => fold::fold_expr(self, Expr::new(other, expr.span)),
        }
    }
}

fn collect_outer_names(rule: &Rule, set: &mut HashSet<String>) {
    collect_call(&rule.head, set);
    if let Some(body) = &rule.body {
        for c in body {
            collect_conjunct(c, set);
        }
    }
}

fn collect_conjunct(conjunct: &Conjunct, set: &mut HashSet<String>) {
    match conjunct {
        Conjunct::Predicate(call) => collect_call(call, set),
        Conjunct::Unification(l, r) | Conjunct::Inclusion(l, r) => {
            collect_expr(l, set);
            collect_expr(r, set);
        }
        Conjunct::Negation(inner, _) => collect_conjunct(inner, set),
        Conjunct::Disjunction(a, b) => {
            for c in a {
                collect_conjunct(c, set);
            }
            for c in b {
                collect_conjunct(c, set);
            }
        }
    }
}

fn collect_call(call: &PredicateCall, set: &mut HashSet<String>) {
    for (_, v) in &call.record.fields {
        collect_field_value(v, set);
    }
}

fn collect_field_value(value: &FieldValue, set: &mut HashSet<String>) {
    match value {
        FieldValue::Expression(e) => collect_expr(e, set),
        FieldValue::Aggregation(a) => collect_expr(&a.arg, set),
    }
}

fn collect_record(record: &Record, set: &mut HashSet<String>) {
    for (_, v) in &record.fields {
        collect_field_value(v, set);
    }
}

fn collect_expr(expr: &Expr, set: &mut HashSet<String>) {
    match &expr.kind {
        ExprKind::Literal(_) => {}
        ExprKind::Variable(n) => {
            set.insert(n.clone());
        }
        ExprKind::Call(c) => collect_call(c, set),
        ExprKind::Subscript(inner, _) => collect_expr(inner, set),
        ExprKind::Record(r) => collect_record(r, set),
        // A combine sub-expression is its own variable scope: names
        // appearing only inside it must not be pre-registered as outer.
        ExprKind::Combine(_) => {}
        ExprKind::Implication(arms, otherwise) => {
            for (c, v) in arms {
                collect_expr(c, set);
                collect_expr(v, set);
            }
            collect_expr(otherwise, set);
        }
        ExprKind::Arrow(a, b) => {
            collect_expr(a, set);
            collect_expr(b, set);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Aggregation, PredicateCall as PC, PredicateName, Span};

    #[test]
    fn renames_variable_local_to_combine_but_not_outer_ones() {
        let span = Span::synthetic(0);
        let mut gen = NameGenerator::new("f");

        // P(y) :- y == (combine += local :- Src(local));  -- `y` is outer, `local` is combine-local.
        let mut combine_head = Record::default();
        combine_head.push_named(
            "logica_value",
            FieldValue::Aggregation(Aggregation {
                op: "+".to_string(),
                arg: Box::new(Expr::variable("local", span)),
                span,
            }),
        );
        let combine_rule = Rule {
            head: PC { name: PredicateName::from_name("combine"), record: combine_head, span },
            body: Some(vec![Conjunct::Predicate(PC {
                name: PredicateName::from_name("Src"),
                record: {
                    let mut r = Record::default();
                    r.push_positional(FieldValue::Expression(Expr::variable("local", span)));
                    r
                },
                span,
            })]),
            distinct_denoted: true,
            full_text: span,
        };
        let combine_expr = Expr::new(ExprKind::Combine(Box::new(combine_rule)), span);

        let mut head_record = Record::default();
        head_record.push_positional(FieldValue::Expression(Expr::variable("y", span)));
        let rule = Rule {
            head: PC { name: PredicateName::from_name("P"), record: head_record, span },
            body: Some(vec![Conjunct::Unification(Expr::variable("y", span), combine_expr)]),
            distinct_denoted: false,
            full_text: span,
        };

        let out = rewrite_rule(rule, &mut gen).unwrap();
        let body = out.body.unwrap();
        match &body[0] {
            Conjunct::Unification(left, right) => {
                assert!(matches!(&left.kind, ExprKind::Variable(n) if n == "y"));
                match &right.kind {
                    ExprKind::Combine(r) => {
                        let body = r.body.as_ref().unwrap();
                        match &body[0] {
                            Conjunct::Predicate(call) => match &call.record.fields[0].1 {
                                FieldValue::Expression(e) => {
                                    assert!(matches!(&e.kind, ExprKind::Variable(n) if n.contains("disambiguated with")));
                                }
                                _ => panic!(),
                            },
                            _ => panic!(),
                        }
                    }
                    _ => panic!(),
                }
            }
            _ => panic!(),
        }
    }
}
