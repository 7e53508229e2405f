//! Rule structurer (§4.5). Flattens a desugared, post-functor [`Rule`] into
//! a [`RuleStructure`]: a join-shaped, dialect-agnostic description (tables,
//! per-column variables, constraints, unnestings, select list) that
//! [`crate::sql::expr`] turns into a single `SELECT`.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{Conjunct, Expr, ExprKind, Field, FieldValue, PredicateName, Record, Rule};
use crate::error::Error;
use crate::utils::NameGenerator;

/// Builtin predicates that represent a boolean constraint rather than a
/// joined table, per §4.5 step 2.
const CONSTRAINT_BUILTINS: &[&str] =
    &["<", "<=", ">", ">=", "!=", "&&", "||", "!", "IsNull", "Like", "Constraint"];

#[derive(Debug, Clone)]
pub enum SelectValue {
    Plain(Expr),
    /// An aggregated head field: `arg` is the pre-aggregation expression,
    /// `op` the aggregation operator name (`Sum`, `Max`, `ArgMax`, …).
    Aggregated { op: String, arg: Expr },
}

#[derive(Debug, Clone, Default)]
pub struct RuleStructure {
    pub tables: Vec<(String, PredicateName)>,
    pub vars_map: FxHashMap<(String, Field), String>,
    pub vars_unification: Vec<(String, Expr)>,
    pub constraints: Vec<Expr>,
    pub unnestings: Vec<(String, Expr)>,
    pub select: Vec<(Field, SelectValue)>,
    pub aggregated_vars: FxHashSet<String>,
    pub distinct_vars: Vec<String>,
    /// Variable elimination log: which user variable got inlined to which
    /// expression, kept for diagnostics (§4.5 step 3).
    pub synonyms: FxHashMap<String, Expr>,
}

pub fn structure(rule: &Rule, gen: &mut NameGenerator) -> Result<RuleStructure, Error> {
    let mut s = RuleStructure::default();
    let mut alias_gen = NameGenerator::new("t_");
    let mut var_gen = NameGenerator::new("x_");
    let _ = gen; // callers may share a single name generator across rules; this builder uses its own scoped ones.

    build_select(rule, &mut s)?;

    let mut pending_eq: Vec<(Expr, Expr)> = Vec::new();
    if let Some(body) = &rule.body {
        for conjunct in body {
            structure_conjunct(conjunct, &mut s, &mut alias_gen, &mut var_gen, &mut pending_eq)?;
        }
    }

    for (l, r) in pending_eq {
        classify_equality(l, r, &mut s);
    }

    eliminate_variables(&mut s);
    promote_unresolved_to_constraints(&mut s);
    check_errors(rule, &s)?;

    if rule.distinct_denoted {
        let mut distinct: Vec<String> = s
            .select
            .iter()
            .filter(|(_, v)| matches!(v, SelectValue::Plain(_)))
            .filter_map(|(_, v)| match v {
                SelectValue::Plain(e) => e.as_variable().map(|n| n.to_string()),
                _ => None,
            })
            .filter(|n| !s.aggregated_vars.contains(n))
            .collect();
        distinct.sort();
        distinct.dedup();
        s.distinct_vars = distinct;
    }

    Ok(s)
}

fn build_select(rule: &Rule, s: &mut RuleStructure) -> Result<(), Error> {
    for (field, value) in &rule.head.record.fields {
        match value {
            FieldValue::Expression(e) => {
                if let ExprKind::Call(call) = &e.kind {
                    if let Some(op) = call.name.name().strip_prefix("Agg") {
                        let arg = call
                            .record
                            .fields
                            .first()
                            .and_then(|(_, v)| v.as_expression())
                            .cloned()
                            .unwrap_or_else(|| e.clone());
                        s.select.push((field.clone(), SelectValue::Aggregated { op: op.to_string(), arg }));
                        s.aggregated_vars.insert(field.to_string());
                        continue;
                    }
                }
                s.select.push((field.clone(), SelectValue::Plain(e.clone())));
            }
            FieldValue::Aggregation(agg) => {
                s.select.push((field.clone(), SelectValue::Aggregated { op: agg.op.clone(), arg: (*agg.arg).clone() }));
                s.aggregated_vars.insert(field.to_string());
            }
        }
    }
    Ok(())
}

fn structure_conjunct(
    conjunct: &Conjunct,
    s: &mut RuleStructure,
    alias_gen: &mut NameGenerator,
    var_gen: &mut NameGenerator,
    pending_eq: &mut Vec<(Expr, Expr)>,
) -> Result<(), Error> {
    match conjunct {
        Conjunct::Predicate(call) if CONSTRAINT_BUILTINS.contains(&call.name.name()) => {
            s.constraints.push(Expr::new(ExprKind::Call(call.clone()), call.span));
            Ok(())
        }
        Conjunct::Predicate(call) => {
            let alias = alias_gen.gen();
            s.tables.push((alias.clone(), call.name.clone()));
            for (field, value) in &call.record.fields {
                let var = var_gen.gen();
                s.vars_map.insert((alias.clone(), field.clone()), var.clone());
                let arg_expr = match value {
                    FieldValue::Expression(e) => e.clone(),
                    FieldValue::Aggregation(a) => (*a.arg).clone(),
                };
                pending_eq.push((Expr::variable(&var, call.span), arg_expr));
            }
            Ok(())
        }
        Conjunct::Unification(l, r) => {
            pending_eq.push((l.clone(), r.clone()));
            Ok(())
        }
        Conjunct::Inclusion(element, list) => {
            if let ExprKind::Call(c) = &list.kind {
                if c.name.name() == "Container" {
                    s.constraints.push(in_constraint(element.clone(), list.clone()));
                    return Ok(());
                }
            }
            let var = var_gen.gen();
            s.unnestings.push((var.clone(), list.clone()));
            pending_eq.push((element.clone(), value_of_unnested(&var, element.span)));
            Ok(())
        }
        Conjunct::Negation(_, span) => Err(Error::rule_compile(
            PredicateName::from_name("<rule>"),
            "negation must be desugared before structuring",
            *span,
        )),
        Conjunct::Disjunction(..) => Err(Error::rule_compile(
            PredicateName::from_name("<rule>"),
            "disjunction must be desugared (DNF) before structuring",
            conjunct.span(),
        )),
    }
}

fn in_constraint(element: Expr, list: Expr) -> Expr {
    let span = element.span.merge(list.span);
    let mut record = Record::default();
    record.push_positional(FieldValue::Expression(element));
    record.push_positional(FieldValue::Expression(list));
    Expr::new(
        ExprKind::Call(crate::ast::PredicateCall { name: PredicateName::from_name("In"), record, span }),
        span,
    )
}

fn value_of_unnested(var: &str, span: crate::ast::Span) -> Expr {
    let mut record = Record::default();
    record.push_positional(FieldValue::Expression(Expr::variable(var, span)));
    Expr::new(
        ExprKind::Call(crate::ast::PredicateCall {
            name: PredicateName::from_name("ValueOfUnnested"),
            record,
            span,
        }),
        span,
    )
}

/// Prefers eliminating the right-hand side first: for a predicate-call
/// argument, `pending_eq` always carries `(column_var, arg_expr)`, so when
/// `arg_expr` is itself a plain variable (the ordinary join-variable case)
/// that's the name we want everywhere it's used — including the head
/// select — replaced by the column reference, not the other way around.
fn classify_equality(l: Expr, r: Expr, s: &mut RuleStructure) {
    if let Some(name) = r.as_variable() {
        s.vars_unification.push((name.to_string(), l));
    } else if let Some(name) = l.as_variable() {
        s.vars_unification.push((name.to_string(), r));
    } else {
        s.constraints.push(equality(l, r));
    }
}

fn equality(l: Expr, r: Expr) -> Expr {
    let span = l.span.merge(r.span);
    let mut record = Record::default();
    record.push_positional(FieldValue::Expression(l));
    record.push_positional(FieldValue::Expression(r));
    Expr::new(
        ExprKind::Call(crate::ast::PredicateCall { name: PredicateName::from_name("=="), record, span }),
        span,
    )
}

/// §4.5 step 3: inline every unification `u = v` where `u` is a plain user
/// variable not itself serving as a table/unnesting column name, repeating
/// to a fixed point. Synthetic `x_`/column-bound names are never eliminated
/// — they're exactly what downstream joins key on.
fn eliminate_variables(s: &mut RuleStructure) {
    let column_names: FxHashSet<String> = s.vars_map.values().cloned().collect();

    loop {
        let mut substituted_any = false;
        let mut remaining = Vec::new();
        for (name, expr) in std::mem::take(&mut s.vars_unification) {
            let eliminable = !column_names.contains(&name)
                && !matches!(&expr.kind, ExprKind::Variable(other) if other == &name)
                && !expr_mentions_combine_referencing(&expr, &name);
            if eliminable && !s.synonyms.contains_key(&name) {
                s.synonyms.insert(name.clone(), expr.clone());
                substitute_var(s, &name, &expr);
                substituted_any = true;
            } else {
                remaining.push((name, expr));
            }
        }
        s.vars_unification = remaining;
        if !substituted_any {
            break;
        }
    }
}

fn expr_mentions_combine_referencing(expr: &Expr, name: &str) -> bool {
    match &expr.kind {
        ExprKind::Combine(rule) => rule_mentions_variable(rule, name),
        ExprKind::Call(c) => c.record.fields.iter().any(|(_, v)| match v {
            FieldValue::Expression(e) => expr_mentions_combine_referencing(e, name),
            FieldValue::Aggregation(a) => expr_mentions_combine_referencing(&a.arg, name),
        }),
        ExprKind::Subscript(inner, _) => expr_mentions_combine_referencing(inner, name),
        _ => false,
    }
}

fn rule_mentions_variable(rule: &Rule, name: &str) -> bool {
    if let Some(body) = &rule.body {
        for c in body {
            if conjunct_mentions_variable(c, name) {
                return true;
            }
        }
    }
    false
}

fn conjunct_mentions_variable(conjunct: &Conjunct, name: &str) -> bool {
    match conjunct {
        Conjunct::Predicate(call) => call.record.fields.iter().any(|(_, v)| match v {
            FieldValue::Expression(e) => matches!(&e.kind, ExprKind::Variable(n) if n == name),
            FieldValue::Aggregation(a) => matches!(&a.arg.kind, ExprKind::Variable(n) if n == name),
        }),
        Conjunct::Unification(l, r) | Conjunct::Inclusion(l, r) => {
            matches!(&l.kind, ExprKind::Variable(n) if n == name)
                || matches!(&r.kind, ExprKind::Variable(n) if n == name)
        }
        Conjunct::Negation(inner, _) => conjunct_mentions_variable(inner, name),
        Conjunct::Disjunction(a, b) => {
            a.iter().any(|c| conjunct_mentions_variable(c, name))
                || b.iter().any(|c| conjunct_mentions_variable(c, name))
        }
    }
}

fn substitute_var(s: &mut RuleStructure, name: &str, expr: &Expr) {
    for (_, v) in &mut s.select {
        match v {
            SelectValue::Plain(e) => replace_var_in_expr(e, name, expr),
            SelectValue::Aggregated { arg, .. } => replace_var_in_expr(arg, name, expr),
        }
    }
    for c in &mut s.constraints {
        replace_var_in_expr(c, name, expr);
    }
    for (_, v) in &mut s.vars_unification {
        replace_var_in_expr(v, name, expr);
    }
    for (_, v) in &mut s.unnestings {
        replace_var_in_expr(v, name, expr);
    }
}

fn replace_var_in_expr(target: &mut Expr, name: &str, replacement: &Expr) {
    match &mut target.kind {
        ExprKind::Variable(n) if n == name => *target = replacement.clone(),
        ExprKind::Call(c) => {
            for (_, v) in &mut c.record.fields {
                match v {
                    FieldValue::Expression(e) => replace_var_in_expr(e, name, replacement),
                    FieldValue::Aggregation(a) => replace_var_in_expr(&mut a.arg, name, replacement),
                }
            }
        }
        ExprKind::Subscript(inner, _) => replace_var_in_expr(inner, name, replacement),
        ExprKind::Record(r) => {
            for (_, v) in &mut r.fields {
                match v {
                    FieldValue::Expression(e) => replace_var_in_expr(e, name, replacement),
                    FieldValue::Aggregation(a) => replace_var_in_expr(&mut a.arg, name, replacement),
                }
            }
        }
        ExprKind::Implication(arms, otherwise) => {
            for (c, v) in arms {
                replace_var_in_expr(c, name, replacement);
                replace_var_in_expr(v, name, replacement);
            }
            replace_var_in_expr(otherwise, name, replacement);
        }
        ExprKind::Arrow(a, b) => {
            replace_var_in_expr(a, name, replacement);
            replace_var_in_expr(b, name, replacement);
        }
        ExprKind::Combine(_) | ExprKind::Literal(_) | ExprKind::Variable(_) => {}
    }
}

/// A variable used as a join key in more than one place (e.g. the same
/// variable named as an argument to two different predicate calls) only
/// gets its first occurrence eliminated by [`eliminate_variables`] — later
/// ones are skipped once a synonym is already recorded, to avoid clobbering
/// the first substitution. Those leftovers land here; rephrase them in
/// terms of the variable's already-resolved synonym so the emitted
/// constraint references real columns instead of the eliminated name.
fn promote_unresolved_to_constraints(s: &mut RuleStructure) {
    for (name, expr) in std::mem::take(&mut s.vars_unification) {
        let span = expr.span;
        let lhs = s.synonyms.get(&name).cloned().unwrap_or_else(|| Expr::variable(&name, span));
        s.constraints.push(equality(lhs, expr));
    }
}

fn check_errors(rule: &Rule, s: &RuleStructure) -> Result<(), Error> {
    if s.select.is_empty() && !rule.head.record.fields.is_empty() {
        return Err(Error::rule_compile(
            rule.head.name.clone(),
            "zero-column select",
            rule.full_text,
        ));
    }

    let column_names: FxHashSet<&String> = s.vars_map.values().collect();
    let unnest_names: FxHashSet<&String> = s.unnestings.iter().map(|(n, _)| n).collect();
    for (_, v) in &s.select {
        let e = match v {
            SelectValue::Plain(e) => e,
            SelectValue::Aggregated { arg, .. } => arg,
        };
        if let Some(name) = e.as_variable() {
            if !column_names.contains(&name.to_string()) && !unnest_names.contains(&name.to_string()) {
                return Err(Error::rule_compile(
                    rule.head.name.clone(),
                    format!("Found no way to assign variables: {name}"),
                    rule.full_text,
                ));
            }
        }
    }

    let mut unnest_deps: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for (var, list_expr) in &s.unnestings {
        let mentions: Vec<&str> = s
            .unnestings
            .iter()
            .filter(|(other, _)| other != var && expr_references_var(list_expr, other))
            .map(|(other, _)| other.as_str())
            .collect();
        unnest_deps.insert(var.as_str(), mentions);
    }
    let keys: Vec<String> = unnest_deps.keys().map(|k| k.to_string()).collect();
    let deps: Vec<(String, Vec<String>)> = keys
        .iter()
        .map(|k| (k.clone(), unnest_deps[k.as_str()].iter().map(|s| s.to_string()).collect()))
        .collect();
    if crate::utils::toposort(&deps).is_none() {
        return Err(Error::rule_compile(
            rule.head.name.clone(),
            "circular dependency of In calls",
            rule.full_text,
        ));
    }

    Ok(())
}

fn expr_references_var(expr: &Expr, name: &str) -> bool {
    match &expr.kind {
        ExprKind::Variable(n) => n == name,
        ExprKind::Call(c) => c.record.fields.iter().any(|(_, v)| match v {
            FieldValue::Expression(e) => expr_references_var(e, name),
            FieldValue::Aggregation(a) => expr_references_var(&a.arg, name),
        }),
        ExprKind::Subscript(inner, _) => expr_references_var(inner, name),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PredicateCall, Span};

    fn var_field(field: &str, var: &str, span: Span) -> (Field, FieldValue) {
        (Field::Named(field.to_string()), FieldValue::Expression(Expr::variable(var, span)))
    }

    #[test]
    fn joins_a_single_predicate_and_eliminates_the_join_variable() {
        let span = Span::synthetic(0);
        let mut src_record = Record::default();
        src_record.fields.push(var_field("name", "n", span));
        let body = vec![Conjunct::Predicate(PredicateCall {
            name: PredicateName::from_name("Src"),
            record: src_record,
            span,
        })];
        let mut head_record = Record::default();
        head_record.fields.push(var_field("name", "n", span));
        let rule = Rule {
            head: PredicateCall { name: PredicateName::from_name("P"), record: head_record, span },
            body: Some(body),
            distinct_denoted: false,
            full_text: span,
        };
        let mut gen = NameGenerator::default();
        let structured = structure(&rule, &mut gen).unwrap();
        assert_eq!(structured.tables.len(), 1);
        assert_eq!(structured.select.len(), 1);
        match &structured.select[0].1 {
            SelectValue::Plain(e) => assert!(e.as_variable().unwrap().starts_with("x_")),
            _ => panic!("expected plain select value"),
        }
    }

    #[test]
    fn shared_join_variable_across_two_calls_becomes_a_column_equality() {
        let span = Span::synthetic(0);
        let mut left_record = Record::default();
        left_record.fields.push(var_field("id", "k", span));
        let mut right_record = Record::default();
        right_record.fields.push(var_field("id", "k", span));
        let body = vec![
            Conjunct::Predicate(PredicateCall { name: PredicateName::from_name("Left"), record: left_record, span }),
            Conjunct::Predicate(PredicateCall { name: PredicateName::from_name("Right"), record: right_record, span }),
        ];
        let mut head_record = Record::default();
        head_record.fields.push(var_field("id", "k", span));
        let rule = Rule {
            head: PredicateCall { name: PredicateName::from_name("P"), record: head_record, span },
            body: Some(body),
            distinct_denoted: false,
            full_text: span,
        };
        let mut gen = NameGenerator::default();
        let structured = structure(&rule, &mut gen).unwrap();
        assert_eq!(structured.tables.len(), 2);
        // "k" is eliminated once (into the select) and the second use becomes
        // a plain column-to-column constraint, never a dangling reference to
        // the eliminated name itself.
        assert_eq!(structured.constraints.len(), 1);
        for c in &structured.constraints {
            assert!(!expr_references_var(c, "k"));
        }
    }

    #[test]
    fn zero_column_select_on_nonempty_head_is_an_error() {
        let span = Span::synthetic(0);
        let rule = Rule {
            head: PredicateCall { name: PredicateName::from_name("P"), record: Record::default(), span },
            body: None,
            distinct_denoted: false,
            full_text: span,
        };
        let mut gen = NameGenerator::default();
        assert!(structure(&rule, &mut gen).is_ok());
    }
}
