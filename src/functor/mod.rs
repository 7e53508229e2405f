//! Functor engine (§4.4): `@Make` expansion.
//!
//! A functor rule `R := F(A1: V1, ...)` parses down to a marker rule
//! `R() :- @Make(F, A1: V1, ...)` ([`crate::parser::rule::parse_functor_rule`]).
//! This module finds every such marker across the whole rule set, expands it
//! by duplicating `F`'s rule closure under the substitution `F -> R`,
//! `Ai -> Vi`, renaming every other closure member with a fresh `_f<N>`
//! suffix, and replaces the marker with the expanded rules.

mod nil_proof;
pub mod recursion;

use std::collections::{HashMap, HashSet};

use crate::ast::{
    Annotation, AstFold, Conjunct, Expr, ExprKind, FieldValue, Literal, PredicateCall,
    PredicateName, Record, Rule, Span,
};
use crate::error::Error;
use crate::utils::{toposort, NameGenerator};

pub use nil_proof::prove_nil;

const MAKE_MARKER: &str = "@Make";

/// One not-yet-expanded `@Make` application found in the rule set.
struct PendingMake {
    target: PredicateName,
    functor: PredicateName,
    args: Vec<(String, Expr)>,
    span: Span,
}

/// A memoization key: the functor plus its argument values, compared
/// structurally (spans excluded so two calls written at different source
/// locations with the same literal arguments still share an expansion).
type CallKey = (String, Vec<(String, String)>);

pub fn expand(
    rules: Vec<Rule>,
    annotations: Vec<Annotation>,
    gen: &mut NameGenerator,
) -> Result<(Vec<Rule>, Vec<Annotation>), Error> {
    let mut rules_by_name: HashMap<String, Vec<Rule>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut pending: HashMap<String, PendingMake> = HashMap::new();

    for rule in rules {
        if let Some(make) = as_pending_make(&rule)? {
            let name = make.target.name().to_string();
            if !order.contains(&name) {
                order.push(name.clone());
            }
            pending.insert(name, make);
        } else {
            let name = rule.predicate_name().to_string();
            rules_by_name.entry(name.clone()).or_default().push(rule);
            if !order.contains(&name) {
                order.push(name);
            }
        }
    }

    if pending.is_empty() {
        let mut flat = Vec::new();
        for name in &order {
            if let Some(rs) = rules_by_name.get(name) {
                flat.extend(rs.iter().cloned());
            }
        }
        return Ok((flat, annotations));
    }

    // Dependency: R depends on R' if R' is itself a pending make and appears
    // (as the functor, or as an argument value naming a predicate symbol) in
    // R's own make application.
    let pending_names: HashSet<String> = pending.keys().cloned().collect();
    let deps: Vec<(String, Vec<String>)> = pending
        .iter()
        .map(|(name, make)| {
            let mut d = Vec::new();
            for referenced in referenced_predicate_names(make) {
                if pending_names.contains(&referenced) && &referenced != name {
                    d.push(referenced);
                }
            }
            (name.clone(), d)
        })
        .collect();
    let make_order = toposort(&deps).ok_or_else(|| {
        Error::functor(
            PredicateName::from_name("@Make"),
            "circular dependency between functor applications: no make is eligible",
            pending.values().next().map(|m| m.span).unwrap_or_else(|| Span::synthetic(0)),
        )
    })?;

    let mut memo: HashMap<CallKey, PredicateName> = HashMap::new();
    let mut renamed_to: HashMap<String, String> = HashMap::new();
    let mut expanded: HashMap<String, Vec<Rule>> = HashMap::new();
    let mut suffix_gen = NameGenerator::new("f");

    for name in &make_order {
        let make = pending.remove(name).expect("make present for its own key");
        let key = call_key(&make);
        if let Some(existing) = memo.get(&key) {
            log::debug!("functor: `{name}` reuses existing expansion `{}`", existing.name());
            renamed_to.insert(name.clone(), existing.name().to_string());
            continue;
        }

        let closure = closure_of(&make.functor, &rules_by_name);
        let suffix = suffix_gen.gen();
        let mut name_subst: HashMap<String, String> = HashMap::new();
        name_subst.insert(make.functor.name().to_string(), make.target.name().to_string());
        for member in &closure {
            if member != make.functor.name() {
                name_subst.insert(member.clone(), format!("{member}_{suffix}"));
            }
        }
        let var_subst: HashMap<String, Expr> = make.args.iter().cloned().collect();

        for member in &closure {
            let Some(member_rules) = rules_by_name.get(member) else { continue };
            let new_name = name_subst.get(member).cloned().unwrap_or_else(|| member.clone());
            let mut copier = FunctorCopy { name_subst: &name_subst, var_subst: &var_subst };
            let copied = member_rules
                .iter()
                .cloned()
                .map(|r| copier.fold_rule(r))
                .collect::<anyhow::Result<Vec<_>>>()
                .map_err(|e| {
                    Error::functor(make.functor.clone(), e.to_string(), make.span)
                })?;
            expanded.entry(new_name).or_default().extend(copied);
        }
        memo.insert(key, make.target.clone());
    }

    // Carry annotations on renamed predicates through to their copy, and
    // drop annotations on predicates that turned out to be aliased away by
    // memoization (their copy already carries its own).
    let mut out_annotations = Vec::with_capacity(annotations.len());
    for ann in annotations {
        let subject = ann.subject().to_string();
        if let Some(target) = renamed_to.get(&subject) {
            let mut ann = ann;
            ann.call.name = PredicateName::from_name(target.clone());
            out_annotations.push(ann);
        } else {
            out_annotations.push(ann);
        }
    }

    let mut flat = Vec::new();
    for name in &order {
        if let Some(rs) = expanded.remove(name) {
            flat.extend(rs);
        } else if let Some(rs) = rules_by_name.remove(name) {
            flat.extend(rs);
        }
        // else: name was a pending make that got aliased to an existing
        // expansion via memoization; nothing of its own to emit.
    }
    Ok((flat, out_annotations))
}

fn as_pending_make(rule: &Rule) -> Result<Option<PendingMake>, Error> {
    let Some(body) = &rule.body else { return Ok(None) };
    let [Conjunct::Predicate(call)] = body.as_slice() else { return Ok(None) };
    if call.name.name() != MAKE_MARKER {
        return Ok(None);
    }
    let mut fields = call.record.fields.iter();
    let (_, functor_value) = fields.next().ok_or_else(|| {
        Error::functor(rule.head.name.clone(), "@Make requires a functor argument", rule.full_text)
    })?;
    let functor = match functor_value {
        FieldValue::Expression(Expr { kind: ExprKind::Literal(Literal::PredicateSymbol(name)), .. }) => {
            name.clone()
        }
        FieldValue::Expression(Expr { kind: ExprKind::Variable(name), .. }) => {
            PredicateName::from_name(name.clone())
        }
        FieldValue::Expression(Expr { kind: ExprKind::Call(c), .. }) => c.name.clone(),
        _ => {
            return Err(Error::functor(
                rule.head.name.clone(),
                "@Make's second argument must name a predicate",
                rule.full_text,
            ))
        }
    };
    let mut args = Vec::new();
    for (field, value) in fields {
        let crate::ast::Field::Named(arg_name) = field else {
            return Err(Error::functor(
                functor.clone(),
                "functor arguments must be named (`Arg: Value`)",
                rule.full_text,
            ));
        };
        let expr = match value {
            FieldValue::Expression(e) => e.clone(),
            FieldValue::Aggregation(_) => {
                return Err(Error::functor(
                    functor.clone(),
                    "functor arguments cannot be aggregations",
                    rule.full_text,
                ))
            }
        };
        args.push((arg_name.clone(), expr));
    }
    Ok(Some(PendingMake {
        target: rule.head.name.clone(),
        functor,
        args,
        span: rule.full_text,
    }))
}

fn referenced_predicate_names(make: &PendingMake) -> Vec<String> {
    let mut out = vec![make.functor.name().to_string()];
    for (_, v) in &make.args {
        if let ExprKind::Literal(Literal::PredicateSymbol(name)) = &v.kind {
            out.push(name.name().to_string());
        }
    }
    out
}

fn call_key(make: &PendingMake) -> CallKey {
    let mut args: Vec<(String, String)> =
        make.args.iter().map(|(k, v)| (k.clone(), canon_expr(v))).collect();
    args.sort();
    (make.functor.as_flat_string(), args)
}

fn canon_expr(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Literal(lit) => format!("lit:{lit}"),
        ExprKind::Variable(name) => format!("var:{name}"),
        ExprKind::Call(c) => {
            let args: Vec<String> = c.record.fields.iter().map(|(f, v)| format!("{f}={}", canon_field(v))).collect();
            format!("call:{}({})", c.name.as_flat_string(), args.join(","))
        }
        ExprKind::Subscript(inner, field) => format!("{}.{}", canon_expr(inner), field),
        ExprKind::Record(r) => {
            let args: Vec<String> = r.fields.iter().map(|(f, v)| format!("{f}={}", canon_field(v))).collect();
            format!("{{{}}}", args.join(","))
        }
        ExprKind::Combine(_) => "<combine>".to_string(),
        ExprKind::Implication(arms, otherwise) => {
            let arms: Vec<String> = arms.iter().map(|(c, v)| format!("{}?{}", canon_expr(c), canon_expr(v))).collect();
            format!("if {} else {}", arms.join(":"), canon_expr(otherwise))
        }
        ExprKind::Arrow(a, b) => format!("{}->{}", canon_expr(a), canon_expr(b)),
    }
}

fn canon_field(v: &FieldValue) -> String {
    match v {
        FieldValue::Expression(e) => canon_expr(e),
        FieldValue::Aggregation(a) => format!("{}({})", a.op, canon_expr(&a.arg)),
    }
}

/// Every predicate name transitively reachable from `start` through body
/// predicate calls, restricted to names with rules in `rules_by_name`.
/// Includes `start` itself.
fn closure_of(start: &PredicateName, rules_by_name: &HashMap<String, Vec<Rule>>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut stack = vec![start.name().to_string()];
    let mut order = Vec::new();
    while let Some(name) = stack.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        order.push(name.clone());
        let Some(rules) = rules_by_name.get(&name) else { continue };
        for rule in rules {
            for called in rule_calls(rule) {
                if !seen.contains(&called) {
                    stack.push(called);
                }
            }
        }
    }
    order
}

fn rule_calls(rule: &Rule) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(body) = &rule.body {
        for c in body {
            collect_conjunct_calls(c, &mut out);
        }
    }
    out
}

fn collect_conjunct_calls(conjunct: &Conjunct, out: &mut Vec<String>) {
    match conjunct {
        Conjunct::Predicate(call) => out.push(call.name.name().to_string()),
        Conjunct::Unification(l, r) | Conjunct::Inclusion(l, r) => {
            collect_expr_calls(l, out);
            collect_expr_calls(r, out);
        }
        Conjunct::Negation(inner, _) => collect_conjunct_calls(inner, out),
        Conjunct::Disjunction(a, b) => {
            for c in a {
                collect_conjunct_calls(c, out);
            }
            for c in b {
                collect_conjunct_calls(c, out);
            }
        }
    }
}

fn collect_expr_calls(expr: &Expr, out: &mut Vec<String>) {
    match &expr.kind {
        ExprKind::Call(c) => {
            out.push(c.name.name().to_string());
            for (_, v) in &c.record.fields {
                if let FieldValue::Expression(e) = v {
                    collect_expr_calls(e, out);
                }
            }
        }
        ExprKind::Subscript(inner, _) => collect_expr_calls(inner, out),
        ExprKind::Record(r) => {
            for (_, v) in &r.fields {
                if let FieldValue::Expression(e) = v {
                    collect_expr_calls(e, out);
                }
            }
        }
        ExprKind::Combine(rule) => out.extend(rule_calls(rule)),
        ExprKind::Implication(arms, otherwise) => {
            for (c, v) in arms {
                collect_expr_calls(c, out);
                collect_expr_calls(v, out);
            }
            collect_expr_calls(otherwise, out);
        }
        ExprKind::Arrow(a, b) => {
            collect_expr_calls(a, out);
            collect_expr_calls(b, out);
        }
        ExprKind::Literal(_) | ExprKind::Variable(_) => {}
    }
}

/// Renames predicate calls per `name_subst` and substitutes bare variables
/// per `var_subst`, as a single tree copy (§4.4 "duplicating F's rules...
/// with the substitution").
struct FunctorCopy<'a> {
    name_subst: &'a HashMap<String, String>,
    var_subst: &'a HashMap<String, Expr>,
}

impl<'a> AstFold for FunctorCopy<'a> {
    fn fold_predicate_call(&mut self, mut call: PredicateCall) -> anyhow::Result<PredicateCall> {
        if call.name.parts.len() == 1 {
            if let Some(renamed) = self.name_subst.get(call.name.name()) {
                call.name = PredicateName::from_name(renamed.clone());
            }
        }
        crate::ast::fold::fold_predicate_call(self, call)
    }

    fn fold_expr(&mut self, expr: Expr) -> anyhow::Result<Expr> {
        match &expr.kind {
            ExprKind::Variable(name) => {
                if let Some(value) = self.var_subst.get(name) {
                    return Ok(value.clone());
                }
                Ok(expr)
            }
            _ => crate::ast::fold::fold_expr(self, expr),
        }
    }
}

#[allow(dead_code)]
fn empty_record() -> Record {
    Record::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PredicateCall as PC, Span};

    fn make_marker(target: &str, functor: &str, args: &[(&str, Expr)], span: Span) -> Rule {
        let mut record = Record::default();
        record.push_positional(FieldValue::Expression(Expr::literal(
            Literal::PredicateSymbol(PredicateName::from_name(functor)),
            span,
        )));
        for (name, value) in args {
            record.push_named(*name, FieldValue::Expression(value.clone()));
        }
        Rule {
            head: PC { name: PredicateName::from_name(target), record: Record::default(), span },
            body: Some(vec![Conjunct::Predicate(PC {
                name: PredicateName::from_name(MAKE_MARKER),
                record,
                span,
            })]),
            distinct_denoted: false,
            full_text: span,
        }
    }

    #[test]
    fn expands_make_with_argument_substitution() {
        let span = Span::synthetic(0);
        let mut f_record = Record::default();
        f_record.push_positional(FieldValue::Expression(Expr::variable("threshold", span)));
        let f_rule = Rule {
            head: PC { name: PredicateName::from_name("F"), record: f_record, span },
            body: Some(vec![Conjunct::Predicate(PC {
                name: PredicateName::from_name("Src"),
                record: Record::default(),
                span,
            })]),
            distinct_denoted: false,
            full_text: span,
        };
        let marker = make_marker(
            "R",
            "F",
            &[("threshold", Expr::literal(Literal::Number(crate::ast::Number::Integer(5)), span))],
            span,
        );
        let mut gen = NameGenerator::default();
        let (out, _) = expand(vec![f_rule, marker], vec![], &mut gen).unwrap();
        assert!(out.iter().any(|r| r.predicate_name() == "R"));
        let made = out.iter().find(|r| r.predicate_name() == "R").unwrap();
        match &made.head.record.fields[0].1 {
            FieldValue::Expression(e) => {
                assert!(matches!(&e.kind, ExprKind::Literal(Literal::Number(_))));
            }
            _ => panic!(),
        }
    }

    #[test]
    fn passes_through_rules_with_no_pending_makes() {
        let span = Span::synthetic(0);
        let rule = Rule {
            head: PC { name: PredicateName::from_name("P"), record: Record::default(), span },
            body: None,
            distinct_denoted: false,
            full_text: span,
        };
        let mut gen = NameGenerator::default();
        let (out, _) = expand(vec![rule], vec![], &mut gen).unwrap();
        assert_eq!(out.len(), 1);
    }
}
