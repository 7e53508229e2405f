//! Recursion unfolding (§4.4). SQL has no native fixpoint operator outside
//! dialect-specific recursive CTEs (which this crate's dialect layer doesn't
//! target), so a cyclic predicate is unfolded into a bounded chain of
//! non-recursive layers before it ever reaches the structurer.

use std::collections::{HashMap, HashSet};

use crate::ast::{
    Annotation, AstFold, Conjunct, FieldValue, PredicateCall, PredicateName, Record, Rule, Span,
};
use crate::error::Error;
use crate::utils::NameGenerator;

/// A strongly connected set of user predicates that call one another.
#[derive(Debug, Clone)]
pub struct Cover {
    pub members: Vec<String>,
}

/// `direct_args_of` restricted to user predicates (names without `_`),
/// grouped into strongly connected components via Tarjan's algorithm.
/// Singleton components are only kept when the predicate calls itself.
pub fn find_cycles(rules: &[Rule]) -> Vec<Cover> {
    let mut by_name: HashMap<String, Vec<&Rule>> = HashMap::new();
    for r in rules {
        by_name.entry(r.predicate_name().to_string()).or_default().push(r);
    }
    let user_names: Vec<String> = by_name.keys().filter(|n| !n.contains('_')).cloned().collect();
    let index: HashMap<&str, usize> =
        user_names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();

    let mut graph: Vec<Vec<usize>> = vec![Vec::new(); user_names.len()];
    for (i, name) in user_names.iter().enumerate() {
        let mut callees = HashSet::new();
        for rule in &by_name[name] {
            collect_calls(rule, &mut callees);
        }
        for callee in callees {
            if let Some(&j) = index.get(callee.as_str()) {
                graph[i].push(j);
            }
        }
    }

    tarjan_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph[component[0]].contains(&component[0])
        })
        .map(|component| Cover { members: component.into_iter().map(|i| user_names[i].clone()).collect() })
        .collect()
}

fn collect_calls(rule: &Rule, out: &mut HashSet<String>) {
    if let Some(body) = &rule.body {
        for c in body {
            collect_conjunct_calls(c, out);
        }
    }
}

fn collect_conjunct_calls(conjunct: &Conjunct, out: &mut HashSet<String>) {
    match conjunct {
        Conjunct::Predicate(call) => {
            out.insert(call.name.name().to_string());
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
        Conjunct::Unification(_, _) | Conjunct::Inclusion(_, _) => {}
    }
}

fn tarjan_scc(graph: &[Vec<usize>]) -> Vec<Vec<usize>> {
    struct State {
        index: Vec<Option<usize>>,
        low: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        counter: usize,
        out: Vec<Vec<usize>>,
    }
    fn strongconnect(v: usize, graph: &[Vec<usize>], s: &mut State) {
        s.index[v] = Some(s.counter);
        s.low[v] = s.counter;
        s.counter += 1;
        s.stack.push(v);
        s.on_stack[v] = true;

        for &w in &graph[v] {
            if s.index[w].is_none() {
                strongconnect(w, graph, s);
                s.low[v] = s.low[v].min(s.low[w]);
            } else if s.on_stack[w] {
                s.low[v] = s.low[v].min(s.index[w].unwrap());
            }
        }

        if s.low[v] == s.index[v].unwrap() {
            let mut component = Vec::new();
            loop {
                let w = s.stack.pop().unwrap();
                s.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            s.out.push(component);
        }
    }

    let n = graph.len();
    let mut state = State {
        index: vec![None; n],
        low: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        counter: 0,
        out: Vec::new(),
    };
    for v in 0..n {
        if state.index[v].is_none() {
            strongconnect(v, graph, &mut state);
        }
    }
    state.out
}

/// Signal that a stop-signal annotation names a predicate outside the
/// recursive component being unfolded.
pub fn validate_stop_signal(cover: &Cover, stop_signal: &str) -> Result<(), Error> {
    if cover.members.iter().any(|m| m == stop_signal) {
        Ok(())
    } else {
        Err(Error::functor(
            PredicateName::from_name(stop_signal),
            "stop signal does not depend on the recursive predicate",
            Span::synthetic(0),
        ))
    }
}

/// `ignition_steps`: default `|cover| + 3`, bumped by one if its parity
/// disagrees with the requested unfolding `depth`.
pub fn ignition_steps(cover: &Cover, depth: usize) -> usize {
    let base = cover.members.len() + 3;
    if base % 2 != depth % 2 {
        base + 1
    } else {
        base
    }
}

const ITERATION_DEPTH_THRESHOLD: usize = 12;

/// Unfolds one recursive cover into a bounded, non-recursive chain of
/// layers. `requested_iteration` carries a user's explicit `@Iteration(p, …)`
/// annotation, if any, for this cover's root.
pub fn unfold_cover(
    rules: &mut Vec<Rule>,
    annotations: &mut Vec<Annotation>,
    cover: &Cover,
    depth: usize,
    requested_iteration: bool,
    gen: &mut NameGenerator,
) -> Result<(), Error> {
    if cover.members.len() == 1 {
        log::debug!("functor: cover {:?} is self-recursive, vertical unfold to depth {depth}", cover.members);
        vertical_unfold(rules, &cover.members[0], depth, gen)
    } else if requested_iteration || depth > ITERATION_DEPTH_THRESHOLD {
        let steps = ignition_steps(cover, depth);
        log::debug!(
            "functor: cover {:?} unfolds horizontally with iteration ({steps} steps, requested={requested_iteration})",
            cover.members
        );
        horizontal_unfold(rules, cover, steps, gen)?;
        let root = &cover.members[0];
        annotations.push(iteration_annotation(root, cover, steps - cover.members.len().max(1)));
        Ok(())
    } else {
        log::debug!("functor: cover {:?} unfolds horizontally to depth {depth}", cover.members);
        horizontal_unfold(rules, cover, depth, gen)
    }
}

fn iteration_annotation(root: &str, cover: &Cover, repetitions: usize) -> Annotation {
    let span = Span::synthetic(0);
    let mut record = Record::default();
    let predicates: Vec<crate::ast::Expr> = cover
        .members
        .iter()
        .map(|m| crate::ast::Expr::literal(crate::ast::Literal::PredicateSymbol(PredicateName::from_name(m.clone())), span))
        .collect();
    record.push_named(
        "predicates",
        FieldValue::Expression(crate::ast::Expr::literal(crate::ast::Literal::List(predicates), span)),
    );
    record.push_named(
        "repetitions",
        FieldValue::Expression(crate::ast::Expr::literal(
            crate::ast::Literal::Number(crate::ast::Number::Integer(repetitions as i64)),
            span,
        )),
    );
    Annotation {
        keyword: "Iteration".to_string(),
        call: PredicateCall { name: PredicateName::from_name(root.to_string()), record, span },
        span,
    }
}

/// A single predicate `p` cuts its own cycle: generate `p_r0 .. p_r(D-1)`
/// where `p_ri` is `p`'s own rules with self-calls bound to `nil` (i=0) or
/// `p_r(i-1)` (i>0), then `p := p_r(D-1)`.
fn vertical_unfold(rules: &mut Vec<Rule>, p: &str, depth: usize, gen: &mut NameGenerator) -> Result<(), Error> {
    let own_rules: Vec<Rule> = rules.iter().filter(|r| r.predicate_name() == p).cloned().collect();
    if own_rules.is_empty() {
        return Ok(());
    }
    rules.retain(|r| r.predicate_name() != p);

    let mut prior_name = "nil".to_string();
    let depth = depth.max(1);
    for i in 0..depth {
        let layer_name = if i + 1 == depth { p.to_string() } else { gen_layer_name(p, i, gen) };
        let mut renamer = SelfCallRenamer { from: p, to: &prior_name };
        for rule in &own_rules {
            let renamed = renamer
                .fold_rule(rule.clone())
                .map_err(|e| Error::functor(PredicateName::from_name(p), e.to_string(), rule.full_text))?;
            rules.push(Rule { head: retarget_head(renamed.head, &layer_name), ..renamed });
        }
        prior_name = layer_name;
    }
    Ok(())
}

/// Every cover member gets its own layered chain `m_fr0 .. m_frD`, each
/// layer's self/mutual calls within the cover bound to the previous layer's
/// names; the final layer for the cover's root is exposed under the
/// original predicate name.
fn horizontal_unfold(rules: &mut Vec<Rule>, cover: &Cover, depth: usize, gen: &mut NameGenerator) -> Result<(), Error> {
    let depth = depth.max(1);
    let mut own_rules: HashMap<String, Vec<Rule>> = HashMap::new();
    for member in &cover.members {
        let rs: Vec<Rule> = rules.iter().filter(|r| r.predicate_name() == member).cloned().collect();
        own_rules.insert(member.clone(), rs);
    }
    rules.retain(|r| !cover.members.contains(&r.predicate_name().to_string()));

    let mut prior_names: HashMap<String, String> =
        cover.members.iter().map(|m| (m.clone(), "nil".to_string())).collect();

    for i in 0..depth {
        let mut next_names = HashMap::new();
        for member in &cover.members {
            let layer_name = if i + 1 == depth {
                member.clone()
            } else {
                gen_layer_name(member, i, gen)
            };
            let mut renamer = CoverRenamer { mapping: &prior_names };
            for rule in &own_rules[member] {
                let renamed = renamer
                    .fold_rule(rule.clone())
                    .map_err(|e| Error::functor(PredicateName::from_name(member.clone()), e.to_string(), rule.full_text))?;
                rules.push(Rule { head: retarget_head(renamed.head, &layer_name), ..renamed });
            }
            next_names.insert(member.clone(), layer_name);
        }
        prior_names = next_names;
    }
    Ok(())
}

fn gen_layer_name(base: &str, layer: usize, gen: &mut NameGenerator) -> String {
    let _ = gen.gen();
    format!("{base}_fr{layer}")
}

fn retarget_head(mut head: PredicateCall, new_name: &str) -> PredicateCall {
    head.name = PredicateName::from_name(new_name.to_string());
    head
}

struct SelfCallRenamer<'a> {
    from: &'a str,
    to: &'a str,
}

impl<'a> AstFold for SelfCallRenamer<'a> {
    fn fold_predicate_call(&mut self, mut call: PredicateCall) -> anyhow::Result<PredicateCall> {
        if call.name.parts.len() == 1 && call.name.name() == self.from {
            call.name = PredicateName::from_name(self.to.to_string());
        }
        crate::ast::fold::fold_predicate_call(self, call)
    }
}

struct CoverRenamer<'a> {
    mapping: &'a HashMap<String, String>,
}

impl<'a> AstFold for CoverRenamer<'a> {
    fn fold_predicate_call(&mut self, mut call: PredicateCall) -> anyhow::Result<PredicateCall> {
        if call.name.parts.len() == 1 {
            if let Some(renamed) = self.mapping.get(call.name.name()) {
                call.name = PredicateName::from_name(renamed.clone());
            }
        }
        crate::ast::fold::fold_predicate_call(self, call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PredicateCall as PC, Span};

    fn self_recursive_rule() -> Vec<Rule> {
        let span = Span::synthetic(0);
        let base = Rule {
            head: PC { name: PredicateName::from_name("P"), record: Record::default(), span },
            body: Some(vec![Conjunct::Predicate(PC {
                name: PredicateName::from_name("Base"),
                record: Record::default(),
                span,
            })]),
            distinct_denoted: false,
            full_text: span,
        };
        let rec = Rule {
            head: PC { name: PredicateName::from_name("P"), record: Record::default(), span },
            body: Some(vec![Conjunct::Predicate(PC {
                name: PredicateName::from_name("P"),
                record: Record::default(),
                span,
            })]),
            distinct_denoted: false,
            full_text: span,
        };
        vec![base, rec]
    }

    #[test]
    fn finds_self_recursive_cycle() {
        let rules = self_recursive_rule();
        let covers = find_cycles(&rules);
        assert_eq!(covers.len(), 1);
        assert_eq!(covers[0].members, vec!["P".to_string()]);
    }

    #[test]
    fn vertical_unfold_produces_bounded_layers_and_keeps_p_as_final_name() {
        let mut rules = self_recursive_rule();
        let mut gen = NameGenerator::new("v");
        vertical_unfold(&mut rules, "P", 3, &mut gen).unwrap();
        assert!(rules.iter().any(|r| r.predicate_name() == "P"));
        assert!(!rules.iter().any(|r| {
            r.body.as_ref().map_or(false, |b| {
                b.iter().any(|c| matches!(c, Conjunct::Predicate(call) if call.name.name() == "P"))
            })
        }));
    }
}
