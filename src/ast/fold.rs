//! A fold (visitor-that-rebuilds) over the rule AST, following the same
//! pattern the teacher crate uses for its PL tree: every desugaring and
//! functor pass implements [`AstFold`] and overrides only the node kinds it
//! cares about, relying on the default methods to recurse (and thereby
//! rebuild, i.e. deep-copy) everywhere else. This is what gives us §5's
//! "each pass clones the tree it receives before mutating" for free — a
//! fold produces a brand new tree, so earlier references (kept around for
//! diagnostics) are never touched.

use anyhow::Result;

use super::expr::{Aggregation, Conjunct, Expr, ExprKind, Field, FieldValue, PredicateCall, Record};
use super::rule::Rule;

pub trait AstFold {
    fn fold_rule(&mut self, rule: Rule) -> Result<Rule> {
        fold_rule(self, rule)
    }

    fn fold_rules(&mut self, rules: Vec<Rule>) -> Result<Vec<Rule>> {
        rules.into_iter().map(|r| self.fold_rule(r)).collect()
    }

    fn fold_conjunct(&mut self, conjunct: Conjunct) -> Result<Conjunct> {
        fold_conjunct(self, conjunct)
    }

    fn fold_body(&mut self, body: Vec<Conjunct>) -> Result<Vec<Conjunct>> {
        body.into_iter().map(|c| self.fold_conjunct(c)).collect()
    }

    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        fold_expr(self, expr)
    }

    fn fold_exprs(&mut self, exprs: Vec<Expr>) -> Result<Vec<Expr>> {
        exprs.into_iter().map(|e| self.fold_expr(e)).collect()
    }

    fn fold_predicate_call(&mut self, call: PredicateCall) -> Result<PredicateCall> {
        fold_predicate_call(self, call)
    }

    fn fold_record(&mut self, record: Record) -> Result<Record> {
        fold_record(self, record)
    }

    fn fold_field_value(&mut self, value: FieldValue) -> Result<FieldValue> {
        fold_field_value(self, value)
    }

    fn fold_aggregation(&mut self, agg: Aggregation) -> Result<Aggregation> {
        Ok(Aggregation {
            op: agg.op,
            arg: Box::new(self.fold_expr(*agg.arg)?),
            span: agg.span,
        })
    }
}

pub fn fold_rule<T: ?Sized + AstFold>(fold: &mut T, rule: Rule) -> Result<Rule> {
    Ok(Rule {
        head: fold.fold_predicate_call(rule.head)?,
        body: rule.body.map(|b| fold.fold_body(b)).transpose()?,
        distinct_denoted: rule.distinct_denoted,
        full_text: rule.full_text,
    })
}

pub fn fold_conjunct<T: ?Sized + AstFold>(fold: &mut T, conjunct: Conjunct) -> Result<Conjunct> {
    Ok(match conjunct {
        Conjunct::Predicate(call) => Conjunct::Predicate(fold.fold_predicate_call(call)?),
        Conjunct::Unification(l, r) => {
            Conjunct::Unification(fold.fold_expr(l)?, fold.fold_expr(r)?)
        }
        Conjunct::Inclusion(e, l) => Conjunct::Inclusion(fold.fold_expr(e)?, fold.fold_expr(l)?),
        Conjunct::Negation(inner, span) => {
            Conjunct::Negation(Box::new(fold.fold_conjunct(*inner)?), span)
        }
        Conjunct::Disjunction(a, b) => {
            Conjunct::Disjunction(fold.fold_body(a)?, fold.fold_body(b)?)
        }
    })
}

pub fn fold_predicate_call<T: ?Sized + AstFold>(
    fold: &mut T,
    call: PredicateCall,
) -> Result<PredicateCall> {
    Ok(PredicateCall {
        name: call.name,
        record: fold.fold_record(call.record)?,
        span: call.span,
    })
}

pub fn fold_record<T: ?Sized + AstFold>(fold: &mut T, record: Record) -> Result<Record> {
    Ok(Record {
        fields: record
            .fields
            .into_iter()
            .map(|(f, v)| Ok::<_, anyhow::Error>((f, fold.fold_field_value(v)?)))
            .collect::<Result<Vec<(Field, FieldValue)>>>()?,
        rest: record.rest,
    })
}

pub fn fold_field_value<T: ?Sized + AstFold>(
    fold: &mut T,
    value: FieldValue,
) -> Result<FieldValue> {
    Ok(match value {
        FieldValue::Expression(e) => FieldValue::Expression(fold.fold_expr(e)?),
        FieldValue::Aggregation(a) => FieldValue::Aggregation(fold.fold_aggregation(a)?),
    })
}

pub fn fold_expr<T: ?Sized + AstFold>(fold: &mut T, expr: Expr) -> Result<Expr> {
    let span = expr.span;
    let kind = match expr.kind {
        ExprKind::Literal(lit) => ExprKind::Literal(lit),
        ExprKind::Variable(v) => ExprKind::Variable(v),
        ExprKind::Call(call) => ExprKind::Call(fold.fold_predicate_call(call)?),
        ExprKind::Subscript(e, field) => ExprKind::Subscript(Box::new(fold.fold_expr(*e)?), field),
        ExprKind::Record(r) => ExprKind::Record(fold.fold_record(r)?),
        ExprKind::Combine(rule) => ExprKind::Combine(Box::new(fold.fold_rule(*rule)?)),
        ExprKind::Implication(arms, otherwise) => {
            let arms = arms
                .into_iter()
                .map(|(c, v)| Ok::<_, anyhow::Error>((fold.fold_expr(c)?, fold.fold_expr(v)?)))
                .collect::<Result<Vec<_>>>()?;
            ExprKind::Implication(arms, Box::new(fold.fold_expr(*otherwise)?))
        }
        ExprKind::Arrow(a, b) => {
            ExprKind::Arrow(Box::new(fold.fold_expr(*a)?), Box::new(fold.fold_expr(*b)?))
        }
    };
    Ok(Expr { kind, span })
}
