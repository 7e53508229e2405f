//! Aggregations-as-expressions (§4.3 step 3): `{op, argument}` becomes a call
//! to a synthetic `Agg<Op>` builtin, so every later pass (combine
//! disambiguation, function inlining, structuring) only has to deal with
//! plain expressions — no special-cased aggregation node past this point.

use anyhow::Result;

use crate::ast::fold;
use crate::ast::{AstFold, Expr, ExprKind, FieldValue, PredicateCall, PredicateName, Record, Rule};
use crate::error::Error;

struct AggAsExpr;

impl AstFold for AggAsExpr {
    fn fold_field_value(&mut self, value: FieldValue) -> Result<FieldValue> {
        match value {
            FieldValue::Aggregation(agg) => {
                let arg = self.fold_expr(*agg.arg)?;
                let mut record = Record::default();
                record.push_positional(FieldValue::Expression(arg));
                Ok(FieldValue::Expression(Expr::new(
                    ExprKind::Call(PredicateCall {
                        name: PredicateName::from_name(agg_builtin_name(&agg.op)),
                        record,
                        span: agg.span,
                    }),
                    agg.span,
                )))
            }
            other => fold::fold_field_value(self, other),
        }
    }
}

fn agg_builtin_name(op: &str) -> String {
    format!("Agg{op}")
}

pub fn rewrite(rules: Vec<Rule>) -> Result<Vec<Rule>, Error> {
    let mut pass = AggAsExpr;
    pass.fold_rules(rules).map_err(|e| Error::simple(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Aggregation, PredicateCall as PC, Span};

    #[test]
    fn sum_becomes_aggsum_call() {
        let span = Span::synthetic(0);
        let mut record = Record::default();
        record.push_named(
            "logica_value",
            FieldValue::Aggregation(Aggregation {
                op: "Sum".to_string(),
                arg: Box::new(Expr::variable("x", span)),
                span,
            }),
        );
        let rule = Rule {
            head: PC { name: PredicateName::from_name("Total"), record, span },
            body: None,
            distinct_denoted: true,
            full_text: span,
        };
        let out = rewrite(vec![rule]).unwrap();
        let value = &out[0].head.record.fields[0].1;
        match value {
            FieldValue::Expression(e) => match &e.kind {
                ExprKind::Call(c) => assert_eq!(c.name.name(), "AggSum"),
                other => panic!("expected call, got {other:?}"),
            },
            other => panic!("expected expression, got {other:?}"),
        }
    }
}
