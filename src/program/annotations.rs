//! Annotation bookkeeping (§4.8, §6) plus the two behaviors pulled in from
//! `original_source/` that `spec.md` only gestures at: `@AttachDatabase`
//! preamble emission and `@NoWith`'s override of default `WITH` promotion.

use std::collections::HashMap;

use crate::ast::{Annotation, FieldValue, Literal, ExprKind};

#[derive(Debug, Clone, Default)]
pub struct AnnotationTable {
    by_subject: HashMap<String, Vec<Annotation>>,
}

impl AnnotationTable {
    pub fn build(annotations: Vec<Annotation>) -> Self {
        let mut by_subject: HashMap<String, Vec<Annotation>> = HashMap::new();
        for ann in annotations {
            by_subject.entry(ann.subject().to_string()).or_default().push(ann);
        }
        AnnotationTable { by_subject }
    }

    pub fn has(&self, predicate: &str, keyword: &str) -> bool {
        self.find(predicate, keyword).is_some()
    }

    pub fn find(&self, predicate: &str, keyword: &str) -> Option<&Annotation> {
        self.by_subject.get(predicate)?.iter().find(|a| a.keyword == keyword)
    }

    /// True when `predicate` should never be inlined into its caller, even
    /// past the default multi-use-triggers-WITH threshold: a `@NoWith`
    /// override present in `original_source/` but never spelled out by
    /// `spec.md` beyond listing the annotation's name (see DESIGN.md).
    pub fn forces_with(&self, predicate: &str) -> bool {
        self.has(predicate, "With")
    }

    pub fn forces_inject(&self, predicate: &str) -> bool {
        self.has(predicate, "NoWith")
    }

    pub fn is_ground(&self, predicate: &str) -> bool {
        self.has(predicate, "Ground")
    }

    pub fn is_no_inject(&self, predicate: &str) -> bool {
        self.has(predicate, "NoInject")
    }

    pub fn has_limit_or_order(&self, predicate: &str) -> bool {
        self.has(predicate, "Limit") || self.has(predicate, "OrderBy")
    }

    pub fn compile_as_udf(&self, predicate: &str) -> bool {
        self.has(predicate, "CompileAsUdf")
    }

    pub fn compile_as_tvf(&self, predicate: &str) -> bool {
        self.has(predicate, "CompileAsTvf")
    }

    pub fn order_by_suffix(&self, predicate: &str) -> Option<String> {
        let ann = self.find(predicate, "OrderBy")?;
        let parts: Vec<String> = ann
            .call
            .record
            .fields
            .iter()
            .map(|(_, v)| field_text(v))
            .collect();
        Some(format!("ORDER BY {}", parts.join(", ")))
    }

    pub fn limit_suffix(&self, predicate: &str) -> Option<String> {
        let ann = self.find(predicate, "Limit")?;
        let (_, v) = ann.call.record.fields.first()?;
        Some(format!("LIMIT {}", field_text(v)))
    }

    /// `@DefineFlag(FlagName, default)` — the flag's name is the annotation
    /// subject (just like `Foo` in `@Limit(Foo, 10)`), the default is its
    /// sole positional argument.
    pub fn define_flag_defaults(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for anns in self.by_subject.values() {
            for ann in anns {
                if ann.keyword == "DefineFlag" {
                    if let Some((_, default)) = ann.call.record.fields.first() {
                        out.insert(ann.subject().to_string(), field_text(default));
                    }
                }
            }
        }
        out
    }

    pub fn reset_flag_overrides(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for anns in self.by_subject.values() {
            for ann in anns {
                if ann.keyword == "ResetFlagValue" {
                    if let Some((_, value)) = ann.call.record.fields.first() {
                        out.insert(ann.subject().to_string(), field_text(value));
                    }
                }
            }
        }
        out
    }

    /// One `ATTACH DATABASE … AS …;` statement per `@AttachDatabase`-annotated
    /// predicate, in annotation order.
    pub fn attach_database_statements(&self, dialect: &dyn crate::sql::Dialect) -> Vec<String> {
        let mut out = Vec::new();
        for anns in self.by_subject.values() {
            for ann in anns {
                if ann.keyword == "AttachDatabase" {
                    let path = ann.call.record.fields.first().map(|(_, v)| field_text(v)).unwrap_or_default();
                    let alias = ann.subject().to_string();
                    if let Some(stmt) = dialect.attach_database_statement(path.trim_matches('\''), &alias) {
                        out.push(stmt);
                    }
                }
            }
        }
        out
    }
}

fn field_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Expression(e) => match &e.kind {
            ExprKind::Literal(Literal::String(s)) => s.clone(),
            ExprKind::Literal(lit) => lit.to_string(),
            ExprKind::Variable(v) => v.clone(),
            _ => String::new(),
        },
        FieldValue::Aggregation(_) => String::new(),
    }
}
