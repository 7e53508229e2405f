//! Program ("universe") compiler (§4.8). Takes every rule and annotation in
//! a compiled file and turns a chosen predicate into runnable SQL: the
//! `@AttachDatabase` preamble, `@Ground` table statements, the `WITH`
//! preamble for materialized predicates, inlined subqueries for everything
//! else, and a flag-substitution pass run to a fixed point at the end.

pub mod annotations;
pub mod inject;
pub mod with_clause;

use std::collections::{HashMap, HashSet};

use crate::ast::{Annotation, PredicateName, Rule};
use crate::error::Error;
use crate::sql::select::render_select;
use crate::sql::Dialect;
use crate::utils::NameGenerator;

pub use annotations::AnnotationTable;

const MAX_FLAG_ITERATIONS: usize = 100;

pub struct Program {
    pub dialect: Box<dyn Dialect>,
    pub rules_by_name: HashMap<String, Vec<Rule>>,
    pub annotations: AnnotationTable,
    pub flag_values: HashMap<String, String>,
    pub custom_udfs: HashSet<String>,
}

/// Everything §6's `run`/`print` subcommands need to execute or display one
/// predicate: the one-time preamble, any `@Ground` table statements that
/// must run first, and the predicate's own final query.
#[derive(Debug, Clone, Default)]
pub struct CompiledPredicateSql {
    pub preamble: Vec<String>,
    pub ground_statements: Vec<String>,
    pub sql: String,
}

impl Program {
    pub fn new(rules: Vec<Rule>, annotations: Vec<Annotation>, dialect: Box<dyn Dialect>) -> Self {
        let mut rules_by_name: HashMap<String, Vec<Rule>> = HashMap::new();
        for rule in rules {
            rules_by_name.entry(rule.predicate_name().to_string()).or_default().push(rule);
        }
        let annotation_table = AnnotationTable::build(annotations);

        let mut flag_values = annotation_table.define_flag_defaults();
        for (name, value) in annotation_table.reset_flag_overrides() {
            flag_values.insert(name, value);
        }

        let custom_udfs: HashSet<String> = rules_by_name
            .keys()
            .filter(|name| annotation_table.compile_as_udf(name))
            .cloned()
            .collect();

        Program { dialect, rules_by_name, annotations: annotation_table, flag_values, custom_udfs }
    }

    pub fn compile(&self, name: &str) -> Result<CompiledPredicateSql, Error> {
        let preamble = self.annotations.attach_database_statements(self.dialect.as_ref());

        let mut ground_statements = Vec::new();
        let mut with_entries: Vec<(String, String)> = Vec::new();
        let mut with_edges: Vec<(String, String)> = Vec::new();
        let mut stack = Vec::new();

        let body = self.predicate_sql(name, &mut stack, &mut ground_statements, &mut with_entries, &mut with_edges)?;

        let sql = if self.custom_udfs.contains(name) {
            format!("CREATE TEMP FUNCTION {name}() AS (\n{body}\n);")
        } else {
            let with_clause = with_clause::assemble(with_entries, with_edges)?;
            if with_clause.is_empty() {
                body
            } else {
                format!("{with_clause}\n{body}")
            }
        };

        let sql = self.substitute_flags(&sql)?;
        let sql = self.apply_order_and_limit(name, sql);

        Ok(CompiledPredicateSql { preamble, ground_statements, sql })
    }

    fn rule_defs(&self, name: &str) -> &[Rule] {
        self.rules_by_name.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Recursively compiles `name`'s own query, splicing in every table it
    /// references either as an inlined subquery or as a `WITH` reference,
    /// and appending any `@Ground` statements it or its dependencies need.
    fn predicate_sql(
        &self,
        name: &str,
        stack: &mut Vec<String>,
        ground_acc: &mut Vec<String>,
        with_entries: &mut Vec<(String, String)>,
        with_edges: &mut Vec<(String, String)>,
    ) -> Result<String, Error> {
        if stack.iter().any(|n| n == name) {
            return Err(Error::simple(format!("cyclic predicate reference compiling `{name}` (recursion should have been unfolded already)")));
        }
        let rules = self.rules_by_name.get(name).ok_or_else(|| Error::simple(format!("undefined predicate `{name}`")))?;
        if rules.len() > 1 && rules.iter().any(|r| r.distinct_denoted) {
            return Err(Error::rule_compile(
                PredicateName::from_name(name),
                "a distinct-denoted predicate may not have more than one rule",
                rules[0].full_text,
            ));
        }

        stack.push(name.to_string());
        let mut per_rule_sql = Vec::new();
        for rule in rules.clone() {
            let mut gen = NameGenerator::default();
            let structured = crate::structure::structure(&rule, &mut gen)?;

            let mut table_sql: HashMap<String, String> = HashMap::new();
            for (alias, table_name) in &structured.tables {
                let tname = table_name.name();
                if tname == name {
                    return Err(Error::rule_compile(
                        PredicateName::from_name(name),
                        "recursive self-reference remains after recursion unfolding",
                        rule.full_text,
                    ));
                }
                if self.annotations.is_ground(tname) {
                    // Already materialized as a real table by an earlier
                    // compile of that predicate; reference it by name.
                    continue;
                }
                if inject::is_injectible(tname, self.rule_defs(tname), &self.annotations) {
                    let sub_sql = self.predicate_sql(tname, stack, ground_acc, with_entries, with_edges)?;
                    table_sql.insert(alias.clone(), format!("({sub_sql})"));
                } else {
                    with_edges.push((name.to_string(), tname.to_string()));
                    if !with_entries.iter().any(|(n, _)| n == tname) {
                        // Reserve the slot before recursing so a sibling
                        // table referencing the same predicate doesn't
                        // trigger a second, duplicate materialization.
                        with_entries.push((tname.to_string(), String::new()));
                        let sub_sql = self.predicate_sql(tname, stack, ground_acc, with_entries, with_edges)?;
                        if let Some(slot) = with_entries.iter_mut().find(|(n, _)| n == tname) {
                            slot.1 = sub_sql;
                        }
                    }
                }
            }

            per_rule_sql.push(render_select(&structured, self.dialect.as_ref(), &table_sql)?);
        }
        stack.pop();

        let combined = per_rule_sql.join("\nUNION ALL\n");

        if self.annotations.is_ground(name) {
            let cascade = self.dialect.maybe_cascading_deletion_word();
            let drop = if cascade.is_empty() {
                format!("DROP TABLE IF EXISTS {name};")
            } else {
                format!("DROP TABLE IF EXISTS {name} {cascade};")
            };
            ground_acc.push(format!("{drop}\nCREATE TABLE {name} AS\n{combined};"));
            Ok(format!("SELECT * FROM {name}"))
        } else {
            Ok(combined)
        }
    }

    /// §4.8 step 7: iteratively replaces every `__LOGICA_FLAG__name__`
    /// placeholder `sql::expr::ExprTranslator` emitted for a `FlagValue`
    /// call with that flag's current value, since a flag's own value may
    /// itself reference another flag. Errors rather than looping forever
    /// when a chain doesn't resolve within a generous iteration budget.
    fn substitute_flags(&self, sql: &str) -> Result<String, Error> {
        let mut out = sql.to_string();
        for _ in 0..MAX_FLAG_ITERATIONS {
            let mut changed = false;
            for (name, value) in &self.flag_values {
                let token = format!("__LOGICA_FLAG__{name}__");
                if out.contains(&token) {
                    out = out.replace(&token, value);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        if out.contains("__LOGICA_FLAG__") {
            return Err(Error::simple("flag substitution did not converge: undefined or circularly-defined flag"));
        }
        Ok(out)
    }

    fn apply_order_and_limit(&self, name: &str, sql: String) -> String {
        let mut out = sql;
        if let Some(order) = self.annotations.order_by_suffix(name) {
            out = format!("{out}\n{order}");
        }
        if let Some(limit) = self.annotations.limit_suffix(name) {
            out = format!("{out}\n{limit}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Field, FieldValue, PredicateCall, Record, Span};
    use crate::sql::dialect::Sqlite;

    fn var_field(field: &str, var: &str, span: Span) -> (Field, FieldValue) {
        (Field::Named(field.to_string()), FieldValue::Expression(crate::ast::Expr::variable(var, span)))
    }

    fn fact_rule(name: &str, field: &str, span: Span) -> Rule {
        let mut record = Record::default();
        record.fields.push((Field::Named(field.to_string()), FieldValue::Expression(crate::ast::Expr::literal(crate::ast::Literal::Number(crate::ast::Number::Integer(1)), span))));
        Rule {
            head: PredicateCall { name: PredicateName::from_name(name), record, span },
            body: None,
            distinct_denoted: false,
            full_text: span,
        }
    }

    #[test]
    fn compiles_a_single_rule_predicate_to_a_select() {
        let span = Span::synthetic(0);
        let mut head_record = Record::default();
        head_record.fields.push(var_field("x", "n", span));
        let body = vec![crate::ast::Conjunct::Predicate(PredicateCall {
            name: PredicateName::from_name("Base"),
            record: {
                let mut r = Record::default();
                r.fields.push(var_field("x", "n", span));
                r
            },
            span,
        })];
        let p_rule = Rule {
            head: PredicateCall { name: PredicateName::from_name("P"), record: head_record, span },
            body: Some(body),
            distinct_denoted: false,
            full_text: span,
        };
        let base_rule = fact_rule("Base", "x", span);

        let program = Program::new(vec![p_rule, base_rule], Vec::new(), Box::new(Sqlite));
        let compiled = program.compile("P").unwrap();
        assert!(compiled.sql.contains("SELECT"));
        assert!(compiled.ground_statements.is_empty());
    }

    #[test]
    fn flag_substitution_resolves_chained_flags() {
        let program = Program {
            dialect: Box::new(Sqlite),
            rules_by_name: HashMap::new(),
            annotations: AnnotationTable::default(),
            flag_values: [
                ("a".to_string(), "__LOGICA_FLAG__b__".to_string()),
                ("b".to_string(), "42".to_string()),
            ]
            .into_iter()
            .collect(),
            custom_udfs: HashSet::new(),
        };
        let sql = program.substitute_flags("SELECT __LOGICA_FLAG__a__").unwrap();
        assert_eq!(sql, "SELECT 42");
    }

    #[test]
    fn unresolved_flag_is_an_error() {
        let program = Program {
            dialect: Box::new(Sqlite),
            rules_by_name: HashMap::new(),
            annotations: AnnotationTable::default(),
            flag_values: HashMap::new(),
            custom_udfs: HashSet::new(),
        };
        assert!(program.substitute_flags("SELECT __LOGICA_FLAG__missing__").is_err());
    }
}
