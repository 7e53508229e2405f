//! Assembles a single `SELECT` from a [`RuleStructure`] (§4.5 output) for a
//! given dialect. `table_sql` lets a caller override a table alias's `FROM`
//! source (used by `program::inject`/`with_clause` to splice injected
//! subqueries or `WITH`-table names); an alias with no override is
//! referenced by its predicate's own flat name, which is what a `combine`
//! sub-expression compiles against.

use std::collections::HashMap;

use crate::ast::ExprKind;
use crate::error::Error;
use crate::sql::builtins;
use crate::sql::dialect::{Dialect, GroupBySpec};
use crate::sql::expr::{ExprTranslator, VarsVocabulary};
use crate::structure::{RuleStructure, SelectValue};

pub fn render_select(
    structure: &RuleStructure,
    dialect: &dyn Dialect,
    table_sql: &HashMap<String, String>,
) -> Result<String, Error> {
    let mut vocabulary: VarsVocabulary = HashMap::new();
    for ((alias, field), var) in &structure.vars_map {
        vocabulary.insert(var.clone(), dialect.subscript(alias, &field.to_string(), true));
    }
    for (var, _) in &structure.unnestings {
        vocabulary.insert(var.clone(), dialect.unnested_value(var));
    }

    let translator = ExprTranslator::new(&vocabulary, dialect);

    let mut select_items = Vec::new();
    let mut group_by_cols = Vec::new();
    for (field, value) in &structure.select {
        match value {
            SelectValue::Plain(e) => {
                let sql = translator.translate(e)?;
                select_items.push(format!("{sql} AS {field}"));
                if !structure.aggregated_vars.is_empty() {
                    group_by_cols.push(field.to_string());
                }
            }
            SelectValue::Aggregated { op, arg } => {
                let sql = if op == "ArgMax" || op == "ArgMin" {
                    render_arg_extremum(&translator, op, arg)?
                } else {
                    format!("{}({})", agg_sql_function(op), translator.translate(arg)?)
                };
                select_items.push(format!("{sql} AS {field}"));
            }
        }
    }
    if select_items.is_empty() {
        select_items.push("1 AS logica_value".to_string());
    }

    let mut from_items = Vec::new();
    for (alias, name) in &structure.tables {
        let source = table_sql.get(alias).cloned().unwrap_or_else(|| name.as_flat_string());
        from_items.push(format!("{source} AS {alias}"));
    }
    for (var, list_expr) in &structure.unnestings {
        let list_sql = translator.translate(list_expr)?;
        from_items.push(dialect.unnest_phrase(&list_sql, var));
    }

    let mut sql = String::from("SELECT ");
    sql.push_str(&select_items.join(", "));
    if !from_items.is_empty() {
        sql.push_str(" FROM ");
        sql.push_str(&from_items.join(", "));
    }

    if !structure.constraints.is_empty() {
        let rendered: Vec<String> =
            structure.constraints.iter().map(|c| translator.translate(c)).collect::<Result<_, _>>()?;
        sql.push_str(" WHERE ");
        sql.push_str(&rendered.join(" AND "));
    }

    if !structure.aggregated_vars.is_empty() && !group_by_cols.is_empty() {
        let group_cols = match dialect.group_by_spec() {
            GroupBySpec::Index => (1..=group_by_cols.len()).map(|i| i.to_string()).collect(),
            GroupBySpec::Name | GroupBySpec::Expr => group_by_cols.clone(),
        };
        sql.push_str(" GROUP BY ");
        sql.push_str(&group_cols.join(", "));
    }

    if !structure.distinct_vars.is_empty() {
        sql = sql.replacen("SELECT ", "SELECT DISTINCT ", 1);
    }

    Ok(sql)
}

/// `Foo ArgMax= (key -> value)` picks the value at the extreme key, which
/// vanilla `MAX`/`MIN` over the pair can't express. The dialect supplies the
/// actual comparison (either a native `MAX_BY`/`MIN_BY`, or, for engines
/// without one, a registered aggregate function).
fn render_arg_extremum(translator: &ExprTranslator, op: &str, arg: &crate::ast::Expr) -> Result<String, Error> {
    let ExprKind::Arrow(key, value) = &arg.kind else {
        return Err(Error::rule_compile(
            crate::ast::PredicateName::from_name(op),
            format!("{op}= expects a `key -> value` pair"),
            arg.span,
        ));
    };
    let key_sql = translator.translate(key)?;
    let value_sql = translator.translate(value)?;
    let sig = builtins::lookup(op, translator.dialect)
        .ok_or_else(|| Error::rule_compile(crate::ast::PredicateName::from_name(op), format!("unknown aggregation `{op}`"), arg.span))?;
    Ok(sig.template.replace("{0}", &value_sql).replace("{1}", &key_sql))
}

fn agg_sql_function(op: &str) -> &str {
    match op {
        "Sum" | "+" => "SUM",
        "Count" => "COUNT",
        "Max" => "MAX",
        "Min" => "MIN",
        "Array" | "List" => "ARRAY_AGG",
        "Any" => "BOOL_OR",
        "All" => "BOOL_AND",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Field, PredicateName, Span};
    use crate::sql::dialect::Sqlite;

    #[test]
    fn renders_a_simple_select_from_one_table() {
        let span = Span::synthetic(0);
        let mut structure = RuleStructure::default();
        structure.tables.push(("t_0".to_string(), PredicateName::from_name("Src")));
        structure
            .vars_map
            .insert(("t_0".to_string(), Field::Named("name".to_string())), "x_0".to_string());
        structure.select.push((Field::Named("name".to_string()), SelectValue::Plain(Expr::variable("x_0", span))));
        let sql = render_select(&structure, &Sqlite, &HashMap::new()).unwrap();
        assert!(sql.contains("SELECT"));
        assert!(sql.contains("FROM Src AS t_0"));
        assert!(sql.contains("AS name"));
    }

    #[test]
    fn aggregated_select_emits_group_by() {
        let span = Span::synthetic(0);
        let mut structure = RuleStructure::default();
        structure.tables.push(("t_0".to_string(), PredicateName::from_name("Src")));
        structure
            .vars_map
            .insert(("t_0".to_string(), Field::Named("k".to_string())), "x_0".to_string());
        structure
            .vars_map
            .insert(("t_0".to_string(), Field::Named("v".to_string())), "x_1".to_string());
        structure.select.push((Field::Named("k".to_string()), SelectValue::Plain(Expr::variable("x_0", span))));
        structure.select.push((
            Field::Named("total".to_string()),
            SelectValue::Aggregated { op: "Sum".to_string(), arg: Expr::variable("x_1", span) },
        ));
        structure.aggregated_vars.insert("total".to_string());
        let sql = render_select(&structure, &Sqlite, &HashMap::new()).unwrap();
        assert!(sql.contains("SUM("));
        assert!(sql.contains("GROUP BY k"));
    }
}
