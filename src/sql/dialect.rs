//! Dialect registry (§4.7). Each backend's differences are expressed as
//! plain method overrides on one trait, the way the teacher's own RQ-to-SQL
//! backend picks a `sqlparser::Dialect` per target — except here the
//! "dialect" also owns semantic knobs (subscript syntax, `GROUP BY` spec)
//! that don't exist in standard SQL at all.

use std::fmt;

/// How a dialect wants `GROUP BY` columns referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBySpec {
    Name,
    Index,
    Expr,
}

pub trait Dialect: fmt::Debug {
    fn name(&self) -> &'static str;

    /// Extra built-in function overrides layered on top of the portable set
    /// and the standard-SQL CSV table (§4.6 source 3).
    fn built_in_functions(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    fn infix_operators(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("+", "+"), ("-", "-"), ("*", "*"), ("/", "/"), ("%", "%"),
            ("==", "="), ("!=", "<>"), ("<=", "<="), (">=", ">="), ("<", "<"), (">", ">"),
            ("&&", "AND"), ("||", "OR"), ("++", "||"),
        ]
    }

    fn subscript(&self, record: &str, field: &str, record_is_table: bool) -> String {
        if record_is_table {
            format!("{record}.{field}")
        } else {
            format!("({record}).{field}")
        }
    }

    /// A Logica snippet prepended to every program compiled for this
    /// dialect (e.g. dialect-specific helper predicates). None of the seven
    /// backends need one today.
    fn library_program(&self) -> &'static str {
        ""
    }

    fn unnest_phrase(&self, list_expr: &str, alias: &str) -> String {
        format!("UNNEST({list_expr}) AS {alias}")
    }

    /// How a row produced by [`Self::unnest_phrase`] exposes its scalar —
    /// bare column for backends whose `UNNEST` aliases the value directly,
    /// something else for table-valued functions like SQLite's `JSON_EACH`.
    fn unnested_value(&self, alias: &str) -> String {
        alias.to_string()
    }

    fn array_phrase(&self, elements: &[String]) -> String {
        format!("[{}]", elements.join(", "))
    }

    fn group_by_spec(&self) -> GroupBySpec {
        GroupBySpec::Name
    }

    /// Wraps a `combine` sub-select so the optimizer can't hoist the
    /// aggregation out of the correlated subquery it belongs in.
    fn decorate_combine_rule(&self, sql: String) -> String {
        format!("MagicalEntangle({sql}, 0)")
    }

    fn maybe_cascading_deletion_word(&self) -> &'static str {
        ""
    }

    fn predicate_literal(&self, name: &str) -> String {
        format!("`{name}`")
    }

    fn attach_database_statement(&self, path: &str, alias: &str) -> Option<String> {
        let _ = (path, alias);
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BigQuery;
impl Dialect for BigQuery {
    fn name(&self) -> &'static str {
        "bq"
    }
    fn subscript(&self, record: &str, field: &str, record_is_table: bool) -> String {
        if record_is_table {
            format!("{record}.{field}")
        } else {
            format!("{record}.{field}")
        }
    }
    fn group_by_spec(&self) -> GroupBySpec {
        GroupBySpec::Index
    }
    fn predicate_literal(&self, name: &str) -> String {
        format!("`{name}`")
    }
}

/// SQLite has neither `UNNEST` nor a native `RANGE`/`ArgMax`/`ArgMin`, so
/// every one of those gets a dialect-level rewrite here instead of a naive
/// template that would be invalid SQL against this engine (§4.6 source 3).
const SQLITE_BUILT_INS: &[(&str, &str)] = &[
    (
        "Range",
        "(select json_group_array(n) from (with recursive t as(select 0 as n union all select n + 1 as n from t where n + 1 < {0}) select n from t) where n < {0})",
    ),
    ("ArgMax", "ARGMAX_BY({0}, {1})"),
    ("ArgMin", "ARGMIN_BY({0}, {1})"),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;
impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }
    fn built_in_functions(&self) -> &'static [(&'static str, &'static str)] {
        SQLITE_BUILT_INS
    }
    fn subscript(&self, record: &str, field: &str, record_is_table: bool) -> String {
        if record_is_table {
            format!("{record}.{field}")
        } else {
            format!("JSON_EXTRACT({record}, '$.{field}')")
        }
    }
    fn group_by_spec(&self) -> GroupBySpec {
        GroupBySpec::Name
    }
    fn predicate_literal(&self, name: &str) -> String {
        format!("\"{name}\"")
    }
    fn attach_database_statement(&self, path: &str, alias: &str) -> Option<String> {
        Some(format!("ATTACH DATABASE '{path}' AS {alias};"))
    }
    /// `RANGE(n)` is rendered as a JSON array (see [`SQLITE_BUILT_INS`]), so
    /// it has to be unnested through `JSON_EACH`, not `UNNEST`.
    fn unnest_phrase(&self, list_expr: &str, alias: &str) -> String {
        format!("JSON_EACH({list_expr}) AS {alias}")
    }
    /// `JSON_EACH` rows carry the scalar under `value`, not the bare alias.
    fn unnested_value(&self, alias: &str) -> String {
        format!("{alias}.value")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgreSql;
impl Dialect for PostgreSql {
    fn name(&self) -> &'static str {
        "psql"
    }
    fn subscript(&self, record: &str, field: &str, record_is_table: bool) -> String {
        if record_is_table {
            format!("{record}.{field}")
        } else {
            format!("({record}).{field}")
        }
    }
    fn group_by_spec(&self) -> GroupBySpec {
        GroupBySpec::Expr
    }
    fn maybe_cascading_deletion_word(&self) -> &'static str {
        "CASCADE"
    }
    fn predicate_literal(&self, name: &str) -> String {
        format!("\"{name}\"")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Trino;
impl Dialect for Trino {
    fn name(&self) -> &'static str {
        "trino"
    }
    fn group_by_spec(&self) -> GroupBySpec {
        GroupBySpec::Expr
    }
    fn unnest_phrase(&self, list_expr: &str, alias: &str) -> String {
        format!("UNNEST({list_expr}) AS t({alias})")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Presto;
impl Dialect for Presto {
    fn name(&self) -> &'static str {
        "presto"
    }
    fn group_by_spec(&self) -> GroupBySpec {
        GroupBySpec::Expr
    }
    fn unnest_phrase(&self, list_expr: &str, alias: &str) -> String {
        format!("UNNEST({list_expr}) AS t({alias})")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDb;
impl Dialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }
    fn subscript(&self, record: &str, field: &str, record_is_table: bool) -> String {
        if record_is_table {
            format!("{record}.{field}")
        } else {
            format!("{record}.{field}")
        }
    }
    fn group_by_spec(&self) -> GroupBySpec {
        GroupBySpec::Expr
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClickHouse;
impl Dialect for ClickHouse {
    fn name(&self) -> &'static str {
        "clickhouse"
    }
    fn subscript(&self, record: &str, field: &str, record_is_table: bool) -> String {
        if record_is_table {
            format!("{record}.{field}")
        } else {
            format!("{record}.{field}")
        }
    }
    fn group_by_spec(&self) -> GroupBySpec {
        GroupBySpec::Expr
    }
    fn unnest_phrase(&self, list_expr: &str, alias: &str) -> String {
        format!("arrayJoin({list_expr}) AS {alias}")
    }
}

pub fn by_name(name: &str) -> Option<Box<dyn Dialect>> {
    Some(match name {
        "bq" | "bigquery" => Box::new(BigQuery),
        "sqlite" => Box::new(Sqlite),
        "psql" | "postgres" | "postgresql" => Box::new(PostgreSql),
        "trino" => Box::new(Trino),
        "presto" => Box::new(Presto),
        "duckdb" => Box::new(DuckDb),
        "clickhouse" => Box::new(ClickHouse),
        _ => return None,
    })
}
