//! The SQL runner interface (§6): `run(sql, engine, is_final) -> Option<(header, rows)>`.
//! The compiler core never talks to a database directly — it hands fully
//! rendered SQL strings to whatever [`SqlRunner`] the caller configured.

use crate::error::Error;

pub type QueryResult = (Vec<String>, Vec<Vec<String>>);

pub trait SqlRunner {
    /// Executes `sql` against `engine`. `is_final` queries must return their
    /// result table; everything else runs for its side effect only and
    /// returns `None`.
    fn run(&self, sql: &str, engine: &str, is_final: bool) -> Result<Option<QueryResult>, Error>;
}

/// Executes nothing and returns an empty table for final queries. Used by
/// `print`/`build_schema` (which never need rows) and by tests that only
/// care about scheduling order, not actual execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRunner;

impl SqlRunner for NullRunner {
    fn run(&self, _sql: &str, _engine: &str, is_final: bool) -> Result<Option<QueryResult>, Error> {
        Ok(is_final.then(|| (Vec::new(), Vec::new())))
    }
}

/// SQLite execution via `rusqlite`, gated behind the `sqlite-runner`
/// feature the way the teacher gates its own optional runtime integrations.
#[cfg(feature = "sqlite-runner")]
pub struct SqliteRunner {
    pub connection: rusqlite::Connection,
}

#[cfg(feature = "sqlite-runner")]
impl SqliteRunner {
    pub fn open(path: &str) -> Result<Self, Error> {
        let connection = rusqlite::Connection::open(path)
            .map_err(|e| Error::simple(format!("failed to open sqlite database `{path}`: {e}")))?;
        register_sqlite_functions(&connection)
            .map_err(|e| Error::simple(format!("failed to register sqlite functions: {e}")))?;
        Ok(SqliteRunner { connection })
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let connection = rusqlite::Connection::open_in_memory()
            .map_err(|e| Error::simple(format!("failed to open in-memory sqlite database: {e}")))?;
        register_sqlite_functions(&connection)
            .map_err(|e| Error::simple(format!("failed to register sqlite functions: {e}")))?;
        Ok(SqliteRunner { connection })
    }
}

/// SQLite has no `ArgMax`/`ArgMin` of its own, so the `sqlite` dialect
/// (`sql::dialect::Sqlite::built_in_functions`) routes `ArgMax=`/`ArgMin=`
/// through these two registered aggregates instead: `ARGMAX_BY(value, key)`
/// returns the value seen alongside the largest key, `ARGMIN_BY` the
/// smallest.
#[cfg(feature = "sqlite-runner")]
pub fn register_sqlite_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    use rusqlite::functions::FunctionFlags;

    conn.create_aggregate_function(
        "ARGMAX_BY",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        ArgExtremum { maximize: true },
    )?;
    conn.create_aggregate_function(
        "ARGMIN_BY",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        ArgExtremum { maximize: false },
    )?;
    Ok(())
}

#[cfg(feature = "sqlite-runner")]
struct ArgExtremum {
    maximize: bool,
}

#[cfg(feature = "sqlite-runner")]
impl rusqlite::functions::Aggregate<Option<(f64, rusqlite::types::Value)>, rusqlite::types::Value> for ArgExtremum {
    fn init(&self, _ctx: &mut rusqlite::functions::Context<'_>) -> rusqlite::Result<Option<(f64, rusqlite::types::Value)>> {
        Ok(None)
    }

    fn step(
        &self,
        ctx: &mut rusqlite::functions::Context<'_>,
        acc: &mut Option<(f64, rusqlite::types::Value)>,
    ) -> rusqlite::Result<()> {
        let value: rusqlite::types::Value = ctx.get(0)?;
        let key: f64 = ctx.get(1)?;
        let better = match acc {
            None => true,
            Some((best_key, _)) if self.maximize => key > *best_key,
            Some((best_key, _)) => key < *best_key,
        };
        if better {
            *acc = Some((key, value));
        }
        Ok(())
    }

    fn finalize(
        &self,
        _ctx: &mut rusqlite::functions::Context<'_>,
        acc: Option<Option<(f64, rusqlite::types::Value)>>,
    ) -> rusqlite::Result<rusqlite::types::Value> {
        Ok(acc.flatten().map(|(_, v)| v).unwrap_or(rusqlite::types::Value::Null))
    }
}

#[cfg(feature = "sqlite-runner")]
impl SqlRunner for SqliteRunner {
    fn run(&self, sql: &str, engine: &str, is_final: bool) -> Result<Option<QueryResult>, Error> {
        if engine != "sqlite" {
            return Err(Error::simple(format!("SqliteRunner cannot execute a `{engine}` query")));
        }
        if !is_final {
            self.connection
                .execute_batch(sql)
                .map_err(|e| Error::simple(format!("sqlite error: {e}")))?;
            return Ok(None);
        }

        let mut stmt = self
            .connection
            .prepare(sql)
            .map_err(|e| Error::simple(format!("sqlite error: {e}")))?;
        let header: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let column_count = header.len();

        let mut rows_out = Vec::new();
        let mut rows = stmt.query([]).map_err(|e| Error::simple(format!("sqlite error: {e}")))?;
        while let Some(row) = rows.next().map_err(|e| Error::simple(format!("sqlite error: {e}")))? {
            let mut rendered = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value: rusqlite::types::Value =
                    row.get(i).map_err(|e| Error::simple(format!("sqlite error: {e}")))?;
                rendered.push(render_value(&value));
            }
            rows_out.push(rendered);
        }

        Ok(Some((header, rows_out)))
    }
}

#[cfg(feature = "sqlite-runner")]
fn render_value(value: &rusqlite::types::Value) -> String {
    use rusqlite::types::Value;
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("{b:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_runner_returns_empty_table_for_final_queries_only() {
        let runner = NullRunner;
        assert_eq!(runner.run("SELECT 1", "sqlite", true).unwrap(), Some((Vec::new(), Vec::new())));
        assert_eq!(runner.run("CREATE TABLE t(x)", "sqlite", false).unwrap(), None);
    }

    #[cfg(feature = "sqlite-runner")]
    #[test]
    fn argmax_by_returns_the_value_at_the_largest_key() {
        let runner = SqliteRunner::open_in_memory().unwrap();
        let (_, rows) = runner
            .run("SELECT ARGMAX_BY(v, k) FROM (SELECT 'a' AS v, 90 AS k UNION ALL SELECT 'b', 70)", "sqlite", true)
            .unwrap()
            .unwrap();
        assert_eq!(rows, vec![vec!["a".to_string()]]);
    }

    #[cfg(feature = "sqlite-runner")]
    #[test]
    fn argmin_by_returns_the_value_at_the_smallest_key() {
        let runner = SqliteRunner::open_in_memory().unwrap();
        let (_, rows) = runner
            .run("SELECT ARGMIN_BY(v, k) FROM (SELECT 'a' AS v, 90 AS k UNION ALL SELECT 'b', 70)", "sqlite", true)
            .unwrap()
            .unwrap();
        assert_eq!(rows, vec![vec!["b".to_string()]]);
    }
}
