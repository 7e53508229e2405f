//! End-to-end scenarios: parse a small Logica program, compile one of its
//! predicates to SQL, run it against an in-memory SQLite database, and
//! check the rows that come back.

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::Connection;

/// Mirrors `logica::runner::register_sqlite_functions`, duplicated here
/// rather than called (that helper lives behind the `sqlite-runner` feature,
/// which this test suite deliberately doesn't need) so `ArgMax=`/`ArgMin=`
/// have something to compile against.
fn register_arg_extremum_functions(conn: &Connection) {
    struct ArgExtremum {
        maximize: bool,
    }
    impl rusqlite::functions::Aggregate<Option<(f64, rusqlite::types::Value)>, rusqlite::types::Value> for ArgExtremum {
        fn init(&self, _ctx: &mut Context<'_>) -> rusqlite::Result<Option<(f64, rusqlite::types::Value)>> {
            Ok(None)
        }
        fn step(
            &self,
            ctx: &mut Context<'_>,
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
            _ctx: &mut Context<'_>,
            acc: Option<Option<(f64, rusqlite::types::Value)>>,
        ) -> rusqlite::Result<rusqlite::types::Value> {
            Ok(acc.flatten().map(|(_, v)| v).unwrap_or(rusqlite::types::Value::Null))
        }
    }
    conn.create_aggregate_function(
        "ARGMAX_BY",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        ArgExtremum { maximize: true },
    )
    .unwrap();
    conn.create_aggregate_function(
        "ARGMIN_BY",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        ArgExtremum { maximize: false },
    )
    .unwrap();
}

fn run_predicate(source: &str, predicate: &str) -> Vec<Vec<String>> {
    let compiled = logica::compile_source("test.l", source.to_string(), &[], "sqlite")
        .unwrap_or_else(|errs| panic!("compile failed: {:?}", errs.iter().map(|e| e.message()).collect::<Vec<_>>()));
    let sql = compiled.program.compile(predicate).unwrap_or_else(|e| panic!("{}", e.message()));

    let conn = Connection::open_in_memory().unwrap();
    register_arg_extremum_functions(&conn);
    for stmt in sql.preamble.iter().chain(sql.ground_statements.iter()) {
        conn.execute_batch(stmt).unwrap_or_else(|e| panic!("preamble failed: {e}\n{stmt}"));
    }

    let mut rows_out = Vec::new();
    let mut stmt = conn.prepare(&sql.sql).unwrap_or_else(|e| panic!("{e}\n{}", sql.sql));
    let column_count = stmt.column_count();
    let mut rows = stmt.query([]).unwrap();
    while let Some(row) = rows.next().unwrap() {
        let mut rendered = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value: rusqlite::types::Value = row.get(i).unwrap();
            rendered.push(match value {
                rusqlite::types::Value::Null => "NULL".to_string(),
                rusqlite::types::Value::Integer(n) => n.to_string(),
                rusqlite::types::Value::Real(f) => f.to_string(),
                rusqlite::types::Value::Text(s) => s,
                rusqlite::types::Value::Blob(b) => format!("{b:?}"),
            });
        }
        rows_out.push(rendered);
    }
    rows_out.sort();
    rows_out
}

#[test]
fn grandparent_via_two_fact_joins() {
    let rows = run_predicate(
        r#"
        Parent("Shmi", "Anakin");
        Parent("Anakin", "Luke");
        Grandparent(g, c) :- Parent(g, x), Parent(x, c);
        "#,
        "Grandparent",
    );
    assert_eq!(rows, vec![vec!["Shmi".to_string(), "Luke".to_string()]]);
}

#[test]
fn sum_aggregation_over_facts() {
    let rows = run_predicate(
        r#"
        Fact(1);
        Fact(2);
        Fact(3);
        Sum() += f :- Fact(f);
        "#,
        "Sum",
    );
    assert_eq!(rows, vec![vec!["6".to_string()]]);
}

#[test]
fn odd_numbers_via_modulo() {
    let rows = run_predicate(
        r#"
        @Engine("sqlite");
        Odd(x) :- x in Range(10), x % 2 == 1;
        "#,
        "Odd",
    );
    let flat: Vec<String> = rows.into_iter().flatten().collect();
    assert_eq!(flat, vec!["1".to_string(), "3".to_string(), "5".to_string(), "7".to_string(), "9".to_string()]);
}

#[test]
fn cross_product_filtered_by_order() {
    let rows = run_predicate(
        r#"
        @Engine("sqlite");
        P(x, y) :- x in Range(3), y in Range(3), x < y;
        "#,
        "P",
    );
    assert_eq!(
        rows,
        vec![
            vec!["0".to_string(), "1".to_string()],
            vec!["0".to_string(), "2".to_string()],
            vec!["1".to_string(), "2".to_string()],
        ]
    );
}

#[test]
fn argmax_picks_the_value_at_the_highest_key() {
    let rows = run_predicate(
        r#"
        Grade(student: "a", score: 90);
        Grade(student: "b", score: 70);
        Top(s ArgMax= (score -> s)) :- Grade(student: s, score: score);
        "#,
        "Top",
    );
    assert_eq!(rows, vec![vec!["a".to_string()]]);
}

#[test]
fn transitive_closure_over_an_edge_chain() {
    let rows = run_predicate(
        r#"
        Edge(1, 2);
        Edge(2, 3);
        Edge(3, 4);
        Closure(x, y) :- Edge(x, y);
        Closure(x, y) :- Edge(x, z), Closure(z, y);
        @Iteration(Closure, 10);
        "#,
        "Closure",
    );
    let expected: Vec<Vec<String>> = vec![(1, 2), (1, 3), (1, 4), (2, 3), (2, 4), (3, 4)]
        .into_iter()
        .map(|(a, b)| vec![a.to_string(), b.to_string()])
        .collect();
    assert_eq!(rows, expected);
}

