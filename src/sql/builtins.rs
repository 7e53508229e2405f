//! Operator/function tables (§4.6). Three layers, merged so later ones
//! override earlier ones: a portable set, a CSV-sourced standard-SQL
//! signature table (parsed with the `csv` crate, the way the teacher parses
//! its own data-driven test fixtures), and the active dialect's overrides.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::sql::dialect::Dialect;

#[derive(Debug, Clone)]
pub struct Signature {
    pub template: String,
    pub min_arity: usize,
    pub max_arity: Option<usize>,
}

impl Signature {
    fn fixed(template: &str, arity: usize) -> Self {
        Signature { template: template.to_string(), min_arity: arity, max_arity: Some(arity) }
    }

    fn variadic(template: &str, min_arity: usize) -> Self {
        Signature { template: template.to_string(), min_arity, max_arity: None }
    }

    pub fn check_arity(&self, name: &str, given: usize) -> Result<(), String> {
        if given < self.min_arity || self.max_arity.is_some_and(|m| given > m) {
            return Err(format!(
                "`{name}` expects {}{} argument(s), got {given}",
                self.min_arity,
                self.max_arity.map(|m| format!("..={m}")).unwrap_or_else(|| "..".to_string())
            ));
        }
        Ok(())
    }
}

fn portable_set() -> HashMap<String, Signature> {
    let mut m = HashMap::new();
    m.insert("ToString".into(), Signature::fixed("CAST({0} AS TEXT)", 1));
    m.insert("ToInt64".into(), Signature::fixed("CAST({0} AS INTEGER)", 1));
    m.insert("Concat".into(), Signature::variadic("CONCAT({args})", 1));
    m.insert("Size".into(), Signature::fixed("ARRAY_LENGTH({0})", 1));
    m.insert("Range".into(), Signature::fixed("RANGE({0})", 1));
    m.insert("IsNull".into(), Signature::fixed("({0} IS NULL)", 1));
    m.insert("Like".into(), Signature::fixed("({0} LIKE {1})", 2));
    m.insert("Cast".into(), Signature::fixed("CAST({0} AS {1})", 2));
    m.insert("In".into(), Signature::fixed("({0} IN {1})", 2));
    m.insert("ArgMin".into(), Signature::fixed("MIN_BY({0}, {1})", 2));
    m.insert("ArgMax".into(), Signature::fixed("MAX_BY({0}, {1})", 2));
    m.insert("List".into(), Signature::variadic("[{args}]", 0));
    m.insert("Set".into(), Signature::variadic("[{args}]", 0));
    m
}

/// A small embedded CSV of standard-SQL scalar function signatures (§4.6
/// source 2): `name,template,min_arity,has_repeated_args`.
const STANDARD_SQL_CSV: &str = "\
name,template,min_arity,has_repeated_args
Abs,ABS({0}),1,0
Ceil,CEIL({0}),1,0
Floor,FLOOR({0}),1,0
Round,ROUND({0}),1,0
Sqrt,SQRT({0}),1,0
Power,\"POWER({0}, {1})\",2,0
Lower,LOWER({0}),1,0
Upper,UPPER({0}),1,0
Length,LENGTH({0}),1,0
Trim,TRIM({0}),1,0
Substr,\"SUBSTR({0}, {1}, {2})\",2,0
Coalesce,COALESCE({args}),1,1
Greatest,GREATEST({args}),1,1
Least,LEAST({args}),1,1
";

fn standard_sql_set() -> HashMap<String, Signature> {
    let mut out = HashMap::new();
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(STANDARD_SQL_CSV.as_bytes());
    for record in reader.records().flatten() {
        let (Some(name), Some(template), Some(min_arity), Some(repeated)) =
            (record.get(0), record.get(1), record.get(2), record.get(3))
        else {
            continue;
        };
        let min_arity: usize = min_arity.parse().unwrap_or(0);
        let max_arity = if repeated == "1" { None } else { Some(min_arity.max(1)) };
        out.insert(
            name.to_string(),
            Signature { template: template.to_string(), min_arity, max_arity },
        );
    }
    out
}

static PORTABLE: Lazy<HashMap<String, Signature>> = Lazy::new(portable_set);
static STANDARD_SQL: Lazy<HashMap<String, Signature>> = Lazy::new(standard_sql_set);

/// Merges the portable set, the standard-SQL CSV table, and the dialect's
/// own overrides (later layers win), and looks up `name`.
pub fn lookup(name: &str, dialect: &dyn Dialect) -> Option<Signature> {
    for (key, template) in dialect.built_in_functions() {
        if *key == name {
            return Some(Signature::variadic(template, 0));
        }
    }
    if let Some(sig) = STANDARD_SQL.get(name) {
        return Some(sig.clone());
    }
    PORTABLE.get(name).cloned()
}

pub fn infix_operator(name: &str, dialect: &dyn Dialect) -> Option<&'static str> {
    dialect.infix_operators().iter().find(|(op, _)| *op == name).map(|(_, sql)| *sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::dialect::Sqlite;

    #[test]
    fn portable_function_resolves() {
        let sig = lookup("ToString", &Sqlite).unwrap();
        assert_eq!(sig.min_arity, 1);
    }

    #[test]
    fn standard_sql_csv_parses_and_resolves() {
        let sig = lookup("Abs", &Sqlite).unwrap();
        assert_eq!(sig.template, "ABS({0})");
        sig.check_arity("Abs", 1).unwrap();
        assert!(sig.check_arity("Abs", 0).is_err());
    }

    #[test]
    fn variadic_signature_has_no_upper_bound() {
        let sig = lookup("Coalesce", &Sqlite).unwrap();
        assert!(sig.max_arity.is_none());
        assert!(sig.check_arity("Coalesce", 5).is_ok());
    }
}
