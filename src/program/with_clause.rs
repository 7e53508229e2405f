//! §4.8 step 5: assembling the `WITH` preamble. Each materialized predicate
//! becomes one `name AS (subquery)` entry, ordered so every entry comes
//! after everything it references — the same DFS toposort used for make
//! ordering and the Concertina scheduler.

use itertools::Itertools;

use crate::error::Error;
use crate::utils::toposort;

/// `entries` is `(name, subquery_sql)` in first-seen (discovery) order;
/// `edges` is `(name, depends_on)` gathered alongside them. Returns the
/// entries reordered so dependencies precede dependents, or an error if the
/// materialized predicates reference each other cyclically (recursion should
/// already have been unfolded away by §4.4, so this should not fire in
/// practice).
pub fn assemble(
    entries: Vec<(String, String)>,
    edges: Vec<(String, String)>,
) -> Result<String, Error> {
    if entries.is_empty() {
        return Ok(String::new());
    }

    let edges_by_name = edges.into_iter().into_group_map();
    let deps: Vec<(String, Vec<String>)> = entries
        .iter()
        .map(|(name, _)| (name.clone(), edges_by_name.get(name).cloned().unwrap_or_default()))
        .collect();

    let order = toposort(&deps).ok_or_else(|| {
        Error::simple("circular dependency among materialized (WITH) predicates")
    })?;

    let by_name: std::collections::HashMap<&str, &str> =
        entries.iter().map(|(n, s)| (n.as_str(), s.as_str())).collect();
    let rendered = order
        .iter()
        .filter_map(|name| by_name.get(name.as_str()).map(|sql| format!("{name} AS (\n{sql}\n)")))
        .join(",\n");

    Ok(format!("WITH {rendered}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_with_entries_by_dependency() {
        let entries = vec![
            ("B".to_string(), "SELECT * FROM A".to_string()),
            ("A".to_string(), "SELECT 1".to_string()),
        ];
        let edges = vec![("B".to_string(), "A".to_string())];
        let sql = assemble(entries, edges).unwrap();
        assert!(sql.find("A AS").unwrap() < sql.find("B AS").unwrap());
    }

    #[test]
    fn empty_entries_render_to_empty_string() {
        assert_eq!(assemble(Vec::new(), Vec::new()).unwrap(), "");
    }
}
