//! Import loader (§4.10). Resolves `a.b.C` against a list of root
//! directories to `<root>/a/b.l`, parses it, and folds its rules into the
//! program — checking along the way that every import is both used and
//! actually defined by the file it names.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::ast::{Annotation, Conjunct, Expr, ExprKind, FieldValue, Rule, SourceMap};
use crate::error::Error;
use crate::parser::{self, ImportedPredicate, ParsedFile};

#[derive(Debug, Clone, Default)]
pub struct LoadedProgram {
    pub rules: Vec<Rule>,
    pub annotations: Vec<Annotation>,
}

/// Loads `entry`'s imports (transitively) against `search_paths`, in
/// first-encountered order, and returns every rule and annotation reachable
/// from the entry file.
pub fn load(
    entry: ParsedFile,
    source_map: &mut SourceMap,
    search_paths: &[String],
) -> Result<LoadedProgram, Error> {
    let mut files: HashMap<String, ParsedFile> = HashMap::new();
    let mut loading: Vec<String> = Vec::new();
    let entry_key = String::new();
    files.insert(entry_key.clone(), entry);

    resolve_transitively(&entry_key, &mut files, &mut loading, source_map, search_paths)?;

    for (key, file) in &files {
        check_file(key, file, &files)?;
    }

    let mut rules = Vec::new();
    let mut annotations = Vec::new();
    for file in files.into_values() {
        rules.extend(file.rules);
        annotations.extend(file.annotations);
    }
    Ok(LoadedProgram { rules, annotations })
}

fn resolve_transitively(
    key: &str,
    files: &mut HashMap<String, ParsedFile>,
    loading: &mut Vec<String>,
    source_map: &mut SourceMap,
    search_paths: &[String],
) -> Result<(), Error> {
    loading.push(key.to_string());
    let imports = files.get(key).expect("just inserted").imported_predicates.clone();

    for import in &imports {
        let import_key = import.path.join(".");
        if files.contains_key(&import_key) {
            continue;
        }
        if loading.contains(&import_key) {
            return Err(Error::simple(format!(
                "import cycle: `{import_key}` is imported while it is still being loaded"
            )));
        }

        let resolved = resolve_path(&import.path, search_paths)
            .ok_or_else(|| Error::simple(format!("cannot resolve import `{import_key}` in any of the search paths")))?;
        let text = std::fs::read_to_string(&resolved)
            .map_err(|e| Error::simple(format!("cannot read `{}`: {e}", resolved.display())))?;
        let buffer_id = source_map.add(resolved.to_string_lossy().into_owned(), text);

        let parsed = parser::parse_file(source_map, buffer_id, &import_key)
            .map_err(|errs| errs.into_iter().next().unwrap_or_else(|| Error::simple("parse error")))?;
        files.insert(import_key.clone(), parsed);

        resolve_transitively(&import_key, files, loading, source_map, search_paths)?;
    }

    loading.pop();
    Ok(())
}

fn resolve_path(path: &[String], search_paths: &[String]) -> Option<PathBuf> {
    let (dirs, file) = path.split_at(path.len().saturating_sub(1));
    let file_stem = file.first()?;
    for root in search_paths {
        let mut candidate = Path::new(root).to_path_buf();
        for part in dirs {
            candidate.push(part);
        }
        candidate.push(format!("{file_stem}.l"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn check_file(key: &str, file: &ParsedFile, files: &HashMap<String, ParsedFile>) -> Result<(), Error> {
    let referenced = referenced_names(file);

    for import in &file.imported_predicates {
        let local_name = import.synonym.as_deref().unwrap_or(&import.name);
        if !referenced.contains(local_name) {
            return Err(Error::annotation(
                "Import",
                format!("`{}` is imported but never referenced in `{}`", import.name, display_key(key)),
                import.span,
            ));
        }

        let import_key = import.path.join(".");
        let target = files.get(&import_key).ok_or_else(|| {
            Error::simple(format!("internal error: `{import_key}` was never loaded"))
        })?;
        if !target.rules.iter().any(|r| r.predicate_name() == import.name) {
            return Err(Error::annotation(
                "Import",
                format!("`{}` does not define a predicate named `{}`", import_key, import.name),
                import.span,
            ));
        }
    }
    Ok(())
}

fn display_key(key: &str) -> &str {
    if key.is_empty() { "<main file>" } else { key }
}

fn referenced_names(file: &ParsedFile) -> HashSet<String> {
    let mut out = HashSet::new();
    for rule in &file.rules {
        if let Some(body) = &rule.body {
            for conjunct in body {
                collect_conjunct(conjunct, &mut out);
            }
        }
    }
    out
}

fn collect_conjunct(conjunct: &Conjunct, out: &mut HashSet<String>) {
    match conjunct {
        Conjunct::Predicate(call) => {
            out.insert(call.name.name().to_string());
            for (_, v) in &call.record.fields {
                collect_field_value(v, out);
            }
        }
        Conjunct::Unification(l, r) | Conjunct::Inclusion(l, r) => {
            collect_expr(l, out);
            collect_expr(r, out);
        }
        Conjunct::Negation(inner, _) => collect_conjunct(inner, out),
        Conjunct::Disjunction(a, b) => {
            for c in a.iter().chain(b.iter()) {
                collect_conjunct(c, out);
            }
        }
    }
}

fn collect_field_value(value: &FieldValue, out: &mut HashSet<String>) {
    match value {
        FieldValue::Expression(e) => collect_expr(e, out),
        FieldValue::Aggregation(a) => collect_expr(&a.arg, out),
    }
}

fn collect_expr(expr: &Expr, out: &mut HashSet<String>) {
    match &expr.kind {
        ExprKind::Call(call) => {
            out.insert(call.name.name().to_string());
            for (_, v) in &call.record.fields {
                collect_field_value(v, out);
            }
        }
        ExprKind::Subscript(inner, _) => collect_expr(inner, out),
        ExprKind::Record(r) => {
            for (_, v) in &r.fields {
                collect_field_value(v, out);
            }
        }
        ExprKind::Combine(rule) => {
            if let Some(body) = &rule.body {
                for c in body {
                    collect_conjunct(c, out);
                }
            }
        }
        ExprKind::Implication(arms, otherwise) => {
            for (c, v) in arms {
                collect_expr(c, out);
                collect_expr(v, out);
            }
            collect_expr(otherwise, out);
        }
        ExprKind::Arrow(a, b) => {
            collect_expr(a, out);
            collect_expr(b, out);
        }
        ExprKind::Literal(_) | ExprKind::Variable(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PredicateCall, PredicateName, Record, Span};

    fn parsed_with_import(referenced: bool) -> ParsedFile {
        let span = Span::synthetic(0);
        let mut rules = Vec::new();
        if referenced {
            rules.push(Rule {
                head: PredicateCall { name: PredicateName::from_name("P"), record: Record::default(), span },
                body: Some(vec![Conjunct::Predicate(PredicateCall {
                    name: PredicateName::from_name("Q"),
                    record: Record::default(),
                    span,
                })]),
                distinct_denoted: false,
                full_text: span,
            });
        }
        ParsedFile {
            rules,
            annotations: Vec::new(),
            imported_predicates: vec![ImportedPredicate {
                path: vec!["lib".to_string()],
                name: "Q".to_string(),
                synonym: None,
                span,
            }],
            predicates_prefix: String::new(),
            file_name: "main.l".to_string(),
        }
    }

    fn target_file() -> ParsedFile {
        let span = Span::synthetic(0);
        ParsedFile {
            rules: vec![Rule {
                head: PredicateCall { name: PredicateName::from_name("Q"), record: Record::default(), span },
                body: None,
                distinct_denoted: false,
                full_text: span,
            }],
            annotations: Vec::new(),
            imported_predicates: Vec::new(),
            predicates_prefix: "lib".to_string(),
            file_name: "lib.l".to_string(),
        }
    }

    #[test]
    fn unused_import_is_an_error() {
        let files: HashMap<String, ParsedFile> = [("lib".to_string(), target_file())].into_iter().collect();
        let unused = parsed_with_import(false);
        assert!(check_file("", &unused, &files).is_err());
    }

    #[test]
    fn used_import_with_existing_target_is_fine() {
        let files: HashMap<String, ParsedFile> = [("lib".to_string(), target_file())].into_iter().collect();
        let used = parsed_with_import(true);
        assert!(check_file("", &used, &files).is_ok());
    }

    #[test]
    fn import_of_undefined_predicate_is_an_error() {
        let span = Span::synthetic(0);
        let mut empty_target = target_file();
        empty_target.rules.clear();
        let files: HashMap<String, ParsedFile> = [("lib".to_string(), empty_target)].into_iter().collect();
        let used = parsed_with_import(true);
        let _ = span;
        assert!(check_file("", &used, &files).is_err());
    }
}
