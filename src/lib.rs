//! Compiler for the Logica logic-programming language, targeting SQL.
//!
//! [`compile_source`] runs the whole pipeline end to end: parse, resolve
//! imports, desugar, expand functors, prove-nil, unfold recursion, and
//! build a [`program::Program`] ready to compile individual predicates to
//! SQL. Each stage also lives as its own module for callers (and this
//! crate's own `print`/`parse` subcommands) that want to stop partway
//! through.

pub mod ast;
#[cfg(feature = "cli")]
pub mod cli;
pub mod concertina;
pub mod config;
pub mod desugar;
pub mod error;
pub mod functor;
pub mod imports;
pub mod parser;
pub mod program;
pub mod runner;
pub mod sql;
pub mod structure;
pub mod types;
pub mod utils;

use ast::{ExprKind, Literal, Number, SourceMap};
use error::Error;
use utils::NameGenerator;

pub struct CompiledProgram {
    pub source_map: SourceMap,
    /// Diagnostics from the minimum-viable type inferencer (§4.11); these
    /// never block compilation.
    pub type_diagnostics: Vec<Error>,
    pub program: program::Program,
}

/// Runs the full pipeline over `text` (the main file's source) and returns
/// a [`CompiledProgram`] ready to compile any predicate it defines.
/// `search_paths` resolves `import` statements (§4.10); `dialect_name` picks
/// the SQL backend (§4.7) by its [`sql::dialect::by_name`] key.
pub fn compile_source(
    file_name: &str,
    text: String,
    search_paths: &[String],
    dialect_name: &str,
) -> Result<CompiledProgram, Vec<Error>> {
    let mut source_map = SourceMap::new();
    let buffer_id = source_map.add(file_name.to_string(), text);
    let parsed = parser::parse_file(&source_map, buffer_id, "")?;

    let loaded = imports::load(parsed, &mut source_map, search_paths).map_err(|e| vec![e])?;
    let type_diagnostics = types::infer(&loaded.rules);

    let mut gen = NameGenerator::default();
    let rules = desugar::desugar(loaded.rules, &mut gen).map_err(|e| vec![e])?;
    let (mut rules, mut annotations) =
        functor::expand(rules, loaded.annotations, &mut gen).map_err(|e| vec![e])?;
    rules = functor::prove_nil(rules).map_err(|e| vec![e])?;

    let covers = functor::recursion::find_cycles(&rules);
    for cover in &covers {
        let iteration = annotations
            .iter()
            .find(|a| a.keyword == "Iteration" && cover.members.iter().any(|m| m == a.subject()))
            .cloned();
        let (depth, requested_iteration) = match &iteration {
            Some(ann) => (iteration_repetitions(ann).unwrap_or(cover.members.len() + 3), true),
            None => (cover.members.len() + 3, false),
        };
        functor::recursion::unfold_cover(&mut rules, &mut annotations, cover, depth, requested_iteration, &mut gen)
            .map_err(|e| vec![e])?;
    }

    let dialect = sql::dialect::by_name(dialect_name)
        .ok_or_else(|| vec![Error::simple(format!("unknown SQL dialect `{dialect_name}`"))])?;
    let program = program::Program::new(rules, annotations, dialect);

    Ok(CompiledProgram { source_map, type_diagnostics, program })
}

/// `@Iteration(Closure, 10)`'s lone positional argument is the requested
/// repetition count.
fn iteration_repetitions(annotation: &ast::Annotation) -> Option<usize> {
    let (_, value) = annotation.call.record.fields.first()?;
    let expr = value.as_expression()?;
    match &expr.kind {
        ExprKind::Literal(Literal::Number(Number::Integer(n))) => Some(*n as usize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_simple_transitive_closure_program() {
        let source = r#"
            Parent("Shmi", "Anakin");
            Parent("Anakin", "Luke");
            Grandparent(g, c) :- Parent(g, x), Parent(x, c);
        "#
        .to_string();
        let compiled = compile_source("main.l", source, &[], "sqlite").unwrap();
        assert!(compiled.type_diagnostics.is_empty());
        let compiled_sql = compiled.program.compile("Grandparent").unwrap();
        assert!(compiled_sql.sql.to_lowercase().contains("select"));
    }

    #[test]
    fn unknown_dialect_is_a_compile_error() {
        let err = compile_source("main.l", "Fact(1);".to_string(), &[], "not-a-real-dialect");
        assert!(err.is_err());
    }
}
