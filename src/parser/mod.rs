//! Rule parser (§4.2). `parse_file` is the `ParseFile` entry point: lex the
//! whole buffer once, then repeatedly split the token stream on a top-level
//! separator (mirroring §4.1's bracket-depth-aware `Split`, just operating on
//! tokens instead of raw characters) to carve out statements, then bodies,
//! then conjuncts, recursing into a small precedence-climbing parser
//! ([`expr`]) only once we're down to an actual expression.

pub mod expr;
pub mod lexer;
pub mod rule;
pub mod text;

use chumsky::Parser as ChumskyParser;

use crate::ast::{Annotation, PredicateName, Rule, SourceMap, Span};
use crate::error::Error;
use lexer::{Token, Spanned};

/// Output of parsing one `.l` file (§4.2 `ParseFile` return value).
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub rules: Vec<Rule>,
    pub annotations: Vec<Annotation>,
    pub imported_predicates: Vec<ImportedPredicate>,
    pub predicates_prefix: String,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct ImportedPredicate {
    pub path: Vec<String>,
    pub name: String,
    pub synonym: Option<String>,
    pub span: Span,
}

pub(crate) enum Statement {
    Import(ImportedPredicate),
    Rule(Rule),
    Annotation(Annotation),
}

/// Lex `text` and parse it into rules/imports/annotations. `prefix` is the
/// import-rename prefix applied to every predicate this file defines (empty
/// for the main file, per §4.2).
pub fn parse_file(
    source_map: &SourceMap,
    buffer_id: u32,
    prefix: &str,
) -> Result<ParsedFile, Vec<Error>> {
    let text = source_map.text(Span::new(buffer_id, 0, source_map.buffer(buffer_id).text.len() as u32));
    let tokens = lexer::lexer()
        .parse(text)
        .map_err(|errs| {
            errs.into_iter()
                .map(|e| {
                    let span = Span::new(buffer_id, e.span().start as u32, e.span().end as u32);
                    Error::parsing(e.to_string(), span)
                })
                .collect::<Vec<_>>()
        })?;

    let mut file = ParsedFile {
        file_name: source_map.file_name(Span::new(buffer_id, 0, 0)).to_string(),
        predicates_prefix: prefix.to_string(),
        ..Default::default()
    };

    let statements = split_top_level(&tokens, &[";"]);
    let mut errors = Vec::new();
    for stmt_tokens in statements {
        if stmt_tokens.is_empty() {
            continue;
        }
        match rule::parse_statement(stmt_tokens, buffer_id, prefix) {
            Ok(Statement::Import(imp)) => file.imported_predicates.push(imp),
            Ok(Statement::Rule(r)) => file.rules.push(r),
            Ok(Statement::Annotation(a)) => file.annotations.push(a),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(file)
    } else {
        Err(errors)
    }
}

/// Splits `tokens` at every top-level (bracket-depth 0) occurrence of any
/// control text in `seps`. Empty trailing slices are dropped, matching how a
/// trailing `;` shouldn't produce an empty statement.
pub(crate) fn split_top_level<'t>(
    tokens: &'t [Spanned<Token>],
    seps: &[&str],
) -> Vec<&'t [Spanned<Token>]> {
    let mut pieces = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0usize;
    for (i, (tok, _)) in tokens.iter().enumerate() {
        if let Token::Control(c) = tok {
            match c.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth -= 1,
                other if depth == 0 && seps.contains(&other) => {
                    pieces.push(&tokens[start..i]);
                    start = i + 1;
                    continue;
                }
                _ => {}
            }
        }
    }
    pieces.push(&tokens[start..]);
    pieces.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Finds the first top-level occurrence of any control text in `seps`,
/// returning its index. Used where exactly one split point is expected
/// (`:-`, `-->`, `:=`).
pub(crate) fn find_top_level(tokens: &[Spanned<Token>], seps: &[&str]) -> Option<usize> {
    let mut depth: i32 = 0;
    for (i, (tok, _)) in tokens.iter().enumerate() {
        if let Token::Control(c) = tok {
            match c.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth -= 1,
                other if depth == 0 && seps.contains(&other) => return Some(i),
                _ => {}
            }
        }
    }
    None
}

pub(crate) fn find_top_level_ident(tokens: &[Spanned<Token>], name: &str) -> Option<usize> {
    let mut depth: i32 = 0;
    for (i, (tok, _)) in tokens.iter().enumerate() {
        match tok {
            Token::Control(c) if c == "(" || c == "[" || c == "{" => depth += 1,
            Token::Control(c) if c == ")" || c == "]" || c == "}" => depth -= 1,
            Token::Ident(s) if depth == 0 && s == name => return Some(i),
            _ => {}
        }
    }
    None
}

pub(crate) fn span_of(tokens: &[Spanned<Token>], buffer_id: u32) -> Span {
    match (tokens.first(), tokens.last()) {
        (Some((_, a)), Some((_, b))) => Span::new(buffer_id, a.start as u32, b.end as u32),
        _ => Span::synthetic(buffer_id),
    }
}

pub(crate) fn tok_span(span: &std::ops::Range<usize>, buffer_id: u32) -> Span {
    Span::new(buffer_id, span.start as u32, span.end as u32)
}

pub(crate) fn predicate_name_from_parts(parts: Vec<String>) -> PredicateName {
    PredicateName::from_path(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(s: &str) -> Vec<Spanned<Token>> {
        lexer::lexer().parse(s).unwrap()
    }

    #[test]
    fn splits_statements_on_semicolon() {
        let tokens = lex("A(1); B(2);");
        let parts = split_top_level(&tokens, &[";"]);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn does_not_split_inside_parens() {
        let tokens = lex("A(f(1,2), 3)");
        let parts = split_top_level(&tokens, &[","]);
        assert_eq!(parts.len(), 1);
    }
}
