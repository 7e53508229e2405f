//! Statement/rule/body grammar (§4.2), built on top of the token splitters in
//! [`super`] and the expression parser in [`super::expr`].

use crate::ast::{
    Annotation, Conjunct, Expr, ExprKind, FieldValue, PredicateCall, PredicateName, Record, Rule,
};
use crate::error::Error;

use super::expr::{agg_op_prefix_len, parse_expr_tokens, ExprParser};
use super::lexer::{Spanned, Token};
use super::{find_top_level, find_top_level_ident, predicate_name_from_parts, span_of, Statement};

type PResult<T> = Result<T, Error>;

pub(crate) fn parse_statement(
    tokens: &[Spanned<Token>],
    buffer_id: u32,
    prefix: &str,
) -> PResult<Statement> {
    if matches!(tokens.first(), Some((Token::Ident(s), _)) if s == "import") {
        return parse_import(tokens, buffer_id).map(Statement::Import);
    }
    if matches!(tokens.first(), Some((Token::Control(c), _)) if c == "@") {
        return parse_annotation(tokens, buffer_id, prefix).map(Statement::Annotation);
    }
    parse_rule(tokens, buffer_id, prefix).map(Statement::Rule)
}

fn err(buffer_id: u32, tokens: &[Spanned<Token>], msg: impl Into<String>) -> Error {
    Error::parsing(msg.into(), span_of(tokens, buffer_id))
}

/// `import a.b.C [as D]`
fn parse_import(tokens: &[Spanned<Token>], buffer_id: u32) -> PResult<super::ImportedPredicate> {
    let span = span_of(tokens, buffer_id);
    let rest = &tokens[1..];
    let as_idx = find_top_level_ident(rest, "as");
    let (path_tokens, synonym) = match as_idx {
        Some(i) => {
            let synonym = match rest.get(i + 1) {
                Some((Token::Ident(s), _)) => s.clone(),
                _ => return Err(err(buffer_id, tokens, "expected an identifier after `as`")),
            };
            (&rest[..i], Some(synonym))
        }
        None => (rest, None),
    };
    let mut parts = Vec::new();
    for (tok, _) in path_tokens {
        match tok {
            Token::Ident(s) => parts.push(s.clone()),
            Token::Control(c) if c == "." => {}
            _ => return Err(err(buffer_id, tokens, "malformed import path")),
        }
    }
    if parts.is_empty() {
        return Err(err(buffer_id, tokens, "empty import path"));
    }
    let name = parts.last().unwrap().clone();
    let path = parts[..parts.len() - 1].to_vec();
    Ok(super::ImportedPredicate { path, name, synonym, span })
}

/// `@Keyword(Subject, arg1, arg2, ...)`: the first positional argument names
/// the predicate the annotation is about; the rest become `call`'s own
/// record, re-indexed from 0, so `Annotation::subject()` can just read
/// `call.name`.
fn parse_annotation(tokens: &[Spanned<Token>], buffer_id: u32, prefix: &str) -> PResult<Annotation> {
    let span = span_of(tokens, buffer_id);
    let rest = &tokens[1..];
    let keyword = match rest.first() {
        Some((Token::Ident(s), _)) => s.clone(),
        _ => return Err(err(buffer_id, tokens, "expected an annotation keyword after `@`")),
    };
    let mut p = ExprParser::new(&rest[1..], buffer_id);
    let fields_record = p.parse_call_record()?;
    let mut fields = fields_record.fields.into_iter();
    let (_, subject_value) = fields
        .next()
        .ok_or_else(|| err(buffer_id, tokens, "@annotation requires a subject predicate"))?;
    let subject_expr = match subject_value {
        FieldValue::Expression(e) => e,
        FieldValue::Aggregation(_) => {
            return Err(err(buffer_id, tokens, "@annotation subject cannot be an aggregation"))
        }
    };
    let subject_name = match subject_expr.kind {
        ExprKind::Variable(name) => PredicateName::from_name(name),
        ExprKind::Call(c) => c.name,
        ExprKind::Literal(crate::ast::Literal::PredicateSymbol(name)) => name,
        _ => return Err(err(buffer_id, tokens, "@annotation subject must name a predicate")),
    };
    let mut record = Record::default();
    for (field, value) in fields {
        match field {
            crate::ast::Field::Positional(_) => record.push_positional(value),
            crate::ast::Field::Named(n) => record.push_named(n, value),
        }
    }
    let call = apply_prefix_to_call(
        PredicateCall { name: subject_name, record, span },
        prefix,
    );
    Ok(Annotation { keyword, call, span })
}

/// Plain rule (`Head :- Body` / fact `Head;`), function rule (`Head --> Expr`),
/// or functor rule (`NewName := AppName(Args)`).
fn parse_rule(tokens: &[Spanned<Token>], buffer_id: u32, prefix: &str) -> PResult<Rule> {
    let span = span_of(tokens, buffer_id);

    if let Some(i) = find_top_level(tokens, &["-->"]) {
        let head = parse_head(&tokens[..i], buffer_id, prefix)?;
        let value = parse_expr_tokens(&tokens[i + 1..], buffer_id)?;
        return Ok(function_rule_to_udf(head, value, span));
    }

    if find_top_level(tokens, &[":-"]).is_none() && find_top_level(tokens, &[":="]).is_some() {
        let i = find_top_level(tokens, &[":="]).unwrap();
        return parse_functor_rule(&tokens[..i], &tokens[i + 1..], buffer_id, prefix, span);
    }

    match find_top_level(tokens, &[":-"]) {
        Some(i) => {
            let head = parse_head(&tokens[..i], buffer_id, prefix)?;
            let body = parse_body(&tokens[i + 1..], buffer_id)?;
            Ok(Rule {
                head: head.0,
                body: Some(body),
                distinct_denoted: head.1,
                full_text: span,
            })
        }
        None => {
            let head = parse_head(tokens, buffer_id, prefix)?;
            Ok(Rule {
                head: head.0,
                body: None,
                distinct_denoted: head.1,
                full_text: span,
            })
        }
    }
}

/// `Head --> Expr` is sugar for a plain rule returning `Expr` plus an
/// implicit `@CompileAsUdf` — the functor/program layer reads the marker
/// back off `distinct_denoted`-adjacent state at the annotation level, so
/// here we only need to produce the equivalent plain rule; the caller's
/// surrounding file attaches `@CompileAsUdf(Head)` once the predicate name is
/// known (see `imports`/`program::annotations`).
fn function_rule_to_udf(head: (PredicateCall, bool), value: Expr, span: crate::ast::Span) -> Rule {
    let mut call = head.0;
    call.record.push_named(crate::ast::expr::LOGICA_VALUE, FieldValue::Expression(value));
    Rule {
        head: call,
        body: None,
        distinct_denoted: head.1,
        full_text: span,
    }
}

/// `NewName := AppName(Args)` desugars to `NewName(..) :- @Make(AppName, ..)`
/// represented directly as a predicate call to the synthetic `@Make`
/// annotation target; the functor engine (§4.4) recognizes this shape by the
/// `@Make` annotation emitted alongside it.
fn parse_functor_rule(
    head_tokens: &[Spanned<Token>],
    app_tokens: &[Spanned<Token>],
    buffer_id: u32,
    prefix: &str,
    span: crate::ast::Span,
) -> PResult<Rule> {
    let new_name = match head_tokens.first() {
        Some((Token::Ident(s), _)) if head_tokens.len() == 1 => s.clone(),
        _ => return Err(err(buffer_id, head_tokens, "functor rule head must be a bare name")),
    };
    let app_expr = parse_expr_tokens(app_tokens, buffer_id)?;
    let app_call = match app_expr.kind {
        ExprKind::Call(c) => c,
        _ => return Err(err(buffer_id, app_tokens, "functor rule right-hand side must be a call")),
    };
    let mut make_record = Record::default();
    make_record.push_positional(FieldValue::Expression(Expr::literal(
        crate::ast::Literal::PredicateSymbol(app_call.name.clone()),
        app_call.span,
    )));
    for (field, value) in app_call.record.fields {
        make_record.fields.push((field, value));
    }
    let head = PredicateCall {
        name: PredicateName::with_prefix(prefix, &new_name),
        record: Record::default(),
        span,
    };
    let body = vec![Conjunct::Predicate(PredicateCall {
        name: PredicateName::from_name("@Make"),
        record: make_record,
        span,
    })];
    Ok(Rule {
        head,
        body: Some(body),
        distinct_denoted: false,
        full_text: span,
    })
}

/// `Call ['distinct'] [ '=' Expr | AggOp '=' Expr ]`. Returns the head call
/// plus whether it ended up `distinct_denoted`.
fn parse_head(
    tokens: &[Spanned<Token>],
    buffer_id: u32,
    prefix: &str,
) -> PResult<(PredicateCall, bool)> {
    if tokens.is_empty() {
        return Err(err(buffer_id, tokens, "empty rule head"));
    }
    let name_end = find_call_name_end(tokens, buffer_id)?;
    let name = parse_dotted_name(&tokens[..name_end]);
    // Re-parse the record through the expression parser (starting right at
    // the opening paren) so call-record parsing logic lives in one place.
    let mut p = ExprParser::new(&tokens[name_end..], buffer_id);
    let call_expr = p.parse_call_record_public(name.clone(), span_of(tokens, buffer_id))?;
    let mut call = match call_expr.kind {
        ExprKind::Call(c) => c,
        _ => unreachable!(),
    };
    call.name = PredicateName::with_prefix(prefix, name.name());
    let mut rest = &tokens[name_end + p.consumed()..];
    let mut distinct = false;
    if matches!(rest.first(), Some((Token::Ident(s), _)) if s == "distinct") {
        distinct = true;
        rest = &rest[1..];
    }
    if rest.is_empty() {
        return Ok((call, distinct));
    }
    if let Some(agg_len) = agg_op_prefix_len(rest) {
        let op = match &rest[0].0 {
            Token::Ident(s) => s.clone(),
            Token::Control(s) => s.clone(),
            _ => unreachable!(),
        };
        let arg_tokens = &rest[agg_len + 1..];
        let arg = parse_expr_tokens(arg_tokens, buffer_id)?;
        let span = span_of(rest, buffer_id);
        call.record.push_named(
            crate::ast::expr::LOGICA_VALUE,
            FieldValue::Aggregation(crate::ast::Aggregation { op, arg: Box::new(arg), span }),
        );
        return Ok((call, true));
    }
    if matches!(rest.first(), Some((Token::Control(c), _)) if c == "=") {
        let value = parse_expr_tokens(&rest[1..], buffer_id)?;
        call.record.push_named(crate::ast::expr::LOGICA_VALUE, FieldValue::Expression(value));
        return Ok((call, distinct));
    }
    Err(err(buffer_id, rest, "unexpected tokens after rule head"))
}

/// Index one past the last identifier of a (possibly dotted) call name,
/// i.e. the index of the opening `(`.
fn find_call_name_end(tokens: &[Spanned<Token>], buffer_id: u32) -> PResult<usize> {
    let mut i = 0;
    loop {
        match tokens.get(i) {
            Some((Token::Ident(_), _)) => i += 1,
            _ => return Err(err(buffer_id, tokens, "expected a predicate name")),
        }
        if matches!(tokens.get(i), Some((Token::Control(c), _)) if c == ".")
            && matches!(tokens.get(i + 1), Some((Token::Ident(_), _)))
        {
            i += 1;
            continue;
        }
        break;
    }
    if !matches!(tokens.get(i), Some((Token::Control(c), _)) if c == "(") {
        return Err(err(buffer_id, tokens, "expected `(` after predicate name"));
    }
    Ok(i)
}

fn parse_dotted_name(tokens: &[Spanned<Token>]) -> PredicateName {
    let parts: Vec<String> = tokens
        .iter()
        .filter_map(|(t, _)| match t {
            Token::Ident(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    predicate_name_from_parts(parts)
}

fn apply_prefix_to_call(mut call: PredicateCall, prefix: &str) -> PredicateCall {
    if call.name.parts.len() == 1 {
        call.name = PredicateName::with_prefix(prefix, call.name.name());
    }
    call
}

/// `Body = DisjunctGroup ('||' DisjunctGroup)*`, each group a comma-separated
/// conjunct list.
pub(crate) fn parse_body(tokens: &[Spanned<Token>], buffer_id: u32) -> PResult<Vec<Conjunct>> {
    let groups = super::split_top_level(tokens, &["||"]);
    let mut parsed_groups: Vec<Vec<Conjunct>> = Vec::new();
    for group in groups {
        let mut conjuncts = Vec::new();
        for conjunct_tokens in super::split_top_level(group, &[","]) {
            conjuncts.push(parse_conjunct(conjunct_tokens, buffer_id)?);
        }
        parsed_groups.push(conjuncts);
    }
    if parsed_groups.is_empty() {
        return Ok(Vec::new());
    }
    let mut iter = parsed_groups.into_iter().rev();
    let mut acc = iter.next().unwrap();
    for group in iter {
        acc = vec![Conjunct::Disjunction(group, acc)];
    }
    Ok(acc)
}

fn parse_conjunct(tokens: &[Spanned<Token>], buffer_id: u32) -> PResult<Conjunct> {
    if tokens.is_empty() {
        return Err(err(buffer_id, tokens, "empty conjunct"));
    }
    if matches!(tokens.first(), Some((Token::Control(c), _)) if c == "~") {
        let span = span_of(tokens, buffer_id);
        let inner = parse_conjunct(&tokens[1..], buffer_id)?;
        return Ok(Conjunct::Negation(Box::new(inner), span));
    }

    if let Some(concise) = try_parse_concise_combine(tokens, buffer_id)? {
        return Ok(concise);
    }

    if let Some(i) = find_top_level(tokens, &["=="]) {
        let left = parse_expr_tokens(&tokens[..i], buffer_id)?;
        let right = parse_expr_tokens(&tokens[i + 1..], buffer_id)?;
        return Ok(Conjunct::Unification(left, right));
    }

    if let Some(i) = find_top_level_ident(tokens, "in") {
        let left = parse_expr_tokens(&tokens[..i], buffer_id)?;
        let right = parse_expr_tokens(&tokens[i + 1..], buffer_id)?;
        return Ok(Conjunct::Inclusion(left, right));
    }

    let call_expr = parse_expr_tokens(tokens, buffer_id)?;
    match call_expr.kind {
        ExprKind::Call(c) => Ok(Conjunct::Predicate(c)),
        _ => Err(err(buffer_id, tokens, "expected a predicate call, unification, or inclusion")),
    }
}

/// `x Op= Expr` ≡ `x == (combine Op= Expr)`. Recognized only when the target
/// is a short postfix expression (variable or subscript chain, no binary
/// operators) immediately followed by an aggregation operator and `=`.
fn try_parse_concise_combine(tokens: &[Spanned<Token>], buffer_id: u32) -> PResult<Option<Conjunct>> {
    let mut p = ExprParser::new(tokens, buffer_id);
    let target = match p.try_parse_postfix_public() {
        Some(t) => t,
        None => return Ok(None),
    };
    let consumed = p.consumed();
    let rest = &tokens[consumed..];
    match agg_op_prefix_len(rest) {
        Some(_) => {}
        None => return Ok(None),
    }
    let span = span_of(tokens, buffer_id);
    let combine_tokens_with_keyword: Vec<Spanned<Token>> = {
        // Reuse ExprParser's `combine` production by synthesizing a leading
        // `combine` identifier token ahead of `rest`.
        let mut v = vec![(Token::Ident("combine".to_string()), 0..0)];
        v.extend(rest.iter().cloned());
        v
    };
    let combine_expr = parse_expr_tokens(&combine_tokens_with_keyword, buffer_id)?;
    Ok(Some(Conjunct::Unification(target, Expr::new(combine_expr.kind, span))))
}
