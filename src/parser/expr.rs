//! Expression grammar (§4.2 operator precedence table), a small hand-rolled
//! precedence-climbing parser over a token slice. `chumsky` drives the lexer
//! ([`super::lexer`]) but isn't used here: the grammar leans on lookahead that
//! doesn't fit combinators cleanly (deciding whether a dotted identifier run
//! is a qualified predicate call or a subscript chain, deciding whether a
//! conjunct is a concise combine before committing to full expression
//! parsing), so a plain recursive-descent parser reads better than a
//! `chumsky::recursive` tangle would.

use crate::ast::{
    Aggregation, Expr, ExprKind, Field, FieldValue, Literal, PredicateCall, PredicateName, Record,
};
use crate::error::Error;

use super::lexer::{Spanned, Token};
use super::{find_top_level, span_of, tok_span};

pub(crate) struct ExprParser<'t> {
    toks: &'t [Spanned<Token>],
    pos: usize,
    buffer_id: u32,
}

type PResult<T> = Result<T, Error>;

/// Parses `tokens` as a single expression; errors if anything is left over.
pub(crate) fn parse_expr_tokens(tokens: &[Spanned<Token>], buffer_id: u32) -> PResult<Expr> {
    let mut p = ExprParser::new(tokens, buffer_id);
    let e = p.parse_or()?;
    if p.pos != p.toks.len() {
        return Err(p.error_here("trailing tokens after expression"));
    }
    Ok(e)
}

impl<'t> ExprParser<'t> {
    pub(crate) fn new(toks: &'t [Spanned<Token>], buffer_id: u32) -> Self {
        ExprParser { toks, pos: 0, buffer_id }
    }

    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn bump(&mut self) -> Option<&Spanned<Token>> {
        let t = self.toks.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn is_control(&self, c: &str) -> bool {
        matches!(self.peek(), Some(Token::Control(s)) if s == c)
    }

    fn is_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == name)
    }

    fn eat_control(&mut self, c: &str) -> bool {
        if self.is_control(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.is_ident(name) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn span_here(&self) -> crate::ast::Span {
        match self.toks.get(self.pos).or_else(|| self.toks.last()) {
            Some((_, r)) => tok_span(r, self.buffer_id),
            None => crate::ast::Span::synthetic(self.buffer_id),
        }
    }

    fn error_here(&self, msg: impl Into<String>) -> Error {
        Error::parsing(msg.into(), self.span_here())
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.bump() {
            Some((Token::Ident(s), _)) => Ok(s.clone()),
            _ => Err(self.error_here("expected identifier")),
        }
    }

    fn span_from(&self, start: usize) -> crate::ast::Span {
        span_of(&self.toks[start..self.pos], self.buffer_id)
    }

    // || (lowest)
    fn parse_or(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_and()?;
        while self.eat_control("||") {
            let right = self.parse_and()?;
            left = self.infix_call("Or", left, right, start);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_arrow()?;
        while self.eat_control("&&") {
            let right = self.parse_arrow()?;
            left = self.infix_call("And", left, right, start);
        }
        Ok(left)
    }

    // a -> b, used for ArgMin=/ArgMax= (key -> value) pairs.
    fn parse_arrow(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let left = self.parse_cmp()?;
        if self.eat_control("->") {
            let right = self.parse_arrow()?;
            let span = self.span_from(start);
            return Ok(Expr::new(ExprKind::Arrow(Box::new(left), Box::new(right)), span));
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_concat()?;
        loop {
            let op = match self.peek() {
                Some(Token::Control(s))
                    if matches!(s.as_str(), "==" | "!=" | "<=" | ">=" | "<" | ">") =>
                {
                    s.clone()
                }
                _ => break,
            };
            self.bump();
            let right = self.parse_concat()?;
            left = self.infix_call(&op, left, right, start);
        }
        Ok(left)
    }

    fn parse_concat(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Control(s)) if s == "++?" || s == "++" => s.clone(),
                _ => break,
            };
            self.bump();
            let right = self.parse_additive()?;
            left = self.infix_call(&op, left, right, start);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Control(s)) if s == "+" || s == "-" => s.clone(),
                _ => break,
            };
            self.bump();
            let right = self.parse_mul()?;
            left = self.infix_call(&op, left, right, start);
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_pow()?;
        loop {
            let op = match self.peek() {
                Some(Token::Control(s)) if s == "*" || s == "/" || s == "%" => s.clone(),
                _ => break,
            };
            self.bump();
            let right = self.parse_pow()?;
            left = self.infix_call(&op, left, right, start);
        }
        Ok(left)
    }

    fn parse_pow(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let left = self.parse_in()?;
        if self.eat_control("^") {
            let right = self.parse_pow()?;
            return Ok(self.infix_call("^", left, right, start));
        }
        Ok(left)
    }

    fn parse_in(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let mut left = self.parse_unary()?;
        while self.is_ident("in") {
            self.bump();
            let right = self.parse_unary()?;
            left = self.infix_call("In", left, right, start);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let start = self.pos;
        if self.eat_control("!") {
            let inner = self.parse_unary()?;
            return Ok(self.unary_call("Not", inner, start));
        }
        if self.eat_control("-") {
            let inner = self.parse_unary()?;
            return Ok(self.unary_call("Minus", inner, start));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let mut expr = self.parse_primary()?;
        loop {
            if self.is_control(".") {
                // Lookahead: `.` followed by anything other than a bare
                // identifier isn't a subscript (qualified call names are
                // consumed entirely inside parse_primary already).
                if matches!(self.toks.get(self.pos + 1), Some((Token::Ident(_), _))) {
                    self.bump();
                    let field = self.expect_ident()?;
                    let span = self.span_from(start);
                    expr = Expr::new(ExprKind::Subscript(Box::new(expr), field), span);
                    continue;
                }
            }
            break;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let start = self.pos;
        if self.eat_control("(") {
            let close = self.matching_close(start)?;
            let inner_tokens = &self.toks[self.pos..close];
            let inner = parse_expr_tokens(inner_tokens, self.buffer_id)?;
            self.pos = close + 1;
            return Ok(inner);
        }
        if self.is_control("{") {
            return self.parse_record_literal();
        }
        if self.is_ident("if") {
            return self.parse_implication();
        }
        if self.is_ident("combine") {
            return self.parse_combine();
        }
        match self.peek().cloned() {
            Some(Token::Literal(Literal::List(_))) => unreachable!("lexer never emits List literals"),
            Some(Token::Literal(lit)) => {
                self.bump();
                Ok(Expr::literal(lit, self.span_from(start)))
            }
            Some(Token::Control(c)) if c == "[" => self.parse_list_literal(),
            Some(Token::Ident(_)) => self.parse_dotted_or_var(),
            other => Err(self.error_here(format!("unexpected token {:?} in expression", other))),
        }
    }

    /// Consumes a (possibly dotted) identifier run. If it's immediately
    /// followed by `(`, it's a qualified predicate call and the whole dotted
    /// run becomes the call name; otherwise only the first identifier is
    /// consumed here and `.field` chains are left for [`Self::parse_postfix`]
    /// to turn into [`ExprKind::Subscript`]s.
    fn parse_dotted_or_var(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let first = self.expect_ident()?;
        let mut parts = vec![first.clone()];
        let mut lookahead = self.pos;
        while matches!(self.toks.get(lookahead), Some((Token::Control(c), _)) if c == ".")
            && matches!(self.toks.get(lookahead + 1), Some((Token::Ident(_), _)))
        {
            if let Some((Token::Ident(s), _)) = self.toks.get(lookahead + 1) {
                parts.push(s.clone());
            }
            lookahead += 2;
        }
        if matches!(self.toks.get(lookahead), Some((Token::Control(c), _)) if c == "(") {
            self.pos = lookahead;
            let name = PredicateName::from_path(parts);
            return self.parse_call_with_name(name, start);
        }
        Ok(Expr::variable(first, self.span_from(start)))
    }

    fn parse_call_with_name(&mut self, name: PredicateName, start: usize) -> PResult<Expr> {
        let record = self.parse_call_record()?;
        let span = self.span_from(start);
        Ok(Expr::new(
            ExprKind::Call(PredicateCall { name, record, span }),
            span,
        ))
    }

    pub(crate) fn consumed(&self) -> usize {
        self.pos
    }

    /// Parses a `(args)` record at the current position and wraps it as a
    /// [`ExprKind::Call`] under `name`/`span`. Used by [`super::rule`] to
    /// reuse call-record parsing for rule heads and `@Keyword(...)`
    /// annotations, where the name is known ahead of time.
    pub(crate) fn parse_call_record_public(&mut self, name: PredicateName, span: crate::ast::Span) -> PResult<Expr> {
        let record = self.parse_call_record()?;
        Ok(Expr::new(ExprKind::Call(PredicateCall { name, record, span }), span))
    }

    /// Tries to parse a postfix expression (variable or subscript chain),
    /// rewinding on failure. Used to probe for a concise-combine target
    /// without committing to full conjunct parsing.
    pub(crate) fn try_parse_postfix_public(&mut self) -> Option<Expr> {
        let checkpoint = self.pos;
        match self.parse_postfix() {
            Ok(e) => Some(e),
            Err(_) => {
                self.pos = checkpoint;
                None
            }
        }
    }

    /// `(args)`: a comma-separated field list, each either positional,
    /// `name: expr`, `name? Op= expr` (aggregated), or `..rest`.
    pub(crate) fn parse_call_record(&mut self) -> PResult<Record> {
        let open = self.pos;
        if !self.eat_control("(") {
            return Err(self.error_here("expected `(`"));
        }
        let close = self.matching_close(open)?;
        let inner = &self.toks[open + 1..close];
        self.pos = close + 1;
        parse_record_fields(inner, self.buffer_id)
    }

    fn parse_record_literal(&mut self) -> PResult<Expr> {
        let start = self.pos;
        self.bump(); // '{'
        let close = self.matching_close(start)?;
        let inner = &self.toks[start + 1..close];
        let record = parse_record_fields(inner, self.buffer_id)?;
        self.pos = close + 1;
        let span = self.span_from(start);
        Ok(Expr::new(ExprKind::Record(record), span))
    }

    fn parse_list_literal(&mut self) -> PResult<Expr> {
        let start = self.pos;
        self.bump(); // '['
        let close = self.matching_close(start)?;
        let inner = &self.toks[start + 1..close];
        self.pos = close + 1;
        let mut items = Vec::new();
        for piece in super::split_top_level(inner, &[","]) {
            items.push(parse_expr_tokens(piece, self.buffer_id)?);
        }
        let span = self.span_from(start);
        Ok(Expr::literal(Literal::List(items), span))
    }

    /// `if C1 then V1 else if C2 then V2 else V3`
    fn parse_implication(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let mut arms = Vec::new();
        loop {
            if !self.eat_ident("if") {
                return Err(self.error_here("expected `if`"));
            }
            let cond = self.parse_or()?;
            if !self.eat_ident("then") {
                return Err(self.error_here("expected `then`"));
            }
            let val = self.parse_or()?;
            arms.push((cond, val));
            if !self.eat_ident("else") {
                return Err(self.error_here("`if` must end in a final `else`"));
            }
            if self.is_ident("if") {
                continue;
            }
            let else_val = self.parse_or()?;
            let span = self.span_from(start);
            return Ok(Expr::new(ExprKind::Implication(arms, Box::new(else_val)), span));
        }
    }

    /// `combine Op= Expr [ :- Body ]`, used both standalone and as the
    /// right-hand side of a concise combine's rewritten unification.
    fn parse_combine(&mut self) -> PResult<Expr> {
        let start = self.pos;
        self.bump(); // 'combine'
        let (op, arg_tokens, body_tokens) = self.split_combine_tail()?;
        let arg = parse_expr_tokens(arg_tokens, self.buffer_id)?;
        let span = self.span_from(start);
        let body = match body_tokens {
            Some(toks) => Some(super::rule::parse_body(toks, self.buffer_id)?),
            None => None,
        };
        let head = PredicateCall {
            name: PredicateName::from_name("combine"),
            record: {
                let mut r = Record::default();
                r.push_named(
                    crate::ast::expr::LOGICA_VALUE,
                    FieldValue::Aggregation(Aggregation { op, arg: Box::new(arg), span }),
                );
                r
            },
            span,
        };
        let rule = crate::ast::Rule {
            head,
            body,
            distinct_denoted: true,
            full_text: span,
        };
        Ok(Expr::new(ExprKind::Combine(Box::new(rule)), span))
    }

    /// Splits the remainder of a `combine` form into `(op, value tokens, body
    /// tokens)`, where the op is an identifier or `+`/`++` immediately
    /// followed by a bare `=`.
    fn split_combine_tail(&mut self) -> PResult<(String, &'t [Spanned<Token>], Option<&'t [Spanned<Token>]>)> {
        let op = match self.bump() {
            Some((Token::Ident(s), _)) => s.clone(),
            Some((Token::Control(s), _)) if s == "+" || s == "++" => s.clone(),
            _ => return Err(self.error_here("expected an aggregation operator before `=`")),
        };
        if !self.eat_control("=") {
            return Err(self.error_here("expected `=` after aggregation operator"));
        }
        let rest = &self.toks[self.pos..];
        self.pos = self.toks.len();
        match find_top_level(rest, &[":-"]) {
            Some(i) => Ok((op, &rest[..i], Some(&rest[i + 1..]))),
            None => Ok((op, rest, None)),
        }
    }

    /// Finds the index of the `)`/`]`/`}` matching the opener at `open`.
    fn matching_close(&self, open: usize) -> PResult<usize> {
        let opener = match &self.toks[open].0 {
            Token::Control(c) => c.clone(),
            _ => unreachable!(),
        };
        let closer = match opener.as_str() {
            "(" => ")",
            "[" => "]",
            "{" => "}",
            _ => unreachable!(),
        };
        let mut depth = 0i32;
        for i in open..self.toks.len() {
            if let (Token::Control(c), _) = &self.toks[i] {
                if matches!(c.as_str(), "(" | "[" | "{") {
                    depth += 1;
                } else if matches!(c.as_str(), ")" | "]" | "}") {
                    depth -= 1;
                    if depth == 0 {
                        if c == closer {
                            return Ok(i);
                        }
                        return Err(self.error_here(format!("mismatched bracket: expected `{closer}`")));
                    }
                }
            }
        }
        Err(self.error_here(format!("unclosed `{opener}`")))
    }

    fn infix_call(&self, op: &str, left: Expr, right: Expr, start: usize) -> Expr {
        let span = self.span_from(start);
        let mut record = Record::default();
        record.push_positional(FieldValue::Expression(left));
        record.push_positional(FieldValue::Expression(right));
        Expr::new(
            ExprKind::Call(PredicateCall {
                name: PredicateName::from_name(op),
                record,
                span,
            }),
            span,
        )
    }

    fn unary_call(&self, op: &str, arg: Expr, start: usize) -> Expr {
        let span = self.span_from(start);
        let mut record = Record::default();
        record.push_positional(FieldValue::Expression(arg));
        Expr::new(
            ExprKind::Call(PredicateCall {
                name: PredicateName::from_name(op),
                record,
                span,
            }),
            span,
        )
    }
}

/// Parses a comma-separated field list (the inside of a call's `(...)` or a
/// record literal's `{...}`).
pub(crate) fn parse_record_fields(tokens: &[Spanned<Token>], buffer_id: u32) -> PResult<Record> {
    let mut record = Record::default();
    for field_tokens in super::split_top_level(tokens, &[","]) {
        if field_tokens.is_empty() {
            continue;
        }
        if matches!(field_tokens[0], (Token::Control(ref c), _) if c == "..") && field_tokens.len() == 2 {
            record.rest = true;
            continue;
        }
        parse_one_field(field_tokens, buffer_id, &mut record)?;
    }
    Ok(record)
}

fn parse_one_field(
    tokens: &[Spanned<Token>],
    buffer_id: u32,
    record: &mut Record,
) -> PResult<()> {
    // `name [?] : expr` or `name [?] Op= expr`; anything else is a bare
    // positional expression.
    if let Some((Token::Ident(name), _)) = tokens.first() {
        let mut idx = 1;
        if matches!(tokens.get(idx), Some((Token::Control(c), _)) if c == "?") {
            idx += 1;
        }
        if matches!(tokens.get(idx), Some((Token::Control(c), _)) if c == ":") {
            let value = parse_expr_tokens(&tokens[idx + 1..], buffer_id)?;
            record.push_named(name.clone(), FieldValue::Expression(value));
            return Ok(());
        }
        if let Some(agg_len) = agg_op_prefix_len(&tokens[idx..]) {
            let op = agg_op_text(&tokens[idx..idx + agg_len]);
            let arg_tokens = &tokens[idx + agg_len + 1..];
            let arg = parse_expr_tokens(arg_tokens, buffer_id)?;
            let span = span_of(tokens, buffer_id);
            record.push_named(
                name.clone(),
                FieldValue::Aggregation(Aggregation { op, arg: Box::new(arg), span }),
            );
            return Ok(());
        }
    }
    let value = parse_expr_tokens(tokens, buffer_id)?;
    record.push_positional(FieldValue::Expression(value));
    Ok(())
}

/// `Op=` lookahead used both by head/record aggregation fields and by
/// concise combine: one token naming the operator, then a bare `=` (never
/// `==`, which the lexer already tokenizes distinctly).
pub(crate) fn agg_op_prefix_len(tokens: &[Spanned<Token>]) -> Option<usize> {
    let first_ok = match tokens.first() {
        Some((Token::Ident(_), _)) => true,
        Some((Token::Control(c), _)) if c == "+" || c == "++" => true,
        _ => false,
    };
    if !first_ok {
        return None;
    }
    matches!(tokens.get(1), Some((Token::Control(c), _)) if c == "=").then_some(1)
}

fn agg_op_text(tokens: &[Spanned<Token>]) -> String {
    match &tokens[0].0 {
        Token::Ident(s) => s.clone(),
        Token::Control(s) => s.clone(),
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::lexer;
    use chumsky::Parser as _;

    fn parse(src: &str) -> Expr {
        let tokens = lexer().parse(src).unwrap();
        parse_expr_tokens(&tokens, 0).unwrap()
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let e = parse("1 + 2 * 3");
        match e.kind {
            ExprKind::Call(c) => assert_eq!(c.name.name(), "+"),
            other => panic!("expected +, got {other:?}"),
        }
    }

    #[test]
    fn parses_qualified_call_vs_subscript() {
        let call = parse("a.b.P(1)");
        assert!(matches!(call.kind, ExprKind::Call(_)));

        let sub = parse("r.field");
        assert!(matches!(sub.kind, ExprKind::Subscript(_, _)));
    }

    #[test]
    fn parses_if_then_else() {
        let e = parse("if x > 0 then 1 else 0");
        assert!(matches!(e.kind, ExprKind::Implication(_, _)));
    }
}
