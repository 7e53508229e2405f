//! Tokenizer, built with `chumsky` the way the teacher crate's own
//! `parser/lexer.rs` is: a flat `Vec<(Token, Range<usize>)>`, comments and
//! whitespace dropped, left for [`super::rule`]/[`super::expr`] to turn into
//! a tree. Bracket/string/comment awareness (§4.1) lives one level below, in
//! [`super::text`] — `chumsky`'s own string/char literals here are exact
//! enough that the lexer doesn't need to re-derive it.

use chumsky::prelude::*;

use crate::ast::{Literal, Number};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Literal(Literal),
    /// Multi-char and single-char punctuation/operators, e.g. `:-`, `++`,
    /// `->`, `(`, `,`.
    Control(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{s}"),
            Token::Literal(l) => write!(f, "{l}"),
            Token::Control(s) => write!(f, "{s}"),
        }
    }
}

pub type Spanned<T> = (T, std::ops::Range<usize>);

pub fn lexer() -> impl Parser<char, Vec<Spanned<Token>>, Error = Simple<char>> {
    let control_multi = choice((
        just(":-"),
        just(":="),
        just("-->"),
        just("++?"),
        just("++"),
        just("=="),
        just("!="),
        just("<="),
        just(">="),
        just("->"),
        just("=>"),
        just(".."),
        just("&&"),
        just("||"),
    ))
    .map(|s| Token::Control(s.to_string()));

    let control_single = one_of("(){}[]:;,.=<>+-*/%^!~@?")
        .map(|c: char| Token::Control(c.to_string()));

    let ident = ident_part().map(Token::Ident);

    let literal = literal().map(Token::Literal);

    let line_comment = just('#').then(filter(|c: &char| *c != '\n').repeated()).ignored();
    let block_comment = just("/*")
        .then(filter(|c: &char| *c != '*').repeated().then(just('*')).repeated())
        .then(just('/'))
        .ignored();
    let comment = line_comment.or(block_comment);

    let token = literal.or(ident).or(control_multi).or(control_single);

    token
        .map_with_span(|tok, span| (tok, span))
        .padded_by(comment.repeated())
        .padded()
        .repeated()
        .then_ignore(end())
}

fn ident_part() -> impl Parser<char, String, Error = Simple<char>> {
    let plain = filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .map(Some)
        .chain::<char, Vec<_>, _>(
            filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_').repeated(),
        )
        .collect();

    let backtick = just('`')
        .ignore_then(filter(|c| *c != '`').repeated())
        .then_ignore(just('`'))
        .collect::<String>();

    plain.or(backtick)
}

fn literal() -> impl Parser<char, Literal, Error = Simple<char>> {
    let number = text::int(10)
        .then(just('.').ignore_then(text::digits(10)).or_not())
        .map(|(int_part, frac): (String, Option<String>)| match frac {
            Some(frac) => Literal::Number(Number::Float(format!("{int_part}.{frac}").parse().unwrap())),
            None => match int_part.parse::<i64>() {
                Ok(i) => Literal::Number(Number::Integer(i)),
                Err(_) => Literal::Number(Number::Float(int_part.parse().unwrap_or(f64::NAN))),
            },
        });

    let boolean = just("true").to(true).or(just("false").to(false)).map(Literal::Bool);
    let null = just("null").to(Literal::Null);

    let string = string();

    string.or(boolean).or(null).or(number)
}

fn string() -> impl Parser<char, Literal, Error = Simple<char>> {
    let escape = just('\\').ignore_then(
        choice((
            just('\\'),
            just('\''),
            just('"'),
            just('n').to('\n'),
            just('t').to('\t'),
            just('r').to('\r'),
        )),
    );

    let single = just('\'')
        .ignore_then(filter(|c| *c != '\\' && *c != '\'').or(escape).repeated())
        .then_ignore(just('\''));

    let double = just('"')
        .ignore_then(filter(|c| *c != '\\' && *c != '"').or(escape).repeated())
        .then_ignore(just('"'));

    single.or(double).collect::<String>().map(Literal::String)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        lexer().parse(src).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lexes_a_simple_rule() {
        let ts = toks("Grandparent(g, c) :- Parent(g, x), Parent(x, c);");
        assert!(ts.iter().any(|t| matches!(t, Token::Control(s) if s == ":-")));
        assert!(ts.iter().any(|t| matches!(t, Token::Ident(s) if s == "Grandparent")));
    }

    #[test]
    fn lexes_numbers() {
        let ts = toks("42 3.5 -1");
        assert!(matches!(&ts[0], Token::Literal(Literal::Number(Number::Integer(42)))));
    }
}
