//! Diagnostics (§7).
//!
//! Mirrors the teacher crate's split: [`Error`] is the internal, span-
//! carrying error type threaded through the compiler with `?`; at the
//! public API boundary it is downcast into a flat, serializable
//! [`ErrorMessage`] and rendered with `ariadne`.

use std::fmt::{self, Debug, Display, Formatter};

use ariadne::{Label, Report, ReportKind, Source};
use serde::Serialize;

use crate::ast::{PredicateName, SourceMap, Span};

#[derive(Debug, Clone)]
pub struct Error {
    pub span: Option<Span>,
    pub reason: Reason,
    pub help: Option<String>,
}

/// The five fatal error kinds of §7. Each carries exactly what its section
/// says it must be able to point at.
#[derive(Debug, Clone)]
pub enum Reason {
    /// §4.1-4.2. `found` is the literal unexpected token/snippet text.
    Parsing { found: String },
    /// §4.4. Functor being made plus the specific misuse.
    Functor { functor: PredicateName, problem: String },
    /// §4.5-4.8. `rule_text` duplicates `full_text` for convenience once the
    /// error has been detached from its originating rule.
    RuleCompile { predicate: PredicateName, problem: String },
    /// §4.11.
    Type { problem: String },
    /// Malformed annotation; reuses the annotation's own span/text.
    Annotation { keyword: String, problem: String },
    Simple(String),
}

impl Error {
    pub fn new(reason: Reason) -> Self {
        Error {
            span: None,
            reason,
            help: None,
        }
    }

    pub fn parsing(found: impl Into<String>, span: Span) -> Self {
        Error::new(Reason::Parsing { found: found.into() }).with_span(span)
    }

    pub fn functor(functor: PredicateName, problem: impl Into<String>, span: Span) -> Self {
        Error::new(Reason::Functor {
            functor,
            problem: problem.into(),
        })
        .with_span(span)
    }

    pub fn rule_compile(predicate: PredicateName, problem: impl Into<String>, span: Span) -> Self {
        Error::new(Reason::RuleCompile {
            predicate,
            problem: problem.into(),
        })
        .with_span(span)
    }

    pub fn type_error(problem: impl Into<String>, span: Span) -> Self {
        Error::new(Reason::Type { problem: problem.into() }).with_span(span)
    }

    pub fn annotation(keyword: impl Into<String>, problem: impl Into<String>, span: Span) -> Self {
        Error::new(Reason::Annotation {
            keyword: keyword.into(),
            problem: problem.into(),
        })
        .with_span(span)
    }

    pub fn simple(message: impl Into<String>) -> Self {
        Error::new(Reason::Simple(message.into()))
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn message(&self) -> String {
        match &self.reason {
            Reason::Parsing { found } => format!("parse error: unexpected `{found}`"),
            Reason::Functor { functor, problem } => {
                format!("cannot make `{functor}`: {problem}")
            }
            Reason::RuleCompile { predicate, problem } => {
                format!("cannot compile `{predicate}`: {problem}")
            }
            Reason::Type { problem } => problem.clone(),
            Reason::Annotation { keyword, problem } => {
                format!("malformed @{keyword}: {problem}")
            }
            Reason::Simple(s) => s.clone(),
        }
    }
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// A rendered, serializable diagnostic — what actually crosses the CLI/JSON
/// boundary (§6: `parse`/`infer_types` emit JSON; the CLI prints `display`).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    pub reason: String,
    pub hint: Option<String>,
    pub span: Option<(usize, usize)>,
    pub location: Option<SourceLocation>,
    pub display: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceLocation {
    pub start: (usize, usize),
    pub end: (usize, usize),
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(display) = &self.display {
            f.write_str(display)
        } else {
            f.write_str(&self.reason)
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ErrorMessages {
    pub inner: Vec<ErrorMessage>,
}

impl Display for ErrorMessages {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, e) in self.inner.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            Display::fmt(e, f)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorMessages {}

/// Render an [`Error`] against its source buffer into an [`ErrorMessage`],
/// with an `ariadne`-produced annotated snippet in `display` when the error
/// carries a span.
pub fn render(error: &Error, source_map: &SourceMap) -> ErrorMessage {
    let reason = error.message();
    let Some(span) = error.span else {
        return ErrorMessage {
            reason,
            hint: error.help.clone(),
            span: None,
            location: None,
            display: None,
        };
    };

    let file_name = source_map.file_name(span).to_string();
    let start = source_map.line_col(span.buffer_id, span.start);
    let end = source_map.line_col(span.buffer_id, span.stop);

    let mut out = Vec::new();
    let range = span.start as usize..span.stop.max(span.start + 1) as usize;
    let mut builder = Report::build(ReportKind::Error, file_name.clone(), range.start)
        .with_message(&reason)
        .with_label(Label::new((file_name.clone(), range)).with_message(&reason));
    if let Some(help) = &error.help {
        builder = builder.with_help(help);
    }
    let report = builder.finish();
    let cache = (file_name.clone(), Source::from(source_map.buffer(span.buffer_id).text.as_ref()));
    let _ = report.write(cache, &mut out);

    ErrorMessage {
        reason,
        hint: error.help.clone(),
        span: Some((span.start as usize, span.stop as usize)),
        location: Some(SourceLocation { start, end }),
        display: Some(String::from_utf8_lossy(&out).into_owned()),
    }
}

pub fn render_all(errors: &[Error], source_map: &SourceMap) -> ErrorMessages {
    ErrorMessages {
        inner: errors.iter().map(|e| render(e, source_map)).collect(),
    }
}
