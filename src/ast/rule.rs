//! Rules (§3).

use serde::{Deserialize, Serialize};

use super::expr::{Conjunct, PredicateCall};
use super::span::Span;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub head: PredicateCall,
    pub body: Option<Vec<Conjunct>>,
    /// Set at parse time whenever the head carries an aggregated field, or a
    /// `combine` appears directly in the head's value (`Head = Expr`).
    pub distinct_denoted: bool,
    pub full_text: Span,
}

impl Rule {
    pub fn predicate_name(&self) -> &str {
        self.head.name.name()
    }

    pub fn is_fact(&self) -> bool {
        self.body.is_none()
    }
}
