//! Dotted predicate names (`a.b.P`), following the same `Vec<String>`
//! representation the teacher crate uses for column/table idents.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredicateName {
    pub parts: Vec<String>,
}

impl PredicateName {
    pub fn from_name(name: impl ToString) -> Self {
        PredicateName {
            parts: vec![name.to_string()],
        }
    }

    pub fn from_path<S: ToString>(path: Vec<S>) -> Self {
        PredicateName {
            parts: path.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn name(&self) -> &str {
        self.parts.last().expect("empty PredicateName")
    }

    pub fn path(&self) -> &[String] {
        &self.parts[..self.parts.len() - 1]
    }

    /// Apply an import prefix (`""` for the main file) to a bare local name.
    pub fn with_prefix(prefix: &str, name: &str) -> Self {
        if prefix.is_empty() {
            PredicateName::from_name(name)
        } else {
            PredicateName {
                parts: vec![prefix.to_string(), name.to_string()],
            }
        }
    }

    pub fn as_flat_string(&self) -> String {
        self.parts.join(".")
    }
}

impl std::fmt::Display for PredicateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_flat_string())
    }
}

impl From<&str> for PredicateName {
    fn from(s: &str) -> Self {
        if s.contains('.') {
            PredicateName::from_path(s.split('.').collect())
        } else {
            PredicateName::from_name(s)
        }
    }
}

impl From<String> for PredicateName {
    fn from(s: String) -> Self {
        PredicateName::from(s.as_str())
    }
}
