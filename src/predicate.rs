//! Predicates and facts.
//!
//! A predicate is a name applied to an ordered list of terms. A fact is a
//! predicate containing no variables; the engine's fact store only ever
//! holds facts, and every derived fact is re-validated on construction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::term::Term;

/// A named tuple of terms, such as `right(#authority, "file1", #read)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Predicate {
    /// Predicate name.
    pub name: String,
    /// Ordered terms. Arity is the pair (name, terms.len()).
    pub terms: Vec<Term>,
}

impl Predicate {
    /// Creates a predicate from a name and terms.
    #[must_use]
    pub fn new(name: impl Into<String>, terms: impl IntoIterator<Item = Term>) -> Self {
        Self {
            name: name.into(),
            terms: terms.into_iter().collect(),
        }
    }

    /// Returns true if any term is a variable.
    #[must_use]
    pub fn has_variables(&self) -> bool {
        self.terms.iter().any(Term::is_variable)
    }

    /// Returns true if any term is, or contains, the named symbol.
    #[must_use]
    pub fn mentions_symbol(&self, name: &str) -> bool {
        self.terms.iter().any(|t| t.mentions_symbol(name))
    }

    /// Returns true if every term satisfies the set element rules.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.terms.iter().all(Term::is_well_formed)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{term}")?;
        }
        write!(f, ")")
    }
}

/// A variable-free predicate.
///
/// Facts coalesce structurally: the fact store is a set, and two facts with
/// the same name and terms are one fact.
///
/// # Examples
///
/// ```
/// use wafer::{Fact, Predicate, Term};
///
/// let fact = Fact::new(Predicate::new(
///     "right",
///     [Term::symbol("authority"), Term::string("file1")],
/// ))
/// .unwrap();
/// assert_eq!(fact.to_string(), "right(#authority, \"file1\")");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Fact(Predicate);

impl Fact {
    /// Wraps a predicate as a fact.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::VariableInFact`] if the predicate contains
    /// a variable, or [`ValidationError::InvalidSetElement`] if any set term
    /// holds a nested set or a variable.
    pub fn new(predicate: Predicate) -> Result<Self, ValidationError> {
        if predicate.has_variables() {
            return Err(ValidationError::VariableInFact {
                predicate: predicate.name,
            });
        }
        if !predicate.is_well_formed() {
            return Err(ValidationError::InvalidSetElement { found: "set" });
        }
        Ok(Self(predicate))
    }

    /// The underlying predicate.
    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.0
    }

    /// Returns true if any term is, or contains, the named symbol.
    #[must_use]
    pub fn mentions_symbol(&self, name: &str) -> bool {
        self.0.mentions_symbol(name)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Facts must stay variable-free even when they arrive from deserialized
// input, so deserialization funnels through the validating constructor.
impl<'de> Deserialize<'de> for Fact {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Predicate::deserialize(deserializer)?;
        Fact::new(raw).map_err(serde::de::Error::custom)
    }
}
