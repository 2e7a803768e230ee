//! Term types appearing in facts, rules and expressions.
//!
//! A [`Term`] is a tagged value. Equality is structural and type-strict:
//! there is no implicit coercion anywhere in the engine, and comparing terms
//! of different types inside an expression is an evaluation error rather
//! than `false`.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A value appearing in a predicate or an expression.
///
/// Terms carry a total order so that fact sets and candidate deltas can live
/// in ordered collections; evaluation output never depends on hash-map
/// iteration order.
///
/// # Examples
///
/// ```
/// use wafer::Term;
///
/// let sym = Term::symbol("read");
/// let num = Term::Int(42);
///
/// assert!(sym.is_symbol());
/// assert_eq!(num.type_name(), "int");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Term {
    /// An interned identifier such as `#authority` or `#read`.
    Symbol(String),
    /// A 64-bit signed integer.
    Int(i64),
    /// A UTF-8 string.
    Str(String),
    /// A UTC instant with microsecond resolution.
    Date(DateTime<Utc>),
    /// An opaque byte string.
    Bytes(Vec<u8>),
    /// A boolean.
    Bool(bool),
    /// A set of scalar terms. Elements are never sets or variables.
    Set(BTreeSet<Term>),
    /// A variable. Appears only inside rules and queries, never in facts.
    Variable(String),
}

impl Term {
    /// Creates a symbol term.
    #[must_use]
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    /// Creates a string term.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Creates a variable term.
    #[must_use]
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Creates a date term, truncated to microsecond resolution.
    #[must_use]
    pub fn date(at: DateTime<Utc>) -> Self {
        let truncated =
            DateTime::from_timestamp_micros(at.timestamp_micros()).unwrap_or(at);
        Self::Date(truncated)
    }

    /// Creates a set term from the given elements.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSetElement`] if any element is
    /// itself a set or a variable.
    pub fn set(elements: impl IntoIterator<Item = Term>) -> Result<Self, ValidationError> {
        let mut out = BTreeSet::new();
        for element in elements {
            if !element.is_set_element() {
                return Err(ValidationError::InvalidSetElement {
                    found: element.type_name(),
                });
            }
            out.insert(element);
        }
        Ok(Self::Set(out))
    }

    pub const fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }

    pub const fn is_variable(&self) -> bool {
        matches!(self, Self::Variable(_))
    }

    pub const fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// Returns true if this term may appear as a set element.
    #[must_use]
    pub const fn is_set_element(&self) -> bool {
        !matches!(self, Self::Set(_) | Self::Variable(_))
    }

    /// Returns true if this term and all nested terms satisfy the set
    /// element rules. Non-set terms are trivially well formed.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self {
            Self::Set(elements) => elements.iter().all(Term::is_set_element),
            _ => true,
        }
    }

    /// Returns true if this term is, or contains, the named symbol.
    ///
    /// Recurses into set elements so a privileged symbol cannot hide inside
    /// a set term.
    #[must_use]
    pub fn mentions_symbol(&self, name: &str) -> bool {
        match self {
            Self::Symbol(s) => s == name,
            Self::Set(elements) => elements.iter().any(|e| e.mentions_symbol(name)),
            _ => false,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Symbol(_) => "symbol",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::Date(_) => "date",
            Self::Bytes(_) => "bytes",
            Self::Bool(_) => "bool",
            Self::Set(_) => "set",
            Self::Variable(_) => "variable",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(s) => write!(f, "#{s}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Self::Bytes(b) => {
                write!(f, "hex:")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Bool(b) => write!(f, "{b}"),
            Self::Set(elements) => {
                write!(f, "[")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
            Self::Variable(v) => write!(f, "${v}"),
        }
    }
}

impl From<i64> for Term {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Term {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for Term {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Term {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Term {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<DateTime<Utc>> for Term {
    fn from(v: DateTime<Utc>) -> Self {
        Self::date(v)
    }
}

impl From<Vec<u8>> for Term {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}
