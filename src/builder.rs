//! Convenience constructors for terms, facts, rules, checks and policies.
//!
//! Embedding code and tests assemble Datalog programs with these free
//! functions instead of spelling out struct literals:
//!
//! ```
//! use wafer::builder::{fact, pred, rule, sym, string, var};
//!
//! let seed = fact("right", [sym("authority"), string("file1"), sym("read")]).unwrap();
//! let derived = rule(
//!     "readable",
//!     [var("f")],
//!     vec![pred("right", [sym("authority"), var("f"), sym("read")])],
//! )
//! .unwrap();
//! assert_eq!(seed.to_string(), "right(#authority, \"file1\", #read)");
//! assert_eq!(
//!     derived.to_string(),
//!     "readable($f) <- right(#authority, $f, #read)"
//! );
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::expression::Expression;
use crate::predicate::{Fact, Predicate};
use crate::rule::{Check, Policy, PolicyKind, QueryItem, Rule};
use crate::term::Term;

/// A symbol term.
#[must_use]
pub fn sym(name: &str) -> Term {
    Term::symbol(name)
}

/// An integer term.
#[must_use]
pub const fn int(value: i64) -> Term {
    Term::Int(value)
}

/// A string term.
#[must_use]
pub fn string(value: &str) -> Term {
    Term::string(value)
}

/// A date term, truncated to microsecond resolution.
#[must_use]
pub fn date(at: DateTime<Utc>) -> Term {
    Term::date(at)
}

/// A byte-string term.
#[must_use]
pub fn bytes(value: &[u8]) -> Term {
    Term::Bytes(value.to_vec())
}

/// A boolean term.
#[must_use]
pub const fn boolean(value: bool) -> Term {
    Term::Bool(value)
}

/// A variable term.
#[must_use]
pub fn var(name: &str) -> Term {
    Term::variable(name)
}

/// A set term.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidSetElement`] if an element is a set or
/// a variable.
pub fn set(elements: impl IntoIterator<Item = Term>) -> Result<Term, ValidationError> {
    Term::set(elements)
}

/// An expression leaf holding a term or a variable.
#[must_use]
pub fn expr(term: impl Into<Term>) -> Expression {
    Expression::value(term)
}

/// A predicate.
#[must_use]
pub fn pred(name: &str, terms: impl IntoIterator<Item = Term>) -> Predicate {
    Predicate::new(name, terms)
}

/// A fact.
///
/// # Errors
///
/// Returns a validation error if any term is a variable or an invalid set.
pub fn fact(name: &str, terms: impl IntoIterator<Item = Term>) -> Result<Fact, ValidationError> {
    Fact::new(Predicate::new(name, terms))
}

/// A rule without guards.
///
/// # Errors
///
/// Returns a validation error if the rule is not range-restricted.
pub fn rule(
    head_name: &str,
    head_terms: impl IntoIterator<Item = Term>,
    body: Vec<Predicate>,
) -> Result<Rule, ValidationError> {
    Rule::new(Predicate::new(head_name, head_terms), body, vec![])
}

/// A rule with guard expressions.
///
/// # Errors
///
/// Returns a validation error if the rule is not range-restricted.
pub fn constrained_rule(
    head_name: &str,
    head_terms: impl IntoIterator<Item = Term>,
    body: Vec<Predicate>,
    guards: Vec<Expression>,
) -> Result<Rule, ValidationError> {
    Rule::new(Predicate::new(head_name, head_terms), body, guards)
}

/// A query item without guards.
///
/// # Errors
///
/// Currently infallible for guard-free queries; kept fallible for symmetry
/// with [`constrained_query`].
pub fn query(body: Vec<Predicate>) -> Result<QueryItem, ValidationError> {
    QueryItem::new(body, vec![])
}

/// A query item with guard expressions.
///
/// # Errors
///
/// Returns a validation error if a guard variable does not appear in the
/// body.
pub fn constrained_query(
    body: Vec<Predicate>,
    guards: Vec<Expression>,
) -> Result<QueryItem, ValidationError> {
    QueryItem::new(body, guards)
}

/// The query item `true`: empty body, one literal `true` guard.
#[must_use]
pub fn truth() -> QueryItem {
    QueryItem {
        body: vec![],
        guards: vec![Expression::value(Term::Bool(true))],
    }
}

/// A check over one or more query items.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyCheck`] if `queries` is empty.
pub fn check(queries: Vec<QueryItem>) -> Result<Check, ValidationError> {
    Check::new(queries)
}

/// An allow policy.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyPolicy`] if `queries` is empty.
pub fn allow(queries: Vec<QueryItem>) -> Result<Policy, ValidationError> {
    Policy::new(PolicyKind::Allow, queries)
}

/// A deny policy.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyPolicy`] if `queries` is empty.
pub fn deny(queries: Vec<QueryItem>) -> Result<Policy, ValidationError> {
    Policy::new(PolicyKind::Deny, queries)
}
