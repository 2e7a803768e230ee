//! Rules, queries, checks and policies.
//!
//! A rule derives new facts from existing ones. A query item is a rule
//! without a head, used inside checks and policies: it is satisfied iff at
//! least one complete binding exists over the saturated facts. All of these
//! are validated at construction; the evaluator assumes range restriction.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::binding::variables_in;
use crate::error::ValidationError;
use crate::expression::Expression;
use crate::predicate::Predicate;

fn guard_variables(guards: &[Expression]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for guard in guards {
        guard.collect_variables(&mut out);
    }
    out
}

fn first_unbound(
    bound: &BTreeSet<String>,
    wanted: impl IntoIterator<Item = String>,
) -> Option<String> {
    wanted.into_iter().find(|v| !bound.contains(v))
}

/// A Datalog rule: head, body, and guard expressions.
///
/// Rules are range-restricted: every variable in the head or in a guard
/// must appear in at least one body predicate.
///
/// # Examples
///
/// ```
/// use wafer::{Predicate, Rule, Term};
///
/// // grandparent($g, $c) <- parent($g, $p), parent($p, $c)
/// let rule = Rule::new(
///     Predicate::new("grandparent", [Term::variable("g"), Term::variable("c")]),
///     vec![
///         Predicate::new("parent", [Term::variable("g"), Term::variable("p")]),
///         Predicate::new("parent", [Term::variable("p"), Term::variable("c")]),
///     ],
///     vec![],
/// )
/// .unwrap();
/// assert_eq!(rule.body.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    /// The derived predicate.
    pub head: Predicate,
    /// Body predicates, matched against the fact set.
    pub body: Vec<Predicate>,
    /// Guard expressions, all of which must evaluate to `true`.
    pub guards: Vec<Expression>,
}

impl Rule {
    /// Creates a validated rule.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnboundVariable`] if a head or guard
    /// variable does not appear in the body.
    pub fn new(
        head: Predicate,
        body: Vec<Predicate>,
        guards: Vec<Expression>,
    ) -> Result<Self, ValidationError> {
        let bound = variables_in(&body);

        let head_vars = variables_in(std::slice::from_ref(&head));
        if let Some(variable) = first_unbound(&bound, head_vars) {
            return Err(ValidationError::UnboundVariable {
                variable,
                rule: head.name,
            });
        }
        if let Some(variable) = first_unbound(&bound, guard_variables(&guards)) {
            return Err(ValidationError::UnboundVariable {
                variable,
                rule: head.name,
            });
        }

        Ok(Self { head, body, guards })
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- ", self.head)?;
        write_body(f, &self.body, &self.guards)
    }
}

fn write_body(
    f: &mut fmt::Formatter<'_>,
    body: &[Predicate],
    guards: &[Expression],
) -> fmt::Result {
    let mut first = true;
    for predicate in body {
        if !first {
            write!(f, ", ")?;
        }
        first = false;
        write!(f, "{predicate}")?;
    }
    for guard in guards {
        if !first {
            write!(f, ", ")?;
        }
        first = false;
        write!(f, "{guard}")?;
    }
    Ok(())
}

// Derived facts must come from range-restricted rules even when the rule
// arrives from deserialized input.
impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawRule {
            head: Predicate,
            body: Vec<Predicate>,
            #[serde(default)]
            guards: Vec<Expression>,
        }

        let raw = RawRule::deserialize(deserializer)?;
        Rule::new(raw.head, raw.body, raw.guards).map_err(serde::de::Error::custom)
    }
}

/// A headless rule body: predicates plus guards.
///
/// Satisfied over a fact set iff at least one binding covers every body
/// variable and passes every guard. An empty body yields exactly one empty
/// candidate binding, so `true` (a single literal guard) is expressible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryItem {
    /// Body predicates.
    pub body: Vec<Predicate>,
    /// Guard expressions.
    pub guards: Vec<Expression>,
}

impl QueryItem {
    /// Creates a validated query item.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnboundVariable`] if a guard variable
    /// does not appear in the body.
    pub fn new(body: Vec<Predicate>, guards: Vec<Expression>) -> Result<Self, ValidationError> {
        let bound = variables_in(&body);
        if let Some(variable) = first_unbound(&bound, guard_variables(&guards)) {
            return Err(ValidationError::UnboundVariable {
                variable,
                rule: body.first().map_or_else(String::new, |p| p.name.clone()),
            });
        }
        Ok(Self { body, guards })
    }
}

impl fmt::Display for QueryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_body(f, &self.body, &self.guards)
    }
}

/// A constraint over the saturated facts: a non-empty disjunction of query
/// items, satisfied iff at least one of them is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    /// The disjunction.
    pub queries: Vec<QueryItem>,
}

impl Check {
    /// Creates a validated check.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyCheck`] if no query item is given.
    pub fn new(queries: Vec<QueryItem>) -> Result<Self, ValidationError> {
        if queries.is_empty() {
            return Err(ValidationError::EmptyCheck);
        }
        Ok(Self { queries })
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "check if ")?;
        for (i, query) in self.queries.iter().enumerate() {
            if i > 0 {
                write!(f, " or ")?;
            }
            write!(f, "{query}")?;
        }
        Ok(())
    }
}

/// Whether a policy grants or refuses access when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// A matching allow policy grants access (if all checks passed).
    Allow,
    /// A matching deny policy refuses access.
    Deny,
}

/// An ordered allow/deny decision: a kind plus a non-empty disjunction of
/// query items. Policies are tried in declaration order; the first whose
/// disjunction matches wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Allow or deny.
    pub kind: PolicyKind,
    /// The disjunction.
    pub queries: Vec<QueryItem>,
}

impl Policy {
    /// Creates a validated policy.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyPolicy`] if no query item is given.
    pub fn new(kind: PolicyKind, queries: Vec<QueryItem>) -> Result<Self, ValidationError> {
        if queries.is_empty() {
            return Err(ValidationError::EmptyPolicy);
        }
        Ok(Self { kind, queries })
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PolicyKind::Allow => write!(f, "allow if ")?,
            PolicyKind::Deny => write!(f, "deny if ")?,
        }
        for (i, query) in self.queries.iter().enumerate() {
            if i > 0 {
                write!(f, " or ")?;
            }
            write!(f, "{query}")?;
        }
        Ok(())
    }
}
