//! Fixpoint saturation and query matching.
//!
//! Evaluation is naive by design: every pass applies every rule to the
//! whole fact set until nothing new appears. The fact and iteration limits
//! make that safe. Rules and facts are iterated in their declared and
//! sorted orders respectively, so the fixpoint is identical across runs and
//! hosts.

use std::collections::BTreeSet;

use tracing::trace;

use crate::binding::{match_predicate, variables_in, Binding};
use crate::error::ExecutionError;
use crate::expression::Expression;
use crate::limits::{DeadlineGuard, Limits};
use crate::predicate::{Fact, Predicate};
use crate::rule::{QueryItem, Rule};
use crate::term::Term;
use crate::world::{forges_privileged_scope, World};

/// Bindings under which every body predicate matches some fact.
///
/// Built as a running cross product: each predicate's matches are merged
/// into the bindings accumulated so far, discarding inconsistent pairs. An
/// empty body yields exactly one empty binding.
fn body_bindings(body: &[Predicate], facts: &BTreeSet<Fact>) -> Vec<Binding> {
    let mut accumulated = vec![Binding::new()];

    for predicate in body {
        let matches: Vec<Binding> = facts
            .iter()
            .filter_map(|fact| match_predicate(predicate, fact))
            .collect();

        let mut next = Vec::new();
        for partial in &accumulated {
            for matched in &matches {
                if let Some(merged) = partial.merge(matched) {
                    next.push(merged);
                }
            }
        }

        accumulated = next;
        if accumulated.is_empty() {
            break;
        }
    }

    accumulated
}

fn passes_guards(binding: &Binding, guards: &[Expression], regexes_enabled: bool) -> bool {
    guards.iter().all(|guard| guard.passes(binding, regexes_enabled))
}

/// Substitutes a binding into a head predicate, producing a fact.
///
/// Returns `None` if any head variable is unbound or the result is not a
/// valid fact; range-restricted rules never hit either case, but derived
/// facts are re-validated rather than trusted.
fn substitute(head: &Predicate, binding: &Binding) -> Option<Fact> {
    let mut terms = Vec::with_capacity(head.terms.len());
    for term in &head.terms {
        match term {
            Term::Variable(v) => terms.push(binding.get(v)?.clone()),
            ground => terms.push(ground.clone()),
        }
    }
    Fact::new(Predicate::new(head.name.clone(), terms)).ok()
}

/// Applies one rule to the fact set, yielding zero or more facts.
pub(crate) fn apply_rule(
    rule: &Rule,
    facts: &BTreeSet<Fact>,
    regexes_enabled: bool,
) -> Vec<Fact> {
    let body_vars = variables_in(&rule.body);

    body_bindings(&rule.body, facts)
        .into_iter()
        .filter(|binding| binding.binds_all(&body_vars))
        .filter(|binding| passes_guards(binding, &rule.guards, regexes_enabled))
        .filter_map(|binding| substitute(&rule.head, &binding))
        .collect()
}

/// Returns true if at least one complete binding satisfies the query item.
pub(crate) fn query_matches(
    item: &QueryItem,
    facts: &BTreeSet<Fact>,
    regexes_enabled: bool,
) -> bool {
    let body_vars = variables_in(&item.body);

    body_bindings(&item.body, facts)
        .into_iter()
        .filter(|binding| binding.binds_all(&body_vars))
        .any(|binding| passes_guards(&binding, &item.guards, regexes_enabled))
}

impl World {
    /// Saturates the fact set: applies all rules until a pass derives
    /// nothing new, or a limit trips.
    ///
    /// Facts derived by attenuation-block rules are dropped when they claim
    /// a privileged scope symbol. The deadline is consulted between passes;
    /// a pass in progress always runs to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::TooManyFacts`],
    /// [`ExecutionError::TooManyIterations`] or
    /// [`ExecutionError::Timeout`].
    pub fn saturate(
        &mut self,
        limits: &Limits,
        deadline: &DeadlineGuard,
    ) -> Result<(), ExecutionError> {
        let mut remaining = limits.max_iterations.max(1);

        loop {
            deadline.check()?;

            let mut delta: BTreeSet<Fact> = BTreeSet::new();
            for rule in &self.trusted_rules {
                delta.extend(apply_rule(rule, &self.facts, limits.allow_regexes));
            }
            for rule in &self.block_rules {
                delta.extend(
                    apply_rule(rule, &self.facts, limits.allow_regexes)
                        .into_iter()
                        .filter(|fact| !forges_privileged_scope(fact)),
                );
            }

            delta.retain(|fact| !self.facts.contains(fact));
            if delta.is_empty() {
                trace!(facts = self.facts.len(), "fixpoint reached");
                return Ok(());
            }

            self.facts.append(&mut delta);

            if self.facts.len() >= limits.max_facts {
                return Err(ExecutionError::TooManyFacts {
                    max_facts: limits.max_facts,
                });
            }

            remaining -= 1;
            if remaining == 0 {
                return Err(ExecutionError::TooManyIterations {
                    max_iterations: limits.max_iterations,
                });
            }
        }
    }
}
