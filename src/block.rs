//! Token blocks.
//!
//! A token is an authority block (index 0) followed by attenuation blocks
//! appended by holders. Signing and serialization happen elsewhere; by the
//! time a block reaches the engine it carries parsed content plus the two
//! revocation identifiers derived from its signature.

use serde::{Deserialize, Serialize};

use crate::predicate::Fact;
use crate::rule::{Check, Rule};

/// One block of a token: facts, rules, checks and revocation identifiers.
///
/// The generic revocation id is tied to the block's content and signing
/// key; the unique revocation id is tied to this specific token instance.
/// Both are opaque here and are surfaced to policies as facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Facts asserted by this block.
    pub facts: Vec<Fact>,
    /// Rules contributed by this block.
    pub rules: Vec<Rule>,
    /// Checks that must hold for the token to be accepted.
    pub checks: Vec<Check>,
    /// Revocation id tied to block content and signing key.
    pub generic_revocation_id: Vec<u8>,
    /// Revocation id tied to this token instance.
    pub unique_revocation_id: Vec<u8>,
}

impl Block {
    /// Creates an empty block with the given revocation identifiers.
    #[must_use]
    pub fn new(
        generic_revocation_id: impl Into<Vec<u8>>,
        unique_revocation_id: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            facts: Vec::new(),
            rules: Vec::new(),
            checks: Vec::new(),
            generic_revocation_id: generic_revocation_id.into(),
            unique_revocation_id: unique_revocation_id.into(),
        }
    }

    /// Appends a fact.
    pub fn add_fact(&mut self, fact: Fact) {
        self.facts.push(fact);
    }

    /// Appends a rule.
    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Appends a check.
    pub fn add_check(&mut self, check: Check) {
        self.checks.push(check);
    }

    /// Returns true if this block asserts facts or rules.
    ///
    /// Checks do not count: a block that only restricts is always welcome.
    #[must_use]
    pub fn asserts_content(&self) -> bool {
        !self.facts.is_empty() || !self.rules.is_empty()
    }
}
