//! The verifier and the verify operation.
//!
//! A verifier contributes its own facts, rules and checks, plus an ordered
//! list of allow/deny policies. Verification saturates the world, requires
//! every check (from the verifier and from every block) to hold, and then
//! tries policies in declaration order. Checks are hard constraints: a
//! failing check refuses the request even when an allow policy matches.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::Block;
use crate::builder::truth;
use crate::engine::query_matches;
use crate::error::{
    DenialError, ExecutionError, FailedCheck, WaferError, WaferResult,
};
use crate::limits::{DeadlineGuard, Limits, RevocationStatus};
use crate::predicate::Fact;
use crate::rule::{Check, Policy, PolicyKind, Rule};
use crate::world::World;

/// The first policy whose disjunction matched the saturated facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMatch {
    /// Position of the policy in declaration order.
    pub index: usize,
    /// The matched policy.
    pub policy: Policy,
}

/// Server-side verification context for one kind of request.
///
/// # Examples
///
/// ```
/// use wafer::builder::{allow, fact, pred, query, string, sym, var};
/// use wafer::{Block, Limits, Verifier};
///
/// # fn main() -> wafer::WaferResult<()> {
/// let mut authority = Block::new(b"generic".to_vec(), b"unique".to_vec());
/// authority.add_fact(fact("right", [sym("authority"), string("file1"), sym("read")])?);
///
/// let mut verifier = Verifier::new();
/// verifier.add_fact(fact("resource", [sym("ambient"), string("file1")])?);
/// verifier.add_fact(fact("operation", [sym("ambient"), sym("read")])?);
/// verifier.add_policy(allow(vec![query(vec![
///     pred("resource", [sym("ambient"), var("f")]),
///     pred("operation", [sym("ambient"), sym("read")]),
///     pred("right", [sym("authority"), var("f"), sym("read")]),
/// ])?])?);
///
/// let verdict = verifier.verify(&authority, &[], &Limits::default())?;
/// assert_eq!(verdict.index, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verifier {
    /// Facts describing the request context.
    pub facts: Vec<Fact>,
    /// Trusted rules, grouped with the authority block's.
    pub rules: Vec<Rule>,
    /// Checks that must hold.
    pub checks: Vec<Check>,
    /// Allow/deny policies, tried in declaration order.
    pub policies: Vec<Policy>,
}

impl Verifier {
    /// Creates an empty verifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

    /// Appends a policy.
    pub fn add_policy(&mut self, policy: Policy) {
        self.policies.push(policy);
    }

    /// Appends `allow if true`.
    pub fn allow_all(&mut self) {
        self.policies.push(Policy {
            kind: PolicyKind::Allow,
            queries: vec![truth()],
        });
    }

    /// Appends `deny if true`.
    pub fn deny_all(&mut self) {
        self.policies.push(Policy {
            kind: PolicyKind::Deny,
            queries: vec![truth()],
        });
    }

    /// Verifies a token against this verifier.
    ///
    /// Runs the revocation pre-pass, assembles and saturates the world,
    /// evaluates every check, then tries policies in order. On success the
    /// winning allow policy is returned with its position.
    ///
    /// # Errors
    ///
    /// [`ExecutionError`](crate::ExecutionError) variants abort the call
    /// (limits, deadline, revocation);
    /// [`DenialError`](crate::DenialError) variants report a completed
    /// verification that refused the request.
    pub fn verify(
        &self,
        authority: &Block,
        blocks: &[Block],
        limits: &Limits,
    ) -> WaferResult<PolicyMatch> {
        let deadline = DeadlineGuard::new(limits.max_time_us);

        self.revocation_pass(authority, blocks, limits, &deadline)?;

        let mut world = World::assemble(self, authority, blocks, limits)?;
        world.saturate(limits, &deadline)?;
        deadline.check().map_err(WaferError::from)?;

        let failed = self.failed_checks(authority, blocks, &world, limits);
        let matched = self.first_matching_policy(&world, limits);

        debug!(
            failed_checks = failed.len(),
            matched = ?matched.as_ref().map(|m| m.index),
            "verification evaluated"
        );

        match matched {
            Some(m) if m.policy.kind == PolicyKind::Allow => {
                if failed.is_empty() {
                    Ok(m)
                } else {
                    Err(DenialError::FailedChecks { failed }.into())
                }
            }
            Some(m) => Err(DenialError::DenyRuleMatched {
                failed,
                index: m.index,
                policy: m.policy,
            }
            .into()),
            None => Err(DenialError::NoPoliciesMatched { failed }.into()),
        }
    }

    fn revocation_pass(
        &self,
        authority: &Block,
        blocks: &[Block],
        limits: &Limits,
        deadline: &DeadlineGuard,
    ) -> WaferResult<()> {
        let Some(checker) = &limits.revocation_check else {
            return Ok(());
        };

        deadline.check().map_err(WaferError::from)?;
        for (index, block) in std::iter::once(authority).chain(blocks).enumerate() {
            match checker.status(&block.unique_revocation_id) {
                Ok(RevocationStatus::NotRevoked) => {}
                Ok(RevocationStatus::Revoked) => {
                    debug!(block = index, "revoked block");
                    return Err(ExecutionError::Revoked { block: index }.into());
                }
                Err(e) => {
                    return Err(ExecutionError::RevocationCheck {
                        message: e.to_string(),
                    }
                    .into())
                }
            }
        }
        deadline.check().map_err(WaferError::from)?;
        Ok(())
    }

    /// Evaluates every check against the saturated facts, collecting
    /// failures in input order: verifier first, then authority (block 0),
    /// then each attenuation block.
    fn failed_checks(
        &self,
        authority: &Block,
        blocks: &[Block],
        world: &World,
        limits: &Limits,
    ) -> Vec<FailedCheck> {
        let satisfied = |check: &Check| {
            check
                .queries
                .iter()
                .any(|q| query_matches(q, world.facts(), limits.allow_regexes))
        };

        let mut failed = Vec::new();
        for (index, check) in self.checks.iter().enumerate() {
            if !satisfied(check) {
                failed.push(FailedCheck::Verifier {
                    index,
                    check: check.clone(),
                });
            }
        }
        for (block_index, block) in std::iter::once(authority).chain(blocks).enumerate() {
            for (index, check) in block.checks.iter().enumerate() {
                if !satisfied(check) {
                    failed.push(FailedCheck::Block {
                        block: block_index,
                        index,
                        check: check.clone(),
                    });
                }
            }
        }
        failed
    }

    fn first_matching_policy(&self, world: &World, limits: &Limits) -> Option<PolicyMatch> {
        self.policies.iter().enumerate().find_map(|(index, policy)| {
            policy
                .queries
                .iter()
                .any(|q| query_matches(q, world.facts(), limits.allow_regexes))
                .then(|| PolicyMatch {
                    index,
                    policy: policy.clone(),
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{allow, check, deny, fact, pred, query, string, sym, var};

    fn authority_with_right() -> Block {
        let mut authority = Block::new(b"g0".to_vec(), b"u0".to_vec());
        authority.add_fact(
            fact("right", [sym("authority"), string("file1"), sym("read")]).unwrap(),
        );
        authority
    }

    fn read_file1_verifier() -> Verifier {
        let mut verifier = Verifier::new();
        verifier.add_fact(fact("resource", [sym("ambient"), string("file1")]).unwrap());
        verifier.add_fact(fact("operation", [sym("ambient"), sym("read")]).unwrap());
        verifier
    }

    #[test]
    fn allow_policy_matches_in_order() {
        let mut verifier = read_file1_verifier();
        verifier.add_policy(
            allow(vec![query(vec![
                pred("resource", [sym("ambient"), var("f")]),
                pred("operation", [sym("ambient"), sym("read")]),
                pred("right", [sym("authority"), var("f"), sym("read")]),
            ])
            .unwrap()])
            .unwrap(),
        );

        let verdict = verifier
            .verify(&authority_with_right(), &[], &Limits::default())
            .unwrap();
        assert_eq!(verdict.index, 0);
        assert_eq!(verdict.policy.kind, PolicyKind::Allow);
    }

    #[test]
    fn no_policies_means_no_match() {
        let verifier = read_file1_verifier();
        let err = verifier
            .verify(&authority_with_right(), &[], &Limits::default())
            .unwrap_err();
        let WaferError::Denial(DenialError::NoPoliciesMatched { failed }) = err else {
            panic!("expected NoPoliciesMatched, got {err}");
        };
        assert!(failed.is_empty());
    }

    #[test]
    fn deny_declared_first_wins() {
        let mut verifier = read_file1_verifier();
        verifier.add_policy(
            deny(vec![query(vec![pred(
                "resource",
                [sym("ambient"), string("file1")],
            )])
            .unwrap()])
            .unwrap(),
        );
        verifier.allow_all();

        let err = verifier
            .verify(&authority_with_right(), &[], &Limits::default())
            .unwrap_err();
        let WaferError::Denial(DenialError::DenyRuleMatched { index, .. }) = err else {
            panic!("expected DenyRuleMatched, got {err}");
        };
        assert_eq!(index, 0);
    }

    #[test]
    fn failed_check_beats_matching_allow() {
        let mut verifier = read_file1_verifier();
        verifier.add_check(
            check(vec![query(vec![pred(
                "resource",
                [sym("ambient"), string("file9")],
            )])
            .unwrap()])
            .unwrap(),
        );
        verifier.allow_all();

        let err = verifier
            .verify(&authority_with_right(), &[], &Limits::default())
            .unwrap_err();
        let WaferError::Denial(DenialError::FailedChecks { failed }) = err else {
            panic!("expected FailedChecks, got {err}");
        };
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0], FailedCheck::Verifier { index: 0, .. }));
    }

    #[test]
    fn failed_checks_report_in_input_order() {
        let mut authority = authority_with_right();
        authority.add_check(
            check(vec![query(vec![pred("never", [])]).unwrap()]).unwrap(),
        );

        let mut attenuation = Block::new(b"g1".to_vec(), b"u1".to_vec());
        attenuation.add_check(
            check(vec![query(vec![pred("also_never", [])]).unwrap()]).unwrap(),
        );

        let mut verifier = read_file1_verifier();
        verifier.add_check(
            check(vec![query(vec![pred("nope", [])]).unwrap()]).unwrap(),
        );
        verifier.allow_all();

        let err = verifier
            .verify(&authority, &[attenuation], &Limits::default())
            .unwrap_err();
        let WaferError::Denial(DenialError::FailedChecks { failed }) = err else {
            panic!("expected FailedChecks, got {err}");
        };
        assert_eq!(failed.len(), 3);
        assert!(matches!(failed[0], FailedCheck::Verifier { index: 0, .. }));
        assert!(matches!(failed[1], FailedCheck::Block { block: 0, index: 0, .. }));
        assert!(matches!(failed[2], FailedCheck::Block { block: 1, index: 0, .. }));
    }

    #[test]
    fn block_checks_see_the_saturated_world() {
        // the attenuation restricts to read operations
        let mut attenuation = Block::new(b"g1".to_vec(), b"u1".to_vec());
        attenuation.add_check(
            check(vec![query(vec![pred(
                "operation",
                [sym("ambient"), sym("read")],
            )])
            .unwrap()])
            .unwrap(),
        );

        let mut verifier = read_file1_verifier();
        verifier.allow_all();
        assert!(verifier
            .verify(&authority_with_right(), &[attenuation.clone()], &Limits::default())
            .is_ok());

        // a write request fails the same token
        let mut writer = Verifier::new();
        writer.add_fact(fact("resource", [sym("ambient"), string("file1")]).unwrap());
        writer.add_fact(fact("operation", [sym("ambient"), sym("write")]).unwrap());
        writer.allow_all();
        let err = writer
            .verify(&authority_with_right(), &[attenuation], &Limits::default())
            .unwrap_err();
        assert!(matches!(
            err,
            WaferError::Denial(DenialError::FailedChecks { .. })
        ));
    }
}
