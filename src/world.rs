//! World assembly.
//!
//! The world is the single evaluation context: seed facts plus two rule
//! groups with different trust. Rules from the verifier and the authority
//! block are trusted; rules from attenuation blocks are not, and facts they
//! derive (or assert) are refused the privileged `#authority` and
//! `#ambient` symbols. That split is what keeps attenuation restrictive.

use std::collections::BTreeSet;

use tracing::debug;

use crate::block::Block;
use crate::error::{ExecutionError, ValidationError, WaferResult};
use crate::limits::Limits;
use crate::predicate::{Fact, Predicate};
use crate::rule::Rule;
use crate::term::Term;
use crate::verifier::Verifier;

/// The symbol reserved for facts asserted by the token issuer.
pub const AUTHORITY: &str = "authority";

/// The symbol reserved for facts describing the request context.
pub const AMBIENT: &str = "ambient";

/// Returns true if the fact claims a privileged scope symbol anywhere,
/// including inside set elements.
pub(crate) fn forges_privileged_scope(fact: &Fact) -> bool {
    fact.mentions_symbol(AUTHORITY) || fact.mentions_symbol(AMBIENT)
}

/// The assembled evaluation context for one verification call.
///
/// Mutated only by saturation, only by adding facts; nothing persists
/// across calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct World {
    /// Rules from the verifier and the authority block.
    pub(crate) trusted_rules: Vec<Rule>,
    /// Rules from attenuation blocks; their output is scope-filtered.
    pub(crate) block_rules: Vec<Rule>,
    /// The fact set, ordered for deterministic iteration.
    pub(crate) facts: BTreeSet<Fact>,
}

impl World {
    /// Assembles a world from the verifier, the token's blocks and the
    /// limits.
    ///
    /// Two revocation-id facts are injected per block:
    /// `revocation_id(index, bytes)` and `unique_revocation_id(index,
    /// bytes)`. These come from the assembler itself and bypass the scope
    /// filter.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::FactsInBlocks`] if an attenuation block
    /// asserts facts or rules while `limits.allow_block_facts` is false.
    pub fn assemble(
        verifier: &Verifier,
        authority: &Block,
        blocks: &[Block],
        limits: &Limits,
    ) -> WaferResult<Self> {
        let mut facts: BTreeSet<Fact> = BTreeSet::new();
        facts.extend(verifier.facts.iter().cloned());
        facts.extend(authority.facts.iter().cloned());

        let mut trusted_rules = verifier.rules.clone();
        trusted_rules.extend(authority.rules.iter().cloned());

        let mut block_rules = Vec::new();
        for (i, block) in blocks.iter().enumerate() {
            let index = i + 1;
            if !limits.allow_block_facts {
                if block.asserts_content() {
                    return Err(ExecutionError::FactsInBlocks { block: index }.into());
                }
                continue;
            }

            // attenuation seed facts may not claim a privileged scope
            facts.extend(
                block
                    .facts
                    .iter()
                    .filter(|f| !forges_privileged_scope(f))
                    .cloned(),
            );
            block_rules.extend(block.rules.iter().cloned());
        }

        for (index, block) in std::iter::once(authority).chain(blocks).enumerate() {
            facts.insert(revocation_fact(
                "revocation_id",
                index,
                &block.generic_revocation_id,
            )?);
            facts.insert(revocation_fact(
                "unique_revocation_id",
                index,
                &block.unique_revocation_id,
            )?);
        }

        debug!(
            facts = facts.len(),
            trusted_rules = trusted_rules.len(),
            block_rules = block_rules.len(),
            "world assembled"
        );

        Ok(Self {
            trusted_rules,
            block_rules,
            facts,
        })
    }

    /// The current fact set.
    #[must_use]
    pub const fn facts(&self) -> &BTreeSet<Fact> {
        &self.facts
    }
}

fn revocation_fact(name: &str, index: usize, id: &[u8]) -> Result<Fact, ValidationError> {
    let index = i64::try_from(index).unwrap_or(i64::MAX);
    Fact::new(Predicate::new(
        name,
        [Term::Int(index), Term::Bytes(id.to_vec())],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{fact, pred, rule, string, sym, var};

    fn block_with_fact(f: Fact) -> Block {
        let mut block = Block::new(b"g".to_vec(), b"u".to_vec());
        block.add_fact(f);
        block
    }

    #[test]
    fn trusted_and_block_rules_stay_separate() {
        let mut authority = Block::new(b"g0".to_vec(), b"u0".to_vec());
        authority.add_rule(
            rule("a", [var("x")], vec![pred("seed", [var("x")])]).unwrap(),
        );

        let mut attenuation = Block::new(b"g1".to_vec(), b"u1".to_vec());
        attenuation.add_rule(
            rule("b", [var("x")], vec![pred("seed", [var("x")])]).unwrap(),
        );

        let mut verifier = Verifier::new();
        verifier.add_rule(rule("c", [var("x")], vec![pred("seed", [var("x")])]).unwrap());

        let world = World::assemble(
            &verifier,
            &authority,
            &[attenuation],
            &Limits::default(),
        )
        .unwrap();

        assert_eq!(world.trusted_rules.len(), 2);
        assert_eq!(world.block_rules.len(), 1);
    }

    #[test]
    fn attenuation_seed_facts_lose_privileged_scopes() {
        let forged = fact("right", [sym(AUTHORITY), string("file2")]).unwrap();
        let honest = fact("tag", [string("limited")]).unwrap();

        let mut attenuation = Block::new(b"g1".to_vec(), b"u1".to_vec());
        attenuation.add_fact(forged.clone());
        attenuation.add_fact(honest.clone());

        let world = World::assemble(
            &Verifier::new(),
            &Block::new(b"g0".to_vec(), b"u0".to_vec()),
            &[attenuation],
            &Limits::default(),
        )
        .unwrap();

        assert!(!world.facts().contains(&forged));
        assert!(world.facts().contains(&honest));
    }

    #[test]
    fn authority_and_verifier_facts_are_not_filtered() {
        let mut authority = Block::new(b"g0".to_vec(), b"u0".to_vec());
        let issued = fact("right", [sym(AUTHORITY), string("file1")]).unwrap();
        authority.add_fact(issued.clone());

        let mut verifier = Verifier::new();
        let ambient = fact("resource", [sym(AMBIENT), string("file1")]).unwrap();
        verifier.add_fact(ambient.clone());

        let world =
            World::assemble(&verifier, &authority, &[], &Limits::default()).unwrap();
        assert!(world.facts().contains(&issued));
        assert!(world.facts().contains(&ambient));
    }

    #[test]
    fn revocation_id_facts_are_injected_for_every_block() {
        let authority = Block::new(vec![0xaa], vec![0xab]);
        let attenuation = Block::new(vec![0xba], vec![0xbb]);

        let world = World::assemble(
            &Verifier::new(),
            &authority,
            &[attenuation],
            &Limits::default(),
        )
        .unwrap();

        let expected = [
            fact("revocation_id", [Term::Int(0), Term::Bytes(vec![0xaa])]).unwrap(),
            fact("unique_revocation_id", [Term::Int(0), Term::Bytes(vec![0xab])]).unwrap(),
            fact("revocation_id", [Term::Int(1), Term::Bytes(vec![0xba])]).unwrap(),
            fact("unique_revocation_id", [Term::Int(1), Term::Bytes(vec![0xbb])]).unwrap(),
        ];
        for f in expected {
            assert!(world.facts().contains(&f), "missing {f}");
        }
    }

    #[test]
    fn disallowed_block_content_is_an_error() {
        let attenuation = block_with_fact(fact("tag", [string("x")]).unwrap());
        let limits = Limits::default().with_block_facts(false);

        let err = World::assemble(
            &Verifier::new(),
            &Block::new(b"g0".to_vec(), b"u0".to_vec()),
            &[attenuation],
            &limits,
        )
        .unwrap_err();

        assert!(err.to_string().contains("block 1"));
    }

    #[test]
    fn scope_filter_sees_inside_sets() {
        let smuggled = Fact::new(Predicate::new(
            "tags",
            [Term::set([Term::symbol(AUTHORITY)]).unwrap()],
        ))
        .unwrap();

        let world = World::assemble(
            &Verifier::new(),
            &Block::new(b"g0".to_vec(), b"u0".to_vec()),
            &[block_with_fact(smuggled.clone())],
            &Limits::default(),
        )
        .unwrap();

        assert!(!world.facts().contains(&smuggled));
    }
}
