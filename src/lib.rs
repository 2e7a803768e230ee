//! # Wafer - attenuable capability tokens, Datalog core
//!
//! Wafer is the authorization engine of a bearer capability token: a token
//! is a chain of append-only blocks, each carrying a fragment of a Datalog
//! program, and a holder can only ever *restrict* what the token permits.
//! On the server side a [`Verifier`] combines its own program with the
//! token's, saturates the combined facts under hard resource limits, and
//! renders an allow/deny verdict.
//!
//! Signing, wire formats and the surface-syntax parser live outside this
//! crate; the engine consumes parsed blocks plus per-block revocation
//! identifiers.
//!
//! ## Core concepts
//!
//! - **Term**: a typed value ([`Term`]); symbols, integers, strings, dates,
//!   byte strings, booleans and sets, plus variables inside rules
//! - **Fact**: a ground predicate; the unit of knowledge ([`Fact`])
//! - **Rule**: derives new facts, with guard expressions ([`Rule`])
//! - **Check**: a constraint every block and the verifier can impose; all
//!   checks must hold ([`Check`])
//! - **Policy**: ordered allow/deny decisions; first match wins ([`Policy`])
//!
//! ## Usage
//!
//! ```
//! use wafer::builder::{allow, fact, pred, query, string, sym, var};
//! use wafer::{Block, Limits, Verifier};
//!
//! # fn main() -> wafer::WaferResult<()> {
//! // the authority block states what the token grants
//! let mut authority = Block::new(b"generic-id".to_vec(), b"unique-id".to_vec());
//! authority.add_fact(fact("right", [sym("authority"), string("file1"), sym("read")])?);
//!
//! // the verifier describes the request and its decision policy
//! let mut verifier = Verifier::new();
//! verifier.add_fact(fact("resource", [sym("ambient"), string("file1")])?);
//! verifier.add_fact(fact("operation", [sym("ambient"), sym("read")])?);
//! verifier.add_policy(allow(vec![query(vec![
//!     pred("resource", [sym("ambient"), var("f")]),
//!     pred("operation", [sym("ambient"), sym("read")]),
//!     pred("right", [sym("authority"), var("f"), sym("read")]),
//! ])?])?);
//!
//! let verdict = verifier.verify(&authority, &[], &Limits::default())?;
//! assert_eq!(verdict.index, 0);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod binding;
pub mod block;
pub mod builder;
mod engine;
pub mod error;
pub mod expression;
pub mod limits;
pub mod predicate;
pub mod rule;
pub mod term;
pub mod verifier;
pub mod world;

// Re-export primary types at crate root for convenience
pub use binding::Binding;
pub use block::Block;
pub use error::{
    DenialError, ExecutionError, FailedCheck, ValidationError, WaferError, WaferResult,
};
pub use expression::{BinaryOp, Expression, UnaryOp};
pub use limits::{Limits, RevocationCheck, RevocationStatus};
pub use predicate::{Fact, Predicate};
pub use rule::{Check, Policy, PolicyKind, QueryItem, Rule};
pub use term::Term;
pub use verifier::{PolicyMatch, Verifier};
pub use world::{World, AMBIENT, AUTHORITY};
