//! Error types for wafer.
//!
//! Errors come in three strata, all strongly typed with thiserror:
//! validation errors raised when building the data model, execution errors
//! that abort a verification call, and denial errors describing a completed
//! verification with a negative verdict. Guard-level evaluation errors are
//! not part of this surface; they reject the offending binding instead.

use thiserror::Error;

use crate::rule::{Check, Policy};

/// Validation errors raised while constructing terms, facts, rules, checks
/// or policies.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A fact contained a variable.
    #[error("fact '{predicate}' contains a variable")]
    VariableInFact {
        /// Predicate name of the offending fact.
        predicate: String,
    },

    /// A set element was itself a set or a variable.
    #[error("a {found} cannot be a set element")]
    InvalidSetElement {
        /// Type name of the offending element.
        found: &'static str,
    },

    /// A head or guard variable does not appear in the rule body.
    #[error("variable ${variable} in rule '{rule}' does not appear in the body")]
    UnboundVariable {
        /// The unbound variable name.
        variable: String,
        /// Name of the rule's head predicate (or first body predicate for
        /// queries).
        rule: String,
    },

    /// A check carried no query items.
    #[error("a check needs at least one query")]
    EmptyCheck,

    /// A policy carried no query items.
    #[error("a policy needs at least one query")]
    EmptyPolicy,
}

/// Execution errors that abort a verification call.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The wall-clock deadline expired.
    #[error("verification timed out after {max_time_us}us")]
    Timeout {
        /// The configured budget, in microseconds.
        max_time_us: u64,
    },

    /// The fact set grew past the configured ceiling.
    #[error("too many facts (limit: {max_facts})")]
    TooManyFacts {
        /// The configured ceiling.
        max_facts: usize,
    },

    /// Saturation did not converge within the iteration budget.
    #[error("too many iterations (limit: {max_iterations})")]
    TooManyIterations {
        /// The configured budget.
        max_iterations: usize,
    },

    /// An attenuation block carried facts or rules while block facts are
    /// disallowed.
    #[error("block {block} carries facts or rules but block facts are disallowed")]
    FactsInBlocks {
        /// Index of the offending block (authority is 0).
        block: usize,
    },

    /// The revocation checker reported a revoked block.
    #[error("block {block} has been revoked")]
    Revoked {
        /// Index of the revoked block (authority is 0).
        block: usize,
    },

    /// The revocation checker itself failed.
    #[error("revocation check failed: {message}")]
    RevocationCheck {
        /// Error details.
        message: String,
    },
}

/// A check that was not satisfied by the saturated facts, tagged with where
/// it came from. Reported in input order: verifier checks first, then the
/// authority block's, then each attenuation block's.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedCheck {
    /// A check contributed by the verifier.
    Verifier {
        /// Position among the verifier's checks.
        index: usize,
        /// The failing check.
        check: Check,
    },
    /// A check contributed by a token block.
    Block {
        /// Block index (authority is 0).
        block: usize,
        /// Position among that block's checks.
        index: usize,
        /// The failing check.
        check: Check,
    },
}

impl std::fmt::Display for FailedCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verifier { index, check } => {
                write!(f, "verifier check {index}: {check}")
            }
            Self::Block { block, index, check } => {
                write!(f, "block {block} check {index}: {check}")
            }
        }
    }
}

/// Denial errors: verification ran to completion and refused the request.
#[derive(Debug, Error)]
pub enum DenialError {
    /// No policy matched the saturated facts.
    #[error("no policy matched ({} failed check(s))", failed.len())]
    NoPoliciesMatched {
        /// Checks that failed, in input order.
        failed: Vec<FailedCheck>,
    },

    /// One or more checks failed while an allow policy matched.
    #[error("{} check(s) failed", failed.len())]
    FailedChecks {
        /// Checks that failed, in input order.
        failed: Vec<FailedCheck>,
    },

    /// A deny policy matched first.
    #[error("deny policy {index} matched ({} failed check(s))", failed.len())]
    DenyRuleMatched {
        /// Checks that failed, in input order.
        failed: Vec<FailedCheck>,
        /// Position of the denying policy.
        index: usize,
        /// The denying policy.
        policy: Policy,
    },
}

impl DenialError {
    /// The failed checks carried by this denial, in input order.
    #[must_use]
    pub fn failed_checks(&self) -> &[FailedCheck] {
        match self {
            Self::NoPoliciesMatched { failed }
            | Self::FailedChecks { failed }
            | Self::DenyRuleMatched { failed, .. } => failed,
        }
    }
}

/// Top-level error type for wafer.
#[derive(Debug, Error)]
pub enum WaferError {
    /// Input validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Verification aborted.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Verification completed and refused the request.
    #[error("denied: {0}")]
    Denial(#[from] DenialError),
}

impl WaferError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a denial.
    #[must_use]
    pub const fn is_denial(&self) -> bool {
        matches!(self, Self::Denial(_))
    }

    /// Returns true if retrying the same call could succeed.
    ///
    /// Only deadline expiry and revocation-checker I/O failures are
    /// transient; every other outcome is stable for fixed inputs.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. } | ExecutionError::RevocationCheck { .. }
            ),
            Self::Validation(_) | Self::Denial(_) => false,
        }
    }
}

/// Result type alias for wafer operations.
pub type WaferResult<T> = Result<T, WaferError>;
