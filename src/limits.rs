//! Resource limits and the verification deadline.
//!
//! The limits are part of the security boundary: naive saturation is only
//! safe because the fact count, the iteration count and the wall clock are
//! all bounded. The deadline is cooperative; an in-progress pass runs to
//! completion before expiry is observed.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ExecutionError;

/// Answer from a revocation checker for one unique revocation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationStatus {
    /// The id has been revoked; verification must fail.
    Revoked,
    /// The id is not known to be revoked.
    NotRevoked,
}

/// External revocation lookup.
///
/// Invoked once per block, authority first, before any fact derivation.
/// This is the engine's only blocking boundary; implementations must not
/// re-enter the engine.
pub trait RevocationCheck: Send + Sync {
    /// Checks one unique revocation id.
    ///
    /// # Errors
    ///
    /// I/O failures abort verification with
    /// [`ExecutionError::RevocationCheck`].
    fn status(&self, unique_revocation_id: &[u8]) -> io::Result<RevocationStatus>;
}

/// Resource limits for one verification call.
///
/// # Examples
///
/// ```
/// use wafer::Limits;
///
/// let limits = Limits::default()
///     .with_max_facts(5_000)
///     .with_max_time_us(10_000)
///     .with_regexes(false);
/// assert_eq!(limits.max_facts, 5_000);
/// assert!(!limits.allow_regexes);
/// ```
#[derive(Clone)]
pub struct Limits {
    /// Hard ceiling on the fact count after any merge.
    pub max_facts: usize,
    /// Maximum number of productive fixpoint passes.
    pub max_iterations: usize,
    /// Wall-clock budget for the whole call, in microseconds.
    pub max_time_us: u64,
    /// Gates the regex match operator.
    pub allow_regexes: bool,
    /// Gates facts and rules carried by attenuation blocks.
    pub allow_block_facts: bool,
    /// Optional revocation checker consulted before evaluation.
    pub revocation_check: Option<Arc<dyn RevocationCheck>>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_facts: 1000,
            max_iterations: 100,
            max_time_us: 1000,
            allow_regexes: true,
            allow_block_facts: true,
            revocation_check: None,
        }
    }
}

impl Limits {
    /// Sets the fact ceiling.
    #[must_use]
    pub const fn with_max_facts(mut self, max_facts: usize) -> Self {
        self.max_facts = max_facts;
        self
    }

    /// Sets the iteration budget.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the wall-clock budget in microseconds.
    #[must_use]
    pub const fn with_max_time_us(mut self, max_time_us: u64) -> Self {
        self.max_time_us = max_time_us;
        self
    }

    /// Enables or disables the regex operator.
    #[must_use]
    pub const fn with_regexes(mut self, allow: bool) -> Self {
        self.allow_regexes = allow;
        self
    }

    /// Enables or disables attenuation-block facts and rules.
    #[must_use]
    pub const fn with_block_facts(mut self, allow: bool) -> Self {
        self.allow_block_facts = allow;
        self
    }

    /// Installs a revocation checker.
    #[must_use]
    pub fn with_revocation_check(mut self, check: Arc<dyn RevocationCheck>) -> Self {
        self.revocation_check = Some(check);
        self
    }
}

impl fmt::Debug for Limits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Limits")
            .field("max_facts", &self.max_facts)
            .field("max_iterations", &self.max_iterations)
            .field("max_time_us", &self.max_time_us)
            .field("allow_regexes", &self.allow_regexes)
            .field("allow_block_facts", &self.allow_block_facts)
            .field("revocation_check", &self.revocation_check.is_some())
            .finish()
    }
}

/// Cooperative wall-clock deadline for one verification call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeadlineGuard {
    deadline: Option<Instant>,
    max_time_us: u64,
}

impl DeadlineGuard {
    /// Starts the clock. A budget too large for the platform clock means
    /// no deadline.
    pub(crate) fn new(max_time_us: u64) -> Self {
        let deadline = Instant::now().checked_add(Duration::from_micros(max_time_us));
        Self {
            deadline,
            max_time_us,
        }
    }

    /// Returns `Timeout` once the budget is spent.
    pub(crate) fn check(&self) -> Result<(), ExecutionError> {
        match self.deadline {
            Some(deadline) if Instant::now() > deadline => Err(ExecutionError::Timeout {
                max_time_us: self.max_time_us,
            }),
            _ => Ok(()),
        }
    }
}
