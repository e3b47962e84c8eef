//! Per-kind fixed-delay retry policies.

use super::TaskKind;
use std::time::Duration;

/// Bounded fixed-delay retry policy.
///
/// `max_attempts` counts executions, including the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of executions.
    pub max_attempts: u32,
    /// Delay before each re-execution.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Returns whether execution number `attempt` is within the budget.
    #[must_use]
    pub const fn allows_attempt(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Returns whether another execution is allowed after `attempt`.
    #[must_use]
    pub const fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Retry policies for every task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicies {
    /// Pull request event dispatch.
    pub dispatch: RetryPolicy,
    /// Deployment.
    pub deploy: RetryPolicy,
    /// Teardown.
    pub destroy: RetryPolicy,
    /// Health polling; each not-converged observation consumes one attempt.
    pub poll: RetryPolicy,
}

impl RetryPolicies {
    /// Returns the policy governing `kind`.
    #[must_use]
    pub const fn for_kind(&self, kind: TaskKind) -> RetryPolicy {
        match kind {
            TaskKind::HandlePrEvent => self.dispatch,
            TaskKind::Deploy => self.deploy,
            TaskKind::Destroy => self.destroy,
            TaskKind::Poll => self.poll,
        }
    }
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            dispatch: RetryPolicy::new(3, Duration::from_secs(30)),
            deploy: RetryPolicy::new(3, Duration::from_secs(60)),
            destroy: RetryPolicy::new(3, Duration::from_secs(60)),
            poll: RetryPolicy::new(20, Duration::from_secs(15)),
        }
    }
}
