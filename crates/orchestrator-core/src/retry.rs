// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry execution: pairs the pure backoff calculation on [`RetryPolicy`]
//! with the cancellable sleep that actually waits between attempts, kept
//! separate from the decision itself for testability.

use crate::context::ExecutionContext;
use crate::workflow::RetryPolicy;

/// Outcome of asking whether a failed attempt should be retried.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep has completed; try again.
    Retry,
    /// The retry budget is exhausted, or the error didn't match `retry_on`.
    Exhausted,
    /// The sleep was interrupted by cancellation; abort immediately.
    Cancelled,
}

/// Drives the retry/backoff loop for one step. Holds no state of its own;
/// `attempt` and `error_message` are supplied by the caller each time.
pub struct RetryExecutor<'a> {
    policy: &'a RetryPolicy,
}

impl<'a> RetryExecutor<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy }
    }

    /// `attempt` is zero-based and counts completed attempts so far.
    /// `max_attempts` is the total attempt budget, not the retry count on
    /// top of a first try: an always-failing step runs exactly
    /// `max_attempts` times before this returns `Exhausted`.
    pub async fn decide(&self, ctx: &ExecutionContext, attempt: u32, error_message: &str) -> RetryDecision {
        if attempt + 1 >= self.policy.max_attempts {
            return RetryDecision::Exhausted;
        }
        if !self.policy.matches(error_message) {
            return RetryDecision::Exhausted;
        }
        let delay = self.policy.next_delay(attempt);
        if ctx.cancellable_sleep(delay).await {
            RetryDecision::Retry
        } else {
            RetryDecision::Cancelled
        }
    }
}
