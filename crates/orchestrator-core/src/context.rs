// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution context: the per-execution cancellation token and the child
//! tokens derived for each step.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Owned by one [`crate::execution::Execution`]. Cancelling the root token
/// cancels every step-scoped child token derived from it.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    root: CancellationToken,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }

    pub fn cancel(&self) {
        self.root.cancel();
    }

    /// A child token for one step's executor call; cancelled automatically
    /// when the root is cancelled, and independently cancellable (by timeout)
    /// without affecting the root or sibling steps.
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Race a future against this context's cancellation and an optional
    /// per-call timeout, returning `None` if the future did not win.
    pub async fn run_cancellable<F, T>(&self, timeout: Option<Duration>, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        let token = self.child_token();
        let timed = async {
            match timeout {
                Some(d) => tokio::time::timeout(d, fut).await.ok(),
                None => Some(fut.await),
            }
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = timed => result,
        }
    }

    /// Sleep cooperatively, returning early if cancelled. Used by the retry
    /// backoff and the delay executor alike.
    pub async fn cancellable_sleep(&self, duration: Duration) -> bool {
        let token = self.child_token();
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
