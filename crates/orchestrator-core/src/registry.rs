// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Executor plug-in model: a small capability set (`type`, `validate`,
//! `execute`) and a process-local registry mapping `step.type` to an
//! executor. Registration is write-once before the engine admits
//! executions; lookups during execution are read-only.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::{OrchestratorError, Result};
use crate::workflow::Step;

/// An executor-local failure. Kept as a plain message so this crate does not
/// need to know about any concrete executor crate's error enum; executors
/// convert their own `thiserror` types into this at the trait boundary.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ExecutorError(String);

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for ExecutorError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Implemented by every step type's plug-in. `validate` runs at parse time;
/// `execute` runs once per attempt and must honour `ctx` cancellation
/// promptly.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The `step.type` string this executor handles, e.g. `"http"`.
    fn step_type(&self) -> &'static str;

    /// Type-specific config validation, delegated to from [`crate::workflow::Workflow::validate`].
    fn validate(&self, step: &Step) -> Result<()>;

    /// Run the step once. `input` is the already-resolved input mapping.
    async fn execute(&self, ctx: &ExecutionContext, step: &Step, input: Value) -> std::result::Result<Value, ExecutorError>;
}

/// Process-local `type` -> executor mapping.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: Arc<DashMap<String, Arc<dyn Executor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, executor: Arc<dyn Executor>) {
        self.executors.insert(executor.step_type().to_string(), executor);
    }

    pub fn lookup(&self, step_type: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(step_type).map(|entry| entry.value().clone())
    }

    /// Validates a step's `type` is registered and delegates config
    /// validation to that executor.
    pub fn validate(&self, step_index: usize, step: &Step) -> Result<()> {
        match self.lookup(&step.step_type) {
            Some(executor) => executor.validate(step).map_err(|e| match e {
                OrchestratorError::Validation { reason, .. } => OrchestratorError::validation(step_index, Some(step.id.clone()), reason),
                other => other,
            }),
            None => Err(OrchestratorError::UnknownStepType(step.step_type.clone())),
        }
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.executors.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ErrorHandling, RetryPolicy};
    use std::collections::HashMap;

    struct EchoExecutor;

    #[async_trait]
    impl Executor for EchoExecutor {
        fn step_type(&self) -> &'static str {
            "echo"
        }

        fn validate(&self, _step: &Step) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, _ctx: &ExecutionContext, _step: &Step, input: Value) -> std::result::Result<Value, ExecutorError> {
            Ok(input)
        }
    }

    fn sample_step(step_type: &str) -> Step {
        Step {
            id: "s".to_string(),
            name: None,
            description: None,
            step_type: step_type.to_string(),
            config: Value::Null,
            input_mapping: HashMap::new(),
            output_mapping: HashMap::new(),
            depends_on: vec![],
            timeout: None,
            retry: None::<RetryPolicy>,
            error_handling: ErrorHandling::default(),
        }
    }

    #[test]
    fn lookup_returns_registered_executor() {
        let registry = ExecutorRegistry::new();
        registry.register(Arc::new(EchoExecutor));
        assert!(registry.lookup("echo").is_some());
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn validate_fails_for_unregistered_type() {
        let registry = ExecutorRegistry::new();
        let err = registry.validate(0, &sample_step("unknown")).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn registered_executor_executes() {
        let registry = ExecutorRegistry::new();
        registry.register(Arc::new(EchoExecutor));
        let executor = registry.lookup("echo").unwrap();
        let ctx = ExecutionContext::new();
        let out = executor.execute(&ctx, &sample_step("echo"), serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(out, serde_json::json!({"a": 1}));
    }
}
