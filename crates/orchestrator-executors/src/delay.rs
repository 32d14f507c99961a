// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delay executor: sleeps cooperatively for a configured duration and
//! returns promptly on cancellation.

use async_trait::async_trait;
use orchestrator_core::{ExecutionContext, Executor, ExecutorError, OrchestratorError, Result, Step};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::StepExecutorError;

#[derive(Debug, Deserialize)]
struct DelayConfig {
    duration: DurationLiteral,
}

/// Accepts either a parseable duration literal (`"5s"`, `"200ms"`) or a bare
/// number of seconds.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationLiteral {
    Seconds(f64),
    Literal(String),
}

impl DurationLiteral {
    fn to_duration(&self) -> std::result::Result<Duration, String> {
        match self {
            Self::Seconds(secs) if *secs >= 0.0 => Ok(Duration::from_secs_f64(*secs)),
            Self::Seconds(secs) => Err(format!("delay duration must not be negative, got {secs}")),
            Self::Literal(s) => humantime::parse_duration(s).map_err(|e| format!("invalid delay duration '{s}': {e}")),
        }
    }
}

#[derive(Default)]
pub struct DelayExecutor;

#[async_trait]
impl Executor for DelayExecutor {
    fn step_type(&self) -> &'static str {
        "delay"
    }

    fn validate(&self, step: &Step) -> Result<()> {
        let config: DelayConfig = serde_json::from_value(step.config.clone()).map_err(|e| OrchestratorError::validation(0, Some(step.id.clone()), format!("invalid delay config: {e}")))?;
        config.duration.to_duration().map_err(|reason| OrchestratorError::validation(0, Some(step.id.clone()), reason))?;
        Ok(())
    }

    async fn execute(&self, ctx: &ExecutionContext, step: &Step, _input: Value) -> std::result::Result<Value, ExecutorError> {
        let config: DelayConfig = serde_json::from_value(step.config.clone()).map_err(|e| StepExecutorError::InvalidConfig(e.to_string()))?;
        let duration = config.duration.to_duration().map_err(StepExecutorError::InvalidConfig)?;

        if ctx.cancellable_sleep(duration).await {
            Ok(json!({ "waited": humantime::format_duration(duration).to_string() }))
        } else {
            Err(StepExecutorError::Cancelled.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::workflow::{ErrorHandling, RetryPolicy};
    use std::collections::HashMap as Map;
    use std::time::Instant;

    fn step(config: Value) -> Step {
        Step {
            id: "s".to_string(),
            name: None,
            description: None,
            step_type: "delay".to_string(),
            config,
            input_mapping: Map::new(),
            output_mapping: Map::new(),
            depends_on: vec![],
            timeout: None,
            retry: None::<RetryPolicy>,
            error_handling: ErrorHandling::default(),
        }
    }

    #[test]
    fn validate_rejects_unparseable_duration() {
        let executor = DelayExecutor;
        let err = executor.validate(&step(json!({"duration": "not a duration"}))).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn validate_accepts_numeric_seconds() {
        let executor = DelayExecutor;
        assert!(executor.validate(&step(json!({"duration": 0.05}))).is_ok());
    }

    #[tokio::test]
    async fn sleeps_for_the_configured_duration() {
        let executor = DelayExecutor;
        let ctx = ExecutionContext::new();
        let started = Instant::now();
        let output = executor.execute(&ctx, &step(json!({"duration": "20ms"})), Value::Null).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(output["waited"], json!("20ms"));
    }

    #[tokio::test]
    async fn cancellation_returns_promptly_with_cancellation_error() {
        let executor = DelayExecutor;
        let ctx = ExecutionContext::new();
        let child = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            child.cancel();
        });
        let started = Instant::now();
        let result = executor.execute(&ctx, &step(json!({"duration": "60s"})), Value::Null).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
