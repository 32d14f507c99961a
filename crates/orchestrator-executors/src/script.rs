// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shell-script executor: runs one command per step attempt via the
//! configured shell, exposing the resolved input as `INPUT_<KEY>` env vars.

use async_trait::async_trait;
use orchestrator_core::{ExecutionContext, Executor, ExecutorError, OrchestratorError, Result, Step};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;
use tokio::process::Command;

use crate::error::StepExecutorError;

fn default_shell() -> String {
    "bash".to_string()
}

#[derive(Debug, Deserialize)]
struct ScriptConfig {
    command: String,
    #[serde(default = "default_shell")]
    shell: String,
    #[serde(default)]
    working_directory: Option<String>,
    #[serde(default)]
    environment: HashMap<String, String>,
}

/// Converts input into `INPUT_<UPPERCASE_KEY>` env vars. Only string-coercible
/// scalars are propagated (see DESIGN.md); arrays, objects, and null are
/// skipped rather than JSON-encoded.
fn input_env_vars(input: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = input else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(key, value)| {
            let scalar = match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            };
            scalar.map(|v| (format!("INPUT_{}", key.to_uppercase()), v))
        })
        .collect()
}

#[derive(Default)]
pub struct ScriptExecutor;

#[async_trait]
impl Executor for ScriptExecutor {
    fn step_type(&self) -> &'static str {
        "script"
    }

    fn validate(&self, step: &Step) -> Result<()> {
        let config: ScriptConfig = serde_json::from_value(step.config.clone()).map_err(|e| OrchestratorError::validation(0, Some(step.id.clone()), format!("invalid script config: {e}")))?;
        if config.command.trim().is_empty() {
            return Err(OrchestratorError::validation(0, Some(step.id.clone()), "script executor requires a non-empty command"));
        }
        Ok(())
    }

    async fn execute(&self, _ctx: &ExecutionContext, step: &Step, input: Value) -> std::result::Result<Value, ExecutorError> {
        let config: ScriptConfig = serde_json::from_value(step.config.clone()).map_err(|e| StepExecutorError::InvalidConfig(e.to_string()))?;

        let mut command = Command::new(&config.shell);
        command.arg("-c").arg(&config.command).kill_on_drop(true);
        if let Some(dir) = &config.working_directory {
            command.current_dir(dir);
        }
        for (key, value) in &config.environment {
            command.env(key, value);
        }
        for (key, value) in input_env_vars(&input) {
            command.env(key, value);
        }

        let started = Instant::now();
        let output = command.output().await.map_err(|e| StepExecutorError::Spawn(e.to_string()))?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            return Err(StepExecutorError::NonZeroExit { exit_code, stdout, stderr }.into());
        }

        Ok(json!({
            "stdout": stdout,
            "stderr": stderr,
            "duration_ms": duration_ms,
            "exit_code": exit_code,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::workflow::{ErrorHandling, RetryPolicy};
    use std::collections::HashMap as Map;

    fn step(config: Value) -> Step {
        Step {
            id: "s".to_string(),
            name: None,
            description: None,
            step_type: "script".to_string(),
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
    fn validate_rejects_empty_command() {
        let executor = ScriptExecutor;
        let err = executor.validate(&step(json!({"command": "  "}))).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn successful_command_populates_output() {
        let executor = ScriptExecutor;
        let ctx = ExecutionContext::new();
        let output = executor.execute(&ctx, &step(json!({"command": "echo hello"})), Value::Null).await.unwrap();
        assert_eq!(output["stdout"], json!("hello\n"));
        assert_eq!(output["exit_code"], json!(0));
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let executor = ScriptExecutor;
        let ctx = ExecutionContext::new();
        let result = executor.execute(&ctx, &step(json!({"command": "exit 3"})), Value::Null).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn input_is_exposed_as_env_vars() {
        let executor = ScriptExecutor;
        let ctx = ExecutionContext::new();
        let output = executor.execute(&ctx, &step(json!({"command": "echo $INPUT_NAME"})), json!({"name": "Ada"})).await.unwrap();
        assert_eq!(output["stdout"], json!("Ada\n"));
    }

    #[tokio::test]
    async fn runs_in_the_configured_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "present").unwrap();
        let executor = ScriptExecutor;
        let ctx = ExecutionContext::new();
        let config = json!({"command": "cat marker.txt", "working_directory": dir.path().to_str().unwrap()});
        let output = executor.execute(&ctx, &step(config), Value::Null).await.unwrap();
        assert_eq!(output["stdout"], json!("present"));
    }
}
