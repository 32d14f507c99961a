// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conditional executor: evaluates a boolean expression over the step's
//! input. Pure; never performs I/O.
//!
//! This executor only computes the boolean — it does not branch the driver
//! or skip steps on its result (see DESIGN.md).

use async_trait::async_trait;
use orchestrator_core::{ExecutionContext, Executor, ExecutorError, OrchestratorError, Result, Step};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::StepExecutorError;

#[derive(Debug, Deserialize)]
struct ConditionalConfig {
    condition: Condition,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "operator", rename_all = "snake_case")]
enum Condition {
    Equals { field: String, value: Value },
    NotEquals { field: String, value: Value },
    Exists { field: String },
    NotExists { field: String },
    And { conditions: Vec<Condition> },
    Or { conditions: Vec<Condition> },
}

impl Condition {
    fn evaluate(&self, input: &Value) -> bool {
        let object = match input {
            Value::Object(map) => Some(map),
            _ => None,
        };
        match self {
            Self::Equals { field, value } => object.and_then(|o| o.get(field)) == Some(value),
            Self::NotEquals { field, value } => object.and_then(|o| o.get(field)) != Some(value),
            Self::Exists { field } => object.map(|o| o.contains_key(field)).unwrap_or(false),
            Self::NotExists { field } => !object.map(|o| o.contains_key(field)).unwrap_or(false),
            Self::And { conditions } => conditions.iter().all(|c| c.evaluate(input)),
            Self::Or { conditions } => conditions.iter().any(|c| c.evaluate(input)),
        }
    }
}

#[derive(Default)]
pub struct ConditionalExecutor;

#[async_trait]
impl Executor for ConditionalExecutor {
    fn step_type(&self) -> &'static str {
        "conditional"
    }

    fn validate(&self, step: &Step) -> Result<()> {
        serde_json::from_value::<ConditionalConfig>(step.config.clone()).map_err(|e| OrchestratorError::validation(0, Some(step.id.clone()), format!("invalid conditional config: {e}")))?;
        Ok(())
    }

    async fn execute(&self, _ctx: &ExecutionContext, step: &Step, input: Value) -> std::result::Result<Value, ExecutorError> {
        let config: ConditionalConfig = serde_json::from_value(step.config.clone()).map_err(|e| StepExecutorError::InvalidConfig(e.to_string()))?;
        let result = config.condition.evaluate(&input);
        Ok(json!({ "condition_result": result, "input": input }))
    }
}
