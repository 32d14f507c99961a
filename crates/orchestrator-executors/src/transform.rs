// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data transform executor: pure, in-memory reshaping of a step's
//! input. No I/O, so no cancellation or retry concerns apply in practice.

use async_trait::async_trait;
use orchestrator_core::{ExecutionContext, Executor, ExecutorError, OrchestratorError, Result, Step};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::StepExecutorError;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TransformConfig {
    Json {
        #[serde(default)]
        operations: Vec<JsonOp>,
    },
    Filter {
        #[serde(default)]
        conditions: Vec<FilterCondition>,
    },
    Map {
        #[serde(default)]
        mapping: std::collections::HashMap<String, String>,
    },
    Aggregate {
        function: String,
        field: String,
        target: String,
    },
}

#[derive(Debug, Deserialize)]
struct JsonOp {
    action: String,
    field: String,
    #[serde(default)]
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilterCondition {
    field: String,
    #[serde(default)]
    equals: Option<Value>,
    #[serde(default)]
    not_equals: Option<Value>,
    #[serde(default)]
    exists: Option<bool>,
    #[serde(default)]
    not_exists: Option<bool>,
}

impl FilterCondition {
    fn holds(&self, input: &Map<String, Value>) -> bool {
        let present = input.contains_key(&self.field);
        if let Some(expected) = &self.equals {
            if input.get(&self.field) != Some(expected) {
                return false;
            }
        }
        if let Some(unexpected) = &self.not_equals {
            if input.get(&self.field) == Some(unexpected) {
                return false;
            }
        }
        if let Some(true) = self.exists {
            if !present {
                return false;
            }
        }
        if let Some(true) = self.not_exists {
            if present {
                return false;
            }
        }
        true
    }
}

fn as_object(input: &Value) -> Map<String, Value> {
    match input {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}

fn apply_json_ops(input: &Value, operations: &[JsonOp]) -> Value {
    let mut working = as_object(input);
    for op in operations {
        match op.action.as_str() {
            "extract" => {
                if let Some(value) = working.get(&op.field).cloned() {
                    let target = op.target.clone().unwrap_or_else(|| op.field.clone());
                    working.insert(target, value);
                }
            }
            "remove" => {
                working.remove(&op.field);
            }
            "rename" => {
                if let Some(value) = working.remove(&op.field) {
                    if let Some(target) = &op.target {
                        working.insert(target.clone(), value);
                    }
                }
            }
            _ => {}
        }
    }
    Value::Object(working)
}

fn apply_filter(input: &Value, conditions: &[FilterCondition]) -> Value {
    let object = as_object(input);
    if conditions.iter().all(|c| c.holds(&object)) {
        Value::Object(object)
    } else {
        Value::Object(Map::new())
    }
}

fn apply_map(input: &Value, mapping: &std::collections::HashMap<String, String>) -> Value {
    let object = as_object(input);
    let mut out = Map::new();
    for (target, source) in mapping {
        if let Some(value) = object.get(source) {
            out.insert(target.clone(), value.clone());
        }
    }
    Value::Object(out)
}

fn as_numbers(value: &Value) -> Vec<f64> {
    match value {
        Value::Array(items) => items.iter().filter_map(|v| v.as_f64()).collect(),
        other => other.as_f64().into_iter().collect(),
    }
}

fn apply_aggregate(input: &Value, function: &str, field: &str, target: &str) -> std::result::Result<Value, StepExecutorError> {
    let object = as_object(input);
    let field_value = object.get(field).cloned().unwrap_or(Value::Null);

    let result = match function {
        "count" => match &field_value {
            Value::Array(items) => Value::from(items.len()),
            Value::Null => Value::from(0),
            _ => Value::from(1),
        },
        "sum" => Value::from(as_numbers(&field_value).into_iter().sum::<f64>()),
        "avg" => {
            let numbers = as_numbers(&field_value);
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        "min" => as_numbers(&field_value).into_iter().fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |m| m.min(n)))).map(Value::from).unwrap_or(Value::Null),
        "max" => as_numbers(&field_value).into_iter().fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |m| m.max(n)))).map(Value::from).unwrap_or(Value::Null),
        other => return Err(StepExecutorError::InvalidConfig(format!("unknown aggregate function '{other}'"))),
    };

    let mut out = object;
    out.insert(target.to_string(), result);
    Ok(Value::Object(out))
}

#[derive(Default)]
pub struct TransformExecutor;

#[async_trait]
impl Executor for TransformExecutor {
    fn step_type(&self) -> &'static str {
        "transform"
    }

    fn validate(&self, step: &Step) -> Result<()> {
        serde_json::from_value::<TransformConfig>(step.config.clone()).map_err(|e| OrchestratorError::validation(0, Some(step.id.clone()), format!("invalid transform config: {e}")))?;
        Ok(())
    }

    async fn execute(&self, _ctx: &ExecutionContext, step: &Step, input: Value) -> std::result::Result<Value, ExecutorError> {
        let config: TransformConfig = serde_json::from_value(step.config.clone()).map_err(|e| StepExecutorError::InvalidConfig(e.to_string()))?;
        let output = match config {
            TransformConfig::Json { operations } => apply_json_ops(&input, &operations),
            TransformConfig::Filter { conditions } => apply_filter(&input, &conditions),
            TransformConfig::Map { mapping } => apply_map(&input, &mapping),
            TransformConfig::Aggregate { function, field, target } => apply_aggregate(&input, &function, &field, &target)?,
        };
        Ok(output)
    }
}
