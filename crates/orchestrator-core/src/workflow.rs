// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow definition types and the parser/validator.
//!
//! A [`Workflow`] is immutable once admitted: the engine never mutates it.
//! Parsing accepts either YAML or JSON and validation is pure,
//! deterministic, and fails on the first violation, reporting the
//! offending step index and id.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

/// A mapping from a target variable name to an expression.
pub type DataMapping = HashMap<String, serde_json::Value>;

fn default_version() -> String {
    "1.0.0".to_string()
}

/// An immutable, declarative workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Opaque 128-bit identifier.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Required, non-empty workflow name.
    pub name: String,

    /// Semantic version; defaults to "1.0.0" if omitted.
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(default)]
    pub annotations: HashMap<String, String>,

    /// Ordered sequence of steps; execution proceeds in this order.
    pub steps: Vec<Step>,

    /// Applied over `variables` at completion; if absent, `variables` becomes `output` verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mapping: Option<DataMapping>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
}

/// A trigger declaration. The engine does not act on triggers; external
/// scheduling collaborators do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub trigger_type: String,

    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

/// One unit of work inside a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the workflow, non-empty.
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// One of the registered executor names (validated against the registry at parse time).
    #[serde(rename = "type")]
    pub step_type: String,

    /// Executor-specific configuration; opaque to the engine.
    #[serde(default)]
    pub config: serde_json::Value,

    /// Mapping of target name -> expression, resolved against the variable
    /// environment before dispatch.
    #[serde(default, rename = "input")]
    pub input_mapping: DataMapping,

    /// Mapping applied to the executor's raw output before merging into
    /// `variables`. If empty, the raw output is merged verbatim.
    #[serde(default, rename = "output")]
    pub output_mapping: DataMapping,

    /// Step ids that must appear earlier in `steps`; validated at parse time
    /// only (this core executes steps in declared order, not DAG order).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Per-step timeout; inherits the execution timeout if absent.
    #[serde(default, with = "humantime_serde::option", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    #[serde(default, rename = "on_error")]
    pub error_handling: ErrorHandling,
}

/// Retry policy for a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay", with = "humantime_serde", rename = "delay")]
    pub initial_delay: Duration,

    #[serde(default = "default_backoff_multiplier", rename = "backoff")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Empty means "retry on any error".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_on: Vec<String>,
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay: default_max_delay(),
            retry_on: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// `next_delay(attempt)` is a pure function from (attempt_number, policy)
    /// to the next backoff delay, kept separate from the cancellable sleep
    /// for testability.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }

    /// Whether `error_message` matches this policy's `retry_on` predicate list.
    /// An empty list means "retry on any error"; matching is substring
    /// containment rather than exact equality (see DESIGN.md).
    pub fn matches(&self, error_message: &str) -> bool {
        self.retry_on.is_empty() || self.retry_on.iter().any(|p| error_message.contains(p.as_str()))
    }
}

fn default_strategy() -> String {
    "fail".to_string()
}

/// Mirrors the definition file's `on_error` block verbatim: `strategy` is
/// `"continue_on_error"` or `"fail"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandling {
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Declared but not consumed by the driver (see DESIGN.md).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_step: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_errors: Vec<String>,
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            fallback_step: None,
            ignore_errors: Vec::new(),
        }
    }
}

impl ErrorHandling {
    pub fn continues_on_error(&self) -> bool {
        self.strategy == "continue_on_error"
    }
}

impl Workflow {
    /// Construct an empty workflow (useful for tests and CLI scaffolding).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: default_version(),
            description: None,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            steps: Vec::new(),
            output_mapping: None,
            triggers: Vec::new(),
        }
    }

    /// Parse a YAML-encoded definition, the canonical format.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a JSON-encoded definition (accepted with an equivalent schema).
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Structural and step-shape validation. Step-type-specific validation
    /// is delegated to the registry, which owns knowledge of which executors
    /// are registered.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::validation(0, None, "workflow name must not be empty"));
        }
        if self.steps.is_empty() {
            return Err(OrchestratorError::validation(0, None, "workflow must declare at least one step"));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                return Err(OrchestratorError::validation(index, None, "step id must not be empty"));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(OrchestratorError::validation(
                    index,
                    Some(step.id.clone()),
                    format!("duplicate step id '{}'", step.id),
                ));
            }
            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(OrchestratorError::validation(
                        index,
                        Some(step.id.clone()),
                        format!("depends_on '{}' must reference a step declared earlier", dep),
                    ));
                }
            }
        }

        for trigger in &self.triggers {
            if trigger.trigger_type.trim().is_empty() {
                return Err(OrchestratorError::validation(0, None, "trigger type must not be empty"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform_step(id: &str, depends_on: Vec<&str>) -> Step {
        Step {
            id: id.to_string(),
            name: None,
            description: None,
            step_type: "transform".to_string(),
            config: serde_json::json!({"type": "map"}),
            input_mapping: HashMap::new(),
            output_mapping: HashMap::new(),
            depends_on: depends_on.into_iter().map(String::from).collect(),
            timeout: None,
            retry: None,
            error_handling: ErrorHandling::default(),
        }
    }

    #[test]
    fn rejects_empty_name() {
        let mut wf = Workflow::new("");
        wf.steps.push(transform_step("a", vec![]));
        assert!(wf.validate().is_err());
    }

    #[test]
    fn rejects_no_steps() {
        let wf = Workflow::new("wf");
        assert!(wf.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let mut wf = Workflow::new("wf");
        wf.steps.push(transform_step("a", vec![]));
        wf.steps.push(transform_step("a", vec![]));
        assert!(wf.validate().is_err());
    }

    #[test]
    fn rejects_forward_reference() {
        let mut wf = Workflow::new("wf");
        wf.steps.push(transform_step("a", vec!["b"]));
        wf.steps.push(transform_step("b", vec![]));
        assert!(wf.validate().is_err());
    }

    #[test]
    fn accepts_backward_reference() {
        let mut wf = Workflow::new("wf");
        wf.steps.push(transform_step("a", vec![]));
        wf.steps.push(transform_step("b", vec!["a"]));
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn yaml_roundtrip_is_idempotent() {
        let mut wf = Workflow::new("wf");
        wf.steps.push(transform_step("a", vec![]));
        let first = Workflow::from_yaml(&wf.to_yaml().unwrap()).unwrap();
        let second = Workflow::from_yaml(&first.to_yaml().unwrap()).unwrap();
        assert_eq!(first.name, second.name);
        assert_eq!(first.steps.len(), second.steps.len());
    }

    #[test]
    fn retry_policy_next_delay_respects_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(300),
            retry_on: vec![],
        };
        assert_eq!(policy.next_delay(0), Duration::from_millis(100));
        assert_eq!(policy.next_delay(1), Duration::from_millis(200));
        assert_eq!(policy.next_delay(2), Duration::from_millis(300)); // capped from 400ms
    }

    #[test]
    fn retry_policy_matches_substring() {
        let policy = RetryPolicy {
            retry_on: vec!["timeout".to_string()],
            ..Default::default()
        };
        assert!(policy.matches("request timeout after 30s"));
        assert!(!policy.matches("connection refused"));
    }

    #[test]
    fn retry_policy_empty_retry_on_matches_anything() {
        let policy = RetryPolicy::default();
        assert!(policy.matches("anything at all"));
    }
}
