// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution and StepExecution records, plus the engine's lifecycle
//! event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Status of a whole execution. Transitions are monotonic; the three
/// terminal variants are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Status of one step attempt. A retried step produces one `StepExecution`
/// row per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One attempt of one step within one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: String,
    pub attempt: u32,
    pub status: StepStatus,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepExecution {
    pub fn started(execution_id: Uuid, step_id: impl Into<String>, attempt: u32, input: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            step_id: step_id.into(),
            attempt,
            status: StepStatus::Running,
            input,
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self, output: Value) {
        self.status = StepStatus::Completed;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn skip(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Skipped;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// One run of a workflow with a concrete input and configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,

    pub input: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<HashMap<String, Value>>,

    pub variables: HashMap<String, Value>,
    pub step_results: HashMap<String, Value>,

    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "humantime_serde::option", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl Execution {
    pub fn new(workflow_id: Uuid, input: HashMap<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: ExecutionStatus::Running,
            variables: input.clone(),
            input,
            output: None,
            step_results: HashMap::new(),
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            error: None,
            current_step: None,
            retry_count: 0,
        }
    }

    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.error = error;
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration = (now - self.started_at).to_std().ok();
    }
}

/// Closed vocabulary of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionFailed,
    ExecutionCancelled,
    StepStarted,
    StepCompleted,
    StepFailed,
}

impl EventType {
    /// Dotted wire form used by the event envelope and webhook payloads,
    /// e.g. `"execution.started"`.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::ExecutionStarted => "execution.started",
            Self::ExecutionCompleted => "execution.completed",
            Self::ExecutionFailed => "execution.failed",
            Self::ExecutionCancelled => "execution.cancelled",
            Self::StepStarted => "step.started",
            Self::StepCompleted => "step.completed",
            Self::StepFailed => "step.failed",
        }
    }
}

/// The bit-stable event envelope delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    pub fn new(event_type: EventType, execution_id: Uuid, workflow_id: Uuid, step_id: Option<String>, data: Value, error: Option<String>) -> Self {
        Self {
            event_type,
            execution_id,
            workflow_id,
            step_id,
            timestamp: Utc::now(),
            data,
            error,
        }
    }
}
