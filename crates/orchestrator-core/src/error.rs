// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the orchestration core.
//!
//! Each variant carries a stable `code()` so that callers and subscribers
//! can branch on error kind without string matching.

use std::time::Duration;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// All error conditions the core can surface.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The workflow definition failed structural or type-specific validation.
    #[error("validation failed at step {step_index} ({step_id:?}): {reason}")]
    Validation {
        step_index: usize,
        step_id: Option<String>,
        reason: String,
    },

    /// Admission was refused because the concurrency budget is exhausted.
    #[error("capacity exceeded: {active}/{max_concurrent} executions active")]
    CapacityExceeded { active: usize, max_concurrent: usize },

    /// No executor is registered for the step's `type`.
    #[error("no executor registered for step type '{0}'")]
    UnknownStepType(String),

    /// A step referenced in `depends_on` does not exist, or appears out of order.
    #[error("step '{step_id}' depends on unknown or forward-declared step '{dependency}'")]
    InvalidDependency { step_id: String, dependency: String },

    /// An executor failed while running a step.
    #[error("step '{step_id}' executor error: {message}")]
    ExecutorFailed { step_id: String, message: String },

    /// A step's context expired before the executor returned.
    #[error("step '{step_id}' timed out after {duration:?}")]
    Timeout { step_id: String, duration: Duration },

    /// The execution (or one of its steps) was cancelled.
    #[error("execution cancelled")]
    Cancelled,

    /// The requested execution id is not known to the engine.
    #[error("execution '{0}' not found")]
    NotFound(String),

    /// `cancel` was called on an execution already in a terminal state.
    #[error("execution '{0}' already terminal")]
    AlreadyTerminal(String),

    /// `shutdown` did not drain all active executions within its timeout.
    #[error("shutdown timed out with {0} execution(s) still active")]
    ShutdownTimeout(usize),

    /// Wraps a YAML (de)serialization failure.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wraps a JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for conditions that don't fit a more specific variant.
    #[error("{0}")]
    Other(String),
}

impl OrchestratorError {
    /// Stable machine-readable code for this error, matching the engine
    /// API's error identifiers where applicable.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::UnknownStepType(_) => "VALIDATION_FAILED",
            Self::InvalidDependency { .. } => "VALIDATION_FAILED",
            Self::ExecutorFailed { .. } => "EXECUTOR_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyTerminal(_) => "ALREADY_TERMINAL",
            Self::ShutdownTimeout(_) => "TIMEOUT",
            Self::Yaml(_) | Self::Json(_) => "VALIDATION_FAILED",
            Self::Other(_) => "INTERNAL",
        }
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    pub fn validation(step_index: usize, step_id: Option<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            step_index,
            step_id,
            reason: reason.into(),
        }
    }
}
