// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by the reference executors, converted into the
//! core's executor-local [`orchestrator_core::ExecutorError`] at the trait
//! boundary.

use orchestrator_core::ExecutorError;

#[derive(Debug, thiserror::Error)]
pub enum StepExecutorError {
    #[error("invalid step config: {0}")]
    InvalidConfig(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("script exited with code {exit_code}: stdout={stdout:?} stderr={stderr:?}")]
    NonZeroExit { exit_code: i32, stdout: String, stderr: String },

    #[error("cancelled")]
    Cancelled,
}

impl From<StepExecutorError> for ExecutorError {
    fn from(value: StepExecutorError) -> Self {
        ExecutorError::new(value.to_string())
    }
}
