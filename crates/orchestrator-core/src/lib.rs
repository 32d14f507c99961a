// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core of the workflow orchestrator: the definition model and
//! parser/validator, the expression evaluator, the executor
//! registry, the event bus, and the execution engine.
//!
//! Reference step executors live in `orchestrator-executors`; reference
//! event subscribers live in `orchestrator-events`.

pub mod bus;
pub mod context;
pub mod engine;
pub mod error;
pub mod execution;
pub mod expression;
pub mod registry;
pub mod retry;
pub mod workflow;

pub use bus::{EventBus, EventSubscriber};
pub use context::ExecutionContext;
pub use engine::{EngineConfig, SubmitConfig, WorkflowEngine};
pub use error::{OrchestratorError, Result};
pub use execution::{Event, EventType, Execution, ExecutionStatus, StepExecution, StepStatus};
pub use registry::{Executor, ExecutorError, ExecutorRegistry};
pub use workflow::{DataMapping, ErrorHandling, RetryPolicy, Step, Trigger, Workflow};
