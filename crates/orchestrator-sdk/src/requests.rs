// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response DTOs for each Engine API operation: `submit`, `cancel`,
//! `get`, `list`, `shutdown`.

use orchestrator_core::{Execution, Workflow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// `submit(workflow, input, config) -> Execution | CAPACITY_EXCEEDED | VALIDATION_FAILED`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub workflow: Workflow,
    #[serde(default)]
    pub input: HashMap<String, Value>,
    /// Overrides the engine's default execution timeout for this submission.
    #[serde(default, with = "humantime_serde::option", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// On success, the freshly admitted [`Execution`] (status `running`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub execution: Execution,
}

/// `cancel(execution_id) -> ok | NOT_FOUND | ALREADY_TERMINAL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub execution_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub acknowledged: bool,
}

/// `get(execution_id) -> Execution | NOT_FOUND`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub execution_id: Uuid,
}

/// `list(filters) -> page of Executions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub filters: ListFilters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub executions: Vec<Execution>,
    pub total: usize,
}

/// `shutdown(timeout) -> ok | TIMEOUT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownRequest {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub drained: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_request_roundtrips_through_json() {
        let request = SubmitRequest {
            workflow: Workflow::new("wf"),
            input: HashMap::from([("name".to_string(), serde_json::json!("Ada"))]),
            timeout: Some(Duration::from_secs(60)),
        };
        let json = serde_json::to_string(&request).unwrap();
        let parsed: SubmitRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.workflow.name, "wf");
        assert_eq!(parsed.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn list_filters_default_to_unbounded() {
        let filters = ListFilters::default();
        assert!(filters.workflow_id.is_none());
        assert!(filters.page.is_none());
    }

    #[test]
    fn shutdown_request_parses_duration_literal() {
        let request: ShutdownRequest = serde_json::from_str(r#"{"timeout":"30s"}"#).unwrap();
        assert_eq!(request.timeout, Duration::from_secs(30));
    }
}
