// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence subscriber: on each event, persists an `ExecutionEvent`
//! row and updates the owning execution's status/timings.
//!
//! The relational storage layer itself is an out-of-scope external
//! collaborator; [`ExecutionStore`] is the seam this subscriber writes
//! through, with [`InMemoryExecutionStore`] as the reference implementation
//! a real SQL-backed store would replace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use orchestrator_core::{Event, EventSubscriber, EventType};
use std::sync::Arc;
use uuid::Uuid;

/// One persisted row of the event log (the `Event` envelope, stored
/// verbatim).
#[derive(Debug, Clone)]
pub struct ExecutionEventRow {
    pub event_type: EventType,
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub step_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

/// The subset of `Execution` fields the persistence subscriber maintains:
/// status and timings, not the live variable environment.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub workflow_id: Uuid,
    pub status: &'static str,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Storage seam for persisted events and execution records. Write failures
/// are the store's own concern to surface; the subscriber logs and does not
/// block further delivery on them.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert_event(&self, row: ExecutionEventRow) -> std::result::Result<(), String>;
    async fn upsert_execution(&self, execution_id: Uuid, record: ExecutionRecord) -> std::result::Result<(), String>;
}

/// In-process reference store. Production deployments back this seam with
/// a relational persistence layer, out of scope here.
#[derive(Default)]
pub struct InMemoryExecutionStore {
    events: DashMap<Uuid, Vec<ExecutionEventRow>>,
    executions: DashMap<Uuid, ExecutionRecord>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_for(&self, execution_id: Uuid) -> Vec<ExecutionEventRow> {
        self.events.get(&execution_id).map(|entry| entry.value().clone()).unwrap_or_default()
    }

    pub fn execution(&self, execution_id: Uuid) -> Option<ExecutionRecord> {
        self.executions.get(&execution_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn insert_event(&self, row: ExecutionEventRow) -> std::result::Result<(), String> {
        self.events.entry(row.execution_id).or_default().push(row);
        Ok(())
    }

    async fn upsert_execution(&self, execution_id: Uuid, record: ExecutionRecord) -> std::result::Result<(), String> {
        self.executions.insert(execution_id, record);
        Ok(())
    }
}

/// Persists every event to `store` and keeps the execution's status/timings
/// row in sync. Write failures log and never block further delivery, per
/// the at-least-once, best-effort subscriber contract.
pub struct PersistenceSubscriber {
    store: Arc<dyn ExecutionStore>,
}

impl PersistenceSubscriber {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    fn status_for(event_type: EventType) -> Option<&'static str> {
        match event_type {
            EventType::ExecutionStarted => Some("running"),
            EventType::ExecutionCompleted => Some("completed"),
            EventType::ExecutionFailed => Some("failed"),
            EventType::ExecutionCancelled => Some("cancelled"),
            EventType::StepStarted | EventType::StepCompleted | EventType::StepFailed => None,
        }
    }
}

#[async_trait]
impl EventSubscriber for PersistenceSubscriber {
    fn name(&self) -> &str {
        "persistence"
    }

    async fn handle(&self, event: &Event) {
        let row = ExecutionEventRow {
            event_type: event.event_type,
            execution_id: event.execution_id,
            workflow_id: event.workflow_id,
            step_id: event.step_id.clone(),
            timestamp: event.timestamp,
            error: event.error.clone(),
        };
        if let Err(e) = self.store.insert_event(row).await {
            tracing::error!(execution_id = %event.execution_id, error = %e, "failed to persist execution event");
        }

        if let Some(status) = Self::status_for(event.event_type) {
            let record = ExecutionRecord {
                workflow_id: event.workflow_id,
                status,
                started_at: matches!(event.event_type, EventType::ExecutionStarted).then_some(event.timestamp),
                completed_at: (!matches!(event.event_type, EventType::ExecutionStarted)).then_some(event.timestamp),
                error: event.error.clone(),
            };
            if let Err(e) = self.store.upsert_execution(event.execution_id, record).await {
                tracing::error!(execution_id = %event.execution_id, error = %e, "failed to upsert execution record");
            }
        }
    }
}
