// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metrics subscriber: increments lifecycle counters and observes
//! duration histograms keyed by workflow id, step id, and event type.
//! Uses the `metrics` facade; wiring an exporter (the dashboard/scraping
//! surface) is out of scope here.

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::{counter, histogram};
use orchestrator_core::{Event, EventSubscriber, EventType};
use uuid::Uuid;

/// Tracks in-flight start timestamps so a terminal event can compute an
/// elapsed-seconds observation without re-reading the execution record.
#[derive(Default)]
pub struct MetricsSubscriber {
    execution_started_at: DashMap<Uuid, std::time::Instant>,
    step_started_at: DashMap<(Uuid, String), std::time::Instant>,
}

impl MetricsSubscriber {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventSubscriber for MetricsSubscriber {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn handle(&self, event: &Event) {
        let workflow_id = event.workflow_id.to_string();

        match event.event_type {
            EventType::ExecutionStarted => {
                self.execution_started_at.insert(event.execution_id, std::time::Instant::now());
                counter!("executions_started_total", "workflow_id" => workflow_id).increment(1);
            }
            EventType::ExecutionCompleted | EventType::ExecutionFailed | EventType::ExecutionCancelled => {
                let metric = match event.event_type {
                    EventType::ExecutionCompleted => "executions_completed_total",
                    EventType::ExecutionFailed => "executions_failed_total",
                    _ => "executions_cancelled_total",
                };
                counter!(metric.to_string(), "workflow_id" => workflow_id.clone()).increment(1);
                if let Some((_, started)) = self.execution_started_at.remove(&event.execution_id) {
                    histogram!("execution_duration_seconds", "workflow_id" => workflow_id).record(started.elapsed().as_secs_f64());
                }
            }
            EventType::StepStarted => {
                if let Some(step_id) = &event.step_id {
                    self.step_started_at.insert((event.execution_id, step_id.clone()), std::time::Instant::now());
                    counter!("steps_started_total", "workflow_id" => workflow_id, "step_id" => step_id.clone()).increment(1);
                }
            }
            EventType::StepCompleted | EventType::StepFailed => {
                let Some(step_id) = &event.step_id else { return };
                let metric = if matches!(event.event_type, EventType::StepCompleted) { "steps_completed_total" } else { "steps_failed_total" };
                counter!(metric.to_string(), "workflow_id" => workflow_id.clone(), "step_id" => step_id.clone()).increment(1);
                if let Some((_, started)) = self.step_started_at.remove(&(event.execution_id, step_id.clone())) {
                    histogram!("step_duration_seconds", "workflow_id" => workflow_id, "step_id" => step_id.clone()).record(started.elapsed().as_secs_f64());
                }
            }
        }
    }
}
