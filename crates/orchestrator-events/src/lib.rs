// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference event subscribers: persistence, metrics, and webhook
//! delivery. Each implements [`orchestrator_core::EventSubscriber`] and
//! registers independently against an [`orchestrator_core::EventBus`].

pub mod metrics;
pub mod persistence;
pub mod webhook;

pub use metrics::MetricsSubscriber;
pub use persistence::{ExecutionRecord, ExecutionEventRow, ExecutionStore, InMemoryExecutionStore, PersistenceSubscriber};
pub use webhook::{ReqwestTransport, WebhookConfig, WebhookSubscriber, WebhookTransport};
