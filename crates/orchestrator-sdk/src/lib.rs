// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External Interfaces: the language-neutral request/response contracts
//! for the Engine API's `submit`/`cancel`/`get`/`list`/`shutdown`
//! operations. These are wire DTOs only — no transport; a REST/WebSocket
//! layer (out of scope here) would serialize these over HTTP, and a CLI can
//! call them directly against an in-process [`orchestrator_core::WorkflowEngine`].

pub mod requests;

pub use requests::{
    CancelRequest, CancelResponse, GetRequest, ListFilters, ListRequest, ListResponse, ShutdownRequest, ShutdownResponse, SubmitRequest, SubmitResponse,
};
