// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference step executors: HTTP, shell-script, data transform, delay,
//! and conditional. Each implements [`orchestrator_core::Executor`] and is
//! otherwise independent of the others.

pub mod conditional;
pub mod delay;
pub mod error;
pub mod http;
pub mod script;
pub mod transform;

pub use conditional::ConditionalExecutor;
pub use delay::DelayExecutor;
pub use http::HttpExecutor;
pub use script::ScriptExecutor;
pub use transform::TransformExecutor;

use orchestrator_core::ExecutorRegistry;
use std::sync::Arc;

/// Registers the full reference set against `registry`.
pub fn register_all(registry: &ExecutorRegistry) {
    registry.register(Arc::new(HttpExecutor::new()));
    registry.register(Arc::new(ScriptExecutor));
    registry.register(Arc::new(TransformExecutor));
    registry.register(Arc::new(DelayExecutor));
    registry.register(Arc::new(ConditionalExecutor));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_all_registers_the_reference_set() {
        let registry = ExecutorRegistry::new();
        register_all(&registry);
        let mut types = registry.registered_types();
        types.sort();
        assert_eq!(types, vec!["conditional", "delay", "http", "script", "transform"]);
    }
}
