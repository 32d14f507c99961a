// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expression evaluator: resolves `${NAME}` references against the
//! execution's variable environment.
//!
//! Deliberately trivial — no dotted paths, no functions. A data mapping
//! is `{target_name: expression}`; evaluating it produces
//! `{target_name: resolved_value}`, omitting targets whose expression
//! references an undefined name.

use serde_json::Value;
use std::collections::HashMap;

use crate::workflow::DataMapping;

/// Resolves a `${NAME}` string against `variables` first, then `step_results`.
/// Anything else (a plain string, or a non-string value) is returned as-is.
fn resolve_expression(expr: &Value, variables: &HashMap<String, Value>, step_results: &HashMap<String, Value>) -> Option<Value> {
    match expr {
        Value::String(s) => match reference_name(s) {
            Some(name) => variables.get(name).or_else(|| step_results.get(name)).cloned(),
            None => Some(expr.clone()),
        },
        other => Some(other.clone()),
    }
}

/// Extracts `NAME` from a string of the exact form `${NAME}`; any other shape
/// (no braces, extra characters, dotted path) is treated as a literal.
fn reference_name(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    if inner.is_empty() || inner.contains(['$', '{', '}']) {
        None
    } else {
        Some(inner)
    }
}

/// Evaluate a data mapping. Pure: the same inputs always produce the same
/// output, and neither `variables` nor `step_results` is mutated.
pub fn evaluate(mapping: &DataMapping, variables: &HashMap<String, Value>, step_results: &HashMap<String, Value>) -> HashMap<String, Value> {
    let mut out = HashMap::with_capacity(mapping.len());
    for (target, expr) in mapping {
        if let Some(value) = resolve_expression(expr, variables, step_results) {
            out.insert(target.clone(), value);
        }
    }
    out
}
