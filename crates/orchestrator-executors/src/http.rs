// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP executor: issues one HTTP request per step attempt.

use async_trait::async_trait;
use orchestrator_core::{ExecutionContext, Executor, ExecutorError, OrchestratorError, Result, Step};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::StepExecutorError;

fn default_method() -> String {
    "GET".to_string()
}

/// Per-attempt transport timeout. The engine additionally bounds the whole
/// attempt by the step's configured timeout.
const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct HttpConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    params: HashMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
}

fn parse_method(raw: &str) -> std::result::Result<Method, String> {
    Method::from_bytes(raw.to_uppercase().as_bytes()).map_err(|_| format!("unsupported http method '{raw}'"))
}

pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder().timeout(TRANSPORT_TIMEOUT).build().expect("building the reqwest client must not fail"),
        }
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    fn step_type(&self) -> &'static str {
        "http"
    }

    fn validate(&self, step: &Step) -> Result<()> {
        let config: HttpConfig = serde_json::from_value(step.config.clone()).map_err(|e| OrchestratorError::validation(0, Some(step.id.clone()), format!("invalid http config: {e}")))?;
        if config.url.trim().is_empty() {
            return Err(OrchestratorError::validation(0, Some(step.id.clone()), "http executor requires a non-empty url"));
        }
        parse_method(&config.method).map_err(|reason| OrchestratorError::validation(0, Some(step.id.clone()), reason))?;
        Ok(())
    }

    async fn execute(&self, _ctx: &ExecutionContext, step: &Step, input: Value) -> std::result::Result<Value, ExecutorError> {
        let config: HttpConfig = serde_json::from_value(step.config.clone()).map_err(|e| StepExecutorError::InvalidConfig(e.to_string()))?;
        let method = parse_method(&config.method).map_err(StepExecutorError::InvalidConfig)?;

        let mut request = self.client.request(method.clone(), &config.url).query(&config.params);
        for (key, value) in &config.headers {
            request = request.header(key, value);
        }
        if method != Method::GET {
            let body = config.body.clone().unwrap_or(input);
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| StepExecutorError::Transport(e.to_string()))?;
        let status = response.status();
        let content_type = response.headers().get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(|s| s.to_string());
        let headers: HashMap<String, String> = response.headers().iter().filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string()))).collect();

        let body_text = response.text().await.map_err(|e| StepExecutorError::Transport(e.to_string()))?;

        if status.as_u16() >= 400 {
            return Err(StepExecutorError::HttpStatus { status: status.as_u16(), body: body_text }.into());
        }

        let mut output = serde_json::Map::new();
        output.insert("status_code".to_string(), json!(status.as_u16()));
        output.insert("headers".to_string(), json!(headers));
        output.insert("body".to_string(), json!(body_text));
        if content_type.map(|ct| ct.contains("application/json")).unwrap_or(false) {
            if let Ok(parsed) = serde_json::from_str::<Value>(&body_text) {
                output.insert("json".to_string(), parsed);
            }
        }
        Ok(Value::Object(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::workflow::{ErrorHandling, RetryPolicy};
    use std::collections::HashMap as Map;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn step(config: Value) -> Step {
        Step {
            id: "s".to_string(),
            name: None,
            description: None,
            step_type: "http".to_string(),
            config,
            input_mapping: Map::new(),
            output_mapping: Map::new(),
            depends_on: vec![],
            timeout: None,
            retry: None::<RetryPolicy>,
            error_handling: ErrorHandling::default(),
        }
    }

    #[test]
    fn validate_rejects_missing_url() {
        let executor = HttpExecutor::new();
        let err = executor.validate(&step(json!({}))).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn validate_rejects_unsupported_method() {
        let executor = HttpExecutor::new();
        let err = executor.validate(&step(json!({"url": "http://example.com", "method": "WIBBLE!!"}))).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn validate_accepts_minimal_config() {
        let executor = HttpExecutor::new();
        assert!(executor.validate(&step(json!({"url": "http://example.com"}))).is_ok());
    }

    #[tokio::test]
    async fn executes_get_and_parses_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let executor = HttpExecutor::new();
        let url = format!("{}/widgets", server.uri());
        let ctx = ExecutionContext::new();
        let output = executor.execute(&ctx, &step(json!({"url": url})), Value::Null).await.unwrap();
        assert_eq!(output["status_code"], json!(200));
        assert_eq!(output["json"], json!({"ok": true}));
    }

    #[tokio::test]
    async fn non_2xx_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/missing")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

        let executor = HttpExecutor::new();
        let url = format!("{}/missing", server.uri());
        let ctx = ExecutionContext::new();
        let result = executor.execute(&ctx, &step(json!({"url": url})), Value::Null).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn post_sends_input_as_body_when_config_body_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/items")).respond_with(ResponseTemplate::new(201).set_body_json(json!({"created": true}))).mount(&server).await;

        let executor = HttpExecutor::new();
        let url = format!("{}/items", server.uri());
        let ctx = ExecutionContext::new();
        let output = executor.execute(&ctx, &step(json!({"url": url, "method": "POST"})), json!({"name": "widget"})).await.unwrap();
        assert_eq!(output["status_code"], json!(201));
    }
}
