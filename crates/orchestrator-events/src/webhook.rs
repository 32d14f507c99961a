// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook subscriber: for each configured webhook whose filters match,
//! signs the event payload with HMAC-SHA256 and POSTs it, retrying
//! non-2xx/transport failures up to three times with 1s/2s/3s spacing
//! before dropping and logging.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use orchestrator_core::{Event, EventSubscriber, EventType};
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

/// Delay before each of the three retries, after the initial send fails.
const RETRY_DELAYS: [Duration; 3] = [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3)];
const SIGNATURE_HEADER: &str = "X-Magic-Flow-Signature";

/// One configured delivery target.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub id: Uuid,
    pub url: String,
    pub secret: String,
    pub enabled: bool,
    /// Empty means "all event types".
    pub event_types: Vec<EventType>,
    /// Empty means "all workflows".
    pub workflow_ids: Vec<Uuid>,
}

impl WebhookConfig {
    fn matches(&self, event: &Event) -> bool {
        self.enabled
            && (self.event_types.is_empty() || self.event_types.contains(&event.event_type))
            && (self.workflow_ids.is_empty() || self.workflow_ids.contains(&event.workflow_id))
    }
}

/// Signs `body` with `secret` using HMAC-SHA256, returning the header value
/// in `sha256=<hex>` form. The receiving side is expected to compare it in
/// constant time; this side just computes it.
fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Abstracts the POST call so delivery can be unit-tested without a real
/// HTTP transport in the loop.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &str, body: &[u8], signature: &str) -> std::result::Result<u16, String>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(&self, url: &str, body: &[u8], signature: &str) -> std::result::Result<u16, String> {
        let response = self
            .client
            .post(url)
            .header(SIGNATURE_HEADER, signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.status().as_u16())
    }
}

pub struct WebhookSubscriber {
    webhooks: Vec<WebhookConfig>,
    transport: Box<dyn WebhookTransport>,
}

impl WebhookSubscriber {
    pub fn new(webhooks: Vec<WebhookConfig>) -> Self {
        Self {
            webhooks,
            transport: Box::new(ReqwestTransport::new()),
        }
    }

    pub fn with_transport(webhooks: Vec<WebhookConfig>, transport: Box<dyn WebhookTransport>) -> Self {
        Self { webhooks, transport }
    }

    async fn deliver(&self, webhook: &WebhookConfig, event: &Event) {
        let body = match serde_json::to_vec(event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(webhook_id = %webhook.id, error = %e, "failed to serialise webhook payload");
                return;
            }
        };
        let signature = sign(&webhook.secret, &body);

        // Attempt 0 is the initial send; attempts 1-3 are the three retries,
        // each preceded by the matching entry in RETRY_DELAYS.
        for attempt in 0..=RETRY_DELAYS.len() {
            match self.transport.post(&webhook.url, &body, &signature).await {
                Ok(status) if (200..300).contains(&status) => return,
                Ok(status) => {
                    tracing::warn!(webhook_id = %webhook.id, attempt, status, "webhook delivery returned non-2xx");
                }
                Err(e) => {
                    tracing::warn!(webhook_id = %webhook.id, attempt, error = %e, "webhook delivery transport error");
                }
            }
            if let Some(delay) = RETRY_DELAYS.get(attempt) {
                tokio::time::sleep(*delay).await;
            }
        }
        tracing::error!(webhook_id = %webhook.id, event_type = event.event_type.wire_name(), "webhook delivery exhausted retries, dropping");
    }
}

#[async_trait]
impl EventSubscriber for WebhookSubscriber {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn handle(&self, event: &Event) {
        for webhook in &self.webhooks {
            if webhook.matches(event) {
                self.deliver(webhook, event).await;
            }
        }
    }
}
