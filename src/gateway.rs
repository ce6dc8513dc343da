//! Text-Generation Gateway — a single "prompt in, text out" call
//! against an Ollama endpoint.
//!
//! Failures never escape as panics or untyped faults: they are logged
//! here with the endpoint for diagnosis and surfaced as a typed
//! [`GatewayError`] the caller treats as "no output available".

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// The external text-generation capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError>;
}

/// Ollama-backed generator. The HTTP call carries an explicit timeout
/// so a stalled model server cannot wedge a sweep.
pub struct OllamaGateway {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Request {
                endpoint: config.endpoint.clone(),
                reason: format!("client build: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl TextGenerator for OllamaGateway {
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let url = format!("{}/api/chat", self.endpoint);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(endpoint = %self.endpoint, error = %e, "Text generation request failed");
                GatewayError::Request {
                    endpoint: self.endpoint.clone(),
                    reason: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(endpoint = %self.endpoint, %status, "Text generation returned error status");
            return Err(GatewayError::InvalidResponse {
                endpoint: self.endpoint.clone(),
                reason: format!("status {status}"),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!(endpoint = %self.endpoint, error = %e, "Text generation response unreadable");
            GatewayError::InvalidResponse {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(parsed.message.content)
    }
}
