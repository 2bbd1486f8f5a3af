use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value, json};
use std::time::Duration;

use super::traits::{ChatRequest, InferenceBackend};
use crate::config::LlmConfig;
use crate::error::{InsightError, Result};

/// OpenAI-compatible chat client for a locally hosted model (LM Studio, llama.cpp server)
#[derive(Clone, Debug)]
pub struct LocalClient {
    endpoint: String,
    model: String,
    max_tokens: u32,
    parameters: Map<String, Value>,
    max_retries: u32,
    retry_delay: Duration,
    client: Client,
}

impl LocalClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| InsightError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            endpoint: chat_completions_url(&config.endpoint),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            parameters: config.parameters.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the chat payload: `{model, messages, ...parameters, max_tokens, stream: false}`
    pub fn build_body(&self, request: &ChatRequest) -> Value {
        let mut body = Map::new();
        body.insert("model".to_string(), json!(self.model));
        body.insert(
            "messages".to_string(),
            json!([
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user}
            ]),
        );
        for (k, v) in &self.parameters {
            body.insert(k.clone(), v.clone());
        }
        body.insert(
            "max_tokens".to_string(),
            json!(request.max_tokens.unwrap_or(self.max_tokens)),
        );
        body.insert("stream".to_string(), json!(false));
        Value::Object(body)
    }

    async fn send_once(&self, body: &Value) -> std::result::Result<String, Attempt> {
        let res = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let message = format!("Failed to connect to local model endpoint: {}", e);
                if e.is_connect() || e.is_timeout() {
                    Attempt::Retryable(message)
                } else {
                    Attempt::Fatal(message)
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let message = format!("Local model returned error {}: {}", status, text);
            return Err(if status.is_server_error() {
                Attempt::Retryable(message)
            } else {
                Attempt::Fatal(message)
            });
        }

        let response_json: Value = res.json().await.map_err(|e| {
            Attempt::Fatal(format!("Failed to parse local model response: {}", e))
        })?;

        extract_content(&response_json).ok_or_else(|| {
            Attempt::Fatal(format!(
                "Local model response has no message content: {}",
                response_json
            ))
        })
    }
}

enum Attempt {
    Retryable(String),
    Fatal(String),
}

#[async_trait]
impl InferenceBackend for LocalClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = self.build_body(request);
        tracing::debug!(
            purpose = request.purpose,
            prompt_chars = request.system.len() + request.user.len(),
            "Sending chat completion to {}",
            self.endpoint
        );

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(content) => return Ok(content),
                Err(Attempt::Retryable(message)) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Inference attempt {}/{} failed: {}",
                        attempt,
                        self.max_retries + 1,
                        message
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(Attempt::Retryable(message)) | Err(Attempt::Fatal(message)) => {
                    return Err(InsightError::UpstreamUnavailable { message });
                }
            }
        }
    }
}

/// Ensure the endpoint points at the chat-completions route.
pub fn chat_completions_url(endpoint: &str) -> String {
    if endpoint.ends_with("/v1/chat/completions") {
        endpoint.to_string()
    } else if endpoint.trim_end_matches('/').ends_with("/v1") {
        format!("{}/chat/completions", endpoint.trim_end_matches('/'))
    } else {
        format!("{}/v1/chat/completions", endpoint.trim_end_matches('/'))
    }
}

fn extract_content(response: &Value) -> Option<String> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
}
