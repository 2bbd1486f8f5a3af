use async_trait::async_trait;

use crate::error::Result;

/// One chat-completion call: a system instruction plus a single user turn
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Label recorded in the diagnostic log ("insight", "normalize")
    pub purpose: &'static str,
    pub system: String,
    pub user: String,
    /// Overrides the backend's configured token cap
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(purpose: &'static str, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            purpose,
            system: system.into(),
            user: user.into(),
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A text-generation backend. Implementations return the raw assistant text.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}
