//! Inference gateway: the single path to the inference server.
//!
//! At most one completion is in flight per process. The gateway is built
//! once and shared via `Arc`; waiters are served in FIFO order (tokio's
//! mutex is fair), optionally bounded by a lock timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};

use crate::clients::{ChatRequest, InferenceBackend, LocalClient};
use crate::config::Config;
use crate::diagnostics::DiagnosticLog;
use crate::error::{InsightError, Result};

pub struct InferenceGateway {
    backend: Arc<dyn InferenceBackend>,
    lock: Mutex<()>,
    lock_timeout: Option<Duration>,
    diagnostics: Option<DiagnosticLog>,
}

impl InferenceGateway {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
            lock_timeout: None,
            diagnostics: None,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_diagnostics(mut self, log: Option<DiagnosticLog>) -> Self {
        self.diagnostics = log;
        self
    }

    /// Gateway backed by the configured HTTP inference server.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = LocalClient::new(&config.llm)?;
        tracing::info!("Inference endpoint: {}", client.endpoint());
        Ok(Self::new(Arc::new(client))
            .with_lock_timeout(config.llm.lock_timeout_ms.map(Duration::from_millis))
            .with_diagnostics(config.insights.debug_log_path.clone().map(DiagnosticLog::new)))
    }

    /// Whether an inference is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Run one completion under the inference lock and return the raw text.
    ///
    /// The lock guard is dropped on every exit path, including errors.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let waited = Instant::now();
        let _guard = self.acquire().await?;
        let wait_ms = waited.elapsed().as_millis() as u64;
        if wait_ms > 0 {
            tracing::debug!(purpose = request.purpose, wait_ms, "Acquired inference lock");
        }

        let started = Instant::now();
        let raw = self.backend.complete(request).await?;
        tracing::info!(
            purpose = request.purpose,
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_chars = raw.len(),
            "Inference completed"
        );

        if let Some(log) = &self.diagnostics {
            log.record(request.purpose, &raw).await;
        }
        Ok(raw)
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, ()>> {
        match self.lock_timeout {
            None => Ok(self.lock.lock().await),
            Some(timeout) => tokio::time::timeout(timeout, self.lock.lock())
                .await
                .map_err(|_| InsightError::UpstreamUnavailable {
                    message: format!(
                        "inference server busy: waited {}ms for the inference lock",
                        timeout.as_millis()
                    ),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Slow;

    #[async_trait]
    impl InferenceBackend for Slow {
        async fn complete(&self, _request: &ChatRequest) -> Result<String> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("done".to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl InferenceBackend for Failing {
        async fn complete(&self, _request: &ChatRequest) -> Result<String> {
            Err(InsightError::upstream("connection refused"))
        }
    }

    #[tokio::test]
    async fn lock_released_after_error() {
        let gateway = InferenceGateway::new(Arc::new(Failing));
        let err = gateway
            .complete(&ChatRequest::new("insight", "s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::UpstreamUnavailable { .. }));
        assert!(!gateway.is_busy());
    }

    #[tokio::test]
    async fn lock_timeout_reports_busy() {
        let gateway = Arc::new(
            InferenceGateway::new(Arc::new(Slow))
                .with_lock_timeout(Some(Duration::from_millis(20))),
        );
        let first = {
            let g = gateway.clone();
            tokio::spawn(async move { g.complete(&ChatRequest::new("insight", "s", "u")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gateway.is_busy());

        let second = gateway.complete(&ChatRequest::new("insight", "s", "u")).await;
        match second {
            Err(InsightError::UpstreamUnavailable { message }) => {
                assert!(message.contains("busy"))
            }
            other => panic!("expected busy error, got {:?}", other),
        }
        assert_eq!(first.await.unwrap().unwrap(), "done");
        assert!(!gateway.is_busy());
    }
}
