//! Embedding providers backed by external services.
//!
//! - **[`OpenAIProvider`]** makes a single `POST /v1/embeddings` call and
//!   classifies failures into [`ProviderError`] variants.
//! - **[`RetryingProvider`]** wraps any provider with exponential backoff
//!   and absorbs the final failure into the deterministic mock vector, so
//!   callers always receive a full-length vector.
//!
//! Use [`create_provider`] to build the stack the configuration asks for.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited), 5xx, and network errors → retry
//! - Other 4xx and malformed responses → no retry
//! - Backoff doubles from `initial_backoff_ms`: 1s, 2s with the defaults
//! - After the last attempt → [`mock_embedding`]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use studybuddy_core::embedding::{mock_embedding, EmbeddingProvider, MockProvider};
use studybuddy_core::error::ProviderError;

use crate::config::EmbeddingConfig;

/// Embedding provider using an OpenAI-compatible API.
pub struct OpenAIProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/embeddings", config.url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body_text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        parse_openai_response(&json, self.dims)
    }
}

/// Map a non-success HTTP status to a provider error.
fn classify_status(status: u16, body: &str) -> ProviderError {
    let message = format!("OpenAI API error {}: {}", status, body);
    if status == 429 || (500..600).contains(&status) {
        ProviderError::Transient(message)
    } else {
        ProviderError::Rejected(message)
    }
}

/// Extract `data[0].embedding` and check its length.
fn parse_openai_response(json: &serde_json::Value, dims: usize) -> Result<Vec<f32>, ProviderError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            ProviderError::InvalidResponse("missing data[0].embedding".to_string())
        })?;

    let vector = embedding
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|x| x as f32)
                .ok_or_else(|| ProviderError::InvalidResponse(format!("non-numeric value {}", v)))
        })
        .collect::<Result<Vec<f32>, _>>()?;

    if vector.len() != dims {
        return Err(ProviderError::DimensionMismatch {
            expected: dims,
            got: vector.len(),
        });
    }
    Ok(vector)
}

/// Attempt count and backoff schedule for [`RetryingProvider`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * (1u32 << (attempt.saturating_sub(1)).min(5))
    }
}

/// Retries transient failures, then falls back to [`mock_embedding`].
pub struct RetryingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingProvider {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let dims = self.inner.dims();
        let mut attempt = 1;

        let last_err = loop {
            let err = match self.inner.embed(text).await {
                Ok(vector) if vector.len() == dims => return Ok(vector),
                Ok(vector) => ProviderError::DimensionMismatch {
                    expected: dims,
                    got: vector.len(),
                },
                Err(e) => e,
            };

            if !err.is_transient() || attempt >= self.policy.max_attempts {
                break err;
            }

            let delay = self.policy.backoff(attempt);
            warn!(
                attempt,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "embedding attempt failed"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        };

        warn!(
            model = self.inner.model_name(),
            attempts = attempt,
            error = %last_err,
            "falling back to mock embedding"
        );
        Ok(mock_embedding(text, dims))
    }
}

/// Build the provider stack for `config`.
///
/// `provider = "openai"` without `OPENAI_API_KEY` in the environment uses
/// the mock provider.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                let openai = OpenAIProvider::new(config, key)?;
                Ok(Arc::new(RetryingProvider::new(
                    Arc::new(openai),
                    RetryPolicy::from_config(config),
                )))
            }
            _ => {
                info!("OPENAI_API_KEY not set, using mock embeddings");
                Ok(Arc::new(MockProvider::new(config.dims)))
            }
        },
        "mock" => Ok(Arc::new(MockProvider::new(config.dims))),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}
