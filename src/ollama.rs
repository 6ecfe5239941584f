//! Minimal HTTP client for the Ollama API.
//!
//! Shared by the embedding provider and the chat model. Connection settings
//! come from an explicit [`OllamaConfig`] value.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, ... (capped at 32s)

use anyhow::Result;
use std::time::Duration;

use crate::config::OllamaConfig;
use crate::error::DocuChatError;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config: config.clone(),
            http,
        })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// POST `body` to `endpoint` and return the parsed JSON response.
    /// Failures are reported as [`DocuChatError::Collaborator`] for `service`.
    pub async fn post_json(
        &self,
        service: &'static str,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = self.url(endpoint);
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(service, attempt, ?delay, "retrying Ollama request");
                tokio::time::sleep(delay).await;
            }

            let resp = self.http.post(&url).json(body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<serde_json::Value>().await.map_err(|e| {
                            DocuChatError::collaborator(
                                service,
                                format!("invalid JSON from {}: {}", url, e),
                            )
                            .into()
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = DocuChatError::collaborator(
                        service,
                        format!("Ollama API error {}: {}", status, body_text),
                    );
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(service, %status, "transient Ollama error");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err.into());
                }
                Err(e) => {
                    tracing::warn!(service, error = %e, "Ollama connection error");
                    last_err = Some(DocuChatError::collaborator(
                        service,
                        format!(
                            "Ollama connection error (is Ollama running at {}?): {}",
                            self.config.base_url, e
                        ),
                    ));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| DocuChatError::collaborator(service, "failed after retries"))
            .into())
    }
}
