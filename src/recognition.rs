//! Recognition client: one call per image to the external vision service.
//!
//! The service is reached through the [`RecognitionBackend`] trait so the
//! orchestrator (and the tests) never care whether markup comes from a live
//! endpoint or a scripted mock. The shipped implementation,
//! [`HttpRecognitionClient`], speaks the OpenAI-compatible chat-completions
//! wire format: a system directive, a user turn carrying the image as a
//! base64 data URL, and an unstructured text response assumed to contain
//! markup (possibly fenced — sanitizing is the caller's job).
//!
//! ## Retry strategy
//!
//! HTTP 429/5xx responses are transient and frequent under concurrent load.
//! A retry with exponential backoff (doubling from `retry_backoff_ms`) lives
//! *inside* one call; the orchestration layer above never re-dispatches an
//! item on its own.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{DocFormat, JobConfig};
use crate::error::Snap2TexError;
use crate::outcome::ImageInput;
use crate::prompts;

const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";

/// Boundary to the external vision service.
///
/// Both operations return raw response text; stripping fences is done by
/// [`crate::sanitize::sanitize_markup`] downstream.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Transcribe one page image into markup of the given format.
    async fn transcribe(
        &self,
        image: &ImageInput,
        format: DocFormat,
        context: Option<&str>,
    ) -> Result<String, Snap2TexError>;

    /// Single-shot text rewrite used by the fix path: `directive` is the
    /// system message, `request` the user message.
    async fn rewrite(&self, directive: &str, request: &str) -> Result<String, Snap2TexError>;
}

/// Resolve the backend for a job: a pre-built one from the config wins,
/// otherwise an HTTP client is constructed from config + environment.
pub fn resolve_backend(
    config: &JobConfig,
) -> Result<std::sync::Arc<dyn RecognitionBackend>, Snap2TexError> {
    if let Some(ref backend) = config.backend {
        return Ok(std::sync::Arc::clone(backend));
    }
    Ok(std::sync::Arc::new(HttpRecognitionClient::from_config(
        config,
    )?))
}

/// Recognition over an OpenAI-compatible chat-completions endpoint.
pub struct HttpRecognitionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    vision_model: String,
    text_model: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl HttpRecognitionClient {
    /// Build a client from the job config, falling back to the
    /// `SNAP2TEX_BASE_URL` / `SNAP2TEX_API_KEY` / `XAI_API_KEY` environment.
    pub fn from_config(config: &JobConfig) -> Result<Self, Snap2TexError> {
        let base_url = config
            .api_base_url
            .clone()
            .or_else(|| std::env::var("SNAP2TEX_BASE_URL").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("SNAP2TEX_API_KEY").ok().filter(|s| !s.is_empty()))
            .or_else(|| std::env::var("XAI_API_KEY").ok().filter(|s| !s.is_empty()))
            .ok_or_else(|| Snap2TexError::RecognitionNotConfigured {
                hint: "Set SNAP2TEX_API_KEY (or XAI_API_KEY), or pass an api_key in the config."
                    .to_string(),
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| Snap2TexError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            vision_model: config.vision_model.clone(),
            text_model: config.text_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }

    /// POST one chat-completions request, retrying transient failures.
    async fn complete(&self, body: serde_json::Value) -> Result<String, Snap2TexError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_err = String::from("no attempt made");

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!("Recognition retry {}/{} after {}ms", attempt, self.max_retries, backoff);
                sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_err = format!("request failed: {e}");
                    continue; // transport errors are worth a retry
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: ChatResponse = response.json().await.map_err(|e| {
                    Snap2TexError::Internal(format!("malformed recognition response: {e}"))
                })?;
                let content = parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .unwrap_or_default();
                debug!("Recognition response: {} chars", content.len());
                return Ok(content);
            }

            let text = response.text().await.unwrap_or_default();
            last_err = format!("HTTP {status}: {}", text.chars().take(200).collect::<String>());
            let retryable = status.as_u16() == 429 || status.is_server_error();
            if !retryable {
                break;
            }
        }

        Err(Snap2TexError::Internal(format!(
            "recognition call failed: {last_err}"
        )))
    }
}

#[async_trait]
impl RecognitionBackend for HttpRecognitionClient {
    async fn transcribe(
        &self,
        image: &ImageInput,
        format: DocFormat,
        context: Option<&str>,
    ) -> Result<String, Snap2TexError> {
        let data_url = format!(
            "data:{};base64,{}",
            image.mime_type(),
            STANDARD.encode(image.bytes())
        );
        let body = serde_json::json!({
            "model": self.vision_model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": prompts::system_directive(format) },
                { "role": "user", "content": [
                    { "type": "text", "text": prompts::transcribe_request(format, context) },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]}
            ]
        });
        self.complete(body).await
    }

    async fn rewrite(&self, directive: &str, request: &str) -> Result<String, Snap2TexError> {
        let body = serde_json::json!({
            "model": self.text_model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": directive },
                { "role": "user", "content": request }
            ]
        });
        self.complete(body).await
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_a_config_error() {
        // Force the env-free path by clearing any inherited keys.
        std::env::remove_var("SNAP2TEX_API_KEY");
        std::env::remove_var("XAI_API_KEY");
        let config = JobConfig::default();
        match HttpRecognitionClient::from_config(&config) {
            Err(Snap2TexError::RecognitionNotConfigured { hint }) => {
                assert!(hint.contains("SNAP2TEX_API_KEY"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected RecognitionNotConfigured"),
        }
    }

    #[test]
    fn explicit_key_and_url_win() {
        let config = JobConfig::builder()
            .api_key("test-key")
            .api_base_url("http://localhost:9999/v1/")
            .build()
            .unwrap();
        let client = HttpRecognitionClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:9999/v1");
        assert_eq!(client.api_key, "test-key");
    }

    #[test]
    fn response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"\\alpha"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "\\alpha");
    }
}
