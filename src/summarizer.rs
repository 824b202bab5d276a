//! Summarization service client.
//!
//! The engine only needs the [`Summarizer`] trait. [`HttpSummarizer`] talks to
//! an HTTP endpoint that accepts `{"text": ..., "parameters": {...}}`, such as
//! a small proxy in front of a hosted summarization model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::{FeedError, Result};

/// Longest error body echoed back in an error message.
const MAX_ERROR_BODY: usize = 200;

/// Generation parameters forwarded to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummarizeOptions {
    /// Upper bound on summary length.
    pub max_length: u32,
    /// Lower bound on summary length.
    pub min_length: u32,
    /// Sample instead of greedy decoding.
    pub do_sample: bool,
}

impl Default for SummarizeOptions {
    fn default() -> Self {
        Self::from(&SummarizerConfig::default())
    }
}

impl From<&SummarizerConfig> for SummarizeOptions {
    fn from(config: &SummarizerConfig) -> Self {
        Self {
            max_length: config.max_length,
            min_length: config.min_length,
            do_sample: false,
        }
    }
}

/// Produces a summary for a piece of text.
///
/// Implementations must be safe to retry: calling twice has no effect beyond
/// returning text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `text`. Failures are reported as [`FeedError::Summarizer`].
    async fn summarize(&self, text: &str, options: &SummarizeOptions) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    text: &'a str,
    parameters: &'a SummarizeOptions,
}

/// HTTP summarizer client.
pub struct HttpSummarizer {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
    max_input_chars: usize,
}

impl HttpSummarizer {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Config`] if no endpoint is configured.
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(FeedError::Config(
                "summarizer.endpoint is not set (or FEEDSUM_SUMMARIZER_URL)".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout() + Duration::from_secs(5))
            .build()
            .map_err(|e| FeedError::Summarizer(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_token: Some(config.api_token.clone()).filter(|t| !t.is_empty()),
            max_input_chars: config.max_input_chars,
        })
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, text: &str, options: &SummarizeOptions) -> Result<String> {
        let text = clip(text, self.max_input_chars);
        debug!("Requesting summary ({} chars)", text.chars().count());

        let mut request = self.client.post(&self.endpoint).json(&SummarizeRequest {
            text,
            parameters: options,
        });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FeedError::Summarizer(format!("request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Summarizer(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(FeedError::Summarizer(format!(
                "HTTP {}: {}",
                status,
                error_message(&body)
            )));
        }

        extract_summary(&body)
            .ok_or_else(|| FeedError::Summarizer("response contained no summary".to_string()))
    }
}

/// Pull the summary out of the shapes summarization services answer with:
/// `{"summary"}`, `{"summary_text"}`, `[{"summary_text"}]` or a JSON string.
fn extract_summary(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let summary = match &value {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => items
            .first()
            .and_then(|first| first.get("summary_text"))
            .and_then(Value::as_str),
        Value::Object(map) => map
            .get("summary")
            .or_else(|| map.get("summary_text"))
            .and_then(Value::as_str),
        _ => None,
    }?;

    let summary = summary.trim();
    (!summary.is_empty()).then(|| summary.to_string())
}

/// Best human-readable cause from an error body.
fn error_message(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        let error = v.get("error")?;
        let details = v.get("details").and_then(Value::as_str);
        Some(match (error.as_str(), details) {
            (Some(e), Some(d)) => format!("{e} ({d})"),
            (Some(e), None) => e.to_string(),
            _ => error.to_string(),
        })
    });
    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    clip(&message, MAX_ERROR_BODY).to_string()
}

/// First `max` characters of `text`.
fn clip(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
