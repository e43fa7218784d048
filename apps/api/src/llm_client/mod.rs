/// Completion client: the single point of entry for all text-generation
/// calls in FieldFill.
///
/// ARCHITECTURAL RULE: no other module may talk to the completion API
/// directly. Everything goes through a `CompletionBackend`, so the fill
/// pipeline is testable offline and the upstream provider is swappable.
///
/// There is deliberately no retry loop here: an upstream failure surfaces
/// immediately and the fill pipeline's per-note policy decides what happens
/// to the rest of the batch.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all completion calls.
/// Intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("completion returned empty content")]
    EmptyContent,

    #[error("completion cancelled")]
    Cancelled,
}

/// The seam between the fill pipeline and the text-generation API: one
/// resolved prompt in, one generated text out. A triggered cancellation
/// token aborts the in-flight call with `Cancelled`.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Anthropic backend
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl CompletionResponse {
    /// Extracts the text content from the first text block.
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Anthropic Messages API backend.
#[derive(Clone)]
pub struct AnthropicBackend {
    client: Client,
    api_key: String,
}

impl AnthropicBackend {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, CompletionError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system: prompts::FILL_SYSTEM,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Try to parse the structured error message
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = response.json().await?;

        debug!(
            "Completion call succeeded: input_tokens={}, output_tokens={}",
            completion.usage.input_tokens, completion.usage.output_tokens
        );

        let text = completion.text().ok_or(CompletionError::EmptyContent)?;
        let text = strip_code_fences(text);
        if text.is_empty() {
            return Err(CompletionError::EmptyContent);
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    async fn complete(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(CompletionError::Cancelled),
            result = self.call(prompt) => result,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Emulated backend
// ────────────────────────────────────────────────────────────────────────────

/// Offline backend: deterministic canned completions, no network. Selected
/// at startup via `EMULATE_COMPLETIONS`; also the default test double.
pub struct EmulatedBackend;

#[async_trait]
impl CompletionBackend for EmulatedBackend {
    async fn complete(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError> {
        if cancel.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }
        Ok(format!("[emulated] {}", prompt.trim()))
    }
}

/// Strips a single wrapping ``` fence (with an optional language tag) that
/// models sometimes add around generated field text, then trims whitespace.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(stripped) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the rest of the fence line (a language tag, if any)
    let stripped = match stripped.split_once('\n') {
        Some((_tag, rest)) => rest,
        None => stripped,
    };
    stripped
        .strip_suffix("```")
        .map(str::trim)
        .unwrap_or_else(|| stripped.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences_with_language_tag() {
        let input = "```text\nBonjour le monde\n```";
        assert_eq!(strip_code_fences(input), "Bonjour le monde");
    }

    #[test]
    fn test_strip_code_fences_without_tag() {
        let input = "```\nBonjour\n```";
        assert_eq!(strip_code_fences(input), "Bonjour");
    }

    #[test]
    fn test_strip_code_fences_no_fences() {
        assert_eq!(strip_code_fences("  Bonjour  "), "Bonjour");
    }

    #[test]
    fn test_strip_code_fences_single_line() {
        assert_eq!(strip_code_fences("``` Bonjour ```"), "Bonjour");
    }

    #[tokio::test]
    async fn test_emulated_backend_is_deterministic() {
        let backend = EmulatedBackend;
        let cancel = CancellationToken::new();
        let a = backend.complete("Translate hello", &cancel).await.unwrap();
        let b = backend.complete("Translate hello", &cancel).await.unwrap();
        assert_eq!(a, b);
        assert!(a.contains("Translate hello"));
    }

    #[tokio::test]
    async fn test_emulated_backend_honors_cancellation() {
        let backend = EmulatedBackend;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = backend.complete("anything", &cancel).await.unwrap_err();
        assert!(matches!(err, CompletionError::Cancelled));
    }
}
