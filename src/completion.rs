//! Completion provider abstraction and implementations.
//!
//! The retrieval router hands the retrieved chunk texts plus the user's
//! question to a [`CompletionProvider`] to synthesize the final answer.
//!
//! - **[`ExtractiveCompletion`]** — offline default: answers verbatim
//!   with the retrieved chunks, highest-ranked first. No model, no
//!   network; the answer is exactly what retrieval found.
//! - **[`OpenAiCompletion`]** — OpenAI-compatible chat completions with
//!   the context stuffed into the prompt. Same timeout/retry policy as
//!   the embedding client.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::CompletionConfig;

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's question using only \
the provided context. If the context does not contain the answer, say that you do not know.";

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Model identifier recorded in logs.
    fn model_name(&self) -> &str;

    /// Synthesize an answer to `query` from retrieved context chunks,
    /// ordered most relevant first.
    async fn complete(&self, query: &str, context: &[String]) -> Result<String>;
}

/// Offline provider that answers with the retrieved chunks themselves.
pub struct ExtractiveCompletion;

#[async_trait]
impl CompletionProvider for ExtractiveCompletion {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, _query: &str, context: &[String]) -> Result<String> {
        Ok(context.join("\n\n"))
    }
}

/// Chat-completions provider speaking the OpenAI protocol.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiCompletion {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl OpenAiCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .context("completion.model required for the openai provider")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for completions")?;
        Ok(Self {
            client,
            url: config.url.clone(),
            model,
            max_retries: config.max_retries,
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, query: &str, context: &[String]) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let user_content = format!(
            "Context:\n{}\n\nQuestion: {}",
            context.join("\n\n---\n\n"),
            query
        );
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_content },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: ChatResponse = response
                            .json()
                            .await
                            .context("Failed to parse completion response")?;
                        let answer = parsed
                            .choices
                            .into_iter()
                            .next()
                            .map(|c| c.message.content)
                            .unwrap_or_default();
                        return Ok(answer);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Completion API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Completion API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

/// Create the [`CompletionProvider`] named by the configuration.
pub fn create_completion(config: &CompletionConfig) -> Result<Box<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "extractive" => Ok(Box::new(ExtractiveCompletion)),
        "openai" => Ok(Box::new(OpenAiCompletion::new(config)?)),
        other => bail!(
            "Unknown completion provider: {}. Must be extractive or openai.",
            other
        ),
    }
}
