//! Optical character recognition seam.
//!
//! Images (standalone files and images embedded in PDF pages) are
//! transcribed through an [`OcrEngine`]. Two implementations exist:
//!
//! - **[`DisabledOcr`]** — returns empty text; images then contribute no
//!   records. This is the default.
//! - **[`VisionOcr`]** — posts the image as a base64 data URL to an
//!   OpenAI-compatible chat completions endpoint and returns the model's
//!   transcription. Requires `OPENAI_API_KEY`.
//!
//! Calls are bounded by the configured timeout and retry policy: HTTP 429
//! and 5xx are retried with exponential backoff, other 4xx fail
//! immediately.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

use crate::config::OcrConfig;

const OCR_PROMPT: &str = "Transcribe every piece of legible text in this image, verbatim. \
Respond with the transcribed text only. If the image contains no text, respond with nothing.";

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Recognize text in one image. An empty string means the image holds
    /// nothing legible; that is not an error.
    async fn recognize(&self, image_bytes: &[u8], mime: &str) -> Result<String>;
}

/// No-op engine used when OCR is not configured.
pub struct DisabledOcr;

#[async_trait]
impl OcrEngine for DisabledOcr {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn recognize(&self, _image_bytes: &[u8], _mime: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// Vision-model engine speaking the OpenAI chat completions protocol.
pub struct VisionOcr {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl VisionOcr {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .context("ocr.model must be set for the vision provider")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for OCR")?;
        Ok(Self {
            client,
            url: config.url.clone(),
            model,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    fn name(&self) -> &str {
        "vision"
    }

    async fn recognize(&self, image_bytes: &[u8], mime: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY must be set for the vision ocr provider")?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": OCR_PROMPT },
                    { "type": "image_url", "image_url": { "url": image_data_url(image_bytes, mime) } }
                ]
            }]
        });

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&self.url)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(anyhow!("OCR request failed: {}", e));
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_error = Some(anyhow!("OCR endpoint returned {}", status));
                continue;
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                anyhow::bail!("OCR endpoint returned {}: {}", status, text);
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .context("Failed to parse OCR response")?;
            let text = parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .unwrap_or_default();
            return Ok(text);
        }

        Err(last_error.unwrap_or_else(|| anyhow!("OCR retries exhausted")))
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

fn image_data_url(image_bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(image_bytes))
}

/// Instantiate the engine named by the configuration.
pub fn create_ocr(config: &OcrConfig) -> Result<Box<dyn OcrEngine>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledOcr)),
        "vision" => Ok(Box::new(VisionOcr::new(config)?)),
        other => anyhow::bail!("Unknown ocr provider: '{}'. Must be disabled or vision.", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_engine_recognizes_nothing() {
        let engine = DisabledOcr;
        let text = engine.recognize(b"\x89PNG", "image/png").await.unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn data_url_embeds_mime_and_payload() {
        let url = image_data_url(&[0x89, 0x50, 0x4E, 0x47], "image/png");
        assert_eq!(url, "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let config = OcrConfig {
            provider: "tesseract".to_string(),
            ..OcrConfig::default()
        };
        assert!(create_ocr(&config).is_err());
    }

    #[test]
    fn vision_requires_model() {
        let config = OcrConfig {
            provider: "vision".to_string(),
            model: None,
            ..OcrConfig::default()
        };
        assert!(create_ocr(&config).is_err());
    }
}
