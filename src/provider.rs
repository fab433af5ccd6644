//! AI vision providers that describe an image.
//!
//! - **[`DisabledProvider`]**: always errors. The default, so that a
//!   misconfigured install never sends images anywhere.
//! - **[`OpenAiProvider`]**: OpenAI-compatible `POST {url}/chat/completions`
//!   with the image inlined as a base64 data URL.
//! - **[`OllamaProvider`]**: local Ollama `POST {url}/api/generate` with a
//!   vision model (e.g. `llava`).
//!
//! Both HTTP providers ask the model for a JSON object
//! `{"alt_text", "caption", "title", "confidence"}` and parse it with
//! [`parse_metadata`].
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - Other 4xx → fail immediately
//! - Network errors → retry
//!
//! Delays double from 1s, capped at 32s, up to `max_retries` extra attempts.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;

use crate::config::ProviderConfig;
use crate::models::GeneratedMetadata;
use crate::traits::{AiProvider, ImageContext};

/// Provider that refuses to run.
pub struct DisabledProvider;

#[async_trait]
impl AiProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn analyze_image(
        &self,
        _path: &Path,
        _context: &ImageContext,
    ) -> Result<GeneratedMetadata> {
        bail!("AI provider is disabled. Set [provider] kind in the config file.")
    }
}

// ============ OpenAI-compatible Provider ============

/// Vision provider using an OpenAI-compatible chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiProvider {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("provider.model required for OpenAI provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            client: build_client(config)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn analyze_image(&self, path: &Path, context: &ImageContext) -> Result<GeneratedMetadata> {
        let image = read_image_base64(path).await?;
        let data_url = format!("data:{};base64,{}", mime_for_path(path), image);

        let body = serde_json::json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": build_prompt(context) },
                    { "type": "image_url", "image_url": { "url": data_url } },
                ],
            }],
        });

        let endpoint = format!("{}/chat/completions", self.url);
        let json = send_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;

        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))?;

        parse_metadata(content, self.name())
    }
}

// ============ Ollama Provider ============

/// Vision provider using a local Ollama instance
/// (default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("provider.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            client: build_client(config)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn analyze_image(&self, path: &Path, context: &ImageContext) -> Result<GeneratedMetadata> {
        let image = read_image_base64(path).await?;

        let body = serde_json::json!({
            "model": self.model,
            "prompt": build_prompt(context),
            "images": [image],
            "format": "json",
            "stream": false,
        });

        let endpoint = format!("{}/api/generate", self.url);
        let json = send_with_retry("Ollama", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await
        .with_context(|| format!("Ollama request failed (is Ollama running at {}?)", self.url))?;

        let content = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))?;

        parse_metadata(content, self.name())
    }
}

/// Create the provider selected by `[provider] kind`.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn AiProvider>> {
    match config.kind.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown provider kind: {}", other),
    }
}

/// Instruction sent with every image. Context keys with empty values are
/// left out.
pub fn build_prompt(context: &ImageContext) -> String {
    let mut prompt = String::from(
        "Describe this image for a website. Respond with a JSON object with the keys \
         \"alt_text\" (concise, under 125 characters, no \"image of\"), \
         \"caption\" (one sentence), \"title\" (a few words) and \
         \"confidence\" (0.0 to 1.0).",
    );

    let mut lines = Vec::new();
    for (key, value) in context {
        let rendered = match value {
            serde_json::Value::Null => continue,
            serde_json::Value::String(s) if s.trim().is_empty() => continue,
            serde_json::Value::Array(items) if items.is_empty() => continue,
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        };
        lines.push(format!("- {}: {}", key, rendered));
    }

    if !lines.is_empty() {
        prompt.push_str("\n\nContext about where the image is used:\n");
        prompt.push_str(&lines.join("\n"));
    }
    if let Some(keyword) = context.get("focus_keyword").and_then(|v| v.as_str()) {
        if !keyword.trim().is_empty() {
            prompt.push_str(&format!(
                "\n\nWork the phrase \"{}\" into the alt text if it fits naturally.",
                keyword.trim()
            ));
        }
    }
    prompt
}

/// Parse a model's JSON answer into [`GeneratedMetadata`].
///
/// Markdown code fences around the object are tolerated. Missing text
/// fields become empty strings; confidence is clamped to `[0, 1]` and
/// defaults to 0.
pub fn parse_metadata(content: &str, provider: &str) -> Result<GeneratedMetadata> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let json: serde_json::Value = serde_json::from_str(unfenced)
        .with_context(|| format!("{} returned non-JSON content", provider))?;
    if !json.is_object() {
        bail!("{} returned JSON that is not an object", provider);
    }

    let text = |key: &str| {
        json.get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    Ok(GeneratedMetadata {
        alt_text: text("alt_text"),
        caption: text("caption"),
        title: text("title"),
        provider: provider.to_string(),
        confidence: json
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0),
    })
}

fn build_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

async fn read_image_base64(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image: {}", path.display()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// POST with exponential backoff; returns the parsed JSON body.
async fn send_with_retry<F>(label: &str, max_retries: u32, request: F) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(label, attempt, ?delay, "retrying provider request");
            tokio::time::sleep(delay).await;
        }

        match request().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        label,
                        status,
                        body_text
                    ));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", label)))
}
