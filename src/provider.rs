//! # Provider — Image Generation Backends
//!
//! The generation runner only knows the [`ImageProvider`] trait: give it a
//! model, a prompt, and the continuity context, get back image bytes and an
//! optional summary of what was drawn.
//!
//! ## Backends
//!
//! | Name | Type | Notes |
//! |------|------|-------|
//! | `openai` | [`OpenAiProvider`] | Responses API with the `image_generation` tool |
//! | `dryrun` | [`DryrunProvider`] | Returns a 1×1 PNG, no network; for demos and tests |
//!
//! [`AnyProvider`] picks one at runtime from configuration.
//!
//! ## OpenAI request shape
//!
//! Each continuity turn becomes a user message holding the earlier verse (and
//! a low-detail `input_image` when its thumbnail has an absolute URL),
//! followed by an assistant message with the stored illustration summary.
//! The current prompt is the last user message. The reply's
//! `image_generation_call.result` is base64 image data; any `output_text` is
//! kept as the image summary.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use crate::config::GenerationConfig;
use crate::prompt::ContinuityTurn;

/// Appended to the final prompt so the model describes what it drew; the
/// description becomes the continuity note for later verses.
const SUMMARY_INSTRUCTION: &str = "After generating the image, reply with one short paragraph \
describing its setting, characters, palette, and composition.";

/// A 1×1 transparent PNG.
const DRYRUN_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub continuity: &'a [ContinuityTurn],
    pub size: &'a str,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub summary: Option<String>,
    /// Provider-side identifier for the exchange, kept for traceability.
    pub conversation_id: Option<String>,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> impl Future<Output = Result<GeneratedImage>> + Send;
}

// ── OpenAI ──────────────────────────────────────────────────────

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(api_base: &str, api_key: String, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("OpenAI API key is empty");
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(OpenAiProvider {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build from configuration, reading the key from the configured env var.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} is not set", config.api_key_env))?;
        Self::new(
            &config.api_base,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

impl ImageProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<GeneratedImage> {
        let endpoint = format!("{}/responses", self.api_base);
        let payload = build_responses_payload(request);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("OpenAI request failed ({endpoint})"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("OpenAI responses request failed ({}): {}", status.as_u16(), body);
        }
        let body: Value = response
            .json()
            .await
            .context("OpenAI response was not valid JSON")?;
        parse_responses_output(&body)
    }
}

/// Responses API payload for one generation.
pub fn build_responses_payload(request: &GenerationRequest<'_>) -> Value {
    let mut input = Vec::new();
    for turn in request.continuity {
        let mut content = vec![json!({
            "type": "input_text",
            "text": format!("Verse {}:\n{}", turn.sequence_number, turn.lyric_text),
        })];
        if let Some(url) = turn
            .reference_image_url
            .as_deref()
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        {
            content.push(json!({
                "type": "input_image",
                "image_url": url,
                "detail": "low",
            }));
        }
        input.push(json!({ "role": "user", "content": content }));
        if let Some(note) = &turn.illustration_note {
            input.push(json!({
                "role": "assistant",
                "content": [{ "type": "output_text", "text": note }],
            }));
        }
    }
    input.push(json!({
        "role": "user",
        "content": [{
            "type": "input_text",
            "text": format!("{}\n\n{}", request.prompt, SUMMARY_INSTRUCTION),
        }],
    }));

    json!({
        "model": request.model,
        "input": input,
        "tools": [{ "type": "image_generation", "size": request.size }],
    })
}

/// Extract image bytes, summary text, and response id from a Responses reply.
pub fn parse_responses_output(body: &Value) -> Result<GeneratedImage> {
    let items = body
        .get("output")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("OpenAI response has no output array"))?;

    let mut image = None;
    let mut texts = Vec::new();
    for item in items {
        match item.get("type").and_then(Value::as_str) {
            Some("image_generation_call") => {
                if image.is_none() {
                    if let Some(b64) = item.get("result").and_then(Value::as_str) {
                        let bytes = BASE64
                            .decode(b64.as_bytes())
                            .context("OpenAI image base64 decode failed")?;
                        image = Some(bytes);
                    }
                }
            }
            Some("message") => {
                let parts = item
                    .get("content")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten();
                for part in parts {
                    if part.get("type").and_then(Value::as_str) == Some("output_text") {
                        if let Some(text) = part.get("text").and_then(Value::as_str) {
                            texts.push(text.trim().to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    let bytes = image.ok_or_else(|| anyhow!("OpenAI response returned no image"))?;
    let summary = Some(texts.join("\n\n")).filter(|s| !s.trim().is_empty());
    Ok(GeneratedImage {
        bytes,
        summary,
        conversation_id: body.get("id").and_then(Value::as_str).map(str::to_string),
    })
}

// ── Dry run ─────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<GeneratedImage> {
        let bytes = BASE64
            .decode(DRYRUN_PNG_BASE64)
            .context("dryrun image decode failed")?;
        let preview: String = request.prompt.chars().take(60).collect();
        Ok(GeneratedImage {
            bytes,
            summary: Some(format!(
                "Placeholder illustration ({} earlier verses) for: {}",
                request.continuity.len(),
                preview
            )),
            conversation_id: None,
        })
    }
}

// ── Runtime selection ───────────────────────────────────────────

pub enum AnyProvider {
    OpenAi(OpenAiProvider),
    Dryrun(DryrunProvider),
}

impl AnyProvider {
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        match config.provider.as_str() {
            "openai" => Ok(AnyProvider::OpenAi(OpenAiProvider::from_config(config)?)),
            "dryrun" => Ok(AnyProvider::Dryrun(DryrunProvider)),
            other => bail!("unknown provider '{}'", other),
        }
    }
}

impl ImageProvider for AnyProvider {
    fn name(&self) -> &str {
        match self {
            AnyProvider::OpenAi(p) => p.name(),
            AnyProvider::Dryrun(p) => p.name(),
        }
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<GeneratedImage> {
        match self {
            AnyProvider::OpenAi(p) => p.generate(request).await,
            AnyProvider::Dryrun(p) => p.generate(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(n: i32, note: Option<&str>, url: Option<&str>) -> ContinuityTurn {
        ContinuityTurn {
            sequence_number: n,
            lyric_text: format!("verse {n}"),
            illustration_note: note.map(str::to_string),
            reference_image_url: url.map(str::to_string),
        }
    }

    #[test]
    fn payload_orders_continuity_before_prompt() {
        let turns = vec![
            turn(1, Some("a boat"), Some("https://cdn.example/t1.png")),
            turn(2, None, Some("/relative/t2.png")),
        ];
        let request = GenerationRequest {
            model: "gpt-4.1",
            prompt: "draw verse 3",
            continuity: &turns,
            size: "1024x1024",
        };
        let payload = build_responses_payload(&request);
        let input = payload["input"].as_array().unwrap();
        // verse 1 user + assistant note, verse 2 user only, final prompt
        assert_eq!(input.len(), 4);
        assert_eq!(input[0]["role"], "user");
        assert_eq!(input[0]["content"][1]["type"], "input_image");
        assert_eq!(input[0]["content"][1]["detail"], "low");
        assert_eq!(input[1]["role"], "assistant");
        assert_eq!(input[1]["content"][0]["text"], "a boat");
        // relative thumbnails cannot be fetched by the provider
        assert_eq!(input[2]["content"].as_array().unwrap().len(), 1);
        let last = input[3]["content"][0]["text"].as_str().unwrap();
        assert!(last.starts_with("draw verse 3"));
        assert_eq!(payload["model"], "gpt-4.1");
        assert_eq!(payload["tools"][0]["type"], "image_generation");
        assert_eq!(payload["tools"][0]["size"], "1024x1024");
    }

    #[test]
    fn parse_output_extracts_image_and_summary() {
        let body = json!({
            "id": "resp_123",
            "output": [
                { "type": "image_generation_call", "result": BASE64.encode(b"png-bytes") },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "  A boat at dawn.  " }
                ]}
            ]
        });
        let image = parse_responses_output(&body).unwrap();
        assert_eq!(image.bytes, b"png-bytes");
        assert_eq!(image.summary.as_deref(), Some("A boat at dawn."));
        assert_eq!(image.conversation_id.as_deref(), Some("resp_123"));
    }

    #[test]
    fn parse_output_without_image_fails() {
        let body = json!({
            "output": [{ "type": "message", "content": [
                { "type": "output_text", "text": "I cannot draw that." }
            ]}]
        });
        let err = parse_responses_output(&body).unwrap_err();
        assert!(err.to_string().contains("no image"));
    }

    #[test]
    fn parse_output_without_text_has_no_summary() {
        let body = json!({
            "output": [{ "type": "image_generation_call", "result": BASE64.encode(b"x") }]
        });
        let image = parse_responses_output(&body).unwrap();
        assert!(image.summary.is_none());
        assert!(image.conversation_id.is_none());
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(OpenAiProvider::new("https://api.openai.com/v1", " ".into(), Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn dryrun_returns_png() {
        let request = GenerationRequest {
            model: "none",
            prompt: "anything",
            continuity: &[],
            size: "1024x1024",
        };
        let image = DryrunProvider.generate(&request).await.unwrap();
        assert_eq!(&image.bytes[..8], b"\x89PNG\r\n\x1a\n");
        assert!(image.summary.unwrap().contains("anything"));
    }
}
