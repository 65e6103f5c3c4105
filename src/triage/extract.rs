//! Handwriting extraction: image/PDF bytes to structured task text.
//!
//! Used by the sync pass to materialize sidecars; the analysis pipeline only
//! ever reads the sidecar text.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::TriageError;
use crate::triage::config::{self, TriageConfig};
use crate::triage::prompts;

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 120;

pub trait TextExtractor: Sync {
    fn label(&self) -> &'static str;
    fn extract(&self, bytes: &[u8], mime: &str) -> Result<String>;
}

pub struct AnthropicVisionExtractor {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u64,
}

/// Placeholder extractor for runs without a key: emits a stub sidecar so the
/// rest of the pipeline stays exercisable.
pub struct OfflineExtractor;

fn source_block(bytes: &[u8], mime: &str) -> Value {
    let block_type = if mime == "application/pdf" {
        "document"
    } else {
        "image"
    };
    serde_json::json!({
        "type": block_type,
        "source": {
            "type": "base64",
            "media_type": mime,
            "data": BASE64.encode(bytes),
        }
    })
}

fn extract_anthropic_text(json: &Value) -> Option<String> {
    let mut chunks = Vec::new();
    let content = json.get("content").and_then(Value::as_array)?;
    for part in content {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            chunks.push(text.to_string());
        }
    }
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

impl TextExtractor for AnthropicVisionExtractor {
    fn label(&self) -> &'static str {
        "anthropic"
    }

    fn extract(&self, bytes: &[u8], mime: &str) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        source_block(bytes, mime),
                        {"type": "text", "text": prompts::IMAGE_EXTRACTION_PROMPT}
                    ]
                }
            ]
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let response = client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .map_err(|err| TriageError::GenerationFailure(err.to_string()))?;
        if !response.status().is_success() {
            return Err(TriageError::GenerationFailure(format!(
                "anthropic vision call failed with status {}",
                response.status()
            ))
            .into());
        }

        let json: Value = response.json()?;
        let text = extract_anthropic_text(&json)
            .context("anthropic vision response missing text content")?;
        Ok(text)
    }
}

impl TextExtractor for OfflineExtractor {
    fn label(&self) -> &'static str {
        "offline"
    }

    fn extract(&self, bytes: &[u8], mime: &str) -> Result<String> {
        Ok(format!(
            "Captured\n    Transcribe {mime} capture ({} bytes) by hand\n",
            bytes.len()
        ))
    }
}

pub fn build_extractor(cfg: &TriageConfig) -> Result<Box<dyn TextExtractor>> {
    match cfg.model.provider.as_str() {
        config::PROVIDER_OFFLINE => Ok(Box::new(OfflineExtractor)),
        _ => {
            let api_key = cfg
                .api_key
                .clone()
                .ok_or_else(|| TriageError::InvalidConfig("missing API key".to_string()))?;
            Ok(Box::new(AnthropicVisionExtractor {
                api_key,
                model: cfg.model.vision_name.clone(),
                max_tokens: cfg.model.max_tokens,
            }))
        }
    }
}
