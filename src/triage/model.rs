//! Plan generation providers.
//!
//! One trait, two implementations: the Anthropic messages API for real runs
//! and a deterministic offline renderer that keeps the pipeline exercisable
//! without a network or key.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::TriageError;
use crate::triage::config::{self, TriageConfig};
use crate::triage::naming::Granularity;
use crate::triage::period::Period;
use crate::triage::prompts;

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub period: Period,
    pub notes: String,
}

pub trait PlanGenerator: Sync {
    fn label(&self) -> &'static str;
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

pub struct AnthropicGenerator {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u64,
    pub temperature: f64,
}

pub struct OfflineGenerator;

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

impl PlanGenerator for AnthropicGenerator {
    fn label(&self) -> &'static str {
        "anthropic"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": prompts::system_prompt(&request.period),
            "messages": [
                {
                    "role": "user",
                    "content": prompts::user_prompt(request.period.granularity, &request.notes)
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
                "anthropic call failed with status {}",
                response.status()
            ))
            .into());
        }

        let json: Value = response.json()?;
        let text =
            extract_anthropic_text(&json).context("anthropic response missing text content")?;
        Ok(text)
    }
}

impl PlanGenerator for OfflineGenerator {
    fn label(&self) -> &'static str {
        "offline"
    }

    /// Deterministic plan rendering: every non-empty note line becomes one
    /// numbered entry under a period header. No network, no key.
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let header = match request.period.granularity {
            Granularity::Daily => {
                format!("# Daily Execution Order \u{2014} {}", request.period.label())
            }
            Granularity::Weekly => {
                format!("# Weekly Execution Analysis: {}", request.period.label())
            }
            Granularity::Monthly => {
                format!("# Monthly Review: {}", request.period.label())
            }
            Granularity::Annual => format!("# Annual Review: {}", request.period.label()),
        };

        let mut out = String::new();
        out.push_str(&header);
        out.push('\n');
        let mut index = 0usize;
        for line in request.notes.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("---") {
                continue;
            }
            index += 1;
            out.push_str(&format!("{index}. {trimmed}\n"));
        }
        if index == 0 {
            out.push_str("1. No actionable items captured for this period\n");
        }
        Ok(out)
    }
}

pub fn build_generator(cfg: &TriageConfig) -> Result<Box<dyn PlanGenerator>> {
    match cfg.model.provider.as_str() {
        config::PROVIDER_OFFLINE => Ok(Box::new(OfflineGenerator)),
        _ => {
            let api_key = cfg
                .api_key
                .clone()
                .ok_or_else(|| TriageError::InvalidConfig("missing API key".to_string()))?;
            Ok(Box::new(AnthropicGenerator {
                api_key,
                model: cfg.model.name.clone(),
                max_tokens: cfg.model.max_tokens,
                temperature: cfg.model.temperature,
            }))
        }
    }
}
