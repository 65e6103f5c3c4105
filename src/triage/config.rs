//! Startup configuration: TOML file merged under environment overrides.
//!
//! Built once in `cli::run` and passed down immutably; no component reads the
//! environment after construction. Secrets (API key, Drive token) come from
//! the environment only and are never serialized.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::error::TriageError;
use crate::triage::backend::{LocalDirBackend, NotesBackend};
use crate::triage::gdrive::DriveBackend;

pub const PROVIDER_ANTHROPIC: &str = "anthropic";
pub const PROVIDER_OFFLINE: &str = "offline";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourcesConfig {
    /// Notes roots in priority order; the first reachable one is primary.
    pub roots: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveSourceConfig {
    pub folder_id: String,
    #[serde(skip)]
    pub token: String,
    pub mirror: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub name: String,
    pub vision_name: String,
    pub max_tokens: u64,
    pub temperature: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: PROVIDER_ANTHROPIC.to_string(),
            name: "claude-haiku-4-5-20241022".to_string(),
            vision_name: "claude-haiku-4-5-20241022".to_string(),
            max_tokens: 4096,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriageConfig {
    pub sources: SourcesConfig,
    pub drive: Option<DriveSourceConfig>,
    pub model: ModelConfig,
    #[serde(skip)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PartialTriageConfig {
    sources: Option<SourcesConfig>,
    drive: Option<DriveSourceConfig>,
    model: Option<ModelConfig>,
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_f64(var: &str, fallback: f64) -> f64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<f64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_csv_paths(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() { fallback.to_vec() } else { out }
        }
        Err(_) => fallback.to_vec(),
    }
}

pub fn expand_tilde(raw: &str, home: Option<&PathBuf>) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = home
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Some(custom) = env_non_empty("TASKTRIAGE_CONFIG_PATH") {
        return Some(PathBuf::from(custom));
    }
    if let Some(base) = env_non_empty("TASKTRIAGE_HOME") {
        return Some(PathBuf::from(base).join("config.toml"));
    }
    let home = dirs::home_dir()?;
    Some(home.join(".tasktriage").join("config.toml"))
}

fn merge_partial(base: &mut TriageConfig, parsed: PartialTriageConfig) {
    if let Some(sources) = parsed.sources {
        base.sources = sources;
    }
    if let Some(drive) = parsed.drive {
        base.drive = Some(drive);
    }
    if let Some(model) = parsed.model {
        base.model = model;
    }
}

fn merge_file_config(base: &mut TriageConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialTriageConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))?;
    merge_partial(base, parsed);
    Ok(())
}

fn validate(cfg: &TriageConfig) -> Result<()> {
    let invalid = |msg: String| -> anyhow::Error { TriageError::InvalidConfig(msg).into() };

    if cfg.sources.roots.is_empty() && cfg.drive.is_none() {
        return Err(invalid(
            "no notes source configured: set TASKTRIAGE_ROOTS or a [sources]/[drive] section"
                .to_string(),
        ));
    }
    if cfg.sources.roots.iter().any(|r| r.trim().is_empty()) {
        return Err(invalid("empty root path in sources".to_string()));
    }
    match cfg.model.provider.as_str() {
        PROVIDER_OFFLINE => {}
        PROVIDER_ANTHROPIC => {
            if cfg.api_key.is_none() {
                return Err(invalid(
                    "ANTHROPIC_API_KEY is not set; use TASKTRIAGE_PROVIDER=offline to run without it"
                        .to_string(),
                ));
            }
        }
        other => {
            return Err(invalid(format!(
                "unknown provider `{other}`: use `anthropic` or `offline`"
            )));
        }
    }
    if cfg.model.max_tokens == 0 {
        return Err(invalid("model max_tokens must be >= 1".to_string()));
    }
    if !(0.0..=1.0).contains(&cfg.model.temperature) {
        return Err(invalid(
            "model temperature must be within 0.0..=1.0".to_string(),
        ));
    }
    if let Some(drive) = &cfg.drive {
        if drive.folder_id.trim().is_empty() {
            return Err(invalid("drive folder_id cannot be empty".to_string()));
        }
        if drive.token.trim().is_empty() {
            return Err(invalid(
                "TASKTRIAGE_DRIVE_TOKEN is not set for the configured drive source".to_string(),
            ));
        }
    }
    Ok(())
}

pub fn load_config() -> Result<TriageConfig> {
    let mut cfg = TriageConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.sources.roots = env_or_csv_paths("TASKTRIAGE_ROOTS", &cfg.sources.roots);
    cfg.model.provider = env_or_string("TASKTRIAGE_PROVIDER", &cfg.model.provider);
    cfg.model.name = env_or_string("TASKTRIAGE_MODEL", &cfg.model.name);
    cfg.model.vision_name = env_or_string("TASKTRIAGE_VISION_MODEL", &cfg.model.vision_name);
    cfg.model.max_tokens = env_or_u64("TASKTRIAGE_MAX_TOKENS", cfg.model.max_tokens);
    cfg.model.temperature = env_or_f64("TASKTRIAGE_TEMPERATURE", cfg.model.temperature);
    cfg.api_key = env_non_empty("ANTHROPIC_API_KEY");

    if let Some(folder_id) = env_non_empty("TASKTRIAGE_DRIVE_FOLDER_ID") {
        let mirror = cfg.drive.as_ref().and_then(|d| d.mirror.clone());
        cfg.drive = Some(DriveSourceConfig {
            folder_id,
            token: String::new(),
            mirror,
        });
    }
    if let Some(drive) = cfg.drive.as_mut() {
        drive.token = env_non_empty("TASKTRIAGE_DRIVE_TOKEN").unwrap_or_default();
        if let Some(mirror) = env_non_empty("TASKTRIAGE_DRIVE_MIRROR") {
            drive.mirror = Some(mirror);
        }
    }

    validate(&cfg)?;
    Ok(cfg)
}

/// Backend instances in priority order: local roots as configured, then the
/// Drive folder last when one is present.
pub fn build_backends(cfg: &TriageConfig) -> Vec<Box<dyn NotesBackend>> {
    let home = dirs::home_dir();
    let mut backends: Vec<Box<dyn NotesBackend>> = Vec::new();
    for root in &cfg.sources.roots {
        let path = expand_tilde(root, home.as_ref());
        backends.push(Box::new(LocalDirBackend::new(root.clone(), path)));
    }
    if let Some(drive) = &cfg.drive {
        let mirror = drive
            .mirror
            .as_deref()
            .map(|m| expand_tilde(m, home.as_ref()));
        backends.push(Box::new(DriveBackend::new(
            "gdrive",
            drive.folder_id.clone(),
            drive.token.clone(),
            mirror,
        )));
    }
    backends
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config(roots: &[&str]) -> TriageConfig {
        TriageConfig {
            sources: SourcesConfig {
                roots: roots.iter().map(|s| s.to_string()).collect(),
            },
            model: ModelConfig {
                provider: PROVIDER_OFFLINE.to_string(),
                ..ModelConfig::default()
            },
            ..TriageConfig::default()
        }
    }

    #[test]
    fn validate_requires_a_source() {
        let cfg = offline_config(&[]);
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("no notes source configured"));
    }

    #[test]
    fn validate_requires_api_key_for_anthropic() {
        let mut cfg = offline_config(&["/notes"]);
        cfg.model.provider = PROVIDER_ANTHROPIC.to_string();
        assert!(validate(&cfg).is_err());

        cfg.api_key = Some("sk-test".to_string());
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_provider_and_bad_sampling() {
        let mut cfg = offline_config(&["/notes"]);
        cfg.model.provider = "bard".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = offline_config(&["/notes"]);
        cfg.model.temperature = 1.5;
        assert!(validate(&cfg).is_err());

        let mut cfg = offline_config(&["/notes"]);
        cfg.model.max_tokens = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn partial_toml_merges_over_defaults() {
        let mut cfg = TriageConfig::default();
        let parsed: PartialTriageConfig = toml::from_str(
            "[sources]\nroots = [\"/media/usb/notes\", \"~/notes\"]\n\n[model]\nprovider = \"offline\"\nname = \"m\"\nvision_name = \"v\"\nmax_tokens = 1024\ntemperature = 0.1\n",
        )
        .unwrap();
        merge_partial(&mut cfg, parsed);

        assert_eq!(cfg.sources.roots.len(), 2);
        assert_eq!(cfg.model.provider, "offline");
        assert_eq!(cfg.model.max_tokens, 1024);
        assert!(cfg.drive.is_none());
    }

    #[test]
    fn tilde_expansion_uses_home() {
        let home = PathBuf::from("/home/matt");
        assert_eq!(
            expand_tilde("~/notes", Some(&home)),
            PathBuf::from("/home/matt/notes")
        );
        assert_eq!(
            expand_tilde("/abs/notes", Some(&home)),
            PathBuf::from("/abs/notes")
        );
    }
}
