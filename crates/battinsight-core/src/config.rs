use crate::errors::ConfigError;
use crate::model::DEFAULT_MAX_RESULTS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ALLOWED_TABLES: &[&str] = &["battery_data", "model_series"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String, // "openai" | "fake"
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    /// Never read from YAML; filled from `OPENAI_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Canned reply used by the `fake` provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fake_reply: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.1,
            max_tokens: 500,
            timeout_ms: 20_000,
            api_key: None,
            fake_reply: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub audit_log_path: PathBuf,
    pub allowed_tables: Vec<String>,
    pub default_max_results: u32,
    pub max_results_ceiling: u32,
    pub max_query_chars: usize,
    pub statement_timeout_ms: u64,
    pub llm: LlmConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("battinsight.db"),
            audit_log_path: PathBuf::from("logs/ai_query_audit.log"),
            allowed_tables: DEFAULT_ALLOWED_TABLES.iter().map(|s| s.to_string()).collect(),
            default_max_results: DEFAULT_MAX_RESULTS,
            max_results_ceiling: 1000,
            max_query_chars: 1000,
            statement_timeout_ms: 10_000,
            llm: LlmConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.llm.timeout_ms)
    }

    /// Layers process environment on top of file/default values.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|k| std::env::var(k).ok());
    }

    pub fn apply_env_from<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("BATTINSIGHT_DB") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("BATTINSIGHT_AUDIT_LOG") {
            self.audit_log_path = PathBuf::from(v);
        }
        if let Some(v) = get("BATTINSIGHT_LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Some(v) = get("BATTINSIGHT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("BATTINSIGHT_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("BATTINSIGHT_ALLOWED_TABLES") {
            let tables: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !tables.is_empty() {
                self.allowed_tables = tables;
            }
        }
        if let Some(n) = get("BATTINSIGHT_STATEMENT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.statement_timeout_ms = n;
        }
        if let Some(n) = get("BATTINSIGHT_MAX_RESULTS").and_then(|v| v.parse().ok()) {
            self.max_results_ceiling = n;
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.allowed_tables.is_empty() {
            return Err(ConfigError("allowed_tables must not be empty".into()));
        }
        if self.max_results_ceiling == 0 {
            return Err(ConfigError("max_results_ceiling must be at least 1".into()));
        }
        if self.default_max_results == 0 || self.default_max_results > self.max_results_ceiling {
            return Err(ConfigError(format!(
                "default_max_results {} must be within 1..={}",
                self.default_max_results, self.max_results_ceiling
            )));
        }
        if self.statement_timeout_ms == 0 {
            return Err(ConfigError("statement_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path, strict: bool) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw, strict)
        .map_err(|ConfigError(msg)| ConfigError(format!("{} (file: {})", msg, path.display())))
}

pub fn parse_config(raw: &str, strict: bool) -> Result<AppConfig, ConfigError> {
    let mut ignored_keys = std::collections::BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    let cfg: AppConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    // `x-` keys are reserved for YAML anchors
    let unknown: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with("x-"))
        .collect();
    if !unknown.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "Unknown fields detected in strict mode: {:?}",
                unknown
            )));
        }
        tracing::warn!(event = "config_unknown_fields", fields = ?unknown);
    }

    cfg.check()?;
    Ok(cfg)
}

/// Default config when no file is given, else the file; env applied last.
pub fn resolve(path: Option<&Path>, strict: bool) -> Result<AppConfig, ConfigError> {
    let mut cfg = match path {
        Some(p) => load_config(p, strict)?,
        None => AppConfig::default(),
    };
    cfg.apply_env();
    cfg.check()?;
    Ok(cfg)
}
