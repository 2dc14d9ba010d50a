use crate::error::{BisubError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which translation backend a job uses (spec §4.6, §9 "provider switching").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Llm,
    Free,
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "llm" => Ok(Provider::Llm),
            "free" => Ok(Provider::Free),
            _ => Err(format!("unknown provider: {s}. Use 'llm' or 'free'")),
        }
    }
}

/// Read-only tunables threaded through every worker (spec §6 "Configuration surface").
///
/// Captured once per run and passed by value into each `FileJob`: a reload
/// never mutates in-flight work, it only changes what future submissions see
/// (spec §9, "global mutable configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub provider: Provider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub custom_prompt: Option<String>,
    pub max_chars_per_batch: usize,
    pub max_entries_per_batch: usize,
    pub max_processes: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub enable_free_fallback: bool,
    pub skip_burn: bool,
    pub skip_translation: bool,
    pub source_language: String,
    pub target_language: String,
    pub cache_dir: PathBuf,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            custom_prompt: None,
            max_chars_per_batch: 3600,
            max_entries_per_batch: 10,
            max_processes: 4,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 60_000,
            enable_free_fallback: false,
            skip_burn: false,
            skip_translation: false,
            source_language: "en".to_string(),
            target_language: "zh".to_string(),
            cache_dir: std::env::temp_dir().join("bisub-cache"),
        }
    }
}

/// On-disk (TOML) + environment-variable loader for a `ConfigSnapshot`.
///
/// File is optional; environment variables always win, mirroring the
/// teacher's `Config::load()` layering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub custom_prompt: Option<String>,
    pub max_chars_per_batch: Option<usize>,
    pub max_entries_per_batch: Option<usize>,
    pub max_processes: Option<usize>,
    pub enable_free_fallback: Option<bool>,
}

impl ConfigSnapshot {
    pub fn load() -> Result<Self> {
        let mut snapshot = Self::default();

        if let Some(path) = Self::config_file_path() {
            if path.exists() {
                let contents = std::fs::read_to_string(&path)?;
                if let Ok(file) = toml::from_str::<ConfigFile>(&contents) {
                    snapshot.apply_file(file);
                }
            }
        }

        if let Ok(key) = std::env::var("BISUB_API_KEY") {
            snapshot.api_key = key;
        }
        if let Ok(base_url) = std::env::var("BISUB_BASE_URL") {
            snapshot.base_url = base_url;
        }
        if let Ok(model) = std::env::var("BISUB_MODEL") {
            snapshot.model = model;
        }
        if let Ok(provider) = std::env::var("BISUB_PROVIDER") {
            if let Ok(p) = provider.parse() {
                snapshot.provider = p;
            }
        }
        if let Ok(max_processes) = std::env::var("BISUB_MAX_PROCESSES") {
            if let Ok(n) = max_processes.parse() {
                snapshot.max_processes = n;
            }
        }

        Ok(snapshot)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.base_url {
            self.base_url = v;
        }
        if let Some(v) = file.api_key {
            self.api_key = v;
        }
        if let Some(v) = file.model {
            self.model = v;
        }
        if let Some(v) = file.custom_prompt {
            self.custom_prompt = Some(v);
        }
        if let Some(v) = file.max_chars_per_batch {
            self.max_chars_per_batch = v;
        }
        if let Some(v) = file.max_entries_per_batch {
            self.max_entries_per_batch = v;
        }
        if let Some(v) = file.max_processes {
            self.max_processes = v;
        }
        if let Some(v) = file.enable_free_fallback {
            self.enable_free_fallback = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() && matches!(self.provider, Provider::Llm) {
            return Err(BisubError::Config(
                "api_key is required for the LLM provider".to_string(),
            ));
        }
        if self.max_processes == 0 {
            return Err(BisubError::Config(
                "max_processes must be greater than 0".to_string(),
            ));
        }
        if self.max_chars_per_batch == 0 || self.max_entries_per_batch == 0 {
            return Err(BisubError::Config(
                "batch budgets must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// `N = min(configured_max, CPU_count)`, clamped to `[1, 12]` (spec §5).
    pub fn effective_concurrency(&self, task_count: usize) -> usize {
        let configured = self.max_processes.clamp(1, 12);
        let n = configured.min(num_cpus::get());
        match task_count {
            0 => n,
            1 => 1,
            2 => n.min(2),
            _ => n,
        }
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("bisub").join("config.toml"))
    }
}
