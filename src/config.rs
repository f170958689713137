use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILENAME: &str = "fragrance-corrector.toml";
pub const CONFIG_ENV_VAR: &str = "FRAGRANCE_CORRECTOR_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub vocabulary: VocabularySection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ServiceSection {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Extra attempts on HTTP 429/5xx before the batch falls back.
    #[serde(default)]
    pub max_retries: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    #[serde(default)]
    pub brand_chunk_size: Option<usize>,
    #[serde(default)]
    pub description_chunk_size: Option<usize>,

    #[serde(default)]
    pub large_sheet_threshold: Option<usize>,
    #[serde(default)]
    pub truncation_buffer: Option<usize>,
    #[serde(default)]
    pub max_rows_per_sheet: Option<usize>,

    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub trace_prompts: Option<bool>,

    /// Treat any row-count mismatch in a response as a failed batch instead of
    /// truncating/padding it.
    #[serde(default)]
    pub strict_reconcile: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct VocabularySection {
    #[serde(default)]
    pub brands_file: Option<String>,
    #[serde(default)]
    pub acronyms_file: Option<String>,
    #[serde(default)]
    pub extra_brands: Vec<String>,
    #[serde(default)]
    pub extra_acronyms: Vec<String>,
}

pub fn find_file_upwards(start: &Path, filename: &str, max_depth: usize) -> Option<PathBuf> {
    let mut dir = Some(start);
    for _ in 0..=max_depth {
        let d = dir?;
        let cand = d.join(filename);
        if cand.is_file() {
            return Some(cand);
        }
        dir = d.parent();
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> anyhow::Result<AppConfig> {
    toml::from_str(text).context("parse config toml")
}

/// Resolves `p` against `base` unless it is already absolute.
pub fn resolve_relative(base: &Path, p: &str) -> PathBuf {
    let p = PathBuf::from(p.trim());
    if p.is_relative() {
        base.join(p)
    } else {
        p
    }
}
