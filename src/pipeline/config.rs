use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::config::{
    find_default_config, load_config, resolve_relative, AppConfig, CONFIG_ENV_VAR,
    DEFAULT_CONFIG_FILENAME,
};
use crate::models::openai::{OpenAiConfig, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::transform::prepare::PrepareOptions;
use crate::vocabulary::{load_list_file, ReferenceVocabulary};
use crate::workbook::write::ExportOptions;

use super::jobs::ChunkSizes;
use super::prompts::{default_prompt_files, PromptSet, DEFAULT_PROMPTS_DIR};

/// Command-line values that take precedence over the config file.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub brand_chunk: Option<usize>,
    pub description_chunk: Option<usize>,
    pub trace: bool,
    pub strict: bool,
    pub skip_ai: bool,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub workdir: PathBuf,
    pub config_path: PathBuf,

    pub service: OpenAiConfig,
    pub model: String,

    pub chunk_sizes: ChunkSizes,
    pub prepare: PrepareOptions,
    pub export: ExportOptions,
    pub strict_reconcile: bool,
    pub skip_ai: bool,

    pub trace_dir: PathBuf,
    pub trace_prompts: bool,

    pub prompts: PromptSet,
    pub vocabulary: ReferenceVocabulary,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let workdir = PathBuf::from(".");
        Self {
            config_path: workdir.join(DEFAULT_CONFIG_FILENAME),
            trace_dir: workdir.join("_trace"),
            workdir,
            service: OpenAiConfig::default(),
            model: DEFAULT_MODEL.to_string(),
            chunk_sizes: ChunkSizes::default(),
            prepare: PrepareOptions::default(),
            export: ExportOptions::default(),
            strict_reconcile: false,
            skip_ai: false,
            trace_prompts: false,
            prompts: PromptSet::default(),
            vocabulary: ReferenceVocabulary::builtin(),
        }
    }
}

impl PipelineConfig {
    pub fn from_paths_and_args(
        input: &Path,
        output: &Path,
        overrides: CliOverrides,
    ) -> anyhow::Result<Self> {
        let workdir = input
            .parent()
            .map(|p| p.to_path_buf())
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."));
        let workdir = workdir.canonicalize().unwrap_or(workdir);

        let cfg_file = overrides
            .config_path
            .clone()
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
            .or_else(|| find_default_config(&workdir, DEFAULT_CONFIG_FILENAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
            }
        }
        let cfg_path = cfg_file.unwrap_or_else(|| workdir.join(DEFAULT_CONFIG_FILENAME));

        let output_dir = output
            .parent()
            .map(|p| p.to_path_buf())
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| workdir.clone());

        Self::from_app_config(workdir, cfg_path, &output_dir, &file_cfg, overrides)
    }

    pub fn from_app_config(
        workdir: PathBuf,
        config_path: PathBuf,
        output_dir: &Path,
        file_cfg: &AppConfig,
        overrides: CliOverrides,
    ) -> anyhow::Result<Self> {
        let config_dir = config_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let s = &file_cfg.service;
        let service = OpenAiConfig {
            base_url: non_empty(overrides.base_url.clone())
                .or_else(|| non_empty(s.base_url.clone()))
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key_env: non_empty(s.api_key_env.clone())
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            timeout: Duration::from_secs(s.timeout_secs.unwrap_or(120).max(1)),
            max_retries: s.max_retries.unwrap_or(2),
        };
        let model = non_empty(overrides.model.clone())
            .or_else(|| non_empty(s.model.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let p = &file_cfg.pipeline;
        let defaults = ChunkSizes::default();
        let chunk_sizes = ChunkSizes {
            brand: overrides
                .brand_chunk
                .or(p.brand_chunk_size)
                .unwrap_or(defaults.brand)
                .max(1),
            description: overrides
                .description_chunk
                .or(p.description_chunk_size)
                .unwrap_or(defaults.description)
                .max(1),
        };

        let prepare_defaults = PrepareOptions::default();
        let prepare = PrepareOptions {
            large_sheet_threshold: p
                .large_sheet_threshold
                .unwrap_or(prepare_defaults.large_sheet_threshold),
            truncation_buffer: p
                .truncation_buffer
                .unwrap_or(prepare_defaults.truncation_buffer),
        };
        let export = ExportOptions {
            max_rows_per_sheet: p
                .max_rows_per_sheet
                .unwrap_or(ExportOptions::default().max_rows_per_sheet)
                .max(1),
        };

        let trace_dir = p.trace_dir.clone().unwrap_or_else(|| "_trace".to_string());
        let trace_dir = resolve_relative(output_dir, &trace_dir);
        let trace_prompts = overrides.trace || p.trace_prompts.unwrap_or(false);
        let strict_reconcile = overrides.strict || p.strict_reconcile.unwrap_or(false);

        let prompts = PromptSet::load(&config_dir, &file_cfg.prompts).context("load prompts")?;
        let vocabulary = load_vocabulary(&config_dir, file_cfg).context("load vocabulary")?;

        Ok(Self {
            workdir,
            config_path,
            service,
            model,
            chunk_sizes,
            prepare,
            export,
            strict_reconcile,
            skip_ai: overrides.skip_ai,
            trace_dir,
            trace_prompts,
            prompts,
            vocabulary,
        })
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn load_vocabulary(config_dir: &Path, cfg: &AppConfig) -> anyhow::Result<ReferenceVocabulary> {
    let v = &cfg.vocabulary;
    let mut brands = v.extra_brands.clone();
    let mut acronyms = v.extra_acronyms.clone();
    if let Some(f) = v.brands_file.as_deref() {
        brands.extend(load_list_file(&resolve_relative(config_dir, f))?);
    }
    if let Some(f) = v.acronyms_file.as_deref() {
        acronyms.extend(load_list_file(&resolve_relative(config_dir, f))?);
    }
    Ok(ReferenceVocabulary::builtin().extended(brands, acronyms))
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(DEFAULT_CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;

    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[service]
base_url = "https://api.openai.com/v1"
model = "gpt-4o"
# The key itself is never stored here.
api_key_env = "OPENAI_API_KEY"
timeout_secs = 120
max_retries = 2

[pipeline]
brand_chunk_size = 70
description_chunk_size = 30

# Sheets longer than this are cut after their last data row (+ buffer).
large_sheet_threshold = 10000
truncation_buffer = 20

# Exported sheets above this many rows are split into <name>_Part<N>.
max_rows_per_sheet = 500000

trace_dir = "_trace"
trace_prompts = false

# true: any row-count mismatch keeps the batch's original values.
# false: extra rows are dropped, missing trailing rows are filled from the input.
strict_reconcile = false

[prompts]
brand = "prompts/brand.txt"
description = "prompts/description.txt"

[vocabulary]
# One entry per line; merged with the built-in lists.
# brands_file = "brands.txt"
# acronyms_file = "acronyms.txt"
extra_brands = []
extra_acronyms = []
"#;
