use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser};

use fragrance_corrector::models::openai::OpenAiChatClient;
use fragrance_corrector::models::TextGenerator;
use fragrance_corrector::pipeline::{
    init_default_config, report_path, CliOverrides, CorrectorPipeline, PipelineConfig,
};
use fragrance_corrector::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "fragrance-corrector")]
#[command(about = "Fragrance spreadsheet cleaner with AI brand/description correction", long_about = None)]
struct Args {
    /// Generate default config + prompt files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input .xlsx
    #[arg(value_name = "XLSX")]
    input: Option<PathBuf>,

    /// Output .xlsx (default: <input_stem>_corrected.xlsx)
    #[arg(short, long, value_name = "XLSX")]
    output: Option<PathBuf>,

    /// Config file path (default: search for fragrance-corrector.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model identifier sent to the correction service
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible API root (e.g. http://localhost:1234/v1)
    #[arg(long)]
    base_url: Option<String>,

    /// Values per brand request
    #[arg(long)]
    brand_chunk: Option<usize>,

    /// Values per description request
    #[arg(long)]
    description_chunk: Option<usize>,

    /// Write every prompt and raw response into the trace dir
    #[arg(long)]
    trace: bool,

    /// Keep a batch's original values on any row-count mismatch
    #[arg(long)]
    strict: bool,

    /// Run pre-processing and derived columns only (no correction service calls)
    #[arg(long)]
    skip_ai: bool,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let progress = ConsoleProgress::new(true);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let input = match args.input {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  fragrance-corrector <input.xlsx>\n\nTIPS:\n  - The API key is read from OPENAI_API_KEY (see [service].api_key_env).\n  - Default config search: fragrance-corrector.toml (upwards), or set FRAGRANCE_CORRECTOR_CONFIG.\n"
            );
            return Ok(());
        }
    };
    let output = match args.output {
        Some(p) => p,
        None => {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output")
                .to_string();
            input.with_file_name(format!("{stem}_corrected.xlsx"))
        }
    };

    let overrides = CliOverrides {
        config_path: args.config,
        model: args.model,
        base_url: args.base_url,
        brand_chunk: args.brand_chunk,
        description_chunk: args.description_chunk,
        trace: args.trace,
        strict: args.strict,
        skip_ai: args.skip_ai,
    };
    let cfg = PipelineConfig::from_paths_and_args(&input, &output, overrides)
        .context("build config")?;

    let mut client = if cfg.skip_ai {
        None
    } else {
        Some(OpenAiChatClient::from_env(&cfg.service).context("create correction client")?)
    };

    let mut pipeline = CorrectorPipeline::new(cfg, progress);
    let report = pipeline.correct_workbook(
        &input,
        &output,
        client.as_mut().map(|c| c as &mut dyn TextGenerator),
    )?;

    eprintln!("Done: {}", report.summary());
    for err in &report.errors {
        eprintln!("  error: {err}");
    }
    eprintln!("Wrote: {}", output.display());
    eprintln!("Report: {}", report_path(&output).display());
    Ok(())
}
