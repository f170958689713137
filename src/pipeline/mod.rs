mod config;
mod corrector;
pub mod jobs;
pub mod prompts;
pub mod reconcile;
pub mod report;
mod trace;

pub use config::{init_default_config, CliOverrides, PipelineConfig};
pub use corrector::{merge_job, CorrectorPipeline, TEMPERATURE};
pub use report::{report_path, JobReport, RunReport};
pub use trace::TraceWriter;
