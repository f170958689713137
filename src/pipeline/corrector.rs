use std::path::Path;

use anyhow::Context;
use tracing::{error, info, warn};

use crate::dataset::Dataset;
use crate::error::{MergeError, MergeIntegrityError, StructuralError};
use crate::models::TextGenerator;
use crate::progress::{progress_fraction, ProgressSink};
use crate::transform::derive::apply_derived_columns;
use crate::transform::prepare::prepare_sheet;
use crate::workbook::{read_workbook_bytes, write_workbook};

use super::jobs::{extract_all_jobs, total_batches, Batch, CorrectionJob};
use super::reconcile::{reconcile, Reconciled, Repair};
use super::report::{fingerprint, report_path, write_report, JobReport, RunReport};
use super::trace::TraceWriter;
use super::PipelineConfig;

/// Sampling temperature for every correction call.
pub const TEMPERATURE: f32 = 0.0;

pub struct CorrectorPipeline<P: ProgressSink> {
    cfg: PipelineConfig,
    progress: P,
    trace: TraceWriter,
}

/// Batches finished so far across the whole run.
struct RunProgress {
    done: usize,
    total: usize,
}

impl<P: ProgressSink> CorrectorPipeline<P> {
    pub fn new(cfg: PipelineConfig, progress: P) -> Self {
        let trace = match TraceWriter::new(cfg.trace_dir.clone(), cfg.trace_prompts) {
            Ok(t) => t,
            Err(err) => {
                warn!(error = %err, "trace disabled");
                TraceWriter::disabled()
            }
        };
        Self {
            cfg,
            progress,
            trace,
        }
    }

    pub fn progress(&self) -> &P {
        &self.progress
    }

    /// Reads `input`, corrects it and writes `output`. Nothing is written when the run
    /// fails at the dataset level.
    pub fn correct_workbook(
        &mut self,
        input: &Path,
        output: &Path,
        generator: Option<&mut dyn TextGenerator>,
    ) -> anyhow::Result<RunReport> {
        self.progress.info(&format!("Read workbook: {}", input.display()));
        let bytes =
            std::fs::read(input).with_context(|| format!("read input: {}", input.display()))?;
        let dataset = read_workbook_bytes(&bytes)
            .with_context(|| format!("read workbook: {}", input.display()))?;

        let (dataset, mut report) = self.process(dataset, generator)?;
        report.input_sha256 = Some(fingerprint(&bytes));

        self.progress.info(&format!("Write workbook: {}", output.display()));
        let export = write_workbook(&dataset, output, &self.cfg.export)?;
        for name in &export.skipped_empty {
            info!(sheet = %name, "empty sheet skipped on export");
        }
        for w in export.warnings {
            warn!("{w}");
            report.warn(w);
        }

        let report_file = report_path(output);
        match write_report(&report_file, &report) {
            Ok(()) => info!(path = %report_file.display(), "run report written"),
            Err(err) => warn!(error = %err, "write run report"),
        }
        Ok(report)
    }

    /// Pre-processing, AI correction and derived columns over an in-memory dataset.
    ///
    /// With no generator every job is still extracted and reported, but values are kept.
    pub fn process(
        &mut self,
        mut dataset: Dataset,
        generator: Option<&mut dyn TextGenerator>,
    ) -> anyhow::Result<(Dataset, RunReport)> {
        let mut report = RunReport {
            model: self.cfg.model.clone(),
            ai_skipped: generator.is_none(),
            ..RunReport::default()
        };

        for sheet in &mut dataset.sheets {
            for w in prepare_sheet(sheet, &self.cfg.prepare) {
                warn!(sheet = %sheet.name, "{w}");
                report.warn(w);
            }
        }

        let jobs = extract_all_jobs(&dataset);
        if jobs.is_empty() {
            return Err(StructuralError::NoEligibleColumns.into());
        }
        let total = total_batches(&jobs, &self.cfg.chunk_sizes);
        report.total_batches = total;
        self.progress.info(&format!(
            "Found {} columns to correct ({} batches)",
            jobs.len(),
            total
        ));

        let mut run = RunProgress { done: 0, total };
        self.progress.report(progress_fraction(0, total), "Starting corrections");
        match generator {
            Some(generator) => {
                for job in &jobs {
                    let job_report = self.run_job(&mut dataset, job, generator, &mut run, &mut report);
                    report.jobs.push(job_report);
                }
            }
            None => {
                for job in &jobs {
                    let batches = job.batch_count(self.cfg.chunk_sizes.for_kind(job.kind));
                    report.jobs.push(JobReport::for_job(job, batches));
                }
                run.done = total;
                self.progress
                    .report(progress_fraction(total, total), "Corrections skipped");
            }
        }
        report.completed_batches = run.done;

        for sheet in &mut dataset.sheets {
            apply_derived_columns(sheet)?;
        }
        self.progress.info(&report.summary());
        Ok((dataset, report))
    }

    fn run_job(
        &mut self,
        dataset: &mut Dataset,
        job: &CorrectionJob,
        generator: &mut dyn TextGenerator,
        run: &mut RunProgress,
        report: &mut RunReport,
    ) -> JobReport {
        let size = self.cfg.chunk_sizes.for_kind(job.kind);
        let batch_count = job.batch_count(size);
        let mut job_report = JobReport::for_job(job, batch_count);
        info!(
            sheet = %job.sheet,
            column = %job.column,
            rows = job.values.len(),
            batches = batch_count,
            "correcting column"
        );

        let mut corrected: Vec<String> = Vec::with_capacity(job.values.len());
        for batch in job.batches(size) {
            let result = self.correct_batch(job, &batch, generator);
            if let Some(repair) = result.repair.as_ref() {
                warn!(
                    sheet = %job.sheet,
                    column = %job.column,
                    batch = batch.number,
                    "{repair}"
                );
                report.warn(format!(
                    "sheet '{}', column '{}', batch {}: {repair}",
                    job.sheet, job.column, batch.number
                ));
                if repair.is_fallback() {
                    job_report.batches_failed += 1;
                    report.fallbacks += 1;
                } else {
                    job_report.batches_repaired += 1;
                }
            }
            corrected.extend(result.values);

            run.done += 1;
            self.progress.report(
                progress_fraction(run.done, run.total),
                &format!(
                    "{} / {}: batch {}/{} ({}/{})",
                    job.sheet, job.column, batch.number, batch_count, run.done, run.total
                ),
            );
        }

        match merge_job(dataset, job, &corrected) {
            Ok(()) => job_report.merged = true,
            Err(err) => {
                error!(sheet = %job.sheet, column = %job.column, "{err}");
                report.error(err.to_string());
            }
        }
        job_report
    }

    /// Prompt, call and reconcile one batch. Never fails: service errors keep the
    /// original values.
    pub fn correct_batch(
        &self,
        job: &CorrectionJob,
        batch: &Batch<'_>,
        generator: &mut dyn TextGenerator,
    ) -> Reconciled {
        let prompt = self
            .cfg
            .prompts
            .build(job.kind, &self.cfg.vocabulary, batch.values);
        self.trace_batch(job, batch.number, "prompt", &prompt);

        match generator.generate(&self.cfg.model, &prompt, TEMPERATURE) {
            Ok(raw) => {
                self.trace_batch(job, batch.number, "response", &raw);
                reconcile(&raw, job.kind, batch.values, self.cfg.strict_reconcile)
            }
            Err(err) => Reconciled::fallback(batch.values, Repair::ServiceFailure(err.to_string())),
        }
    }

    fn trace_batch(&self, job: &CorrectionJob, batch: usize, kind: &str, text: &str) {
        if let Err(err) = self
            .trace
            .write_batch_text(&job.sheet, &job.column, batch, kind, text)
        {
            warn!(error = %err, "write trace");
        }
    }
}

/// Writes a job's corrected values back by row position, or leaves the column untouched.
pub fn merge_job(
    dataset: &mut Dataset,
    job: &CorrectionJob,
    corrected: &[String],
) -> Result<(), MergeError> {
    if job.positions.len() != corrected.len() {
        return Err(MergeIntegrityError {
            sheet: job.sheet.clone(),
            column: job.column.clone(),
            positions: job.positions.len(),
            corrected: corrected.len(),
        }
        .into());
    }
    dataset
        .sheet_mut(&job.sheet)?
        .write_column(&job.column, &job.positions, corrected)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::dataset::{Cell, Sheet};
    use crate::error::ServiceError;
    use crate::pipeline::jobs::{ChunkSizes, ColumnKind};
    use crate::progress::NullProgress;

    struct Scripted {
        replies: VecDeque<Result<String, ServiceError>>,
        prompts: Vec<String>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ServiceError>>) -> Self {
            Self {
                replies: replies.into(),
                prompts: Vec::new(),
            }
        }
    }

    impl TextGenerator for Scripted {
        fn generate(
            &mut self,
            _model: &str,
            prompt: &str,
            temperature: f32,
        ) -> Result<String, ServiceError> {
            assert_eq!(temperature, 0.0);
            self.prompts.push(prompt.to_string());
            self.replies
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::MalformedResponse("no reply".into())))
        }
    }

    #[derive(Default)]
    struct Recording {
        fractions: RefCell<Vec<f64>>,
    }

    impl ProgressSink for Recording {
        fn info(&self, _msg: &str) {}

        fn report(&self, fraction: f64, _status: &str) {
            self.fractions.borrow_mut().push(fraction);
        }
    }

    fn dataset() -> Dataset {
        let mut s = Sheet::new("Feb", vec!["Brand".into(), "Description".into()]);
        s.push_row(vec![Cell::text("ga profondo edt 50ml"), Cell::text("GA ADG EDT 50ml")]);
        s.push_row(vec![Cell::Empty, Cell::Empty]);
        s.push_row(vec![Cell::text("Kylie Jenner"), Cell::text("YSL Libre EDP 90ml")]);
        Dataset::new(vec![s])
    }

    fn config(brand: usize, description: usize) -> PipelineConfig {
        PipelineConfig {
            chunk_sizes: ChunkSizes { brand, description },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn corrected_values_merge_back_by_position() {
        let mut gen = Scripted::new(vec![
            Ok("brand\nGiorgio Armani Profondo EDT 50ml\nKylie Jenner".into()),
            Ok("```csv\ndescription\nAcqua di Gio\nLibre\n```".into()),
        ]);
        let mut pipeline = CorrectorPipeline::new(config(70, 30), NullProgress);
        let (out, report) = pipeline.process(dataset(), Some(&mut gen)).expect("process");

        let sheet = &out.sheets[0];
        assert_eq!(sheet.text_at(0, Some(0)), "Giorgio Armani Profondo EDT 50ml");
        assert_eq!(sheet.cell(1, 0), &Cell::Empty);
        assert_eq!(sheet.text_at(2, Some(0)), "Kylie Jenner");
        assert_eq!(sheet.text_at(0, Some(1)), "Acqua di Gio");
        assert_eq!(sheet.text_at(2, Some(1)), "Libre");
        assert_eq!(report.total_batches, 2);
        assert!(report.jobs.iter().all(|j| j.merged));
        assert!(report.warnings.is_empty());
        assert!(gen.prompts[0].contains("```csv\nbrand\nga profondo edt 50ml\nKylie Jenner\n```"));
    }

    #[test]
    fn service_failure_keeps_original_batch_and_continues() {
        let mut gen = Scripted::new(vec![
            Err(ServiceError::Auth(401)),
            Ok("brand\nKylie Jenner".into()),
            Ok("description\nAcqua di Gio\nLibre".into()),
        ]);
        let mut pipeline = CorrectorPipeline::new(config(1, 30), NullProgress);
        let (out, report) = pipeline.process(dataset(), Some(&mut gen)).expect("process");

        let sheet = &out.sheets[0];
        assert_eq!(sheet.text_at(0, Some(0)), "ga profondo edt 50ml");
        assert_eq!(sheet.text_at(2, Some(0)), "Kylie Jenner");
        assert_eq!(sheet.text_at(2, Some(1)), "Libre");
        assert_eq!(report.fallbacks, 1);
        assert_eq!(report.jobs[0].batches_failed, 1);
        assert_eq!(report.completed_batches, 3);
        assert!(!report.has_errors());
    }

    #[test]
    fn progress_is_monotonic_and_completes() {
        let mut gen = Scripted::new(vec![
            Ok("brand\nA".into()),
            Ok("".into()),
            Ok("description\nX\nY\nZ".into()),
        ]);
        let mut pipeline = CorrectorPipeline::new(config(1, 30), Recording::default());
        pipeline.process(dataset(), Some(&mut gen)).expect("process");

        let fractions = pipeline.progress().fractions.borrow().clone();
        assert_eq!(fractions.first().copied(), Some(0.0));
        assert_eq!(fractions.last().copied(), Some(1.0));
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.len(), 4);
    }

    #[test]
    fn dataset_without_eligible_columns_is_a_structural_error() {
        let mut s = Sheet::new("S", vec!["SKU code".into(), "Brand".into()]);
        s.push_row(vec![Cell::text("1"), Cell::text("  ")]);
        let mut pipeline = CorrectorPipeline::new(PipelineConfig::default(), NullProgress);
        let err = pipeline
            .process(Dataset::new(vec![s]), None)
            .expect_err("no jobs");
        assert_eq!(
            err.downcast_ref::<StructuralError>(),
            Some(&StructuralError::NoEligibleColumns)
        );
    }

    #[test]
    fn skipping_ai_still_reports_jobs_and_derives_columns() {
        let mut pipeline = CorrectorPipeline::new(PipelineConfig::default(), NullProgress);
        let (out, report) = pipeline.process(dataset(), None).expect("process");
        assert!(report.ai_skipped);
        assert_eq!(report.jobs.len(), 2);
        assert_eq!(report.jobs[0].kind, Some(ColumnKind::Brand));
        assert!(out.sheets[0].find_column("Caveat").is_some());
        assert_eq!(out.sheets[0].text_at(0, Some(0)), "ga profondo edt 50ml");
    }

    #[test]
    fn merge_rejects_length_mismatch_without_writing() {
        let mut ds = dataset();
        let job = extract_all_jobs(&ds).remove(0);
        let err = merge_job(&mut ds, &job, &["only one".to_string()]).expect_err("mismatch");
        assert!(matches!(err, MergeError::Integrity(_)));
        assert_eq!(ds.sheets[0].text_at(0, Some(0)), "ga profondo edt 50ml");
    }
}
