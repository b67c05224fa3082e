//! Submission entry points and the per-invocation drive loop.
//!
//! Small submissions complete inline and return the finished CSV.
//! Anything larger becomes a durable job: each call to
//! [`run_invocation`] chews through as many units as the wall-clock
//! budget allows, persists results and progress, and leaves the job
//! resumable until the last unit is done.

use std::time::Duration;

use crate::assembler::{self, AssembledOutput, QUOTES_FILE_NAME};
use crate::chunker::ChunkPlanner;
use crate::completion::CompletionClient;
use crate::config::{PipelineConfig, SubmissionConfig};
use crate::dispatcher::AnnotationDispatcher;
use crate::error::{InputError, PipelineError};
use crate::job::{JobStore, NewJob};
use crate::scheduler;
use crate::tabular;
use crate::types::{Job, JobStatusReport, Mode, UnitPayload, WorkUnit};

/// What a submission call produced: an inline result, or a queued job to
/// poll and drive.
#[derive(Debug)]
pub enum SubmissionOutcome {
    Completed(AssembledOutput),
    Queued { job_id: String },
}

/// Submit a CSV file for row labeling.
///
/// Files at or under the sync limit are annotated before this returns;
/// larger files are persisted as a pending job.
pub async fn submit_tabular(
    bytes: &[u8],
    file_name: &str,
    config: SubmissionConfig,
    tuning: &PipelineConfig,
    client: &dyn CompletionClient,
    store: &dyn JobStore,
) -> Result<SubmissionOutcome, PipelineError> {
    config.validate()?;

    let rows = tabular::parse_bytes(bytes)?;
    let header = rows[0].clone();
    let units: Vec<WorkUnit> = rows
        .into_iter()
        .skip(1)
        .enumerate()
        .map(|(index, fields)| WorkUnit {
            index,
            payload: UnitPayload::Row { fields },
            source_name: file_name.to_string(),
        })
        .collect();

    tracing::info!(file = file_name, units = units.len(), "tabular submission");
    submit_units(units, file_name, Some(header), config, tuning, client, store).await
}

/// Submit one or more plain-text files for quote extraction. Each entry
/// is a (file name, contents) pair.
pub async fn submit_texts(
    files: &[(String, String)],
    config: SubmissionConfig,
    tuning: &PipelineConfig,
    client: &dyn CompletionClient,
    store: &dyn JobStore,
) -> Result<SubmissionOutcome, PipelineError> {
    config.validate()?;

    let planner = ChunkPlanner::new();
    let mut units = Vec::new();
    for (name, text) in files {
        for segment in planner.plan(text) {
            units.push(WorkUnit {
                index: units.len(),
                payload: UnitPayload::Text { segment },
                source_name: name.clone(),
            });
        }
    }
    if units.is_empty() {
        return Err(PipelineError::Input(InputError::NoSegments));
    }

    let file_name = files
        .first()
        .map(|(name, _)| name.as_str())
        .unwrap_or(QUOTES_FILE_NAME);
    tracing::info!(files = files.len(), units = units.len(), "text submission");
    submit_units(units, file_name, None, config, tuning, client, store).await
}

async fn submit_units(
    units: Vec<WorkUnit>,
    file_name: &str,
    header: Option<Vec<String>>,
    config: SubmissionConfig,
    tuning: &PipelineConfig,
    client: &dyn CompletionClient,
    store: &dyn JobStore,
) -> Result<SubmissionOutcome, PipelineError> {
    if units.len() <= tuning.sync_unit_limit {
        let dispatcher = AnnotationDispatcher::new(client, &config, tuning);
        let outcome = scheduler::run_batches(&units, &dispatcher, tuning, None).await;
        let output = assembler::assemble(&config, header.as_deref(), file_name, &outcome.results);
        return Ok(SubmissionOutcome::Completed(output));
    }

    let job = store.create_job(&NewJob {
        file_name: file_name.to_string(),
        config,
        header,
        units,
    })?;
    tracing::info!(job_id = %job.id, total = job.total_units, "job queued");
    Ok(SubmissionOutcome::Queued { job_id: job.id })
}

/// Drive one bounded invocation of a queued job.
///
/// Picks up at the persisted offset, annotates up to the per-invocation
/// unit cap within the wall-clock budget, persists what it got, and
/// finalizes the job when the last unit is in. Safe to call again after
/// completion; terminal jobs are reported without any dispatch.
pub async fn run_invocation(
    job_id: &str,
    tuning: &PipelineConfig,
    client: &dyn CompletionClient,
    store: &dyn JobStore,
) -> Result<JobStatusReport, PipelineError> {
    let job = store.get_job(job_id)?;
    let (config, header) = store.get_submission(job_id)?;
    if job.status.is_terminal() {
        return Ok(build_report(&job, config.mode));
    }

    store.set_processing(job_id)?;

    let offset = job.processed_units;
    let units = store.load_units(job_id, offset, tuning.max_units_per_invocation)?;
    if units.is_empty() {
        return finalize(job_id, &config, header.as_deref(), store);
    }

    let dispatcher = AnnotationDispatcher::new(client, &config, tuning);
    let budget = Duration::from_secs(tuning.invocation_budget_secs);
    let outcome = scheduler::run_batches(&units, &dispatcher, tuning, Some(budget)).await;

    let new_processed = offset + outcome.processed as u32;
    if let Err(e) = store
        .store_results(job_id, &outcome.results)
        .and_then(|_| store.update_progress(job_id, new_processed))
    {
        tracing::error!(job_id, error = %e, "failed to persist invocation results");
        if let Err(mark_err) = store.mark_failed(job_id, &format!("result storage failed: {e}")) {
            tracing::warn!(job_id, error = %mark_err, "could not mark job failed");
        }
        return Err(PipelineError::Store(e));
    }

    if new_processed >= job.total_units {
        return finalize(job_id, &config, header.as_deref(), store);
    }

    tracing::info!(
        job_id,
        processed = new_processed,
        total = job.total_units,
        budget_exhausted = outcome.budget_exhausted,
        "invocation finished, job still in progress"
    );
    let job = store.get_job(job_id)?;
    Ok(build_report(&job, config.mode))
}

fn finalize(
    job_id: &str,
    config: &SubmissionConfig,
    header: Option<&[String]>,
    store: &dyn JobStore,
) -> Result<JobStatusReport, PipelineError> {
    let job = store.get_job(job_id)?;
    let results = store.load_results(job_id)?;
    let output = assembler::assemble(config, header, &job.file_name, &results);
    store.mark_completed(job_id, &output.csv)?;
    tracing::info!(job_id, file = %output.file_name, "job completed");

    let job = store.get_job(job_id)?;
    Ok(build_report(&job, config.mode))
}

/// Poll a job without driving it.
pub fn job_status(job_id: &str, store: &dyn JobStore) -> Result<JobStatusReport, PipelineError> {
    let job = store.get_job(job_id)?;
    let (config, _header) = store.get_submission(job_id)?;
    Ok(build_report(&job, config.mode))
}

fn build_report(job: &Job, mode: Mode) -> JobStatusReport {
    let progress_percent = if job.total_units == 0 {
        100
    } else {
        (job.processed_units as f64 / job.total_units as f64 * 100.0).round() as u32
    };

    let (result_payload, result_file_name) = match (&job.status, &job.result_payload) {
        (crate::types::JobStatus::Completed, Some(csv)) => {
            let name = match mode {
                Mode::Labels => assembler::labeled_file_name(&job.file_name),
                Mode::Quotes => QUOTES_FILE_NAME.to_string(),
            };
            (Some(assembler::encode_payload(csv)), Some(name))
        }
        _ => (None, None),
    };

    JobStatusReport {
        status: job.status,
        total_units: job.total_units,
        processed_units: job.processed_units,
        progress_percent,
        error_message: job.error_message.clone(),
        result_payload,
        result_file_name,
    }
}
