//! Error taxonomy for the annotation pipeline.
//!
//! Four tiers with different recovery policies:
//! - `InputError`: surfaced to the caller before any job exists.
//! - `CompletionError`: per-unit, absorbed by the dispatcher (fallback label
//!   in labels mode, zero quotes in quotes mode) and never fails a job.
//! - `StoreError`: durable-store failures; outside the per-unit net, these
//!   mark the job failed.
//! - `PipelineError`: umbrella returned by the runner entry points.

use thiserror::Error;

/// Malformed or unsupported input, rejected before a job is created.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("file is empty")]
    Empty,

    #[error("file must contain a header row and at least one data row")]
    TooFewRows,

    #[error(
        "binary spreadsheet formats are not supported; export the sheet as a \
         CSV file (File > Save As > CSV) and upload that instead"
    )]
    ConversionRequired,

    #[error("no text segments long enough to annotate were found")]
    NoSegments,
}

/// A single completion request failed. Always recovered locally.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("cannot reach completion endpoint at {0}")]
    Connection(String),

    #[error("completion request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("completion endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("unexpected response shape: {0}")]
    ResponseShape(String),
}

/// Durable job-store failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration v{version} failed: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {0} is in a terminal state and cannot be updated")]
    TerminalState(String),

    #[error("bad stored JSON: {0}")]
    Json(String),
}

/// Top-level error returned by the runner entry points.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid submission: {0}")]
    Config(String),
}
