//! Batch annotation of spreadsheet rows and text files through an LLM
//! chat-completion endpoint.
//!
//! Two modes: label every row of a CSV with one category from a closed
//! set, or pull verbatim quotes (with surrounding context) out of plain
//! text. Small submissions finish inline; larger ones become durable
//! jobs driven forward by repeated bounded-time invocations.

pub mod assembler;
pub mod chunker;
pub mod completion;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod prompt;
pub mod runner;
pub mod scheduler;
pub mod tabular;
pub mod types;

use tracing_subscriber::EnvFilter;

pub use config::{PipelineConfig, SubmissionConfig};
pub use error::{CompletionError, InputError, PipelineError, StoreError};
pub use job::{JobStore, SqliteJobStore};
pub use runner::{job_status, run_invocation, submit_tabular, submit_texts, SubmissionOutcome};
pub use types::{Job, JobStatus, JobStatusReport, Mode};

/// Initialize tracing, honoring `RUST_LOG` when set.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
