//! Submission parameters and pipeline tuning.
//!
//! `SubmissionConfig` is what the caller hands in with a file; it is
//! persisted alongside queued jobs so later invocations annotate with the
//! same prompt, labels, and model. `PipelineConfig` holds operational
//! tuning (batch width, delays, budgets) and is never persisted.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::Mode;

/// Caller-supplied parameters for one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    pub mode: Mode,
    /// Closed, ordered label set (labels mode only). The first label is the
    /// fallback when the model's answer matches nothing.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Caller prompt template embedded into the system instruction.
    pub prompt: String,
    /// Completion model identifier passed through to the endpoint.
    pub model: String,
    /// Requested character radius of context around each quote (quotes mode).
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// Ordered metadata columns prepended to the quotes output schema.
    #[serde(default)]
    pub metadata_fields: Vec<String>,
    /// Opaque credential forwarded as the bearer token. Never logged.
    #[serde(skip_serializing, default)]
    pub credential: String,
}

fn default_context_window() -> usize {
    200
}

impl SubmissionConfig {
    pub fn for_labels(prompt: &str, model: &str, labels: Vec<String>, credential: &str) -> Self {
        Self {
            mode: Mode::Labels,
            labels,
            prompt: prompt.to_string(),
            model: model.to_string(),
            context_window: default_context_window(),
            metadata_fields: Vec::new(),
            credential: credential.to_string(),
        }
    }

    pub fn for_quotes(prompt: &str, model: &str, context_window: usize, credential: &str) -> Self {
        Self {
            mode: Mode::Quotes,
            labels: Vec::new(),
            prompt: prompt.to_string(),
            model: model.to_string(),
            context_window,
            metadata_fields: Vec::new(),
            credential: credential.to_string(),
        }
    }

    /// Reject submissions that cannot produce a valid result, before any
    /// dispatch or job creation happens.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.model.trim().is_empty() {
            return Err(PipelineError::Config("model identifier is empty".into()));
        }
        if self.mode == Mode::Labels && self.labels.is_empty() {
            return Err(PipelineError::Config(
                "labels mode requires at least one label".into(),
            ));
        }
        Ok(())
    }
}

/// Operational tuning for scheduling and dispatch.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Units dispatched concurrently per batch.
    pub batch_size: usize,
    /// Throttle between batches, to stay under upstream rate limits.
    pub inter_batch_delay_ms: u64,
    /// Per-request timeout, independent of the invocation budget.
    pub request_timeout_secs: u64,
    /// Character budget for the user message in labels mode.
    pub max_field_chars: usize,
    /// Jobs at or under this unit count complete synchronously.
    pub sync_unit_limit: usize,
    /// Cap on units attempted within a single invocation.
    pub max_units_per_invocation: u32,
    /// Wall-clock budget per invocation, checked between batches.
    pub invocation_budget_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            inter_batch_delay_ms: 500,
            request_timeout_secs: 30,
            max_field_chars: 4000,
            sync_unit_limit: 50,
            max_units_per_invocation: 500,
            invocation_budget_secs: 240,
        }
    }
}

impl PipelineConfig {
    /// Mode-adjusted defaults: quote extraction returns much longer
    /// completions, so it runs with a narrower batch.
    pub fn for_mode(mode: Mode) -> Self {
        let mut config = Self::default();
        if mode == Mode::Quotes {
            config.batch_size = 5;
        }
        config
    }
}

/// Default `RUST_LOG` filter when the environment does not set one.
pub fn default_log_filter() -> &'static str {
    "annotable=info"
}
