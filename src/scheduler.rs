//! Batched concurrent dispatch under a wall-clock budget.
//!
//! Units are partitioned into fixed-size batches; each batch's requests are
//! in flight together and awaited together. A short delay between batches
//! keeps the pipeline under upstream rate limits. The budget is checked
//! between batches only; that cooperative exit point is what makes large
//! jobs resumable across invocations.

use std::time::{Duration, Instant};

use futures_util::future::join_all;

use crate::config::PipelineConfig;
use crate::dispatcher::AnnotationDispatcher;
use crate::types::{AnnotationResult, WorkUnit};

/// Extra headroom beyond the per-request timeout before a whole batch is
/// declared stuck and skipped.
const BATCH_GUARD_MARGIN_SECS: u64 = 15;

/// What one bounded invocation of the scheduler accomplished.
#[derive(Debug)]
pub struct InvocationOutcome {
    /// Results in completion order; callers sort by `unit_index`.
    pub results: Vec<AnnotationResult>,
    /// Units this invocation is done with (including any skipped batch).
    pub processed: usize,
    /// True when the scheduler stopped because the budget ran out.
    pub budget_exhausted: bool,
}

/// Run as many batches as the budget allows.
///
/// Individual unit failures are absorbed by the dispatcher; a batch that
/// exceeds the guard timeout as a whole is logged and skipped, and the
/// offset still advances so the job keeps moving.
pub async fn run_batches(
    units: &[WorkUnit],
    dispatcher: &AnnotationDispatcher<'_>,
    tuning: &PipelineConfig,
    budget: Option<Duration>,
) -> InvocationOutcome {
    let start = Instant::now();
    let batch_size = tuning.batch_size.max(1);
    let guard = Duration::from_secs(tuning.request_timeout_secs + BATCH_GUARD_MARGIN_SECS);

    let mut results = Vec::with_capacity(units.len());
    let mut processed = 0usize;
    let mut budget_exhausted = false;

    for batch in units.chunks(batch_size) {
        if let Some(budget) = budget {
            if start.elapsed() >= budget {
                tracing::info!(
                    processed,
                    remaining = units.len() - processed,
                    "invocation budget exhausted, stopping for resume"
                );
                budget_exhausted = true;
                break;
            }
        }

        let in_flight: Vec<_> = batch.iter().map(|unit| dispatcher.annotate(unit)).collect();
        match tokio::time::timeout(guard, join_all(in_flight)).await {
            Ok(batch_results) => results.extend(batch_results),
            Err(_) => {
                tracing::warn!(
                    first_unit = batch[0].index,
                    batch_len = batch.len(),
                    "whole batch exceeded guard timeout, skipping it"
                );
            }
        }
        processed += batch.len();

        if processed < units.len() && tuning.inter_batch_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(tuning.inter_batch_delay_ms)).await;
        }
    }

    InvocationOutcome {
        results,
        processed,
        budget_exhausted,
    }
}
