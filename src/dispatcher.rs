//! Per-unit annotation dispatch.
//!
//! `annotate` is total: every work unit produces exactly one result, no
//! matter what the completion endpoint does. The two modes carry distinct,
//! deliberate failure policies:
//! - labels: fallback to the first configured label (every row gets a label);
//! - quotes: drop the chunk's contribution (no quotes are ever invented).

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::completion::{ChatMessage, CompletionClient, CompletionRequest};
use crate::config::{PipelineConfig, SubmissionConfig};
use crate::prompt::{self, PromptSpec};
use crate::types::{
    display_row, AnnotationResult, ExtractedQuote, Mode, UnitOutput, WorkUnit,
};

/// Minimum kept quote length, in characters.
const MIN_QUOTE_CHARS: usize = 10;

/// Completion budget for a single label answer.
const LABEL_MAX_TOKENS: u32 = 16;

/// Completion budget for a quote array.
const QUOTE_MAX_TOKENS: u32 = 1024;

/// Issues one completion request per work unit and normalizes the answer.
pub struct AnnotationDispatcher<'a> {
    client: &'a dyn CompletionClient,
    config: &'a SubmissionConfig,
    tuning: &'a PipelineConfig,
}

impl<'a> AnnotationDispatcher<'a> {
    pub fn new(
        client: &'a dyn CompletionClient,
        config: &'a SubmissionConfig,
        tuning: &'a PipelineConfig,
    ) -> Self {
        Self {
            client,
            config,
            tuning,
        }
    }

    /// Annotate one unit. Never fails: per-unit errors become the mode's
    /// fallback output.
    pub async fn annotate(&self, unit: &WorkUnit) -> AnnotationResult {
        let output = match self.config.mode {
            Mode::Labels => self.classify(unit).await,
            Mode::Quotes => self.extract(unit).await,
        };
        AnnotationResult {
            unit_index: unit.index,
            payload: unit.payload.clone(),
            output,
            source_name: unit.source_name.clone(),
        }
    }

    async fn classify(&self, unit: &WorkUnit) -> UnitOutput {
        let text = truncate_chars(&unit.payload.joined_text(), self.tuning.max_field_chars);
        let rendered = prompt::render(
            &PromptSpec::Labels {
                labels: &self.config.labels,
            },
            &self.config.prompt,
            &text,
        );

        let request = CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(rendered.system),
                ChatMessage::user(rendered.user),
            ],
            max_tokens: LABEL_MAX_TOKENS,
            temperature: 0.0,
        };

        let label = match self.send(&request).await {
            Some(answer) => match match_label(&answer, &self.config.labels) {
                Some(label) => label,
                None => {
                    tracing::debug!(
                        row = display_row(unit.index),
                        answer = %answer.trim(),
                        "answer matched no label, using fallback"
                    );
                    self.fallback_label()
                }
            },
            None => self.fallback_label(),
        };

        UnitOutput::Label { label }
    }

    async fn extract(&self, unit: &WorkUnit) -> UnitOutput {
        let rendered = prompt::render(
            &PromptSpec::Quotes {
                context_window: self.config.context_window,
            },
            &self.config.prompt,
            &unit.payload.joined_text(),
        );

        let request = CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(rendered.system),
                ChatMessage::user(rendered.user),
            ],
            max_tokens: QUOTE_MAX_TOKENS,
            temperature: 0.0,
        };

        let quotes = match self.send(&request).await {
            Some(response) => parse_quote_response(&response, unit.index),
            None => Vec::new(),
        };

        UnitOutput::Quotes { quotes }
    }

    /// Send with the per-request timeout; all failures collapse to `None`
    /// after logging, so callers apply their mode's fallback policy.
    async fn send(&self, request: &CompletionRequest) -> Option<String> {
        let timeout = Duration::from_secs(self.tuning.request_timeout_secs);
        match tokio::time::timeout(timeout, self.client.complete(request)).await {
            Ok(Ok(answer)) => Some(answer),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "completion request failed for unit");
                None
            }
            Err(_) => {
                tracing::warn!(
                    secs = self.tuning.request_timeout_secs,
                    "completion request timed out for unit"
                );
                None
            }
        }
    }

    fn fallback_label(&self) -> String {
        self.config.labels.first().cloned().unwrap_or_default()
    }
}

/// First case-insensitive substring match against the labels in list order.
fn match_label(answer: &str, labels: &[String]) -> Option<String> {
    let lowered = answer.to_lowercase();
    labels
        .iter()
        .find(|label| lowered.contains(&label.to_lowercase()))
        .cloned()
}

/// Parse a quote-mode response, tolerating fenced code blocks and
/// commentary around the array. Malformed responses yield zero quotes.
fn parse_quote_response(response: &str, unit_index: usize) -> Vec<ExtractedQuote> {
    static ARRAY_RE: OnceLock<Regex> = OnceLock::new();
    let re = ARRAY_RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("valid regex"));

    let Some(array) = re.find(response) else {
        tracing::warn!(chunk = unit_index, "no JSON array in quote response, dropping chunk");
        return Vec::new();
    };

    match serde_json::from_str::<Vec<ExtractedQuote>>(array.as_str()) {
        Ok(quotes) => quotes
            .into_iter()
            .filter(|q| q.quote.chars().count() > MIN_QUOTE_CHARS)
            .collect(),
        Err(e) => {
            tracing::warn!(
                chunk = unit_index,
                error = %e,
                "malformed quote JSON, dropping chunk"
            );
            Vec::new()
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
