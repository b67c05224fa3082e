//! Turns a completed set of per-unit results into the final CSV
//! artifact. Output order follows unit index regardless of the order
//! in which completions arrived.

use std::collections::HashMap;

use base64::Engine as _;

use crate::config::SubmissionConfig;
use crate::tabular;
use crate::types::{AnnotationResult, Mode, UnitOutput, UnitPayload};

/// File name for the quote-extraction artifact; label jobs derive theirs
/// from the submitted file via [`labeled_file_name`].
pub const QUOTES_FILE_NAME: &str = "extracted_quotes.csv";

const LABEL_COLUMN: &str = "Label";
const QUOTE_COLUMN: &str = "Quote";
const CONTEXT_COLUMN: &str = "Context";

/// Assembled artifact plus a human-readable summary line.
#[derive(Debug, Clone)]
pub struct AssembledOutput {
    pub csv: String,
    pub file_name: String,
    pub summary: String,
}

/// "feedback.csv" → "labeled_feedback.csv".
pub fn labeled_file_name(original: &str) -> String {
    let stem = original.strip_suffix(".csv").unwrap_or(original);
    format!("labeled_{stem}.csv")
}

/// Build the output CSV for a finished job. Results may arrive in any
/// order; rows are emitted in unit-index order.
pub fn assemble(
    config: &SubmissionConfig,
    header: Option<&[String]>,
    original_file_name: &str,
    results: &[AnnotationResult],
) -> AssembledOutput {
    let mut ordered: Vec<&AnnotationResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.unit_index);

    match config.mode {
        Mode::Labels => assemble_labels(header, original_file_name, &ordered),
        Mode::Quotes => assemble_quotes(config, &ordered),
    }
}

fn assemble_labels(
    header: Option<&[String]>,
    original_file_name: &str,
    ordered: &[&AnnotationResult],
) -> AssembledOutput {
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(ordered.len() + 1);

    let mut header_row: Vec<String> = header.map(|h| h.to_vec()).unwrap_or_default();
    header_row.push(LABEL_COLUMN.to_string());
    rows.push(header_row);

    for result in ordered {
        let mut row = match &result.payload {
            UnitPayload::Row { fields } => fields.clone(),
            UnitPayload::Text { segment } => vec![segment.clone()],
        };
        let label = match &result.output {
            UnitOutput::Label { label } => label.clone(),
            UnitOutput::Quotes { .. } => String::new(),
        };
        row.push(label);
        rows.push(row);
    }

    AssembledOutput {
        csv: tabular::write_rows(&rows),
        file_name: labeled_file_name(original_file_name),
        summary: format!("Labeled {} rows", ordered.len()),
    }
}

fn assemble_quotes(config: &SubmissionConfig, ordered: &[&AnnotationResult]) -> AssembledOutput {
    let metadata: Vec<String> = if config.metadata_fields.is_empty() {
        vec!["Source".to_string()]
    } else {
        config.metadata_fields.clone()
    };

    let mut header: Vec<String> = metadata.clone();
    header.push(QUOTE_COLUMN.to_string());
    header.push(CONTEXT_COLUMN.to_string());

    let mut rows: Vec<Vec<String>> = vec![header];
    let mut quote_count = 0usize;
    // Per-source 1-based segment ordinal, counted in index order.
    let mut ordinals: HashMap<&str, usize> = HashMap::new();

    for result in ordered {
        let ordinal = ordinals
            .entry(result.source_name.as_str())
            .and_modify(|n| *n += 1)
            .or_insert(1);
        let ordinal = *ordinal;

        let quotes = match &result.output {
            UnitOutput::Quotes { quotes } => quotes,
            UnitOutput::Label { .. } => continue,
        };
        for quote in quotes {
            let mut row: Vec<String> = metadata
                .iter()
                .map(|field| metadata_value(field, &result.source_name, ordinal))
                .collect();
            row.push(quote.quote.clone());
            row.push(quote.context.clone());
            rows.push(row);
            quote_count += 1;
        }
    }

    AssembledOutput {
        csv: tabular::write_rows(&rows),
        file_name: QUOTES_FILE_NAME.to_string(),
        summary: format!(
            "Extracted {quote_count} quotes from {} segments",
            ordered.len()
        ),
    }
}

/// Recognized metadata columns are filled in; anything else stays blank.
fn metadata_value(field: &str, source: &str, ordinal: usize) -> String {
    match field {
        "Source" => source.to_string(),
        "Segment" => ordinal.to_string(),
        _ => String::new(),
    }
}

/// Encode a finished artifact for transport inside a JSON status report.
pub fn encode_payload(csv: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(csv.as_bytes())
}
