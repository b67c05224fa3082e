//! Core types for the annotation pipeline.
//!
//! These model the lifecycle:
//! Input file → WorkUnit → dispatch → AnnotationResult → assembled CSV,
//! with `Job` as the durable record spanning bounded-time invocations.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════
// Annotation Mode
// ═══════════════════════════════════════════

/// The two annotation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Classify each spreadsheet row into one label from a closed set.
    Labels,
    /// Extract verbatim quotes (with context) from text segments.
    Quotes,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Labels => "labels",
            Self::Quotes => "quotes",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "labels" => Some(Self::Labels),
            "quotes" => Some(Self::Quotes),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Work Unit (input to the dispatcher)
// ═══════════════════════════════════════════

/// The payload of one work unit: a spreadsheet row or a text segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitPayload {
    Row { fields: Vec<String> },
    Text { segment: String },
}

impl UnitPayload {
    /// The unit's content joined into the text sent to the model.
    pub fn joined_text(&self) -> String {
        match self {
            Self::Row { fields } => fields.join(", "),
            Self::Text { segment } => segment.clone(),
        }
    }
}

/// One atomic item submitted to the language model.
/// Immutable once created; `index` is the stable global ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub index: usize,
    pub payload: UnitPayload,
    pub source_name: String,
}

/// Human-facing row number for a tabular unit: 1-based plus the header row.
pub fn display_row(index: usize) -> usize {
    index + 2
}

// ═══════════════════════════════════════════
// Annotation Result (output of the dispatcher)
// ═══════════════════════════════════════════

/// A quote extracted from a text segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedQuote {
    pub quote: String,
    #[serde(default)]
    pub context: String,
}

/// Mode-specific output for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitOutput {
    Label { label: String },
    Quotes { quotes: Vec<ExtractedQuote> },
}

/// One result per unit, created by the dispatcher, consumed by the assembler.
/// Collected in completion order and sorted by `unit_index` before assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationResult {
    pub unit_index: usize,
    pub payload: UnitPayload,
    pub output: UnitOutput,
    /// Name of the file this unit came from.
    pub source_name: String,
}

// ═══════════════════════════════════════════
// Job (durable record)
// ═══════════════════════════════════════════

/// Job lifecycle status. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable record of a long-running annotation task.
///
/// `processed_units` is monotonically non-decreasing and never exceeds
/// `total_units`; `result_payload` is set only at completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub file_name: String,
    pub total_units: u32,
    pub processed_units: u32,
    pub status: JobStatus,
    pub result_payload: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Answer to a status poll. `result_payload` is base64-encoded CSV,
/// present only when the job is completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub total_units: u32,
    pub processed_units: u32,
    pub progress_percent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_file_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_roundtrip() {
        for mode in [Mode::Labels, Mode::Quotes] {
            assert_eq!(Mode::from_str(mode.as_str()), Some(mode));
        }
        assert_eq!(Mode::from_str("spreadsheet"), None);
    }

    #[test]
    fn job_status_roundtrip() {
        let variants = [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ];
        for s in &variants {
            assert_eq!(JobStatus::from_str(s.as_str()), Some(*s));
        }
        assert_eq!(JobStatus::from_str("done"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn display_row_accounts_for_header() {
        // Array position 0 is the first data row, shown as row 2.
        assert_eq!(display_row(0), 2);
        assert_eq!(display_row(10), 12);
    }

    #[test]
    fn row_payload_joins_fields() {
        let payload = UnitPayload::Row {
            fields: vec!["Alice".to_string(), "Great, thanks".to_string()],
        };
        assert_eq!(payload.joined_text(), "Alice, Great, thanks");
    }

    #[test]
    fn unit_payload_serde_is_tagged() {
        let payload = UnitPayload::Text {
            segment: "a paragraph".to_string(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"kind\":\"text\""));
        let parsed: UnitPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn extracted_quote_context_defaults_empty() {
        let q: ExtractedQuote = serde_json::from_str(r#"{"quote": "a quote"}"#).unwrap();
        assert_eq!(q.context, "");
    }

    #[test]
    fn status_report_skips_absent_payload() {
        let report = JobStatusReport {
            status: JobStatus::Processing,
            total_units: 10,
            processed_units: 4,
            progress_percent: 40,
            error_message: None,
            result_payload: None,
            result_file_name: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("result_payload"));
        assert!(json.contains("\"progress_percent\":40"));
    }
}
