//! Prompt rendering for both annotation modes.
//!
//! One rendering function over a tagged variant keeps the two modes'
//! near-duplicate prompt text from drifting apart: each mode's system
//! instruction is produced in exactly one place.

/// Mode-specific prompt parameters.
#[derive(Debug, Clone)]
pub enum PromptSpec<'a> {
    Labels { labels: &'a [String] },
    Quotes { context_window: usize },
}

/// A rendered system/user message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// Render the deterministic prompt pair for one unit.
///
/// `caller_prompt` is the user-configured template; `unit_text` is the
/// unit's (already truncated) content.
pub fn render(spec: &PromptSpec<'_>, caller_prompt: &str, unit_text: &str) -> RenderedPrompt {
    let system = match spec {
        PromptSpec::Labels { labels } => format!(
            "{caller_prompt}\n\n\
             Classify the text into exactly one of these categories: {}.\n\
             Respond with the category name only, nothing else.",
            labels.join(", ")
        ),
        PromptSpec::Quotes { context_window } => format!(
            "{caller_prompt}\n\n\
             Return a JSON array of objects, each with a \"quote\" key holding a \
             verbatim quote from the text and a \"context\" key holding up to \
             {context_window} characters of surrounding text.\n\
             Respond with the JSON array only, with no commentary and no markdown.\n\
             Example: [{{\"quote\": \"the exact words\", \"context\": \"...the exact words, she said...\"}}]\n\
             If there are no suitable quotes, return []."
        ),
    };

    RenderedPrompt {
        system,
        user: unit_text.to_string(),
    }
}
