use super::retrieve::TITLE_MARKER;
use super::state::AgentState;
use crate::pipeline::{PipelineError, Step};

pub const MAX_TITLE_CHARS: usize = 100;

/// Titles following each `TITLE:` marker in `context`, truncated, unique, in
/// first-seen order.
#[must_use]
pub fn extract_sources(context: &str) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for (pos, _) in context.match_indices(TITLE_MARKER) {
        let rest = &context[pos + TITLE_MARKER.len()..];
        let line = rest.lines().next().unwrap_or_default().trim();
        let title: String = line.chars().take(MAX_TITLE_CHARS).collect();
        let title = title.trim_end();
        if !title.is_empty() && !sources.iter().any(|s| s == title) {
            sources.push(title.to_owned());
        }
    }
    sources
}

/// Cites only what retrieval put into the context, never the answer text.
pub struct SourcesStage;

impl Step for SourcesStage {
    type Input = AgentState;
    type Output = AgentState;

    async fn run(&self, mut state: AgentState) -> Result<AgentState, PipelineError> {
        state.sources = extract_sources(&state.context_text);
        Ok(state)
    }
}
