use docent_llm::LlmProvider;
use serde::Deserialize;

use super::json::{extract_object, strip_code_fence};
use super::judge::Judge;
use super::prompts;
use super::state::{AgentState, Mode};
use crate::pipeline::{PipelineError, Step};

#[derive(Deserialize)]
struct ModeReply {
    mode: Mode,
}

const KEYWORDS: [(&str, Mode); 3] = [
    ("summary", Mode::Summary),
    ("general", Mode::General),
    ("rag", Mode::Rag),
];

/// Parse a classifier reply: a JSON `mode` field, or else the first word that
/// names a mode.
#[must_use]
pub fn parse_mode(raw: &str) -> Option<Mode> {
    let body = strip_code_fence(raw);
    if let Some(obj) = extract_object(body)
        && let Ok(reply) = serde_json::from_str::<ModeReply>(&obj.to_lowercase())
    {
        return Some(reply.mode);
    }
    body.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .find_map(|word| {
            KEYWORDS
                .iter()
                .find(|(kw, _)| *kw == word)
                .map(|(_, mode)| *mode)
        })
}

pub struct ClassifyStage<'a, P> {
    pub judge: &'a Judge<P>,
    pub default_mode: Mode,
}

impl<P: LlmProvider> Step for ClassifyStage<'_, P> {
    type Input = AgentState;
    type Output = AgentState;

    async fn run(&self, mut state: AgentState) -> Result<AgentState, PipelineError> {
        state.mode = match self.judge.ask(prompts::CLASSIFICATION, &state.question).await {
            Ok(raw) => parse_mode(&raw).unwrap_or_else(|| {
                tracing::warn!(stage = "classify", default = %self.default_mode, "unparseable classifier reply");
                self.default_mode
            }),
            Err(e) => {
                tracing::warn!(stage = "classify", default = %self.default_mode, error = %e, "classifier failed");
                self.default_mode
            }
        };
        tracing::debug!(stage = "classify", mode = %state.mode);
        Ok(state)
    }
}
