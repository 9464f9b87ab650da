use docent_llm::LlmProvider;

use super::json::{extract_array, strip_code_fence};
use super::judge::Judge;
use super::prompts;
use super::state::AgentState;
use crate::pipeline::{PipelineError, Step};

pub const MAX_FOLLOWUPS: usize = 3;

/// Strip a leading bullet or `1.`/`1)` marker. Returns `None` for lines that
/// carry no marker and do not end in a question mark.
fn list_item(line: &str) -> Option<&str> {
    let line = line.trim();
    let unbulleted = line.trim_start_matches(['-', '*', '•']).trim_start();
    let digits = unbulleted.chars().take_while(char::is_ascii_digit).count();
    let item = if digits > 0
        && let Some(rest) = unbulleted[digits..].strip_prefix(['.', ')'])
    {
        rest.trim()
    } else {
        unbulleted
    };
    (item.len() < line.len() || line.ends_with('?')).then_some(item)
}

/// Follow-up questions from a JSON array of strings, or else from a bulleted
/// or numbered list. At most three, empty entries dropped.
#[must_use]
pub fn parse_followups(raw: &str) -> Vec<String> {
    let body = strip_code_fence(raw);
    let items: Vec<String> = match extract_array(body)
        .and_then(|arr| serde_json::from_str::<Vec<String>>(arr).ok())
    {
        Some(items) => items,
        None => body
            .lines()
            .filter_map(list_item)
            .map(|l| l.trim_matches('"').to_owned())
            .collect(),
    };
    let mut followups: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !followups.iter().any(|f| f == item) {
            followups.push(item.to_owned());
        }
        if followups.len() == MAX_FOLLOWUPS {
            break;
        }
    }
    followups
}

pub struct FollowupStage<'a, P> {
    pub judge: &'a Judge<P>,
    pub enabled: bool,
}

impl<P: LlmProvider> Step for FollowupStage<'_, P> {
    type Input = AgentState;
    type Output = AgentState;

    async fn run(&self, mut state: AgentState) -> Result<AgentState, PipelineError> {
        if !self.enabled || state.answer.is_empty() {
            return Ok(state);
        }
        let input = prompts::followup_input(&state.question, &state.answer);
        match self.judge.ask(prompts::FOLLOWUP, &input).await {
            Ok(raw) => state.followups = parse_followups(&raw),
            Err(e) => tracing::debug!(stage = "widgets", error = %e, "follow-up suggestions skipped"),
        }
        Ok(state)
    }
}
