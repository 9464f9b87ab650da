use docent_llm::LlmProvider;
use serde::Deserialize;

use super::json::{extract_object, strip_code_fence};
use super::judge::Judge;
use super::prompts;
use super::state::{AgentState, GuardVerdict};
use crate::config::GuardFallback;
use crate::pipeline::{PipelineError, Step};

#[derive(Deserialize)]
struct VerdictReply {
    verdict: String,
    #[serde(default)]
    reason: String,
}

fn verdict_from(kind: &str, reason: String) -> Option<GuardVerdict> {
    match kind.trim().to_lowercase().as_str() {
        "allow" => Some(GuardVerdict::Allow),
        "warn" => Some(GuardVerdict::Warn(reason)),
        "reject" => Some(GuardVerdict::Reject(reason)),
        _ => None,
    }
}

/// Parse a moderation reply: a JSON object, or a line starting with
/// `ALLOW`, `WARN` or `REJECT` optionally followed by `:` and a reason.
#[must_use]
pub fn parse_verdict(raw: &str) -> Option<GuardVerdict> {
    let body = strip_code_fence(raw);
    if let Some(obj) = extract_object(body)
        && let Ok(reply) = serde_json::from_str::<VerdictReply>(obj)
    {
        return verdict_from(&reply.verdict, reply.reason.trim().to_owned());
    }

    let line = body.lines().find(|l| !l.trim().is_empty())?.trim();
    let (kind, rest) = line
        .split_once(|c: char| c == ':' || c == '-' || c.is_whitespace())
        .unwrap_or((line, ""));
    verdict_from(kind, rest.trim_start_matches([':', '-', ' ']).trim().to_owned())
}

pub struct GuardStage<'a, P> {
    pub judge: &'a Judge<P>,
    pub on_failure: GuardFallback,
}

impl<P> GuardStage<'_, P> {
    fn fallback(&self) -> GuardVerdict {
        match self.on_failure {
            GuardFallback::Allow => GuardVerdict::Allow,
            GuardFallback::Reject => GuardVerdict::Reject(prompts::GUARD_UNAVAILABLE.into()),
        }
    }
}

impl<P: LlmProvider> Step for GuardStage<'_, P> {
    type Input = AgentState;
    type Output = AgentState;

    async fn run(&self, mut state: AgentState) -> Result<AgentState, PipelineError> {
        let verdict = match self.judge.ask(prompts::MODERATION, &state.question).await {
            Ok(raw) => parse_verdict(&raw).unwrap_or_else(|| {
                tracing::warn!(
                    stage = "guard",
                    policy = self.on_failure.as_str(),
                    "unparseable moderation reply, applying fallback verdict"
                );
                self.fallback()
            }),
            Err(e) => {
                tracing::warn!(
                    stage = "guard",
                    policy = self.on_failure.as_str(),
                    error = %e,
                    "moderation judge failed, applying fallback verdict"
                );
                self.fallback()
            }
        };

        match &verdict {
            GuardVerdict::Allow => {}
            GuardVerdict::Warn(reason) => {
                tracing::info!(stage = "guard", reason = %reason, "question allowed with warning");
                if !reason.is_empty() {
                    state.warnings.push(reason.clone());
                }
            }
            GuardVerdict::Reject(reason) => {
                tracing::info!(stage = "guard", reason = %reason, "question rejected");
                state.answer = if reason.is_empty() {
                    "This question cannot be answered.".into()
                } else {
                    reason.clone()
                };
            }
        }
        state.guard_verdict = verdict;
        Ok(state)
    }
}
