//! Answer generation and the ordered chain of reply-parsing strategies.

use std::sync::LazyLock;

use docent_llm::LlmProvider;
use regex::Regex;

use super::json::{extract_object, remove_trailing_commas, strip_code_fence};
use super::judge::Judge;
use super::prompts;
use super::state::{AgentState, Mode};
use crate::pipeline::{PipelineError, Step};

static ANSWER_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""answer"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("answer regex is valid")
});

static ANSWER_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*"?answer"?\s*:\s*"#).expect("answer label regex is valid")
});

/// One way of recovering the answer text from a raw generation reply.
pub trait AnswerParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` when this strategy cannot produce a non-empty answer.
    fn parse(&self, raw: &str) -> Option<String>;
}

fn answer_field(value: &serde_json::Value) -> Option<String> {
    value
        .get("answer")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// The whole reply is a JSON object with an `answer` field.
pub struct DirectJson;

impl AnswerParser for DirectJson {
    fn name(&self) -> &'static str {
        "direct_json"
    }

    fn parse(&self, raw: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(strip_code_fence(raw)).ok()?;
        answer_field(&value)
    }
}

/// An `"answer": "..."` pair somewhere in mixed text.
pub struct AnswerPattern;

impl AnswerParser for AnswerPattern {
    fn name(&self) -> &'static str {
        "answer_pattern"
    }

    fn parse(&self, raw: &str) -> Option<String> {
        let escaped = ANSWER_FIELD.captures(raw)?.get(1)?.as_str();
        let text = serde_json::from_str::<String>(&format!("\"{escaped}\""))
            .unwrap_or_else(|_| escaped.replace("\\n", "\n").replace("\\\"", "\""));
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_owned())
    }
}

/// The outermost `{...}` span, with trailing commas removed before parsing.
pub struct BraceExtract;

impl AnswerParser for BraceExtract {
    fn name(&self) -> &'static str {
        "brace_extract"
    }

    fn parse(&self, raw: &str) -> Option<String> {
        let object = extract_object(raw)?;
        let cleaned = remove_trailing_commas(object);
        let value: serde_json::Value = serde_json::from_str(&cleaned).ok()?;
        answer_field(&value)
    }
}

/// Treat the reply as prose once leftover JSON punctuation is stripped.
pub struct PunctuationStrip;

impl AnswerParser for PunctuationStrip {
    fn name(&self) -> &'static str {
        "punctuation_strip"
    }

    fn parse(&self, raw: &str) -> Option<String> {
        let body = strip_code_fence(raw);
        let body = body.trim().trim_start_matches('{').trim_end_matches('}');
        let body = ANSWER_LABEL.replace(body, "");
        let cleaned: String = body
            .chars()
            .filter(|c| !matches!(c, '{' | '}' | '[' | ']' | '"'))
            .collect();
        let text = cleaned
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_end_matches(',')
            .trim()
            .to_owned();
        (!text.is_empty()).then_some(text)
    }
}

/// Strategies tried in order; the first non-empty answer wins.
pub struct ParserChain {
    parsers: Vec<Box<dyn AnswerParser>>,
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(DirectJson),
            Box::new(AnswerPattern),
            Box::new(BraceExtract),
            Box::new(PunctuationStrip),
        ])
    }
}

impl ParserChain {
    #[must_use]
    pub fn new(parsers: Vec<Box<dyn AnswerParser>>) -> Self {
        Self { parsers }
    }

    /// Returns the answer and the name of the strategy that produced it.
    /// Falls back to a fixed apology when every strategy fails.
    #[must_use]
    pub fn parse(&self, raw: &str) -> (String, &'static str) {
        for parser in &self.parsers {
            if let Some(answer) = parser.parse(raw) {
                return (answer, parser.name());
            }
        }
        (prompts::APOLOGY.to_owned(), "apology")
    }
}

pub struct GenerateStage<'a, P> {
    pub generation: &'a Judge<P>,
    pub general: &'a Judge<P>,
    pub parsers: &'a ParserChain,
}

impl<P: LlmProvider> GenerateStage<'_, P> {
    async fn general_answer(&self, question: &str) -> String {
        match self.general.ask(prompts::GENERAL, question).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_owned(),
            Ok(_) => {
                tracing::warn!(stage = "generate", "general judge returned an empty reply");
                prompts::APOLOGY.to_owned()
            }
            Err(e) => {
                tracing::warn!(stage = "generate", error = %e, "general judge failed");
                prompts::APOLOGY.to_owned()
            }
        }
    }

    async fn grounded_answer(&self, state: &AgentState) -> String {
        let system = match state.mode {
            Mode::Summary => prompts::GENERATION_SUMMARY,
            Mode::Rag | Mode::General => prompts::GENERATION_RAG,
        };
        let input = prompts::generation_input(&state.question, &state.context_text);
        let raw = self.generation.ask(system, &input).await.unwrap_or_else(|e| {
            tracing::warn!(stage = "generate", error = %e, "generation judge failed");
            String::new()
        });
        let (answer, strategy) = self.parsers.parse(&raw);
        match strategy {
            "direct_json" => tracing::debug!(stage = "generate", strategy),
            "apology" => tracing::warn!(stage = "generate", strategy, "no answer recovered from reply"),
            _ => tracing::warn!(stage = "generate", strategy, "generation reply was not clean JSON"),
        }
        answer
    }
}

impl<P: LlmProvider> Step for GenerateStage<'_, P> {
    type Input = AgentState;
    type Output = AgentState;

    async fn run(&self, mut state: AgentState) -> Result<AgentState, PipelineError> {
        state.answer = match state.mode {
            Mode::General => self.general_answer(&state.question).await,
            Mode::Rag | Mode::Summary => self.grounded_answer(&state).await,
        };
        Ok(state)
    }
}
