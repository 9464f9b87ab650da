use docent_index::RetrievalResult;
use serde::{Deserialize, Serialize};

use crate::pipeline::Haltable;

/// How a question is answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Grounded question answering over the project's documents.
    #[default]
    Rag,
    /// Free conversation, no retrieval.
    General,
    /// Broad synthesis over more context.
    Summary,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::General => "general",
            Self::Summary => "summary",
        }
    }

    #[must_use]
    pub fn uses_retrieval(self) -> bool {
        !matches!(self, Self::General)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "lowercase")]
pub enum GuardVerdict {
    #[default]
    Allow,
    Warn(String),
    Reject(String),
}

/// Everything one question accumulates on its way through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub project_id: String,
    pub question: String,
    pub mode: Mode,
    pub guard_verdict: GuardVerdict,
    /// Assembled retrieval context. Source titles are extracted from here only.
    pub context_text: String,
    pub retrieved: Vec<RetrievalResult>,
    pub answer: String,
    pub sources: Vec<String>,
    pub followups: Vec<String>,
    /// User-visible notes about degraded stages.
    pub warnings: Vec<String>,
}

impl AgentState {
    #[must_use]
    pub fn new(project_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            question: question.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self.guard_verdict, GuardVerdict::Reject(_))
    }
}

impl Haltable for AgentState {
    fn is_halted(&self) -> bool {
        self.is_rejected()
    }
}
