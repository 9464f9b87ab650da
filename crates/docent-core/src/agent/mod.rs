//! The staged answer pipeline: guard, classify, retrieve, generate, sources, widgets.

pub mod classify;
pub mod generate;
pub mod guard;
pub mod json;
pub mod judge;
pub mod prompts;
pub mod retrieve;
pub mod sources;
pub mod state;
pub mod widgets;

pub use generate::{AnswerParser, ParserChain};
pub use judge::{Judge, Judges};
pub use state::{AgentState, GuardVerdict, Mode};

use docent_index::HybridRetriever;
use docent_llm::LlmProvider;

use crate::config::{PolicyConfig, RetrievalConfig};
use crate::pipeline::{Pipeline, PipelineError};
use classify::ClassifyStage;
use generate::GenerateStage;
use guard::GuardStage;
use retrieve::RetrieveStage;
use sources::SourcesStage;
use widgets::FollowupStage;

pub struct AgentPipeline<P> {
    judges: Judges<P>,
    policy: PolicyConfig,
    retrieval: RetrievalConfig,
    parsers: ParserChain,
}

impl<P: LlmProvider> AgentPipeline<P> {
    #[must_use]
    pub fn new(judges: Judges<P>, policy: PolicyConfig, retrieval: RetrievalConfig) -> Self {
        Self {
            judges,
            policy,
            retrieval,
            parsers: ParserChain::default(),
        }
    }

    #[must_use]
    pub fn judges(&self) -> &Judges<P> {
        &self.judges
    }

    /// Answer `question` for `project_id`. A rejected question stops after the
    /// guard with the rejection reason as the answer.
    ///
    /// # Errors
    ///
    /// Stages degrade instead of failing, so an error here is unexpected.
    pub async fn run(
        &self,
        project_id: &str,
        question: &str,
        retriever: Option<&HybridRetriever>,
    ) -> Result<AgentState, PipelineError> {
        let pipeline = Pipeline::start(GuardStage {
            judge: &self.judges.moderation,
            on_failure: self.policy.guard_on_failure,
        })
        .stage(ClassifyStage {
            judge: &self.judges.classification,
            default_mode: self.policy.default_mode,
        })
        .stage(RetrieveStage {
            retriever,
            rag_k: self.retrieval.rag_k,
            summary_k: self.retrieval.summary_k,
            weights: self.retrieval.weights(),
        })
        .stage(GenerateStage {
            generation: &self.judges.generation,
            general: &self.judges.general,
            parsers: &self.parsers,
        })
        .stage(SourcesStage)
        .stage(FollowupStage {
            judge: &self.judges.followup,
            enabled: self.policy.followups_enabled,
        });

        let state = pipeline.run(AgentState::new(project_id, question)).await?;
        tracing::info!(
            project_id,
            mode = %state.mode,
            rejected = state.is_rejected(),
            sources = state.sources.len(),
            warnings = state.warnings.len(),
            "pipeline finished"
        );
        Ok(state)
    }
}
