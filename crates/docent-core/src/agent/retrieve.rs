use std::fmt::Write as _;

use docent_index::{HybridRetriever, RetrievalResult, Weights};

use super::state::{AgentState, Mode};
use crate::pipeline::{PipelineError, Step};

/// Marker placed before every passage title in the assembled context.
pub const TITLE_MARKER: &str = "TITLE:";

const RETRIEVAL_FAILED: &str =
    "Document search is temporarily unavailable; this answer is not grounded in your documents.";

/// Format passages as `[n] TITLE: <title>` followed by the passage text.
#[must_use]
pub fn assemble_context(results: &[RetrievalResult]) -> String {
    let mut context = String::new();
    for (i, r) in results.iter().enumerate() {
        if i > 0 {
            context.push_str("\n\n");
        }
        let title = unmark(&r.metadata.title).replace('\n', " ");
        let _ = write!(
            context,
            "[{}] {TITLE_MARKER} {}\n{}",
            i + 1,
            title.trim(),
            unmark(&r.text)
        );
    }
    context
}

/// Passage text can itself contain the marker; only headers written above may carry it.
fn unmark(text: &str) -> String {
    text.replace(TITLE_MARKER, "Title:")
}

pub struct RetrieveStage<'a> {
    pub retriever: Option<&'a HybridRetriever>,
    pub rag_k: usize,
    pub summary_k: usize,
    pub weights: Weights,
}

impl RetrieveStage<'_> {
    fn k_for(&self, mode: Mode) -> usize {
        match mode {
            Mode::Summary => self.summary_k,
            Mode::Rag | Mode::General => self.rag_k,
        }
    }
}

impl Step for RetrieveStage<'_> {
    type Input = AgentState;
    type Output = AgentState;

    async fn run(&self, mut state: AgentState) -> Result<AgentState, PipelineError> {
        if !state.mode.uses_retrieval() {
            return Ok(state);
        }
        let Some(retriever) = self.retriever else {
            tracing::warn!(stage = "retrieve", project_id = %state.project_id, "no retriever available");
            state.warnings.push(RETRIEVAL_FAILED.into());
            return Ok(state);
        };

        if retriever.project_id() != state.project_id {
            return Err(PipelineError::Stage {
                stage: "retrieve",
                message: format!(
                    "retriever for project {} cannot serve project {}",
                    retriever.project_id(),
                    state.project_id
                ),
            });
        }

        let k = self.k_for(state.mode);
        match retriever.search(&state.question, k, self.weights).await {
            Ok(results) => {
                let total = results.len();
                let scoped: Vec<RetrievalResult> = results
                    .into_iter()
                    .filter(|r| r.metadata.project_id == state.project_id)
                    .collect();
                if scoped.len() < total {
                    tracing::warn!(
                        stage = "retrieve",
                        project_id = %state.project_id,
                        dropped = total - scoped.len(),
                        "dropped results belonging to another project"
                    );
                }
                tracing::debug!(stage = "retrieve", k, returned = scoped.len());
                state.context_text = assemble_context(&scoped);
                state.retrieved = scoped;
            }
            Err(e) => {
                tracing::warn!(
                    stage = "retrieve",
                    project_id = %state.project_id,
                    error = %e,
                    "retrieval failed, generating without context"
                );
                state.warnings.push(RETRIEVAL_FAILED.into());
            }
        }
        Ok(state)
    }
}
