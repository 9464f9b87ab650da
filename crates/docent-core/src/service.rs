//! Query API: the one entry point callers use to ask questions and manage indexes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use docent_index::{
    BuildOutcome, HybridRetriever, IndexRegistry, IndexReport, RetrievalResult, StoreError,
    Weights,
};
use docent_llm::LlmProvider;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentPipeline, AgentState, Mode};
use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Answered,
    Rejected,
    Initializing,
    NotFound,
    InvalidQuery,
    Failed,
}

impl ResponseStatus {
    /// Fixed user-facing message for statuses that carry no generated answer.
    #[must_use]
    pub fn message(self) -> Option<&'static str> {
        match self {
            Self::Answered | Self::Rejected => None,
            Self::Initializing => Some(
                "The documents for this project are still being indexed. Please try again in a moment.",
            ),
            Self::NotFound => Some("This project could not be found."),
            Self::InvalidQuery => Some("Please enter a question."),
            Self::Failed => Some("Something went wrong while answering. Please try again."),
        }
    }
}

/// Canonical answer shape returned for every question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: ResponseStatus,
    pub answer: String,
    pub sources: Vec<String>,
    pub followups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
}

impl QueryResponse {
    #[must_use]
    pub fn status_only(status: ResponseStatus) -> Self {
        Self {
            status,
            answer: status.message().unwrap_or_default().to_owned(),
            sources: Vec::new(),
            followups: Vec::new(),
            warning: None,
            mode: None,
        }
    }

    fn from_state(state: AgentState) -> Self {
        if state.is_rejected() {
            return Self {
                status: ResponseStatus::Rejected,
                answer: state.answer,
                sources: Vec::new(),
                followups: Vec::new(),
                warning: None,
                mode: None,
            };
        }
        Self {
            status: ResponseStatus::Answered,
            answer: state.answer,
            sources: state.sources,
            followups: state.followups,
            warning: (!state.warnings.is_empty()).then(|| state.warnings.join(" ")),
            mode: Some(state.mode),
        }
    }
}

/// Hybrid and semantic-only results for the same query, for weight tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalComparison {
    pub hybrid_results: Vec<RetrievalResult>,
    pub semantic_results: Vec<RetrievalResult>,
}

pub struct QueryService<P> {
    registry: Arc<IndexRegistry>,
    pipeline: AgentPipeline<P>,
    auto_build: bool,
}

impl<P: LlmProvider> QueryService<P> {
    #[must_use]
    pub fn new(registry: Arc<IndexRegistry>, pipeline: AgentPipeline<P>) -> Self {
        Self {
            registry,
            pipeline,
            auto_build: false,
        }
    }

    /// Start a background build when a question arrives for an unbuilt project.
    #[must_use]
    pub fn with_auto_build(mut self, enabled: bool) -> Self {
        self.auto_build = enabled;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Answer a question about one project's documents. Never fails: every
    /// error, including a panic inside the pipeline, becomes a status.
    pub async fn answer_question(&self, project_id: &str, question: &str) -> QueryResponse {
        match AssertUnwindSafe(self.try_answer(project_id, question))
            .catch_unwind()
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(project_id, error = %e, "answering failed");
                QueryResponse::status_only(ResponseStatus::Failed)
            }
            Err(_) => {
                tracing::error!(project_id, "answering panicked");
                QueryResponse::status_only(ResponseStatus::Failed)
            }
        }
    }

    async fn try_answer(&self, project_id: &str, question: &str) -> Result<QueryResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(QueryResponse::status_only(ResponseStatus::InvalidQuery));
        }

        let retriever = match self.ready_retriever(project_id).await {
            Ok(r) => r,
            Err(ServiceError::ProjectNotFound(_)) => {
                return Ok(QueryResponse::status_only(ResponseStatus::NotFound));
            }
            Err(ServiceError::NotReady(_)) => {
                return Ok(QueryResponse::status_only(ResponseStatus::Initializing));
            }
            Err(e) => return Err(e),
        };

        let state = self
            .pipeline
            .run(project_id, question, Some(&retriever))
            .await?;
        Ok(QueryResponse::from_state(state))
    }

    /// Registered retriever, or one hydrated from a persisted index. An unbuilt
    /// project yields `NotReady` without waiting for any in-flight build.
    async fn ready_retriever(&self, project_id: &str) -> Result<Arc<HybridRetriever>> {
        if let Some(retriever) = self.registry.get(project_id) {
            return Ok(retriever);
        }

        let listed = match self.registry.store().list_documents(project_id).await {
            Ok(docs) => Some(docs.len()),
            Err(StoreError::ProjectNotFound(_)) => {
                return Err(ServiceError::ProjectNotFound(project_id.to_owned()));
            }
            Err(e) => {
                tracing::warn!(project_id, error = %e, "document listing failed");
                None
            }
        };

        if self.registry.semantic_store().exists(project_id)
            && !self.registry.is_busy(project_id)
            && let Some(retriever) = self.registry.load(project_id).await
        {
            return Ok(retriever);
        }

        if self.auto_build && listed.is_some_and(|n| n > 0) {
            self.spawn_build(project_id);
        }
        Err(ServiceError::NotReady(project_id.to_owned()))
    }

    fn spawn_build(&self, project_id: &str) {
        if self.registry.is_busy(project_id) {
            return;
        }
        let registry = Arc::clone(&self.registry);
        let project_id = project_id.to_owned();
        tracing::info!(project_id = %project_id, "starting background index build");
        tokio::spawn(async move {
            match registry.create_or_update(&project_id).await {
                Ok(outcome) => tracing::info!(project_id = %project_id, ?outcome, "background build finished"),
                Err(e) => tracing::error!(project_id = %project_id, error = %e, "background build failed"),
            }
        });
    }

    /// Answer like [`answer_question`](Self::answer_question), but index an unbuilt
    /// project in the foreground first. For one-shot callers whose runtime
    /// would not outlive a background build.
    pub async fn answer_after_build(&self, project_id: &str, question: &str) -> QueryResponse {
        let response = self.answer_question(project_id, question).await;
        if response.status != ResponseStatus::Initializing {
            return response;
        }

        tracing::info!(project_id, "index not ready, building before answering");
        match self.build_index(project_id).await {
            Ok(BuildOutcome::Empty) => response,
            Ok(outcome) => {
                tracing::info!(project_id, ?outcome, "index ready");
                self.answer_question(project_id, question).await
            }
            Err(e) => {
                tracing::error!(project_id, error = %e, "foreground build failed");
                QueryResponse::status_only(ResponseStatus::Failed)
            }
        }
    }

    /// Hybrid and semantic-only results side by side.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotReady`] when no index exists, or the retrieval
    /// error if the query cannot be embedded.
    pub async fn compare_retrieval(
        &self,
        project_id: &str,
        query: &str,
        k: usize,
        weights: Weights,
    ) -> Result<RetrievalComparison> {
        if query.trim().is_empty() || k == 0 {
            return Err(ServiceError::InvalidQuery);
        }
        let retriever = self.ready_retriever(project_id).await?;
        let hybrid_results = retriever.search(query, k, weights).await?;
        let semantic_results = retriever.semantic_search(query, k, weights).await?;
        Ok(RetrievalComparison {
            hybrid_results,
            semantic_results,
        })
    }

    /// Build the project's index unless already built in this process.
    ///
    /// # Errors
    ///
    /// Returns the registry error for unknown projects or failed builds.
    pub async fn build_index(&self, project_id: &str) -> Result<BuildOutcome> {
        Ok(self.registry.create_or_update(project_id).await?)
    }

    /// Drop and rebuild the project's index. `true` only when a new index was built.
    pub async fn regenerate_index(&self, project_id: &str) -> bool {
        match self.registry.force_regenerate(project_id).await {
            Ok(BuildOutcome::Built { .. }) => true,
            Ok(outcome) => {
                tracing::info!(project_id, ?outcome, "regenerate produced no index");
                false
            }
            Err(e) => {
                tracing::warn!(project_id, error = %e, "regenerate failed");
                false
            }
        }
    }

    pub async fn validate_index(&self, project_id: &str) -> IndexReport {
        self.registry.validate(project_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use docent_index::{Document, InMemoryDocumentStore, RegistryConfig, SemanticStore};
    use docent_llm::mock::MockProvider;

    use super::*;
    use crate::agent::{Judge, Judges};
    use crate::config::{PolicyConfig, RetrievalConfig};

    fn embed(text: &str) -> Vec<f32> {
        #[allow(clippy::cast_precision_loss)]
        let len = text.len() as f32;
        vec![1.0, len.sqrt()]
    }

    fn judges(generation: MockProvider) -> Judges<MockProvider> {
        let t = Duration::from_secs(1);
        Judges {
            moderation: Judge::new("moderation", MockProvider::with_responses(vec!["ALLOW".into()]), t),
            classification: Judge::new("classification", MockProvider::with_responses(vec!["rag".into()]), t),
            generation: Judge::new("generation", generation, t),
            general: Judge::new("general", MockProvider::default(), t),
            followup: Judge::new("followup", MockProvider::failing(), t),
        }
    }

    fn service(
        store: Arc<InMemoryDocumentStore>,
        root: &std::path::Path,
        generation: MockProvider,
    ) -> QueryService<MockProvider> {
        let provider = docent_llm::AnyProvider::Mock(MockProvider::default().with_embedder(embed));
        let semantic = SemanticStore::new(root, Arc::new(provider.embed_fn()));
        let registry = Arc::new(IndexRegistry::new(store, semantic, RegistryConfig::default()));
        let pipeline = AgentPipeline::new(
            judges(generation),
            PolicyConfig::default(),
            RetrievalConfig::default(),
        );
        QueryService::new(registry, pipeline)
    }

    fn store() -> Arc<InMemoryDocumentStore> {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert(Document {
            project_id: "proj".into(),
            document_id: "guide".into(),
            title: "Setup Guide".into(),
            full_text: "Install the widget, then calibrate it weekly.".into(),
        });
        store.add_project("empty");
        store
    }

    #[tokio::test]
    async fn empty_question_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(store(), dir.path(), MockProvider::default());
        let resp = svc.answer_question("proj", "   ").await;
        assert_eq!(resp.status, ResponseStatus::InvalidQuery);
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(store(), dir.path(), MockProvider::default());
        let resp = svc.answer_question("ghost", "hello?").await;
        assert_eq!(resp.status, ResponseStatus::NotFound);
        assert_eq!(resp.answer, ResponseStatus::NotFound.message().unwrap());
    }

    #[tokio::test]
    async fn unbuilt_project_is_initializing() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(store(), dir.path(), MockProvider::default());
        let resp = svc.answer_question("proj", "how to calibrate?").await;
        assert_eq!(resp.status, ResponseStatus::Initializing);
        assert!(!svc.registry().is_registered("proj"));
    }

    #[tokio::test]
    async fn auto_build_registers_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(store(), dir.path(), MockProvider::default()).with_auto_build(true);
        let resp = svc.answer_question("proj", "how to calibrate?").await;
        assert_eq!(resp.status, ResponseStatus::Initializing);

        for _ in 0..50 {
            if svc.registry().is_registered("proj") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(svc.registry().is_registered("proj"));
    }

    #[tokio::test]
    async fn answer_after_build_indexes_unbuilt_project() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(
            store(),
            dir.path(),
            MockProvider::with_responses(vec![r#"{"answer":"Weekly."}"#.into()]),
        );
        assert!(!svc.registry().is_registered("proj"));

        let resp = svc.answer_after_build("proj", "how often to calibrate the widget?").await;
        assert_eq!(resp.status, ResponseStatus::Answered);
        assert_eq!(resp.answer, "Weekly.");
        assert!(svc.registry().is_registered("proj"));
        assert!(matches!(
            svc.validate_index("proj").await,
            IndexReport::Valid { entries: 1, .. }
        ));
    }

    #[tokio::test]
    async fn answer_after_build_waits_for_background_build() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(store(), dir.path(), MockProvider::default()).with_auto_build(true);
        let resp = svc.answer_after_build("proj", "how to calibrate?").await;
        assert_eq!(resp.status, ResponseStatus::Answered);
        assert!(svc.registry().is_registered("proj"));
    }

    #[tokio::test]
    async fn answer_after_build_keeps_initializing_for_empty_project() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(store(), dir.path(), MockProvider::default());
        let resp = svc.answer_after_build("empty", "anything?").await;
        assert_eq!(resp.status, ResponseStatus::Initializing);
        assert_eq!(
            svc.answer_after_build("ghost", "anything?").await.status,
            ResponseStatus::NotFound
        );
    }

    #[tokio::test]
    async fn built_project_is_answered_with_sources() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(
            store(),
            dir.path(),
            MockProvider::with_responses(vec![r#"{"answer":"Weekly."}"#.into()]),
        );
        assert!(matches!(
            svc.build_index("proj").await.unwrap(),
            BuildOutcome::Built { .. }
        ));
        let resp = svc.answer_question("proj", "how often to calibrate the widget?").await;
        assert_eq!(resp.status, ResponseStatus::Answered);
        assert_eq!(resp.answer, "Weekly.");
        assert_eq!(resp.sources, vec!["Setup Guide"]);
        assert_eq!(resp.mode, Some(Mode::Rag));
    }

    #[tokio::test]
    async fn regenerate_reports_whether_an_index_was_built() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(store(), dir.path(), MockProvider::default());
        assert!(svc.regenerate_index("proj").await);
        assert!(!svc.regenerate_index("empty").await);
        assert!(!svc.regenerate_index("ghost").await);
        assert!(matches!(
            svc.validate_index("proj").await,
            IndexReport::Valid { entries: 1, .. }
        ));
        assert!(matches!(
            svc.validate_index("empty").await,
            IndexReport::Missing { .. }
        ));
    }

    #[tokio::test]
    async fn compare_requires_a_built_index() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(store(), dir.path(), MockProvider::default());
        assert!(matches!(
            svc.compare_retrieval("proj", "widget", 3, Weights::default()).await,
            Err(ServiceError::NotReady(_))
        ));
        svc.build_index("proj").await.unwrap();
        let cmp = svc
            .compare_retrieval("proj", "widget", 3, Weights::default())
            .await
            .unwrap();
        assert_eq!(cmp.hybrid_results.len(), 1);
        assert_eq!(cmp.semantic_results.len(), 1);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ResponseStatus::InvalidQuery).unwrap(),
            "\"invalid_query\""
        );
    }
}
