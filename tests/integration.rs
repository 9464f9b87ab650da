use std::sync::Arc;
use std::time::Duration;

use docent_core::agent::{AgentPipeline, Judge, Judges};
use docent_core::config::{PolicyConfig, RetrievalConfig};
use docent_core::{QueryService, ResponseStatus};
use docent_index::{
    BuildOutcome, Document, DocumentStore, FsDocumentStore, InMemoryDocumentStore, IndexRegistry,
    Provenance, RegistryConfig, SemanticStore, Weights,
};
use docent_llm::mock::MockProvider;
use docent_llm::{AnyProvider, LlmError, LlmProvider, Message};

// -- Fixtures --

/// Fixed vectors: the query "widgetX" sits closest to the roadmap and shipping
/// documents, not to the one that literally mentions it.
fn embed(text: &str) -> Vec<f32> {
    if text.trim() == "widgetX" {
        vec![1.0, 0.0]
    } else if text.contains("roadmap") {
        vec![1.0, 0.1]
    } else if text.contains("shipping") {
        vec![0.98, 0.2]
    } else if text.contains("widgetX") {
        vec![0.9, 0.4]
    } else {
        vec![0.5, 0.5]
    }
}

fn document(id: &str, title: &str, text: &str) -> Document {
    Document {
        project_id: "acme".into(),
        document_id: id.into(),
        title: title.into(),
        full_text: text.into(),
    }
}

fn acme_store() -> Arc<InMemoryDocumentStore> {
    let store = Arc::new(InMemoryDocumentStore::new());
    store.insert(document("a", "A", "Product overview and the roadmap for next year."));
    store.insert(document("b", "B", "The widgetX calibration steps, in order."));
    store.insert(document("c", "C", "Our shipping and returns policy."));
    store.add_project("empty");
    store
}

fn registry(store: Arc<dyn DocumentStore>, root: &std::path::Path) -> Arc<IndexRegistry> {
    let embedder = AnyProvider::Mock(MockProvider::default().with_embedder(embed));
    let semantic = SemanticStore::new(root, Arc::new(embedder.embed_fn()));
    let config = RegistryConfig {
        fetch: docent_index::FetchPolicy {
            retries: 1,
            timeout: Duration::from_secs(1),
            backoff: Duration::from_millis(5),
        },
        ..RegistryConfig::default()
    };
    Arc::new(IndexRegistry::new(store, semantic, config))
}

fn judges<P: LlmProvider>(
    moderation: P,
    classification: P,
    generation: P,
    general: P,
    followup: P,
) -> Judges<P> {
    let t = Duration::from_secs(2);
    Judges {
        moderation: Judge::new("moderation", moderation, t),
        classification: Judge::new("classification", classification, t),
        generation: Judge::new("generation", generation, t),
        general: Judge::new("general", general, t),
        followup: Judge::new("followup", followup, t),
    }
}

fn mock_service(registry: Arc<IndexRegistry>, generation: MockProvider) -> QueryService<MockProvider> {
    let judges = judges(
        MockProvider::with_responses(vec![r#"{"verdict":"allow","reason":""}"#.into()]),
        MockProvider::with_responses(vec![r#"{"mode":"rag"}"#.into()]),
        generation,
        MockProvider::default(),
        MockProvider::with_responses(vec![r#"["How is widgetX stored?"]"#.into()]),
    );
    let pipeline = AgentPipeline::new(judges, PolicyConfig::default(), RetrievalConfig::default());
    QueryService::new(registry, pipeline)
}

// -- Scenarios --

#[tokio::test]
async fn literal_term_outranks_closer_semantic_matches() {
    let dir = tempfile::tempdir().unwrap();
    let svc = mock_service(
        registry(acme_store(), dir.path()),
        MockProvider::with_responses(vec![r#"{"answer":"Follow the calibration steps."}"#.into()]),
    );
    svc.build_index("acme").await.unwrap();

    let cmp = svc
        .compare_retrieval("acme", "widgetX", 3, Weights::default())
        .await
        .unwrap();
    assert_eq!(cmp.hybrid_results[0].metadata.title, "B");
    assert_eq!(cmp.hybrid_results[0].provenance, Provenance::Hybrid);
    assert_eq!(cmp.semantic_results[0].metadata.title, "A");

    let resp = svc.answer_question("acme", "widgetX").await;
    assert_eq!(resp.status, ResponseStatus::Answered);
    assert_eq!(resp.answer, "Follow the calibration steps.");
    assert_eq!(resp.sources.first().map(String::as_str), Some("B"));
    assert_eq!(resp.followups, vec!["How is widgetX stored?"]);
}

#[tokio::test]
async fn project_without_documents_is_initializing() {
    let dir = tempfile::tempdir().unwrap();
    let svc = mock_service(registry(acme_store(), dir.path()), MockProvider::default())
        .with_auto_build(true);

    assert_eq!(svc.build_index("empty").await.unwrap(), BuildOutcome::Empty);
    let resp = svc.answer_question("empty", "anything there?").await;
    assert_eq!(resp.status, ResponseStatus::Initializing);
    assert!(!resp.answer.is_empty());
    assert!(resp.sources.is_empty());
}

#[tokio::test]
async fn prose_generation_still_answers_with_sources() {
    let dir = tempfile::tempdir().unwrap();
    let svc = mock_service(
        registry(acme_store(), dir.path()),
        MockProvider::with_responses(vec![
            "Calibrate widgetX by following the listed steps in order.".into(),
        ]),
    );
    svc.build_index("acme").await.unwrap();

    let resp = svc.answer_question("acme", "How do I calibrate widgetX?").await;
    assert_eq!(resp.status, ResponseStatus::Answered);
    assert_eq!(
        resp.answer,
        "Calibrate widgetX by following the listed steps in order."
    );
    assert!(resp.sources.contains(&"B".to_owned()));
}

#[tokio::test]
async fn unreachable_store_falls_back_to_semantic_results() {
    let dir = tempfile::tempdir().unwrap();
    let store = acme_store();
    let first = registry(store.clone(), dir.path());
    first.create_or_update("acme").await.unwrap();

    // Fresh process: the persisted index loads, but no document can be fetched.
    store.set_fetch_failing(true);
    let svc = mock_service(registry(store, dir.path()), MockProvider::default());
    let cmp = svc
        .compare_retrieval("acme", "widgetX", 3, Weights::default())
        .await
        .unwrap();

    let retriever = svc.registry().get("acme").unwrap();
    assert!(!retriever.lexical().is_available());
    assert_eq!(cmp.hybrid_results.len(), 3);
    assert!(
        cmp.hybrid_results
            .iter()
            .all(|r| r.provenance == Provenance::Semantic)
    );
}

#[tokio::test]
async fn rejected_question_returns_reason_only() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(acme_store(), dir.path());
    registry.create_or_update("acme").await.unwrap();
    let generation = MockProvider::default();
    let judges = judges(
        MockProvider::with_responses(vec!["REJECT: Not something I can help with.".into()]),
        MockProvider::default(),
        generation.clone(),
        MockProvider::default(),
        MockProvider::default(),
    );
    let pipeline = AgentPipeline::new(judges, PolicyConfig::default(), RetrievalConfig::default());
    let svc = QueryService::new(registry, pipeline);

    let resp = svc.answer_question("acme", "widgetX").await;
    assert_eq!(resp.status, ResponseStatus::Rejected);
    assert_eq!(resp.answer, "Not something I can help with.");
    assert!(resp.sources.is_empty());
    assert!(generation.recorded_calls().is_empty());
}

struct PanickingProvider;

impl LlmProvider for PanickingProvider {
    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        panic!("provider exploded");
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::Unavailable)
    }

    fn supports_embeddings(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

#[tokio::test]
async fn panic_inside_pipeline_becomes_failed_status() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(acme_store(), dir.path());
    registry.create_or_update("acme").await.unwrap();
    let judges = judges(
        PanickingProvider,
        PanickingProvider,
        PanickingProvider,
        PanickingProvider,
        PanickingProvider,
    );
    let pipeline = AgentPipeline::new(judges, PolicyConfig::default(), RetrievalConfig::default());
    let svc = QueryService::new(registry, pipeline);

    let resp = svc.answer_question("acme", "widgetX").await;
    assert_eq!(resp.status, ResponseStatus::Failed);
    assert_eq!(resp.answer, ResponseStatus::Failed.message().unwrap());
}

#[tokio::test]
async fn filesystem_documents_build_and_regenerate() {
    let docs = tempfile::tempdir().unwrap();
    let project = docs.path().join("handbook");
    std::fs::create_dir(&project).unwrap();
    std::fs::write(project.join("leave.md"), "Request leave two weeks ahead.").unwrap();
    std::fs::write(project.join("notes.bin"), "ignored").unwrap();

    let index = tempfile::tempdir().unwrap();
    let svc = mock_service(
        registry(Arc::new(FsDocumentStore::new(docs.path())), index.path()),
        MockProvider::with_responses(vec![r#"{"answer":"Two weeks ahead."}"#.into()]),
    );

    assert_eq!(
        svc.build_index("handbook").await.unwrap(),
        BuildOutcome::Built {
            documents: 1,
            chunks: 1,
            degraded_entries: 0,
            lexical_available: true,
        }
    );
    let resp = svc.answer_question("handbook", "When to request leave?").await;
    assert_eq!(resp.sources, vec!["leave"]);

    std::fs::write(project.join("travel.txt"), "Book travel via the portal.").unwrap();
    assert!(svc.regenerate_index("handbook").await);
    assert!(matches!(
        svc.validate_index("handbook").await,
        docent_index::IndexReport::Valid { entries: 2, .. }
    ));
    assert_eq!(
        svc.answer_question("nowhere", "hello?").await.status,
        ResponseStatus::NotFound
    );
}
