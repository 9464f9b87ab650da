//! Read-only access to the external document store.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::document::{Document, DocumentSummary};
use crate::error::StoreError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const DOCUMENT_EXTENSIONS: &[&str] = &["md", "txt"];

pub trait DocumentStore: Send + Sync {
    /// List the documents of a project.
    ///
    /// Unknown projects yield [`StoreError::ProjectNotFound`]; a known project
    /// without documents yields an empty list.
    fn list_documents(
        &self,
        project_id: &str,
    ) -> BoxFuture<'_, Result<Vec<DocumentSummary>, StoreError>>;

    /// Fetch the authoritative full text of a document.
    fn get_document(&self, document_id: &str) -> BoxFuture<'_, Result<String, StoreError>>;
}

/// Bounded retry policy for idempotent document reads.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub retries: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            timeout: Duration::from_secs(10),
            backoff: Duration::from_millis(100),
        }
    }
}

/// Fetch a document, retrying transient failures with linear backoff.
///
/// # Errors
///
/// Returns the last error once all attempts are exhausted, or immediately for
/// non-transient errors such as [`StoreError::DocumentNotFound`].
pub async fn fetch_with_retry(
    store: &dyn DocumentStore,
    document_id: &str,
    policy: FetchPolicy,
) -> Result<String, StoreError> {
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, store.get_document(document_id))
            .await
        {
            Ok(r) => r,
            Err(_) => Err(StoreError::Timeout(document_id.to_owned())),
        };
        match result {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < policy.retries => {
                attempt += 1;
                tracing::debug!(document_id, attempt, error = %e, "retrying document fetch");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Default)]
struct InMemoryState {
    projects: HashMap<String, Vec<DocumentSummary>>,
    texts: HashMap<String, String>,
}

/// Document store held in memory. Fetches can be switched off to simulate an
/// unreachable backend.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    state: RwLock<InMemoryState>,
    fetch_failing: AtomicBool,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project with no documents.
    pub fn add_project(&self, project_id: &str) {
        if let Ok(mut state) = self.state.write() {
            state.projects.entry(project_id.to_owned()).or_default();
        }
    }

    /// Insert or replace a document.
    pub fn insert(&self, document: Document) {
        let Ok(mut state) = self.state.write() else {
            return;
        };
        let docs = state.projects.entry(document.project_id.clone()).or_default();
        docs.retain(|d| d.id != document.document_id);
        docs.push(DocumentSummary {
            id: document.document_id.clone(),
            title: document.title.clone(),
        });
        state.texts.insert(document.document_id, document.full_text);
    }

    pub fn remove(&self, document_id: &str) {
        if let Ok(mut state) = self.state.write() {
            for docs in state.projects.values_mut() {
                docs.retain(|d| d.id != document_id);
            }
            state.texts.remove(document_id);
        }
    }

    /// Make every `get_document` call fail with [`StoreError::Unavailable`].
    pub fn set_fetch_failing(&self, failing: bool) {
        self.fetch_failing.store(failing, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("fetch_failing", &self.fetch_failing.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn list_documents(
        &self,
        project_id: &str,
    ) -> BoxFuture<'_, Result<Vec<DocumentSummary>, StoreError>> {
        let project_id = project_id.to_owned();
        Box::pin(async move {
            let state = self
                .state
                .read()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            state
                .projects
                .get(&project_id)
                .cloned()
                .ok_or(StoreError::ProjectNotFound(project_id))
        })
    }

    fn get_document(&self, document_id: &str) -> BoxFuture<'_, Result<String, StoreError>> {
        let document_id = document_id.to_owned();
        Box::pin(async move {
            if self.fetch_failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("fetches disabled".into()));
            }
            let state = self
                .state
                .read()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            state
                .texts
                .get(&document_id)
                .cloned()
                .ok_or(StoreError::DocumentNotFound(document_id))
        })
    }
}

/// Documents laid out on disk as `<root>/<project>/<name>.{md,txt}`.
///
/// Document ids are `<project>/<file name>`; titles are file stems.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let rel = Path::new(relative);
        let safe = !relative.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.root.join(rel))
    }
}

impl DocumentStore for FsDocumentStore {
    fn list_documents(
        &self,
        project_id: &str,
    ) -> BoxFuture<'_, Result<Vec<DocumentSummary>, StoreError>> {
        let project_id = project_id.to_owned();
        Box::pin(async move {
            let Some(dir) = self.resolve(&project_id).filter(|d| d.is_dir()) else {
                return Err(StoreError::ProjectNotFound(project_id));
            };

            let mut entries = tokio::fs::read_dir(&dir).await?;
            let mut docs = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let supported = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| DOCUMENT_EXTENSIONS.contains(&e));
                if !supported || !entry.file_type().await?.is_file() {
                    continue;
                }
                let (Some(name), Some(stem)) = (
                    path.file_name().and_then(|n| n.to_str()),
                    path.file_stem().and_then(|n| n.to_str()),
                ) else {
                    continue;
                };
                docs.push(DocumentSummary {
                    id: format!("{project_id}/{name}"),
                    title: stem.to_owned(),
                });
            }
            docs.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(docs)
        })
    }

    fn get_document(&self, document_id: &str) -> BoxFuture<'_, Result<String, StoreError>> {
        let document_id = document_id.to_owned();
        Box::pin(async move {
            let Some(path) = self.resolve(&document_id) else {
                return Err(StoreError::DocumentNotFound(document_id));
            };
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => Ok(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(StoreError::DocumentNotFound(document_id))
                }
                Err(e) => Err(StoreError::Io(e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    fn doc(project: &str, id: &str, title: &str, text: &str) -> Document {
        Document {
            project_id: project.into(),
            document_id: id.into(),
            title: title.into(),
            full_text: text.into(),
        }
    }

    #[tokio::test]
    async fn in_memory_lists_and_fetches() {
        let store = InMemoryDocumentStore::new();
        store.insert(doc("p", "a", "Alpha", "alpha text"));
        store.insert(doc("p", "b", "Beta", "beta text"));

        let listed = store.list_documents("p").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "Alpha");
        assert_eq!(store.get_document("b").await.unwrap(), "beta text");
    }

    #[tokio::test]
    async fn in_memory_unknown_project_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store.list_documents("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::ProjectNotFound(_)));
    }

    #[tokio::test]
    async fn in_memory_empty_project_lists_nothing() {
        let store = InMemoryDocumentStore::new();
        store.add_project("empty");
        assert!(store.list_documents("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_replaces_existing_document() {
        let store = InMemoryDocumentStore::new();
        store.insert(doc("p", "a", "Old", "old"));
        store.insert(doc("p", "a", "New", "new"));
        let listed = store.list_documents("p").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "New");
        assert_eq!(store.get_document("a").await.unwrap(), "new");
    }

    #[tokio::test]
    async fn failing_fetch_is_unavailable_but_listing_works() {
        let store = InMemoryDocumentStore::new();
        store.insert(doc("p", "a", "Alpha", "alpha"));
        store.set_fetch_failing(true);
        assert!(store.list_documents("p").await.is_ok());
        assert!(matches!(
            store.get_document("a").await.unwrap_err(),
            StoreError::Unavailable(_)
        ));
    }

    struct FlakyStore {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl DocumentStore for FlakyStore {
        fn list_documents(
            &self,
            _project_id: &str,
        ) -> BoxFuture<'_, Result<Vec<DocumentSummary>, StoreError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn get_document(&self, document_id: &str) -> BoxFuture<'_, Result<String, StoreError>> {
            let document_id = document_id.to_owned();
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if document_id == "missing" {
                    return Err(StoreError::DocumentNotFound(document_id));
                }
                if self.failures_left.load(Ordering::SeqCst) > 0 {
                    self.failures_left.fetch_sub(1, Ordering::SeqCst);
                    return Err(StoreError::Unavailable("flaky".into()));
                }
                Ok("content".into())
            })
        }
    }

    fn quick_policy(retries: u32) -> FetchPolicy {
        FetchPolicy {
            retries,
            timeout: Duration::from_secs(1),
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let store = FlakyStore {
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        };
        let text = fetch_with_retry(&store, "doc", quick_policy(2)).await.unwrap();
        assert_eq!(text, "content");
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_bound() {
        let store = FlakyStore {
            failures_left: AtomicU32::new(10),
            calls: AtomicU32::new(0),
        };
        assert!(fetch_with_retry(&store, "doc", quick_policy(1)).await.is_err());
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let store = FlakyStore {
            failures_left: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        };
        let err = fetch_with_retry(&store, "missing", quick_policy(3))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DocumentNotFound(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fs_store_lists_supported_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("handbook");
        std::fs::create_dir(&project).unwrap();
        std::fs::write(project.join("zeta.md"), "zeta body").unwrap();
        std::fs::write(project.join("alpha.txt"), "alpha body").unwrap();
        std::fs::write(project.join("image.png"), [0u8; 4]).unwrap();

        let store = FsDocumentStore::new(dir.path());
        let docs = store.list_documents("handbook").await.unwrap();
        assert_eq!(
            docs,
            vec![
                DocumentSummary {
                    id: "handbook/alpha.txt".into(),
                    title: "alpha".into()
                },
                DocumentSummary {
                    id: "handbook/zeta.md".into(),
                    title: "zeta".into()
                },
            ]
        );
        assert_eq!(
            store.get_document("handbook/zeta.md").await.unwrap(),
            "zeta body"
        );
    }

    #[tokio::test]
    async fn fs_store_rejects_traversal_and_unknown_project() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        assert!(matches!(
            store.list_documents("missing").await.unwrap_err(),
            StoreError::ProjectNotFound(_)
        ));
        assert!(matches!(
            store.list_documents("../etc").await.unwrap_err(),
            StoreError::ProjectNotFound(_)
        ));
        assert!(matches!(
            store.get_document("../secret.md").await.unwrap_err(),
            StoreError::DocumentNotFound(_)
        ));
    }
}
