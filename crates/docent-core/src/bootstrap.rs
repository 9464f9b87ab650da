//! Wiring from a loaded [`Config`] to a ready [`QueryService`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use docent_index::{DocumentStore, IndexRegistry, SemanticStore};
use docent_llm::ollama::OllamaProvider;
use docent_llm::openai::OpenAiProvider;
use docent_llm::{AnyProvider, LlmProvider};

use crate::agent::{AgentPipeline, Judge, Judges};
use crate::config::{Config, JudgeConfig, ProviderKind};
use crate::service::QueryService;

/// Priority: explicit path > `DOCENT_CONFIG` env > `config/docent.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli {
        return path;
    }
    if let Ok(path) = std::env::var("DOCENT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/docent.toml")
}

/// Provider for one judge role, or the embedding provider when `judge` is `None`.
///
/// # Errors
///
/// Returns an error if the OpenAI backend is selected without an API key.
pub fn create_provider(config: &Config, judge: Option<&JudgeConfig>) -> anyhow::Result<AnyProvider> {
    let llm = &config.llm;
    let model = judge
        .and_then(|j| j.model.clone())
        .unwrap_or_else(|| llm.model.clone());
    let provider = match llm.provider {
        ProviderKind::Ollama => {
            let mut p = OllamaProvider::new(&llm.base_url, model, llm.embedding_model.clone());
            if let Some(j) = judge {
                p = p.with_sampling(j.temperature, j.max_tokens);
            }
            AnyProvider::Ollama(p)
        }
        ProviderKind::OpenAi => {
            let api_key = llm
                .api_key
                .clone()
                .context("llm.api_key (or DOCENT_LLM_API_KEY) is required for the openai provider")?;
            let mut p = OpenAiProvider::new(
                api_key,
                llm.base_url.clone(),
                model,
                Some(llm.embedding_model.clone()),
            );
            if let Some(j) = judge {
                p = p.with_sampling(j.temperature, j.max_tokens);
            }
            AnyProvider::OpenAi(p)
        }
    };
    Ok(provider)
}

/// One provider per pipeline role, each with its own sampling settings.
///
/// # Errors
///
/// Returns an error if any role's provider cannot be created.
pub fn build_judges(config: &Config) -> anyhow::Result<Judges<AnyProvider>> {
    let timeout = Duration::from_secs(config.timeouts.llm_seconds);
    let judge = |role: &'static str, cfg: &JudgeConfig| -> anyhow::Result<Judge<AnyProvider>> {
        let provider = create_provider(config, Some(cfg))
            .with_context(|| format!("failed to create {role} judge"))?;
        Ok(Judge::new(role, provider, timeout))
    };
    Ok(Judges {
        moderation: judge("moderation", &config.judges.moderation)?,
        classification: judge("classification", &config.judges.classification)?,
        generation: judge("generation", &config.judges.generation)?,
        general: judge("general", &config.judges.general)?,
        followup: judge("followup", &config.judges.followup)?,
    })
}

/// Index registry over `store`, persisting semantic indexes under `index.root`.
///
/// # Errors
///
/// Returns an error if the embedding provider cannot be created.
pub fn build_registry(
    config: &Config,
    store: Arc<dyn DocumentStore>,
) -> anyhow::Result<Arc<IndexRegistry>> {
    let embedder = create_provider(config, None).context("failed to create embedding provider")?;
    if !embedder.supports_embeddings() {
        tracing::warn!(provider = embedder.name(), "provider reports no embedding support");
    }
    let semantic = SemanticStore::new(&config.index.root, Arc::new(embedder.embed_fn()))
        .with_concurrency(config.index.embed_concurrency)
        .with_timeout(Duration::from_secs(config.timeouts.embedding_seconds));
    Ok(Arc::new(IndexRegistry::new(
        store,
        semantic,
        config.registry_config(),
    )))
}

/// Validate `config` and assemble the full query service.
///
/// # Errors
///
/// Returns an error for invalid configuration or unconstructible providers.
pub fn build_service(
    config: &Config,
    store: Arc<dyn DocumentStore>,
) -> anyhow::Result<QueryService<AnyProvider>> {
    config.validate()?;
    let registry = build_registry(config, store)?;
    let pipeline = AgentPipeline::new(build_judges(config)?, config.policy, config.retrieval);
    tracing::info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        index_root = %config.index.root.display(),
        "query service ready"
    );
    Ok(QueryService::new(registry, pipeline).with_auto_build(config.index.auto_build))
}

pub async fn health_check(provider: &AnyProvider) {
    if let AnyProvider::Ollama(ollama) = provider {
        match ollama.health_check().await {
            Ok(()) => tracing::info!("ollama health check passed"),
            Err(e) => tracing::warn!("ollama health check failed: {e:#}"),
        }
    }
}
