use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::agent::Mode;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub judges: JudgesConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    OpenAi,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "mistral:7b".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            api_key: None,
        }
    }
}

/// Sampling settings for one judge role.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JudgeConfig {
    pub temperature: f32,
    /// Overrides `llm.model` for this role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    1024
}

impl JudgeConfig {
    #[must_use]
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            model: None,
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JudgesConfig {
    #[serde(default = "default_moderation_judge")]
    pub moderation: JudgeConfig,
    #[serde(default = "default_classification_judge")]
    pub classification: JudgeConfig,
    #[serde(default = "default_generation_judge")]
    pub generation: JudgeConfig,
    #[serde(default = "default_general_judge")]
    pub general: JudgeConfig,
    #[serde(default = "default_followup_judge")]
    pub followup: JudgeConfig,
}

fn default_moderation_judge() -> JudgeConfig {
    JudgeConfig::with_temperature(0.0)
}

fn default_classification_judge() -> JudgeConfig {
    JudgeConfig::with_temperature(0.0)
}

fn default_generation_judge() -> JudgeConfig {
    JudgeConfig::with_temperature(0.1)
}

fn default_general_judge() -> JudgeConfig {
    JudgeConfig::with_temperature(0.7)
}

fn default_followup_judge() -> JudgeConfig {
    JudgeConfig::with_temperature(0.5)
}

impl Default for JudgesConfig {
    fn default() -> Self {
        Self {
            moderation: default_moderation_judge(),
            classification: default_classification_judge(),
            generation: default_generation_judge(),
            general: default_general_judge(),
            followup: default_followup_judge(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Directory holding one persisted semantic index per project.
    #[serde(default = "default_index_root")]
    pub root: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_embed_concurrency")]
    pub embed_concurrency: usize,
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    /// Start a background build when a question arrives for an unbuilt project.
    #[serde(default = "default_true")]
    pub auto_build: bool,
}

fn default_index_root() -> PathBuf {
    PathBuf::from(".docent/indexes")
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    80
}

fn default_embed_concurrency() -> usize {
    4
}

fn default_fetch_retries() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: default_index_root(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embed_concurrency: default_embed_concurrency(),
            fetch_retries: default_fetch_retries(),
            auto_build: default_true(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_rag_k")]
    pub rag_k: usize,
    #[serde(default = "default_summary_k")]
    pub summary_k: usize,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,
}

fn default_rag_k() -> usize {
    5
}

fn default_summary_k() -> usize {
    6
}

fn default_semantic_weight() -> f32 {
    0.6
}

fn default_keyword_weight() -> f32 {
    0.4
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rag_k: default_rag_k(),
            summary_k: default_summary_k(),
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
        }
    }
}

impl RetrievalConfig {
    #[must_use]
    pub fn weights(&self) -> docent_index::Weights {
        docent_index::Weights {
            semantic: self.semantic_weight,
            keyword: self.keyword_weight,
        }
    }
}

/// Verdict applied when the moderation judge fails or replies with garbage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardFallback {
    #[default]
    Allow,
    Reject,
}

impl GuardFallback {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub guard_on_failure: GuardFallback,
    /// Mode used when the classifier fails.
    #[serde(default)]
    pub default_mode: Mode,
    #[serde(default = "default_true")]
    pub followups_enabled: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            guard_on_failure: GuardFallback::default(),
            default_mode: Mode::default(),
            followups_enabled: default_true(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_timeout")]
    pub llm_seconds: u64,
    #[serde(default = "default_embedding_timeout")]
    pub embedding_seconds: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_seconds: u64,
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_fetch_timeout() -> u64 {
    10
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_seconds: default_llm_timeout(),
            embedding_seconds: default_embedding_timeout(),
            fetch_seconds: default_fetch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentsConfig {
    /// One sub-directory per project, each `.md`/`.txt` file a document.
    #[serde(default = "default_documents_root")]
    pub root: PathBuf,
}

fn default_documents_root() -> PathBuf {
    PathBuf::from("documents")
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: default_documents_root(),
        }
    }
}
