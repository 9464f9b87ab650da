use std::path::PathBuf;

use super::{Config, GuardFallback, ProviderKind};

fn parse_lowercase<T: serde::de::DeserializeOwned>(v: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(v.to_lowercase())).ok()
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_index();
        self.apply_env_overrides_policy();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("DOCENT_LLM_PROVIDER") {
            if let Some(kind) = parse_lowercase::<ProviderKind>(&v) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid DOCENT_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCENT_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("DOCENT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("DOCENT_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("DOCENT_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("DOCENT_TIMEOUT_LLM") {
            match v.parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeouts.llm_seconds = secs,
                _ => tracing::warn!("ignoring invalid DOCENT_TIMEOUT_LLM value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("DOCENT_TIMEOUT_EMBEDDING") {
            match v.parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeouts.embedding_seconds = secs,
                _ => tracing::warn!("ignoring invalid DOCENT_TIMEOUT_EMBEDDING value: {v}"),
            }
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("DOCENT_INDEX_ROOT") {
            self.index.root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DOCENT_DOCUMENTS_ROOT") {
            self.documents.root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DOCENT_RETRIEVAL_SEMANTIC_WEIGHT") {
            match v.parse::<f32>() {
                Ok(w) if w >= 0.0 => self.retrieval.semantic_weight = w,
                _ => tracing::warn!("ignoring invalid DOCENT_RETRIEVAL_SEMANTIC_WEIGHT value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("DOCENT_RETRIEVAL_KEYWORD_WEIGHT") {
            match v.parse::<f32>() {
                Ok(w) if w >= 0.0 => self.retrieval.keyword_weight = w,
                _ => tracing::warn!("ignoring invalid DOCENT_RETRIEVAL_KEYWORD_WEIGHT value: {v}"),
            }
        }
    }

    fn apply_env_overrides_policy(&mut self) {
        if let Ok(v) = std::env::var("DOCENT_POLICY_GUARD_ON_FAILURE") {
            if let Some(fallback) = parse_lowercase::<GuardFallback>(&v) {
                self.policy.guard_on_failure = fallback;
            } else {
                tracing::warn!("ignoring invalid DOCENT_POLICY_GUARD_ON_FAILURE value: {v}");
            }
        }
    }
}
