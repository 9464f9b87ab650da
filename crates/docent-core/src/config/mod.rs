mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use docent_index::{FetchPolicy, RegistryConfig, SplitterConfig};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the index and pipeline cannot work with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.index.chunk_size == 0 {
            bail!("index.chunk_size must be greater than zero");
        }
        if self.index.chunk_overlap >= self.index.chunk_size {
            bail!(
                "index.chunk_overlap ({}) must be smaller than index.chunk_size ({})",
                self.index.chunk_overlap,
                self.index.chunk_size
            );
        }
        if self.retrieval.rag_k == 0 || self.retrieval.summary_k == 0 {
            bail!("retrieval.rag_k and retrieval.summary_k must be greater than zero");
        }
        if self.retrieval.semantic_weight < 0.0 || self.retrieval.keyword_weight < 0.0 {
            bail!("retrieval weights must not be negative");
        }
        if self.timeouts.llm_seconds == 0
            || self.timeouts.embedding_seconds == 0
            || self.timeouts.fetch_seconds == 0
        {
            bail!("timeouts must be greater than zero");
        }
        Ok(())
    }

    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            splitter: SplitterConfig {
                chunk_size: self.index.chunk_size,
                chunk_overlap: self.index.chunk_overlap,
            },
            fetch: FetchPolicy {
                retries: self.index.fetch_retries,
                timeout: Duration::from_secs(self.timeouts.fetch_seconds),
                ..FetchPolicy::default()
            },
        }
    }
}
