//! Test-only mock provider.

use std::sync::{Arc, Mutex};

use crate::provider::{LlmProvider, Message};

/// Deterministic text-to-vector function used by [`MockProvider::with_embedder`].
pub type MockEmbedder = fn(&str) -> Vec<f32>;

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
    pub default_response: String,
    pub embedding: Vec<f32>,
    pub embedder: Option<MockEmbedder>,
    pub supports_embeddings: bool,
    pub fail_chat: bool,
    pub fail_embed: bool,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            embedding: vec![0.0; 8],
            embedder: None,
            supports_embeddings: false,
            fail_chat: false,
            fail_embed: false,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            fail_embed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn with_embedder(mut self, embedder: MockEmbedder) -> Self {
        self.embedder = Some(embedder);
        self.supports_embeddings = true;
        self
    }

    /// Messages received by `chat`, in call order.
    #[must_use]
    pub fn recorded_calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, crate::LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_chat {
            return Err(crate::LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::LlmError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_embed {
            return Err(crate::LlmError::Unavailable);
        }
        if !self.supports_embeddings {
            return Err(crate::LlmError::EmbedUnsupported {
                provider: "mock".into(),
            });
        }
        Ok(self.embedder.map_or_else(|| self.embedding.clone(), |f| f(text)))
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_are_consumed_in_order() {
        let p = MockProvider::with_responses(vec!["one".into(), "two".into()]);
        assert_eq!(p.chat(&[]).await.unwrap(), "one");
        assert_eq!(p.chat(&[]).await.unwrap(), "two");
        assert_eq!(p.chat(&[]).await.unwrap(), "mock response");
        assert_eq!(p.recorded_calls().len(), 3);
    }

    #[tokio::test]
    async fn failing_errors_on_chat_and_embed() {
        let p = MockProvider::failing();
        assert!(p.chat(&[]).await.is_err());
        assert!(p.embed("x").await.is_err());
    }

    #[tokio::test]
    async fn embedder_is_used_per_text() {
        fn len_vec(text: &str) -> Vec<f32> {
            #[allow(clippy::cast_precision_loss)]
            vec![text.len() as f32]
        }
        let p = MockProvider::default().with_embedder(len_vec);
        assert_eq!(p.embed("abc").await.unwrap(), vec![3.0]);
    }
}
