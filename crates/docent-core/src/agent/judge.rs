use std::time::Duration;

use docent_llm::{LlmError, LlmProvider, Message};

/// A provider bound to one pipeline role, with a hard deadline per call.
#[derive(Debug)]
pub struct Judge<P> {
    role: &'static str,
    provider: P,
    timeout: Duration,
}

impl<P: LlmProvider> Judge<P> {
    #[must_use]
    pub fn new(role: &'static str, provider: P, timeout: Duration) -> Self {
        Self {
            role,
            provider,
            timeout,
        }
    }

    #[must_use]
    pub fn role(&self) -> &'static str {
        self.role
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Send a system instruction and a user message, returning the raw reply.
    ///
    /// # Errors
    ///
    /// Returns the provider error, or [`LlmError::Timeout`] when the deadline passes.
    pub async fn ask(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let messages = [Message::system(system), Message::user(user)];
        let reply = tokio::time::timeout(self.timeout, self.provider.chat(&messages))
            .await
            .map_err(|_| LlmError::Timeout {
                operation: "chat",
                seconds: self.timeout.as_secs(),
            })??;
        tracing::debug!(role = self.role, chars = reply.len(), "judge replied");
        Ok(reply)
    }
}

/// One judge per pipeline role.
#[derive(Debug)]
pub struct Judges<P> {
    pub moderation: Judge<P>,
    pub classification: Judge<P>,
    pub generation: Judge<P>,
    pub general: Judge<P>,
    pub followup: Judge<P>,
}

#[cfg(test)]
mod tests {
    use docent_llm::mock::MockProvider;

    use super::*;

    #[tokio::test]
    async fn ask_sends_system_then_user() {
        let mock = MockProvider::with_responses(vec!["ok".into()]);
        let judge = Judge::new("test", mock.clone(), Duration::from_secs(1));
        assert_eq!(judge.ask("be brief", "hello").await.unwrap(), "ok");

        let calls = mock.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], Message::system("be brief"));
        assert_eq!(calls[0][1], Message::user("hello"));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let judge = Judge::new(
            "slow",
            MockProvider::default().with_delay(200),
            Duration::from_millis(20),
        );
        let err = judge.ask("s", "u").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout { operation: "chat", .. }));
    }
}
