use std::future::Future;

use super::PipelineError;

pub trait Step: Send + Sync {
    type Input: Send;
    type Output: Send;

    fn run(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = Result<Self::Output, PipelineError>> + Send;
}

/// State that can stop the remaining stages of a pipeline early.
pub trait Haltable {
    fn is_halted(&self) -> bool;
}

/// Runs the wrapped step only while the state has not been halted.
/// A halted state passes through unchanged.
pub struct UnlessHalted<S>(pub S);

impl<S, T> Step for UnlessHalted<S>
where
    S: Step<Input = T, Output = T>,
    T: Haltable + Send,
{
    type Input = T;
    type Output = T;

    async fn run(&self, input: T) -> Result<T, PipelineError> {
        if input.is_halted() {
            return Ok(input);
        }
        self.0.run(input).await
    }
}
