pub mod builder;
pub mod step;

pub use builder::Pipeline;
pub use step::{Haltable, Step, UnlessHalted};

/// Failure that no stage can degrade around; the caller reports it as a failed answer.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stage {stage} failed: {message}")]
    Stage {
        stage: &'static str,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AddSuffix {
        suffix: String,
    }

    impl Step for AddSuffix {
        type Input = String;
        type Output = String;

        async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
            Ok(format!("{input}{}", self.suffix))
        }
    }

    struct ParseLen;

    impl Step for ParseLen {
        type Input = String;
        type Output = usize;

        async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
            Ok(input.len())
        }
    }

    #[derive(Debug, PartialEq)]
    struct Counter {
        value: u32,
        stopped: bool,
    }

    impl Haltable for Counter {
        fn is_halted(&self) -> bool {
            self.stopped
        }
    }

    struct Increment;

    impl Step for Increment {
        type Input = Counter;
        type Output = Counter;

        async fn run(&self, mut input: Counter) -> Result<Counter, PipelineError> {
            input.value += 1;
            Ok(input)
        }
    }

    struct StopAt(u32);

    impl Step for StopAt {
        type Input = Counter;
        type Output = Counter;

        async fn run(&self, mut input: Counter) -> Result<Counter, PipelineError> {
            input.stopped = input.value >= self.0;
            Ok(input)
        }
    }

    #[tokio::test]
    async fn single_step_pipeline() {
        let result = Pipeline::start(AddSuffix { suffix: "!".into() })
            .run("hello".into())
            .await
            .unwrap();
        assert_eq!(result, "hello!");
    }

    #[tokio::test]
    async fn heterogeneous_chain() {
        let result = Pipeline::start(AddSuffix {
            suffix: "abc".into(),
        })
        .step(ParseLen)
        .run(String::new())
        .await
        .unwrap();
        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn halted_state_skips_remaining_stages() {
        let pipeline = Pipeline::start(Increment)
            .step(StopAt(1))
            .stage(Increment)
            .stage(Increment);
        let out = pipeline
            .run(Counter {
                value: 0,
                stopped: false,
            })
            .await
            .unwrap();
        assert_eq!(
            out,
            Counter {
                value: 1,
                stopped: true
            }
        );
    }

    #[tokio::test]
    async fn stages_run_when_not_halted() {
        let pipeline = Pipeline::start(Increment)
            .step(StopAt(10))
            .stage(Increment)
            .stage(Increment);
        let out = pipeline
            .run(Counter {
                value: 0,
                stopped: false,
            })
            .await
            .unwrap();
        assert_eq!(out.value, 3);
    }

    #[tokio::test]
    async fn error_propagation() {
        struct FailStep;

        impl Step for FailStep {
            type Input = String;
            type Output = String;

            async fn run(&self, _input: Self::Input) -> Result<Self::Output, PipelineError> {
                Err(PipelineError::Stage {
                    stage: "fail",
                    message: "boom".into(),
                })
            }
        }

        let result = Pipeline::start(AddSuffix {
            suffix: "ok".into(),
        })
        .step(FailStep)
        .run("hi".into())
        .await;
        assert!(result.unwrap_err().to_string().contains("boom"));
    }
}
