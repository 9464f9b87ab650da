use docent_index::IndexError;

use crate::pipeline::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("project {0} not found")]
    ProjectNotFound(String),

    #[error("index for project {0} is not built yet")]
    NotReady(String),

    #[error("query must not be empty")]
    InvalidQuery,

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
