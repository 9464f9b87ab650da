//! Configuration, the staged answer pipeline, and the query service.

pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;

pub use agent::{AgentPipeline, AgentState, GuardVerdict, Judges, Mode};
pub use config::Config;
pub use error::ServiceError;
pub use service::{QueryResponse, QueryService, ResponseStatus, RetrievalComparison};
