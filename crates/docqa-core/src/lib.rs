//! Configuration, prompt assembly, and the question answering pipeline.

pub mod bootstrap;
pub mod channel;
pub mod chat;
pub mod config;
pub mod error;
pub mod instrument;
pub mod pipeline;
pub mod prompt;

pub use error::{PipelineError, QueryError};
pub use pipeline::{Answer, Pipeline, QueryStage};
