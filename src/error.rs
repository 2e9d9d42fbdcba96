//! Error types for workflow execution.
//!
//! Only engine-level faults live here. Provider failures are ordinary data
//! (see [`ProviderError`](crate::provider::ProviderError)) and are turned into
//! conversation content before they can reach [`Error`].

use thiserror::Error;

use crate::graph::GraphError;

/// The main error type for workflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The workflow graph is malformed.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// The input handed to a run does not satisfy its preconditions.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A step reported an error it could not turn into conversation content.
    #[error("Execution error in step '{step_name}': {message}")]
    Execution {
        /// The node that failed.
        step_name: String,
        /// What went wrong.
        message: String,
    },

    /// A step panicked while running.
    #[error("Step '{step_name}' panicked: {message}")]
    StepPanicked {
        /// The node that panicked.
        step_name: String,
        /// The panic payload, when it was a string.
        message: String,
    },

    /// The dispatch loop visited more nodes than the graph contains.
    #[error("Step limit of {limit} exceeded")]
    StepLimit {
        /// Maximum number of node executions allowed for one run.
        limit: usize,
    },
}

impl Error {
    /// Convenience constructor for step execution failures.
    pub fn execution(step_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Execution {
            step_name: step_name.into(),
            message: message.into(),
        }
    }
}

/// A specialized `Result` type for workflow operations.
pub type Result<T> = std::result::Result<T, Error>;
