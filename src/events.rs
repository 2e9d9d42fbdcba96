//! Structured workflow execution events for tracing and observability.
//!
//! Every graph node run emits events into the run's trace log, so a caller
//! can see which nodes ran, how long they took, and which provider failures
//! were absorbed into the conversation.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Events that can be emitted during workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WorkflowEvent {
    /// A node has started execution.
    NodeStart {
        /// Name of the node being executed.
        node: String,
        /// Messages in the state handed to the node.
        state_len: usize,
    },
    /// A node has finished and its delta was merged.
    NodeEnd {
        /// Name of the node that completed.
        node: String,
        /// Duration of execution in milliseconds.
        duration_ms: u128,
        /// Number of messages the node contributed.
        delta_len: usize,
    },
    /// A provider call failed and was recovered as a system message.
    ProviderFailure {
        /// Name of the node that made the call.
        node: String,
        /// Failure class, e.g. `missing_credential`.
        kind: String,
        /// Human-readable detail.
        message: String,
    },
    /// A node failed with an engine-level fault.
    Error {
        /// Name of the node where the fault occurred.
        node: String,
        /// Error message describing what went wrong.
        message: String,
    },
}

/// A timestamped trace entry containing a workflow event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Unix epoch timestamp in milliseconds when this event occurred.
    pub timestamp: u128,
    /// The workflow event that was recorded.
    #[serde(flatten)]
    pub event: WorkflowEvent,
}

impl TraceEntry {
    /// Create a new trace entry with the current timestamp.
    #[must_use]
    pub fn new(event: WorkflowEvent) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self { timestamp, event }
    }
}
