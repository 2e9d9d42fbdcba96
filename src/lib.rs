//! # cortex
//!
//! Backend for a "second brain": free-text notes plus a chat endpoint that
//! routes each message through a runtime-selected LLM provider.
//!
//! The chat path is a small workflow engine. A run takes the conversation so
//! far and a per-request [`ProviderConfig`], walks a validated
//! [`WorkflowGraph`] from its entry node to [`END`], and returns the extended
//! conversation. Anticipated provider failures (missing key, unknown provider,
//! failed call) never escape as errors; they become a system message that
//! starts with `Error:`.
//!
//! ## Core Concepts
//!
//! - **ConversationState**: Ordered message history, extended by merging deltas
//! - **Step**: A graph node that reads the state and returns a delta
//! - **AgentStep**: The node that calls the configured provider
//! - **WorkflowGraph**: Immutable nodes and edges, validated at build time
//! - **Workflow**: Runs a graph with per-run context, metrics and traces
//! - **ProviderAdapter**: Stateless OpenAI / Gemini client selection
//!
//! ## Example: Chat Workflow
//!
//! ```rust
//! use std::sync::Arc;
//! use cortex::{
//!     ConversationState, ProviderAdapter, ProviderConfig, ProviderSettings, Role, Workflow,
//! };
//!
//! # tokio_test::block_on(async {
//! let adapter = ProviderAdapter::new(ProviderSettings::default()).unwrap();
//! let workflow = Workflow::agent(Arc::new(adapter)).unwrap();
//!
//! // No API key: the provider is never contacted and the run still completes.
//! let (state, metrics) = workflow
//!     .run_with_metrics(ConversationState::from_user("hello"), ProviderConfig::new("openai", ""))
//!     .await
//!     .unwrap();
//!
//! let reply = state.last().unwrap();
//! assert_eq!(reply.role(), Role::System);
//! assert_eq!(reply.content(), "Error: API Key missing");
//! assert_eq!(metrics.steps_completed, 1);
//! assert!(metrics.has_failures());
//! # });
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod graph;
pub mod instrumented;
pub mod message;
pub mod metrics;
pub mod notes;
pub mod provider;
pub mod server;
pub mod step;
pub mod workflow;

pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use events::{TraceEntry, WorkflowEvent};
pub use graph::{GraphBuilder, GraphError, Next, WorkflowGraph, END};
pub use instrumented::InstrumentedStep;
pub use message::{ConversationState, Delta, Message, Role};
pub use metrics::WorkflowMetrics;
pub use provider::{
    ChatModel, Completion, CompletionProvider, Credential, Endpoint, Provider, ProviderAdapter,
    ProviderConfig, ProviderError, ProviderPolicy, ProviderSettings, Usage,
};
pub use step::{AgentStep, LambdaStep, Step};
pub use workflow::Workflow;
