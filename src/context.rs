//! Execution context for workflow runs.
//!
//! Every run gets its own `ExecutionContext`. It carries the provider
//! configuration chosen for that run, plus the metrics and trace log the
//! steps write into. Nothing in it outlives the run unless the caller keeps
//! the context around.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::events::{TraceEntry, WorkflowEvent};
use crate::metrics::WorkflowMetrics;
use crate::provider::ProviderConfig;

/// Context passed to every step in the workflow.
///
/// Cloning is cheap and clones share metrics and traces.
///
/// # Example
///
/// ```rust
/// use cortex::{ExecutionContext, ProviderConfig, WorkflowEvent};
///
/// let ctx = ExecutionContext::new(ProviderConfig::new("openai", "sk-test"));
/// ctx.emit(WorkflowEvent::NodeStart {
///     node: "agent".to_string(),
///     state_len: 1,
/// });
///
/// assert_eq!(ctx.trace_snapshot().len(), 1);
/// assert_eq!(ctx.provider_config().provider, "openai");
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    provider: Arc<ProviderConfig>,
    /// Shared metrics accumulator.
    pub metrics: Arc<Mutex<WorkflowMetrics>>,
    /// Shared trace log for structured workflow events.
    pub traces: Arc<Mutex<Vec<TraceEntry>>>,
}

impl ExecutionContext {
    /// Create a new execution context for one run.
    #[must_use]
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider: Arc::new(provider),
            metrics: Arc::new(Mutex::new(WorkflowMetrics::default())),
            traces: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The provider selection and credential for this run.
    pub fn provider_config(&self) -> &ProviderConfig {
        &self.provider
    }

    fn metrics(&self) -> MutexGuard<'_, WorkflowMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn traces(&self) -> MutexGuard<'_, Vec<TraceEntry>> {
        self.traces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record token usage reported by a provider.
    pub fn record_tokens(&self, prompt: usize, completion: usize) {
        self.metrics().add_tokens(prompt, completion);
    }

    /// Increment the steps completed counter.
    pub fn record_step(&self) {
        self.metrics().record_step();
    }

    /// Increment the provider call counter.
    pub fn record_provider_call(&self) {
        self.metrics().record_provider_call();
    }

    /// Record a failure message.
    pub fn record_failure(&self, error: impl Into<String>) {
        self.metrics().record_failure(error.into());
    }

    /// Get a snapshot of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> WorkflowMetrics {
        self.metrics().clone()
    }

    /// Emit a structured workflow event to the trace log.
    pub fn emit(&self, event: WorkflowEvent) {
        let entry = TraceEntry::new(event);
        self.traces().push(entry);
    }

    /// Get a snapshot of the current trace log.
    #[must_use]
    pub fn trace_snapshot(&self) -> Vec<TraceEntry> {
        self.traces().clone()
    }
}
