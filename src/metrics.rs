//! Metrics collection for workflow execution.
//!
//! This module provides `WorkflowMetrics` for tracking token usage,
//! provider calls, executed steps, and recovered failures.

use serde::{Deserialize, Serialize};

/// Aggregated metrics for a workflow execution.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    /// Total prompt tokens reported by providers.
    pub prompt_token_count: usize,
    /// Total completion tokens reported by providers.
    pub completion_token_count: usize,
    /// Total tokens (prompt + completion).
    pub total_token_count: usize,
    /// Number of graph nodes that completed.
    pub steps_completed: usize,
    /// Number of provider calls attempted, successful or not.
    pub provider_calls: usize,
    /// Failure messages, both recovered provider failures and faults.
    pub failures: Vec<String>,
}

impl WorkflowMetrics {
    /// Record both prompt and completion tokens.
    pub fn add_tokens(&mut self, prompt: usize, completion: usize) {
        self.prompt_token_count += prompt;
        self.completion_token_count += completion;
        self.total_token_count += prompt + completion;
    }

    /// Record a failure message.
    pub fn record_failure(&mut self, error: String) {
        self.failures.push(error);
    }

    /// Increment the steps completed counter.
    pub fn record_step(&mut self) {
        self.steps_completed += 1;
    }

    /// Increment the provider call counter.
    pub fn record_provider_call(&mut self) {
        self.provider_calls += 1;
    }

    /// Check if there were any failures.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Get the total number of tokens used.
    pub fn total_tokens(&self) -> usize {
        self.total_token_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_tokens_updates_total() {
        let mut m = WorkflowMetrics::default();
        m.add_tokens(12, 3);
        m.add_tokens(1, 1);
        assert_eq!(m.prompt_token_count, 13);
        assert_eq!(m.completion_token_count, 4);
        assert_eq!(m.total_tokens(), 17);
        assert!(!m.has_failures());
    }
}
