//! The provider-backed "agent" step.

use async_trait::async_trait;
use std::sync::Arc;

use crate::provider::CompletionProvider;
use crate::{ConversationState, Delta, ExecutionContext, Message, Result, Step, WorkflowEvent};

/// Name of the agent node in the standard graph.
pub const AGENT_NODE: &str = "agent";

/// Asks the run's provider for one reply to the whole conversation.
///
/// Provider failures never leave this step as errors: each one becomes a
/// single `system` message carrying [`ProviderError::notice`], and is also
/// recorded in the run's metrics and trace log.
///
/// [`ProviderError::notice`]: crate::provider::ProviderError::notice
pub struct AgentStep {
    provider: Arc<dyn CompletionProvider>,
}

impl AgentStep {
    /// Create an agent step backed by `provider`.
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Step for AgentStep {
    async fn run(&self, ctx: &ExecutionContext, state: &ConversationState) -> Result<Delta> {
        ctx.record_provider_call();
        let outcome = self
            .provider
            .complete(ctx.provider_config(), state.messages())
            .await;

        match outcome {
            Ok(completion) => {
                ctx.record_tokens(
                    completion.usage.prompt_tokens,
                    completion.usage.completion_tokens,
                );
                Ok(vec![completion.message])
            }
            Err(e) => {
                tracing::warn!(
                    node = AGENT_NODE,
                    provider = %ctx.provider_config().provider,
                    kind = e.kind(),
                    error = %e,
                    "Provider failure recovered as system message"
                );
                ctx.record_failure(e.to_string());
                ctx.emit(WorkflowEvent::ProviderFailure {
                    node: AGENT_NODE.to_string(),
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
                Ok(vec![Message::system(e.notice())])
            }
        }
    }

    fn name(&self) -> &str {
        AGENT_NODE
    }
}
