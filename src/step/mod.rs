//! Core step trait and fundamental step types.
//!
//! This module defines the [`Step`] trait, the unit of work behind every
//! workflow graph node, along with [`LambdaStep`] for closure-based steps and
//! the provider-backed [`AgentStep`].

use async_trait::async_trait;
use std::future::Future;

use crate::{ConversationState, Delta, ExecutionContext, Result};

pub mod agent;

pub use agent::AgentStep;

/// A named unit of work in a workflow graph.
///
/// A step reads the current conversation and returns the messages it wants
/// appended. It never edits the state itself. Returning `Err` means the step
/// is broken and aborts the run; anticipated external failures should be
/// returned as messages instead.
///
/// # Example
///
/// ```rust
/// use cortex::{ConversationState, ExecutionContext, Message, ProviderConfig, Step};
/// use cortex::step::LambdaStep;
///
/// # tokio_test::block_on(async {
/// let echo = LambdaStep::new(|state: ConversationState| async move {
///     let last = state.last().map(|m| m.content().to_string()).unwrap_or_default();
///     Ok::<_, cortex::Error>(vec![Message::assistant(last)])
/// });
///
/// let ctx = ExecutionContext::new(ProviderConfig::default());
/// let delta = echo.run(&ctx, &ConversationState::from_user("ping")).await.unwrap();
/// assert_eq!(delta, vec![Message::assistant("ping")]);
/// # });
/// ```
#[async_trait]
pub trait Step: Send + Sync {
    /// Execute this step against the conversation so far.
    async fn run(&self, ctx: &ExecutionContext, state: &ConversationState) -> Result<Delta>;

    /// Returns a human-readable name for this step. Defaults to the type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A step constructed from a closure over a snapshot of the state.
///
/// Handy for lightweight nodes such as retrieval or critique passes that do
/// not need their own type.
pub struct LambdaStep<F> {
    f: F,
}

impl<F, Fut> LambdaStep<F>
where
    F: Fn(ConversationState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Delta>> + Send + 'static,
{
    /// Create a new `LambdaStep` from the given closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Step for LambdaStep<F>
where
    F: Fn(ConversationState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Delta>> + Send + 'static,
{
    async fn run(&self, _ctx: &ExecutionContext, state: &ConversationState) -> Result<Delta> {
        (self.f)(state.clone()).await
    }
}

// Boxed steps are what the graph stores.
#[async_trait]
impl Step for Box<dyn Step> {
    async fn run(&self, ctx: &ExecutionContext, state: &ConversationState) -> Result<Delta> {
        (**self).run(ctx, state).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
