//! Instrumented step wrapper for automatic tracing and metrics.

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use crate::{ConversationState, Delta, Error, ExecutionContext, Result, Step, WorkflowEvent};

/// Wraps a graph node with event emission, metric recording and panic
/// containment.
///
/// For each execution, `InstrumentedStep` emits:
/// - A [`WorkflowEvent::NodeStart`] before the inner step runs
/// - A [`WorkflowEvent::NodeEnd`] with elapsed milliseconds on success
/// - A [`WorkflowEvent::Error`] and failure metric on error
///
/// A panic inside the inner step is reported as [`Error::StepPanicked`].
///
/// # Example
///
/// ```rust
/// use cortex::{ConversationState, ExecutionContext, InstrumentedStep, Message, ProviderConfig, Step};
/// use cortex::step::LambdaStep;
///
/// # tokio_test::block_on(async {
/// let step = LambdaStep::new(|_state: ConversationState| async move {
///     Ok::<_, cortex::Error>(vec![Message::assistant("done")])
/// });
/// let instrumented = InstrumentedStep::new(step, "finish");
///
/// let ctx = ExecutionContext::new(ProviderConfig::default());
/// let delta = instrumented.run(&ctx, &ConversationState::from_user("go")).await.unwrap();
/// assert_eq!(delta.len(), 1);
///
/// let traces = ctx.trace_snapshot();
/// assert_eq!(traces.len(), 2); // NodeStart + NodeEnd
/// # });
/// ```
pub struct InstrumentedStep<S> {
    inner: S,
    name: String,
}

impl<S: Step> InstrumentedStep<S> {
    /// Wrap `inner` with instrumentation, labelling it `name`.
    pub fn new(inner: S, name: impl Into<String>) -> Self {
        Self {
            inner,
            name: name.into(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[async_trait]
impl<S: Step> Step for InstrumentedStep<S> {
    async fn run(&self, ctx: &ExecutionContext, state: &ConversationState) -> Result<Delta> {
        ctx.emit(WorkflowEvent::NodeStart {
            node: self.name.clone(),
            state_len: state.len(),
        });

        let start = Instant::now();
        let result = AssertUnwindSafe(self.inner.run(ctx, state))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(Error::StepPanicked {
                    step_name: self.name.clone(),
                    message: panic_message(payload.as_ref()),
                })
            });
        let duration_ms = start.elapsed().as_millis();

        match &result {
            Ok(delta) => {
                ctx.record_step();
                ctx.emit(WorkflowEvent::NodeEnd {
                    node: self.name.clone(),
                    duration_ms,
                    delta_len: delta.len(),
                });
                tracing::debug!(node = %self.name, duration_ms = %duration_ms, delta_len = delta.len(), "Node completed");
            }
            Err(e) => {
                ctx.record_failure(e.to_string());
                ctx.emit(WorkflowEvent::Error {
                    node: self.name.clone(),
                    message: e.to_string(),
                });
                tracing::error!(node = %self.name, error = %e, "Node failed");
            }
        }

        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}
