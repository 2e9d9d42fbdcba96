//! The workflow engine.

use std::sync::Arc;
use tracing::Instrument;

use crate::graph::{GraphError, Next, WorkflowGraph};
use crate::provider::{CompletionProvider, ProviderConfig};
use crate::{ConversationState, Error, ExecutionContext, Result, Role, WorkflowMetrics};

/// Runs a [`WorkflowGraph`] over a conversation.
///
/// Build one at startup and share it (`Arc<Workflow>`) across requests. Each
/// call to [`run`](Workflow::run) gets its own [`ExecutionContext`], so
/// concurrent runs never see each other's state or credentials.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use cortex::{
///     Completion, CompletionProvider, ConversationState, Message, ProviderConfig,
///     ProviderError, Usage, Workflow,
/// };
///
/// struct Calculator;
///
/// #[async_trait]
/// impl CompletionProvider for Calculator {
///     async fn complete(
///         &self,
///         _config: &ProviderConfig,
///         _messages: &[Message],
///     ) -> Result<Completion, ProviderError> {
///         Ok(Completion { message: Message::assistant("4"), usage: Usage::default() })
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let workflow = Workflow::agent(Arc::new(Calculator)).unwrap();
///
/// let state = workflow
///     .run(ConversationState::from_user("2+2?"), ProviderConfig::new("openai", "sk-test"))
///     .await
///     .unwrap();
///
/// assert_eq!(state.len(), 2);
/// assert_eq!(state.last(), Some(&Message::assistant("4")));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Workflow {
    graph: Arc<WorkflowGraph>,
    name: String,
}

impl Workflow {
    /// Create a workflow over a validated graph.
    pub fn new(graph: WorkflowGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            name: "workflow".to_string(),
        }
    }

    /// The standard chat workflow: a single agent node backed by `provider`.
    pub fn agent(provider: Arc<dyn CompletionProvider>) -> Result<Self> {
        Ok(Self::new(WorkflowGraph::agent(provider)?).with_name("chat"))
    }

    /// Set a human-readable name for this workflow.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the name of this workflow.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The graph this workflow executes.
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Run the graph from its entry node until it reaches the terminal.
    ///
    /// `config` lives only as long as the run. Provider failures come back as
    /// system messages in the returned state; `Err` means the workflow itself
    /// is broken.
    pub async fn run(
        &self,
        initial: ConversationState,
        config: ProviderConfig,
    ) -> Result<ConversationState> {
        let ctx = ExecutionContext::new(config);
        self.run_with_ctx(&ctx, initial).await
    }

    /// Run the workflow, returning the final state along with the collected metrics.
    pub async fn run_with_metrics(
        &self,
        initial: ConversationState,
        config: ProviderConfig,
    ) -> Result<(ConversationState, WorkflowMetrics)> {
        let ctx = ExecutionContext::new(config);
        let state = self.run_with_ctx(&ctx, initial).await?;
        Ok((state, ctx.snapshot()))
    }

    /// Run the workflow with a caller-provided execution context.
    ///
    /// Useful when the caller wants the trace log as well as the result.
    pub async fn run_with_ctx(
        &self,
        ctx: &ExecutionContext,
        initial: ConversationState,
    ) -> Result<ConversationState> {
        match initial.last() {
            None => return Err(Error::Validation("conversation is empty".to_string())),
            Some(last) if last.role() != Role::User => {
                return Err(Error::Validation(format!(
                    "conversation must end with a user message, found '{}'",
                    last.role()
                )))
            }
            Some(_) => {}
        }

        let span = tracing::info_span!(
            "workflow",
            name = %self.name,
            provider = %ctx.provider_config().provider
        );
        self.dispatch(ctx, initial).instrument(span).await
    }

    async fn dispatch(
        &self,
        ctx: &ExecutionContext,
        mut state: ConversationState,
    ) -> Result<ConversationState> {
        let limit = self.graph.len();
        let initial_len = state.len();
        let mut current = self.graph.entry();

        for _ in 0..limit {
            let node = self
                .graph
                .node(current)
                .ok_or_else(|| GraphError::UnknownNode(current.to_string()))?;

            let delta = node.run(ctx, &state).await?;
            state.append(delta);

            match self
                .graph
                .successor(current)
                .ok_or_else(|| GraphError::MissingEdge(current.to_string()))?
            {
                Next::Terminal => {
                    tracing::info!(
                        added = state.len() - initial_len,
                        total = state.len(),
                        "Workflow reached terminal"
                    );
                    return Ok(state);
                }
                Next::Node(next) => current = next.as_str(),
            }
        }

        Err(Error::StepLimit { limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::END;
    use crate::provider::{Completion, ProviderAdapter, ProviderError, ProviderSettings, Usage};
    use crate::step::{AgentStep, LambdaStep};
    use crate::{Message, WorkflowEvent};
    use async_trait::async_trait;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies with a fixed outcome and counts calls.
    struct ScriptedProvider {
        outcome: std::result::Result<String, ProviderError>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: ProviderError) -> Arc<Self> {
            Arc::new(Self {
                outcome: Err(err),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(
            &self,
            _config: &ProviderConfig,
            messages: &[Message],
        ) -> std::result::Result<Completion, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(messages.to_vec());
            self.outcome.clone().map(|text| Completion {
                message: Message::assistant(text),
                usage: Usage {
                    prompt_tokens: 7,
                    completion_tokens: 1,
                },
            })
        }
    }

    /// Echoes the credential back so tests can check run isolation.
    struct CredentialEcho;

    #[async_trait]
    impl CompletionProvider for CredentialEcho {
        async fn complete(
            &self,
            config: &ProviderConfig,
            _messages: &[Message],
        ) -> std::result::Result<Completion, ProviderError> {
            tokio::task::yield_now().await;
            Ok(Completion {
                message: Message::assistant(config.credential.expose()),
                usage: Usage::default(),
            })
        }
    }

    fn key(k: &str) -> ProviderConfig {
        ProviderConfig::new("openai", k)
    }

    #[tokio::test]
    async fn test_successful_reply_is_appended() {
        let provider = ScriptedProvider::replying("4");
        let workflow = Workflow::agent(provider.clone()).unwrap();

        let state = workflow
            .run(ConversationState::from_user("2+2?"), key("sk-test"))
            .await
            .unwrap();

        assert_eq!(state.len(), 2);
        assert_eq!(state.messages()[0], Message::user("2+2?"));
        assert_eq!(state.last(), Some(&Message::assistant("4")));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_full_history_is_sent_in_order() {
        let provider = ScriptedProvider::replying("ok");
        let workflow = Workflow::agent(provider.clone()).unwrap();
        let history = ConversationState::new(vec![
            Message::system("be brief"),
            Message::user("one"),
            Message::assistant("two"),
            Message::user("three"),
        ]);

        let state = workflow.run(history.clone(), key("k")).await.unwrap();

        assert_eq!(&state.messages()[..4], history.messages());
        assert_eq!(provider.seen.lock().unwrap()[0], history.messages());
    }

    #[tokio::test]
    async fn test_missing_credential_without_network() {
        // Real adapter pointed at a closed port: a network attempt would fail differently.
        let settings = ProviderSettings {
            openai: crate::provider::Endpoint::new("http://127.0.0.1:9", "gpt-test"),
            ..ProviderSettings::default()
        };
        let adapter = ProviderAdapter::new(settings).unwrap();
        let workflow = Workflow::agent(Arc::new(adapter)).unwrap();

        let state = workflow
            .run(ConversationState::from_user("hello"), key(""))
            .await
            .unwrap();

        assert_eq!(state.len(), 2);
        assert_eq!(state.last(), Some(&Message::system("Error: API Key missing")));
    }

    #[tokio::test]
    async fn test_missing_credential_notice_from_double() {
        let provider = ScriptedProvider::failing(ProviderError::MissingCredential);
        let workflow = Workflow::agent(provider).unwrap();

        let (state, metrics) = workflow
            .run_with_metrics(ConversationState::from_user("hello"), key(""))
            .await
            .unwrap();

        let last = state.last().unwrap();
        assert_eq!(last.role(), Role::System);
        assert_eq!(last.content(), "Error: API Key missing");
        assert_eq!(metrics.failures, vec!["API Key missing".to_string()]);
        assert_eq!(metrics.steps_completed, 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_recovered() {
        let provider = ScriptedProvider::failing(ProviderError::call_failed(
            "Connection failed: connection refused",
        ));
        let workflow = Workflow::agent(provider).unwrap();
        let ctx = ExecutionContext::new(key("sk-test"));

        let state = workflow
            .run_with_ctx(&ctx, ConversationState::from_user("hi"))
            .await
            .unwrap();

        let last = state.last().unwrap();
        assert_eq!(last.role(), Role::System);
        assert!(last.content().starts_with("Error:"));
        assert!(last.content().contains("connection refused"));

        let failures: Vec<_> = ctx
            .trace_snapshot()
            .into_iter()
            .filter(|t| matches!(t.event, WorkflowEvent::ProviderFailure { .. }))
            .collect();
        assert_eq!(failures.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_provider_notice() {
        let provider = ScriptedProvider::failing(ProviderError::UnknownProvider("x".into()));
        let workflow = Workflow::agent(provider).unwrap();

        let state = workflow
            .run(ConversationState::from_user("hi"), ProviderConfig::new("x", "k"))
            .await
            .unwrap();
        assert_eq!(
            state.last(),
            Some(&Message::system("Error: Unknown provider 'x'"))
        );
    }

    #[tokio::test]
    async fn test_multi_node_deltas_merge_in_order() {
        let provider = ScriptedProvider::replying("answer");
        let retrieve = LambdaStep::new(|_state: ConversationState| async move {
            Ok::<_, Error>(vec![
                Message::system("context: a"),
                Message::system("context: b"),
            ])
        });
        let critique = LambdaStep::new(|state: ConversationState| async move {
            let n = state.len();
            Ok::<_, Error>(vec![Message::system(format!("reviewed {n} messages"))])
        });
        let graph = WorkflowGraph::builder()
            .node("retrieve", retrieve)
            .node("agent", AgentStep::new(provider.clone()))
            .node("critique", critique)
            .entry("retrieve")
            .edge("retrieve", "agent")
            .edge("agent", "critique")
            .edge("critique", END)
            .build()
            .unwrap();
        let workflow = Workflow::new(graph);

        let (state, metrics) = workflow
            .run_with_metrics(ConversationState::from_user("q"), key("k"))
            .await
            .unwrap();

        let contents: Vec<&str> = state.messages().iter().map(Message::content).collect();
        assert_eq!(
            contents,
            ["q", "context: a", "context: b", "answer", "reviewed 4 messages"]
        );
        // The agent saw the retrieval delta.
        assert_eq!(provider.seen.lock().unwrap()[0].len(), 3);
        assert_eq!(metrics.steps_completed, 3);
        assert_eq!(metrics.provider_calls, 1);
        assert_eq!(metrics.total_tokens(), 8);
    }

    #[tokio::test]
    async fn test_step_error_is_a_fault() {
        let broken = LambdaStep::new(|_state: ConversationState| async move {
            Err::<crate::Delta, _>(Error::execution("broken", "bad state"))
        });
        let graph = WorkflowGraph::builder()
            .node("broken", broken)
            .entry("broken")
            .edge("broken", END)
            .build()
            .unwrap();

        let err = Workflow::new(graph)
            .run(ConversationState::from_user("q"), key("k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
    }

    #[tokio::test]
    async fn test_step_panic_is_a_fault() {
        let panicking = LambdaStep::new(|_state: ConversationState| async move {
            if true {
                panic!("step defect");
            }
            Ok::<crate::Delta, Error>(Vec::new())
        });
        let graph = WorkflowGraph::builder()
            .node("defect", panicking)
            .entry("defect")
            .edge("defect", END)
            .build()
            .unwrap();

        let err = Workflow::new(graph)
            .run(ConversationState::from_user("q"), key("k"))
            .await
            .unwrap_err();
        match err {
            Error::StepPanicked { step_name, message } => {
                assert_eq!(step_name, "defect");
                assert_eq!(message, "step defect");
            }
            other => panic!("expected StepPanicked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_initial_state_must_end_with_user() {
        let workflow = Workflow::agent(ScriptedProvider::replying("x")).unwrap();

        let err = workflow
            .run(ConversationState::default(), key("k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = workflow
            .run(
                ConversationState::new(vec![Message::user("q"), Message::assistant("a")]),
                key("k"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let workflow = Arc::new(Workflow::agent(Arc::new(CredentialEcho)).unwrap());

        let runs = (0..16).map(|i| {
            let workflow = Arc::clone(&workflow);
            async move {
                let state = workflow
                    .run(ConversationState::from_user("who am i"), key(&format!("key-{i}")))
                    .await
                    .unwrap();
                (i, state)
            }
        });

        for (i, state) in join_all(runs).await {
            assert_eq!(state.len(), 2);
            assert_eq!(state.last().unwrap().content(), format!("key-{i}"));
        }
    }

    #[tokio::test]
    async fn test_repeated_runs_share_no_state() {
        let provider = ScriptedProvider::replying("same");
        let workflow = Workflow::agent(provider.clone()).unwrap();

        let first = workflow
            .run(ConversationState::from_user("a"), key("k"))
            .await
            .unwrap();
        let second = workflow
            .run(ConversationState::from_user("a"), key("k"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls(), 2);
        assert_eq!(provider.seen.lock().unwrap()[1].len(), 1);
    }
}
