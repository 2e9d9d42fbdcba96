//! Static workflow graphs.
//!
//! A [`WorkflowGraph`] is a set of named steps, an entry node, and exactly one
//! outgoing edge per node pointing either at another node or at [`END`]. It is
//! validated once by [`GraphBuilder::build`] and never changes afterwards, so
//! the engine can rely on every run reaching the terminal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::instrumented::InstrumentedStep;
use crate::provider::CompletionProvider;
use crate::step::agent::{AgentStep, AGENT_NODE};
use crate::step::Step;

/// Edge target naming the terminal state.
pub const END: &str = "__end__";

/// Where control goes after a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Run another node.
    Node(String),
    /// Stop and return the accumulated state.
    Terminal,
}

/// Reasons a graph definition is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph has no nodes")]
    Empty,
    #[error("graph has no entry node")]
    MissingEntry,
    #[error("entry node '{0}' does not exist")]
    UnknownEntry(String),
    #[error("node '{0}' is defined more than once")]
    DuplicateNode(String),
    #[error("'{0}' is reserved for the terminal and cannot name a node")]
    ReservedName(String),
    #[error("edge starts at unknown node '{0}'")]
    UnknownSource(String),
    #[error("node '{0}' has more than one outgoing edge")]
    DuplicateEdge(String),
    #[error("edge from '{from}' points at unknown node '{to}'")]
    UnknownTarget { from: String, to: String },
    #[error("node '{0}' has no outgoing edge")]
    MissingEdge(String),
    #[error("node '{0}' is not reachable from the entry")]
    Unreachable(String),
    #[error("cycle detected at node '{0}'; the terminal is never reached")]
    Cycle(String),
    #[error("node '{0}' does not exist")]
    UnknownNode(String),
}

/// An immutable, validated workflow graph.
pub struct WorkflowGraph {
    nodes: HashMap<String, InstrumentedStep<Box<dyn Step>>>,
    edges: HashMap<String, Next>,
    entry: String,
    order: Vec<String>,
}

impl WorkflowGraph {
    /// Start defining a graph.
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// The standard single-node graph: `agent -> END`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use cortex::{Next, ProviderAdapter, ProviderSettings, WorkflowGraph};
    ///
    /// let adapter = ProviderAdapter::new(ProviderSettings::default()).unwrap();
    /// let graph = WorkflowGraph::agent(Arc::new(adapter)).unwrap();
    ///
    /// assert_eq!(graph.entry(), "agent");
    /// assert_eq!(graph.successor("agent"), Some(&Next::Terminal));
    /// ```
    pub fn agent(provider: Arc<dyn CompletionProvider>) -> Result<Self, GraphError> {
        Self::builder()
            .node(AGENT_NODE, AgentStep::new(provider))
            .entry(AGENT_NODE)
            .edge(AGENT_NODE, END)
            .build()
    }

    /// Name of the first node to run.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// The step registered under `name`.
    pub fn node(&self, name: &str) -> Option<&(dyn Step + 'static)> {
        self.nodes.get(name).map(|s| s as &(dyn Step + 'static))
    }

    /// The node that follows `name`.
    pub fn successor(&self, name: &str) -> Option<&Next> {
        self.edges.get(name)
    }

    /// Node names in the order they were added.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a built graph.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("entry", &self.entry)
            .field("nodes", &self.order)
            .field("edges", &self.edges)
            .finish()
    }
}

/// Collects nodes and edges, then validates them into a [`WorkflowGraph`].
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<(String, Box<dyn Step>)>,
    edges: Vec<(String, String)>,
    entry: Option<String>,
}

impl GraphBuilder {
    /// Register `step` under `name`.
    #[must_use]
    pub fn node(mut self, name: impl Into<String>, step: impl Step + 'static) -> Self {
        self.nodes.push((name.into(), Box::new(step)));
        self
    }

    /// Set the node a run starts at.
    #[must_use]
    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Add the outgoing edge of `from`. Use [`END`] to finish the run.
    #[must_use]
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Validate the definition.
    pub fn build(self) -> Result<WorkflowGraph, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut nodes = HashMap::with_capacity(self.nodes.len());
        for (name, step) in self.nodes {
            if name == END {
                return Err(GraphError::ReservedName(name));
            }
            if nodes.contains_key(&name) {
                return Err(GraphError::DuplicateNode(name));
            }
            order.push(name.clone());
            nodes.insert(name.clone(), InstrumentedStep::new(step, name));
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !nodes.contains_key(&entry) {
            return Err(GraphError::UnknownEntry(entry));
        }

        let mut edges = HashMap::with_capacity(self.edges.len());
        for (from, to) in self.edges {
            if !nodes.contains_key(&from) {
                return Err(GraphError::UnknownSource(from));
            }
            if edges.contains_key(&from) {
                return Err(GraphError::DuplicateEdge(from));
            }
            let next = if to == END {
                Next::Terminal
            } else if nodes.contains_key(&to) {
                Next::Node(to)
            } else {
                return Err(GraphError::UnknownTarget { from, to });
            };
            edges.insert(from, next);
        }

        if let Some(name) = order.iter().find(|n| !edges.contains_key(*n)) {
            return Err(GraphError::MissingEdge(name.clone()));
        }

        // Each node has one successor, so the reachable set is a single path.
        let mut visited = HashSet::new();
        let mut current = entry.as_str();
        loop {
            if !visited.insert(current) {
                return Err(GraphError::Cycle(current.to_string()));
            }
            match &edges[current] {
                Next::Terminal => break,
                Next::Node(next) => current = next.as_str(),
            }
        }
        if let Some(name) = order.iter().find(|n| !visited.contains(n.as_str())) {
            return Err(GraphError::Unreachable(name.clone()));
        }

        Ok(WorkflowGraph {
            nodes,
            edges,
            entry,
            order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::LambdaStep;
    use crate::{ConversationState, Message};

    fn noop() -> impl Step + 'static {
        LambdaStep::new(|_state: ConversationState| async move {
            Ok::<_, crate::Error>(vec![Message::system("noop")])
        })
    }

    #[test]
    fn test_linear_graph_builds() {
        let graph = WorkflowGraph::builder()
            .node("retrieve", noop())
            .node("agent", noop())
            .entry("retrieve")
            .edge("retrieve", "agent")
            .edge("agent", END)
            .build()
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.entry(), "retrieve");
        assert_eq!(graph.successor("retrieve"), Some(&Next::Node("agent".to_string())));
        assert_eq!(graph.successor("agent"), Some(&Next::Terminal));
        assert_eq!(graph.node_names().collect::<Vec<_>>(), ["retrieve", "agent"]);
        assert_eq!(graph.node("agent").map(|s| s.name()), Some("agent"));
    }

    #[test]
    fn test_empty_and_entry_errors() {
        assert_eq!(GraphBuilder::default().build().unwrap_err(), GraphError::Empty);

        let err = WorkflowGraph::builder()
            .node("a", noop())
            .edge("a", END)
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::MissingEntry);

        let err = WorkflowGraph::builder()
            .node("a", noop())
            .entry("b")
            .edge("a", END)
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownEntry("b".to_string()));
    }

    #[test]
    fn test_node_name_errors() {
        let err = WorkflowGraph::builder()
            .node("a", noop())
            .node("a", noop())
            .entry("a")
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("a".to_string()));

        let err = WorkflowGraph::builder()
            .node(END, noop())
            .entry(END)
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::ReservedName(END.to_string()));
    }

    #[test]
    fn test_edge_errors() {
        let err = WorkflowGraph::builder()
            .node("a", noop())
            .entry("a")
            .edge("ghost", END)
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownSource("ghost".to_string()));

        let err = WorkflowGraph::builder()
            .node("a", noop())
            .entry("a")
            .edge("a", "b")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownTarget {
                from: "a".to_string(),
                to: "b".to_string()
            }
        );

        let err = WorkflowGraph::builder()
            .node("a", noop())
            .entry("a")
            .edge("a", END)
            .edge("a", END)
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateEdge("a".to_string()));

        let err = WorkflowGraph::builder()
            .node("a", noop())
            .node("b", noop())
            .entry("a")
            .edge("a", "b")
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::MissingEdge("b".to_string()));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = WorkflowGraph::builder()
            .node("a", noop())
            .node("b", noop())
            .entry("a")
            .edge("a", "b")
            .edge("b", "a")
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::Cycle("a".to_string()));
    }

    #[test]
    fn test_unreachable_node_is_rejected() {
        let err = WorkflowGraph::builder()
            .node("a", noop())
            .node("orphan", noop())
            .entry("a")
            .edge("a", END)
            .edge("orphan", END)
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::Unreachable("orphan".to_string()));
    }
}
