//! Conversation messages and the append-only conversation state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The caller.
    User,
    /// A model reply.
    Assistant,
    /// Notices produced by the workflow itself.
    System,
}

impl Role {
    /// Lowercase wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    /// Create a message with an explicit role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// A message from the caller.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// A model reply.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A workflow notice, e.g. a recovered provider failure.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// The author of this message.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The text of this message.
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// The messages a single step contributes to the conversation.
pub type Delta = Vec<Message>;

/// Ordered conversation history for one workflow run.
///
/// The sequence only grows. Callers can build an initial state and read it;
/// appending deltas is reserved for the workflow engine.
///
/// # Example
///
/// ```rust
/// use cortex::{ConversationState, Message, Role};
///
/// let state = ConversationState::from_user("hello")
///     .with_message(Message::assistant("hi there"));
///
/// assert_eq!(state.len(), 2);
/// assert_eq!(state.last().map(Message::role), Some(Role::Assistant));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    /// Build a state from an existing history.
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Build a state holding a single user message.
    pub fn from_user(content: impl Into<String>) -> Self {
        Self::new(vec![Message::user(content)])
    }

    /// Return this state with one more message at the end.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The most recent assistant or system message.
    pub fn last_reply(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role() != Role::User)
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the state holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Consume the state, returning its messages.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub(crate) fn append(&mut self, delta: Delta) {
        self.messages.extend(delta);
    }
}

impl From<Vec<Message>> for ConversationState {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}
