//! Message domain types.
//!
//! A message is a tagged union: what a user said, what the assistant
//! answered, which tools the assistant asked for, and what those tools
//! returned. Messages are immutable once appended to a session; their order
//! is the only temporal record of a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role a message plays when sent to an LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (prompts)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Prompt instructions. Only used to build LLM requests; sessions never
    /// store them.
    System {
        content: String,
        timestamp: DateTime<Utc>,
    },

    User {
        content: String,
        timestamp: DateTime<Utc>,
    },

    Assistant {
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// The assistant asked for one or more tools to run.
    ToolCall {
        /// Any text the model produced alongside the calls
        #[serde(default)]
        content: String,
        calls: Vec<MessageToolCall>,
        timestamp: DateTime<Utc>,
    },

    /// The outcome of one tool call.
    ToolResult {
        call_id: String,
        name: String,
        content: String,
        timestamp: DateTime<Utc>,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_call(content: impl Into<String>, calls: Vec<MessageToolCall>) -> Self {
        Self::ToolCall {
            content: content.into(),
            calls,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            name: name.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// The role this message maps to on the LLM wire.
    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } | Self::ToolCall { .. } => Role::Assistant,
            Self::ToolResult { .. } => Role::Tool,
        }
    }

    /// The text content of the message.
    pub fn content(&self) -> &str {
        match self {
            Self::System { content, .. }
            | Self::User { content, .. }
            | Self::Assistant { content, .. }
            | Self::ToolCall { content, .. }
            | Self::ToolResult { content, .. } => content,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::System { timestamp, .. }
            | Self::User { timestamp, .. }
            | Self::Assistant { timestamp, .. }
            | Self::ToolCall { timestamp, .. }
            | Self::ToolResult { timestamp, .. } => *timestamp,
        }
    }

    /// Pending tool calls carried by this message (empty for other kinds).
    pub fn tool_calls(&self) -> &[MessageToolCall] {
        match self {
            Self::ToolCall { calls, .. } => calls,
            _ => &[],
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Self::Assistant { .. })
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}
