//! Raw execution events produced while a turn runs.
//!
//! The orchestrator emits these in the order things happen; the stream
//! multiplexer turns them into client-facing events. Errors travel in the
//! same channel as `Err(TurnError)` items.

use crate::error::{ProviderError, SessionError};
use crate::message::Message;
use serde_json::Value;
use thiserror::Error;

/// Node name of the router step.
pub const ROUTER_NODE: &str = "router";

/// Node names of the RAG pipeline stages.
pub const RETRIEVE_NODE: &str = "retrieve";
pub const GENERATE_NODE: &str = "generate";

/// Node name used for tool execution inside a specialist loop.
pub const TOOLS_NODE: &str = "tools";

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    /// Free-form payload written by a node (the router's decision, for one)
    Custom { node: String, payload: Value },

    /// A complete message produced by a node
    Message { node: String, message: Message },

    /// A streamed fragment of assistant text
    Delta { node: String, content: String },

    /// A node ran to completion
    NodeFinished { node: String },
}

impl ExecutionEvent {
    pub fn node(&self) -> &str {
        match self {
            Self::Custom { node, .. }
            | Self::Message { node, .. }
            | Self::Delta { node, .. }
            | Self::NodeFinished { node } => node,
        }
    }
}

/// A failure that ends a turn early.
#[derive(Debug, Clone, Error)]
pub enum TurnError {
    #[error("Session store failed: {0}")]
    Session(#[from] SessionError),

    #[error("LLM call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Turn cancelled: event sink closed")]
    Cancelled,

    #[error("Turn aborted: {0}")]
    Internal(String),
}
