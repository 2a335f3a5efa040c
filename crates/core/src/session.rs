//! Session domain types and the SessionStore trait.
//!
//! A session is the persisted state of one conversation thread: the
//! append-only message history, every routing decision taken for it, and a
//! scratch map where tools leave their last artifacts.

use crate::error::SessionError;
use crate::message::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The specialist agents a turn can be routed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    #[default]
    #[serde(rename = "announcement_agent")]
    Announcement,
    #[serde(rename = "regulation_agent")]
    Regulation,
}

impl AgentId {
    /// Match order for classifier output: regulation first.
    pub const ALL: [AgentId; 2] = [AgentId::Regulation, AgentId::Announcement];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Announcement => "announcement_agent",
            Self::Regulation => "regulation_agent",
        }
    }

    /// Upper-case keywords that select this agent in classifier output.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Announcement => &["ANNOUNCEMENT"],
            Self::Regulation => &["YONETMELIK", "REGULATION"],
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a turn went to a given specialist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub selected_agent: AgentId,
    /// Classifier output as received, empty when the call failed
    pub raw_output: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl RoutingDecision {
    pub fn new(
        selected_agent: AgentId,
        raw_output: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            selected_agent,
            raw_output: raw_output.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The persisted state of one conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub thread_id: String,

    #[serde(rename = "conversation_history")]
    history: Vec<Message>,

    #[serde(default)]
    pub routing_history: Vec<RoutingDecision>,

    #[serde(default)]
    pub scratch: Map<String, Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            history: Vec::new(),
            routing_history: Vec::new(),
            scratch: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message. System prompts are never stored.
    pub fn append(&mut self, message: Message) {
        if matches!(message, Message::System { .. }) {
            return;
        }
        self.history.push(message);
        self.updated_at = Utc::now();
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Text of the most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(Message::content)
    }

    pub fn record_routing(&mut self, decision: RoutingDecision) {
        self.routing_history.push(decision);
        self.updated_at = Utc::now();
    }

    /// Merge tool artifacts into the scratch map, overwriting older values.
    pub fn merge_scratch(&mut self, scratch: Map<String, Value>) {
        if scratch.is_empty() {
            return;
        }
        self.scratch.extend(scratch);
        self.updated_at = Utc::now();
    }
}

/// Persistent storage for sessions, keyed by thread id.
///
/// Implementations must be safe for concurrent use across threads and
/// read-after-write consistent per thread id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, thread_id: &str) -> std::result::Result<Option<Session>, SessionError>;

    /// Store `session` under its own `thread_id`, replacing any previous value.
    async fn put(&self, session: &Session) -> std::result::Result<(), SessionError>;
}
