//! # UniDesk Core
//!
//! Domain types, traits, and error definitions for the UniDesk assistant.
//! This crate has no I/O of its own: it defines the model that the
//! provider, memory, tool and agent crates implement against.
//!
//! Every external collaborator (LLM, vector store, embedder, session
//! store, tool) is a trait here so implementations can be swapped by
//! configuration and replaced by scripted fakes in tests.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod session;
pub mod site;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, RetrievalError, SessionError, ToolError};
pub use event::{ExecutionEvent, TurnError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use retrieval::{Document, Embedder, MetadataFilter, RetrievedChunk, VectorStore};
pub use session::{AgentId, RoutingDecision, Session, SessionStore};
pub use site::{Announcement, AnnouncementDetail, AnnouncementSource, DocumentChunk, DocumentExtractor};
pub use tool::{SiteContext, Tool, ToolCall, ToolContext, ToolRegistry, ToolResult};
