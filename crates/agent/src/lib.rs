//! Turn execution for UniDesk.
//!
//! A turn flows through three stages:
//!
//! 1. **Route**: a one-shot LLM classifier picks the announcement or the
//!    regulation specialist
//! 2. **Specialize**: the announcement agent runs a tool loop over the
//!    department site; the regulation agent runs a retrieve → generate
//!    pipeline over the course vector store
//! 3. **Stream**: raw execution events are multiplexed into the client
//!    event sequence, always ending in `done`
//!
//! The session is committed once, after the specialist finishes.

pub mod multiplexer;
pub mod orchestrator;
pub mod prompts;
pub mod rag;
pub mod router;
pub mod sink;
pub mod specialist;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use multiplexer::{Multiplexer, multiplex, spawn_pump};
pub use orchestrator::{Orchestrator, RetrievalSettings, TurnRequest};
pub use rag::{RagInput, RagOutcome, RagPipeline};
pub use router::Router;
pub use sink::{EventSink, RawItem};
pub use specialist::ToolAgent;
pub use stream_event::{StreamEvent, ToolOutput};
