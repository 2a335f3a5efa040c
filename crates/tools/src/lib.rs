//! Tools the UniDesk specialists can call.
//!
//! - `list_announcements` / `get_announcement`: the department's
//!   announcement board, scraped from HTML
//! - `fetch_document`: text of a linked document, chunked
//! - `search_regulations`: semantic search over indexed regulations
//!
//! Network access sits behind the [`AnnouncementSource`] and
//! [`DocumentExtractor`] traits so tests can substitute fixed content.

pub mod announcements;
pub mod document;
pub mod fetch;
pub mod regulation_search;

use std::sync::Arc;
use std::time::Duration;
use unidesk_core::site::{AnnouncementSource, DocumentExtractor};
use unidesk_core::tool::ToolRegistry;
use unidesk_memory::Retriever;

pub use announcements::{
    GetAnnouncementTool, HtmlAnnouncementSource, ListAnnouncementsTool, TimeRange,
    filter_by_time_range,
};
pub use document::{FetchDocumentTool, HttpDocumentExtractor, chunk_text};
pub use regulation_search::SearchRegulationsTool;

/// Tools offered to the announcement specialist.
pub const ANNOUNCEMENT_TOOLS: [&str; 3] = ["list_announcements", "get_announcement", "fetch_document"];

/// External collaborators the built-in tools need.
pub struct ToolDeps {
    pub announcements: Arc<dyn AnnouncementSource>,
    pub documents: Arc<dyn DocumentExtractor>,
    pub retriever: Retriever,
    /// Course searched when a call names none
    pub default_course_id: Option<String>,
}

impl ToolDeps {
    /// Live HTTP adapters for the site, over the given retriever.
    pub fn http(retriever: Retriever, fetch_timeout: Duration) -> Self {
        Self {
            announcements: Arc::new(HtmlAnnouncementSource::new(fetch_timeout)),
            documents: Arc::new(HttpDocumentExtractor::new(fetch_timeout)),
            retriever,
            default_course_id: None,
        }
    }
}

/// Create a registry with every built-in tool.
pub fn default_registry(deps: ToolDeps, timeout: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::new().with_timeout(timeout);
    registry.register(Box::new(ListAnnouncementsTool::new(deps.announcements.clone())));
    registry.register(Box::new(GetAnnouncementTool::new(deps.announcements)));
    registry.register(Box::new(FetchDocumentTool::new(deps.documents)));

    let mut search = SearchRegulationsTool::new(deps.retriever);
    if let Some(course) = deps.default_course_id {
        search = search.with_default_course(course);
    }
    registry.register(Box::new(search));
    registry
}
