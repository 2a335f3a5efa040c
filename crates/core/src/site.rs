//! Department-site content: announcements and linked documents.
//!
//! These traits are the seams between the tools and the network; the HTML
//! and HTTP adapters live in `unidesk-tools`.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder used when an announcement has no recognizable date.
pub const UNKNOWN_DATE: &str = "N/A";

/// One row of the announcement listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub title: String,
    pub url: String,
    /// `dd.mm.yyyy`, or `N/A` when the listing shows no date
    pub date: String,
}

/// A single announcement page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementDetail {
    pub title: String,
    pub date: String,
    pub content: String,
    pub links: Vec<String>,
}

/// A bounded span of a fetched document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    pub metadata: Map<String, Value>,
}

/// Reads announcements from a department website.
#[async_trait]
pub trait AnnouncementSource: Send + Sync {
    /// All announcements listed under `<site_url>/Duyurular`, in page order.
    async fn list(&self, site_url: &str) -> std::result::Result<Vec<Announcement>, ToolError>;

    async fn detail(&self, url: &str) -> std::result::Result<AnnouncementDetail, ToolError>;
}

/// Downloads a document and splits its text into ordered chunks.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> std::result::Result<Vec<DocumentChunk>, ToolError>;
}
