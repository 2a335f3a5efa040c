//! Fetching linked documents and splitting them into chunks.

use crate::fetch::{self, Page};
use async_trait::async_trait;
use scraper::{Html, Node, Selector};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use unidesk_core::error::ToolError;
use unidesk_core::site::{DocumentChunk, DocumentExtractor};
use unidesk_core::tool::{Tool, ToolContext};

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;

/// Scratch key holding the most recently fetched document.
pub const LAST_DOCUMENT_KEY: &str = "last_document";

/// Split `text` into windows of at most `size` characters, consecutive
/// windows sharing `overlap` characters. A window prefers to end on
/// whitespace when one exists in its second half.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let size = size.max(1);
    let overlap = overlap.min(size - 1);
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + size).min(chars.len());
        if end < chars.len()
            && let Some(ws) = chars[start..end].iter().rposition(|c| c.is_whitespace())
            && ws > size / 2
        {
            end = start + ws;
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Visible text of an HTML page, one line per text run, scripts and
/// styles dropped.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = match Selector::parse("body") {
        Ok(body) => document.select(&body).next(),
        Err(_) => None,
    }
    .unwrap_or_else(|| document.root_element());

    let mut lines = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
        if hidden {
            continue;
        }
        let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

fn page_text(page: &Page) -> Result<String, ToolError> {
    if page.is_plain_text() {
        Ok(page.body.clone())
    } else if page.is_html() {
        Ok(html_to_text(&page.body))
    } else {
        Err(ToolError::Fetch {
            url: page.url.clone(),
            reason: format!("unsupported content type '{}'", page.content_type),
        })
    }
}

/// Downloads HTML or plain-text documents over HTTP.
pub struct HttpDocumentExtractor {
    client: reqwest::Client,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl HttpDocumentExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: fetch::http_client(timeout),
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
        }
    }
}

impl Default for HttpDocumentExtractor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// Wrap split text into chunks tagged with their source.
pub fn into_chunks(text: &str, url: &str, size: usize, overlap: usize) -> Vec<DocumentChunk> {
    chunk_text(text, size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, content)| {
            let mut metadata = Map::new();
            metadata.insert("source_url".into(), Value::String(url.to_string()));
            metadata.insert("chunk_index".into(), Value::from(i));
            DocumentChunk { content, metadata }
        })
        .collect()
}

#[async_trait]
impl DocumentExtractor for HttpDocumentExtractor {
    async fn extract(&self, url: &str) -> Result<Vec<DocumentChunk>, ToolError> {
        let page = fetch::get_page(&self.client, url).await?;
        let text = page_text(&page)?;
        Ok(into_chunks(&text, url, self.chunk_size, self.chunk_overlap))
    }
}

/// `fetch_document`: download a linked document and return its text chunks.
pub struct FetchDocumentTool {
    extractor: Arc<dyn DocumentExtractor>,
}

impl FetchDocumentTool {
    pub fn new(extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Tool for FetchDocumentTool {
    fn name(&self) -> &str {
        "fetch_document"
    }

    fn description(&self) -> &str {
        "Download a document linked from the department website (HTML page or plain \
         text) and return its text split into ordered chunks."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute URL of the document"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: Value, ctx: &mut ToolContext) -> Result<Value, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        let chunks = self.extractor.extract(url).await?;
        info!(url, chunks = chunks.len(), "Fetched document");

        let value = serde_json::json!({
            "url": url,
            "num_chunks": chunks.len(),
            "chunks": chunks,
        });
        ctx.scratch.insert(LAST_DOCUMENT_KEY.into(), value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("Ders kaydı", 1000, 200), vec!["Ders kaydı"]);
        assert!(chunk_text("   ", 1000, 200).is_empty());
        assert!(chunk_text("", 1000, 200).is_empty());
    }

    #[test]
    fn windows_overlap_and_stay_bounded() {
        let text = "abcdefghij".repeat(25);
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert_eq!(chunks[0], text[..100]);
        assert_eq!(chunks[1], text[80..180]);
        assert!(chunks.last().unwrap().ends_with('j'));
    }

    #[test]
    fn windows_prefer_whitespace_boundaries() {
        let text = "kelime ".repeat(40);
        let chunks = chunk_text(&text, 50, 10);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.starts_with(' ') && !chunk.ends_with(' '));
            assert!(chunk.chars().count() <= 50);
        }
    }

    #[test]
    fn multibyte_text_is_split_on_chars() {
        let text = "ğüşıöç".repeat(50);
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn html_text_drops_scripts() {
        let html = r#"<html><head><title>t</title></head><body>
            <script>var x = 1;</script>
            <h2>Staj  Yönergesi</h2>
            <p>Madde 1 - Amaç</p>
            <style>.a{}</style>
        </body></html>"#;
        assert_eq!(html_to_text(html), "Staj Yönergesi\nMadde 1 - Amaç");
    }

    #[test]
    fn unsupported_content_type_is_rejected() {
        let page = Page {
            url: "https://x/form.pdf".into(),
            content_type: "application/pdf".into(),
            body: "%PDF-1.4".into(),
        };
        let err = page_text(&page).unwrap_err();
        assert!(err.to_string().contains("unsupported content type"));
    }

    #[test]
    fn chunks_carry_source_metadata() {
        let chunks = into_chunks("bir iki üç", "https://x/doc", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata["source_url"], "https://x/doc");
        assert_eq!(chunks[0].metadata["chunk_index"], 0);
    }

    struct FixedExtractor;

    #[async_trait]
    impl DocumentExtractor for FixedExtractor {
        async fn extract(&self, url: &str) -> Result<Vec<DocumentChunk>, ToolError> {
            Ok(into_chunks("Yönetmelik metni", url, CHUNK_SIZE, CHUNK_OVERLAP))
        }
    }

    #[tokio::test]
    async fn tool_records_last_document() {
        let tool = FetchDocumentTool::new(Arc::new(FixedExtractor));
        let mut ctx = ToolContext::default();
        let out = tool
            .execute(serde_json::json!({"url": "https://x/yonetmelik"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out["num_chunks"], 1);
        assert_eq!(out["chunks"][0]["content"], "Yönetmelik metni");
        assert_eq!(ctx.scratch[LAST_DOCUMENT_KEY]["url"], "https://x/yonetmelik");

        let err = tool
            .execute(serde_json::json!({"url": "ftp://x"}), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
