//! Shared HTTP fetching for the site tools.

use std::time::Duration;
use tracing::debug;
use unidesk_core::error::ToolError;

/// A fetched page: body text plus the media type the server declared.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub content_type: String,
    pub body: String,
}

impl Page {
    pub fn is_html(&self) -> bool {
        self.content_type.is_empty()
            || self.content_type.contains("text/html")
            || self.content_type.contains("application/xhtml")
    }

    pub fn is_plain_text(&self) -> bool {
        self.content_type.starts_with("text/plain")
    }
}

pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("unidesk/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to create HTTP client")
}

/// GET `url` and return the body. Non-2xx statuses are errors.
pub async fn get_page(client: &reqwest::Client, url: &str) -> Result<Page, ToolError> {
    let fail = |reason: String| ToolError::Fetch {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| fail(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(fail(format!("HTTP {status}")));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let body = response.text().await.map_err(|e| fail(e.to_string()))?;
    debug!(url, content_type = %content_type, bytes = body.len(), "Fetched page");

    Ok(Page {
        url: url.to_string(),
        content_type,
        body,
    })
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let joined: String = parts.into_iter().collect();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve `href` against `base`, keeping only http(s) targets.
pub fn resolve_link(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let base = reqwest::Url::parse(base).ok()?;
    let mut resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved.to_string())
}
