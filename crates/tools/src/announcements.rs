//! Department announcements: HTML scraping plus the two tools built on it.
//!
//! The listing lives at `<site>/Duyurular`. Each `.trending-courses-items
//! .item` block carries an `h5 a` title link and a `.meta` line with the
//! publication date as `dd.mm.yyyy`.

use crate::fetch::{self, collapse_whitespace, resolve_link};
use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};
use unidesk_core::error::ToolError;
use unidesk_core::site::{Announcement, AnnouncementDetail, AnnouncementSource, UNKNOWN_DATE};
use unidesk_core::tool::{Tool, ToolContext};

/// Path of the announcement listing, relative to the site root.
pub const LISTING_PATH: &str = "Duyurular";

/// Scratch key holding the most recent announcement list.
pub const LAST_LIST_KEY: &str = "last_announcement_list";

/// Scratch key holding the most recently read announcement.
pub const LAST_DETAIL_KEY: &str = "last_announcement";

/// How far back an announcement listing reaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "1w")]
    Week,
    #[serde(rename = "1m")]
    Month,
    #[serde(rename = "3m")]
    Quarter,
    #[serde(rename = "6m")]
    HalfYear,
    #[serde(rename = "1y")]
    Year,
    #[default]
    #[serde(rename = "all")]
    All,
}

impl TimeRange {
    pub const ALL_RANGES: [TimeRange; 7] = [
        TimeRange::Day,
        TimeRange::Week,
        TimeRange::Month,
        TimeRange::Quarter,
        TimeRange::HalfYear,
        TimeRange::Year,
        TimeRange::All,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Day => "1d",
            TimeRange::Week => "1w",
            TimeRange::Month => "1m",
            TimeRange::Quarter => "3m",
            TimeRange::HalfYear => "6m",
            TimeRange::Year => "1y",
            TimeRange::All => "all",
        }
    }

    /// Length of the window in days; `None` means unbounded.
    pub fn days(self) -> Option<i64> {
        match self {
            TimeRange::Day => Some(1),
            TimeRange::Week => Some(7),
            TimeRange::Month => Some(30),
            TimeRange::Quarter => Some(90),
            TimeRange::HalfYear => Some(180),
            TimeRange::Year => Some(365),
            TimeRange::All => None,
        }
    }
}

impl FromStr for TimeRange {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL_RANGES
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| ToolError::InvalidArguments(format!("unknown time_range '{s}'")))
    }
}

/// Parse a listing date (`dd.mm.yyyy`).
pub fn parse_listing_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%d.%m.%Y").ok()
}

/// Drop announcements dated before `today - range`. Undated or unparseable
/// entries are always kept.
pub fn filter_by_time_range(
    items: Vec<Announcement>,
    range: TimeRange,
    today: NaiveDate,
) -> Vec<Announcement> {
    let Some(days) = range.days() else {
        return items;
    };
    let cutoff = today - chrono::Duration::days(days);
    items
        .into_iter()
        .filter(|a| parse_listing_date(&a.date).is_none_or(|d| d >= cutoff))
        .collect()
}

struct Selectors {
    item: Selector,
    title_link: Selector,
    meta: Selector,
    heading: Selector,
    paragraph: Selector,
    anchor: Selector,
    body: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let parse = |css: &str| Selector::parse(css).expect("static selector is valid");
        Selectors {
            item: parse(".trending-courses-items .item"),
            title_link: parse("h5 a"),
            meta: parse(".meta"),
            heading: parse("h1"),
            paragraph: parse("p"),
            anchor: parse("a[href]"),
            body: parse("body"),
        }
    })
}

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{2}\.\d{2}\.\d{4}").expect("static pattern is valid"))
}

/// First `dd.mm.yyyy` in `text`, or `N/A`.
pub fn find_date(text: &str) -> String {
    date_pattern()
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string())
}

/// Parse the announcement listing page. Items missing a title link, an
/// href, or a meta line are skipped.
pub fn parse_announcement_list(html: &str, list_url: &str) -> Vec<Announcement> {
    let document = Html::parse_document(html);
    let s = selectors();
    let list_url = list_url.trim_end_matches('/');
    let mut announcements = Vec::new();

    for (idx, item) in document.select(&s.item).enumerate() {
        let Some(link) = item.select(&s.title_link).next() else {
            debug!(idx, "Skipping announcement: no title element");
            continue;
        };
        let Some(href) = link
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty())
        else {
            debug!(idx, "Skipping announcement: no link");
            continue;
        };
        let Some(meta) = item.select(&s.meta).next() else {
            debug!(idx, "Skipping announcement: no meta element");
            continue;
        };

        let url = if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            format!("{list_url}/{}", href.trim_start_matches('/'))
        };

        announcements.push(Announcement {
            title: collapse_whitespace(link.text()),
            url,
            date: find_date(&meta.text().collect::<String>()),
        });
    }

    announcements
}

/// Parse one announcement page.
pub fn parse_announcement_detail(html: &str, page_url: &str) -> AnnouncementDetail {
    let document = Html::parse_document(html);
    let s = selectors();

    let title = document
        .select(&s.heading)
        .next()
        .map(|h| collapse_whitespace(h.text()))
        .unwrap_or_default();

    let content = document
        .select(&s.paragraph)
        .map(|p| collapse_whitespace(p.text()))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let page_text = document
        .select(&s.body)
        .next()
        .map(|b| b.text().collect::<String>())
        .unwrap_or_default();

    let mut links: Vec<String> = Vec::new();
    for anchor in document.select(&s.anchor) {
        if let Some(link) = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_link(page_url, href))
            && !links.contains(&link)
        {
            links.push(link);
        }
    }

    AnnouncementDetail {
        title,
        date: find_date(&page_text),
        content,
        links,
    }
}

/// Reads announcements straight from the department's HTML pages.
pub struct HtmlAnnouncementSource {
    client: reqwest::Client,
}

impl HtmlAnnouncementSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: fetch::http_client(timeout),
        }
    }
}

impl Default for HtmlAnnouncementSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl AnnouncementSource for HtmlAnnouncementSource {
    async fn list(&self, site_url: &str) -> Result<Vec<Announcement>, ToolError> {
        let list_url = format!("{}/{LISTING_PATH}", site_url.trim_end_matches('/'));
        let page = fetch::get_page(&self.client, &list_url).await?;
        Ok(parse_announcement_list(&page.body, &list_url))
    }

    async fn detail(&self, url: &str) -> Result<AnnouncementDetail, ToolError> {
        let page = fetch::get_page(&self.client, url).await?;
        Ok(parse_announcement_detail(&page.body, &page.url))
    }
}

/// `list_announcements`: the site's announcements within a time window.
pub struct ListAnnouncementsTool {
    source: Arc<dyn AnnouncementSource>,
}

impl ListAnnouncementsTool {
    pub fn new(source: Arc<dyn AnnouncementSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for ListAnnouncementsTool {
    fn name(&self) -> &str {
        "list_announcements"
    }

    fn description(&self) -> &str {
        "List announcements published on the department website. Each item has a title, \
         url and date (dd.mm.yyyy). Use time_range to limit how far back to look."
    }

    fn parameters_schema(&self) -> Value {
        let ranges: Vec<&str> = TimeRange::ALL_RANGES.iter().map(|r| r.as_str()).collect();
        serde_json::json!({
            "type": "object",
            "properties": {
                "time_range": {
                    "type": "string",
                    "description": "1d, 1w, 1m, 3m, 6m, 1y or all (default all)",
                    "enum": ranges,
                    "default": "all"
                }
            }
        })
    }

    async fn execute(&self, arguments: Value, ctx: &mut ToolContext) -> Result<Value, ToolError> {
        let range = match arguments["time_range"].as_str() {
            Some(raw) => raw.parse()?,
            None => TimeRange::All,
        };

        let all = self.source.list(&ctx.site.url).await?;
        let total = all.len();
        let today = chrono::Local::now().date_naive();
        let announcements = filter_by_time_range(all, range, today);

        info!(
            site = %ctx.site.url,
            time_range = range.as_str(),
            total,
            kept = announcements.len(),
            "Listed announcements"
        );

        let items = serde_json::to_value(&announcements)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;
        ctx.scratch.insert(LAST_LIST_KEY.into(), items.clone());

        Ok(serde_json::json!({
            "time_range": range.as_str(),
            "count": announcements.len(),
            "announcements": items,
        }))
    }
}

/// `get_announcement`: title, date, body text and links of one announcement.
pub struct GetAnnouncementTool {
    source: Arc<dyn AnnouncementSource>,
}

impl GetAnnouncementTool {
    pub fn new(source: Arc<dyn AnnouncementSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for GetAnnouncementTool {
    fn name(&self) -> &str {
        "get_announcement"
    }

    fn description(&self) -> &str {
        "Read a single announcement page. Returns its title, date, text content and \
         the links it contains (e.g. attached documents)."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Announcement URL, as returned by list_announcements"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: Value, ctx: &mut ToolContext) -> Result<Value, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;

        let detail = self.source.detail(url).await?;
        debug!(url, links = detail.links.len(), "Read announcement");

        let mut value = serde_json::to_value(&detail).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("url".into(), Value::String(url.to_string()));
        }
        ctx.scratch.insert(LAST_DETAIL_KEY.into(), value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unidesk_core::tool::SiteContext;

    const LISTING: &str = r#"
        <html><body>
        <div class="trending-courses-items">
          <div class="item">
            <h5><a href="vize-programi-2024">  Vize Sınav
                Programı </a></h5>
            <div class="meta"><span>Yayın: 10.03.2024</span> | Bölüm</div>
          </div>
          <div class="item">
            <h5><a href="staj-basvurulari">Staj Başvuruları</a></h5>
            <div class="meta">Tarih belirtilmemiş</div>
          </div>
          <div class="item">
            <h5>Bağlantısız başlık</h5>
            <div class="meta">01.01.2024</div>
          </div>
          <div class="item">
            <h5><a href="">Boş bağlantı</a></h5>
            <div class="meta">01.01.2024</div>
          </div>
          <div class="item">
            <h5><a href="meta-yok">Meta yok</a></h5>
          </div>
          <div class="item">
            <h5><a href="https://www.bakircay.edu.tr/duyuru/1">Üniversite duyurusu</a></h5>
            <div class="meta">05.01.2023</div>
          </div>
        </div>
        </body></html>
    "#;

    fn announcement(date: &str) -> Announcement {
        Announcement {
            title: format!("Duyuru {date}"),
            url: format!("https://eem.bakircay.edu.tr/Duyurular/{date}"),
            date: date.into(),
        }
    }

    #[test]
    fn listing_is_parsed_and_malformed_items_skipped() {
        let items = parse_announcement_list(LISTING, "https://eem.bakircay.edu.tr/Duyurular");
        assert_eq!(items.len(), 3);

        assert_eq!(items[0].title, "Vize Sınav Programı");
        assert_eq!(
            items[0].url,
            "https://eem.bakircay.edu.tr/Duyurular/vize-programi-2024"
        );
        assert_eq!(items[0].date, "10.03.2024");

        assert_eq!(items[1].title, "Staj Başvuruları");
        assert_eq!(items[1].date, UNKNOWN_DATE);

        assert_eq!(items[2].url, "https://www.bakircay.edu.tr/duyuru/1");
    }

    #[test]
    fn empty_listing_yields_nothing() {
        assert!(parse_announcement_list("<html></html>", "https://x/Duyurular").is_empty());
    }

    #[test]
    fn time_range_parses_and_rejects() {
        assert_eq!("1w".parse::<TimeRange>().unwrap(), TimeRange::Week);
        assert_eq!("all".parse::<TimeRange>().unwrap(), TimeRange::All);
        assert!("2w".parse::<TimeRange>().is_err());
        assert_eq!(TimeRange::default(), TimeRange::All);
        assert_eq!(TimeRange::HalfYear.days(), Some(180));
    }

    #[test]
    fn week_filter_keeps_recent_and_undated() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let items = vec![
            announcement("14.03.2024"),
            announcement("08.03.2024"),
            announcement("01.03.2024"),
            announcement(UNKNOWN_DATE),
        ];

        let kept = filter_by_time_range(items, TimeRange::Week, today);
        let dates: Vec<_> = kept.iter().map(|a| a.date.as_str()).collect();
        assert_eq!(dates, vec!["14.03.2024", "08.03.2024", UNKNOWN_DATE]);
    }

    #[test]
    fn all_range_keeps_everything() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let items = vec![announcement("01.01.2001"), announcement("14.03.2024")];
        assert_eq!(filter_by_time_range(items, TimeRange::All, today).len(), 2);
    }

    #[test]
    fn detail_page_is_parsed() {
        let html = r#"
            <html><body>
              <h1> Yaz Stajı  Duyurusu </h1>
              <div class="meta">12.06.2024</div>
              <p>Staj başvuruları başlamıştır.</p>
              <p>   </p>
              <p>Formlar ekte yer almaktadır.</p>
              <a href="/Dosyalar/staj-formu.pdf">Form</a>
              <a href="/Dosyalar/staj-formu.pdf">Form (tekrar)</a>
              <a href="mailto:eem@bakircay.edu.tr">E-posta</a>
            </body></html>
        "#;
        let detail =
            parse_announcement_detail(html, "https://eem.bakircay.edu.tr/Duyurular/yaz-staji");
        assert_eq!(detail.title, "Yaz Stajı Duyurusu");
        assert_eq!(detail.date, "12.06.2024");
        assert_eq!(
            detail.content,
            "Staj başvuruları başlamıştır.\nFormlar ekte yer almaktadır."
        );
        assert_eq!(
            detail.links,
            vec!["https://eem.bakircay.edu.tr/Dosyalar/staj-formu.pdf"]
        );
    }

    struct FixedSource {
        items: Vec<Announcement>,
    }

    #[async_trait]
    impl AnnouncementSource for FixedSource {
        async fn list(&self, site_url: &str) -> Result<Vec<Announcement>, ToolError> {
            assert_eq!(site_url, "https://eem.bakircay.edu.tr");
            Ok(self.items.clone())
        }

        async fn detail(&self, url: &str) -> Result<AnnouncementDetail, ToolError> {
            Err(ToolError::Fetch {
                url: url.into(),
                reason: "HTTP 404 Not Found".into(),
            })
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(SiteContext {
            url: "https://eem.bakircay.edu.tr".into(),
            school: "Izmir Bakircay Universitesi".into(),
            department: "Elektrik Elektronik Mühendisliği".into(),
        })
    }

    #[tokio::test]
    async fn list_tool_writes_scratch() {
        let tool = ListAnnouncementsTool::new(Arc::new(FixedSource {
            items: vec![announcement(UNKNOWN_DATE), announcement("01.01.2001")],
        }));
        let mut ctx = ctx();

        let out = tool
            .execute(serde_json::json!({"time_range": "1y"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out["time_range"], "1y");
        assert_eq!(out["count"], 1);
        assert_eq!(out["announcements"][0]["date"], UNKNOWN_DATE);
        assert_eq!(ctx.scratch[LAST_LIST_KEY].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn detail_failure_is_an_error() {
        let tool = GetAnnouncementTool::new(Arc::new(FixedSource { items: vec![] }));
        let mut ctx = ctx();
        let err = tool
            .execute(serde_json::json!({"url": "https://x/yok"}), &mut ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(ctx.scratch.is_empty());
    }
}
