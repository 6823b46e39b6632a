//! Page parsing and the extraction cascades.
//!
//! A fetched page is parsed once into a [`PageView`], then every strategy
//! reads from that shared view. View strategies run in fixed order and the
//! first hit wins. The date cascade is independent: a missing publish date
//! never fails an extraction.

pub mod counts;
pub mod dates;
pub mod views;

pub use counts::AbbreviationTable;

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::traits::{FetchError, PageFetcher, VideoExtractor};
use crate::types::{ExtractionFailure, ScrapedStats};

use dates::{EmbeddedJsonDate, MarkupRegexDate, MetaTagDate, RelativeTextDate};
use views::{DomSelectorViews, EmbeddedJsonViews, MarkupRegexViews, VisibleTextViews};

static DIGG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""diggCount"\s*:\s*(\d+)"#).unwrap());
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""commentCount"\s*:\s*(\d+)"#).unwrap());
static SHARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""shareCount"\s*:\s*(\d+)"#).unwrap());

/// Terminal page states worth recognizing in body text.
const UNAVAILABLE_MARKERS: [&str; 4] = [
    "Video currently unavailable",
    "This video is private",
    "This video has been removed",
    "Verify to continue",
];

/// One way of reading a view count off a parsed page.
pub trait ViewsStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, page: &PageView) -> Option<u64>;
}

/// One way of reading a publish date off a parsed page.
pub trait DateStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, page: &PageView, now: DateTime<Utc>) -> Option<NaiveDate>;
}

/// A fetched page, parsed once and shared by every strategy.
///
/// Holds a `scraper::Html` tree, which is not `Send`. A `PageView` is built,
/// read, and dropped inside one synchronous pass; it must never be held
/// across an await point.
pub struct PageView {
    raw: String,
    dom: Html,
    universal: Option<Value>,
    sigi: Option<Value>,
    next_data: Option<Value>,
    json_ld: Vec<Value>,
    visible_text: String,
    title: String,
}

impl PageView {
    pub fn parse(html: &str) -> Self {
        let dom = Html::parse_document(html);
        let universal = script_json(&dom, "script#__UNIVERSAL_DATA_FOR_REHYDRATION__");
        let sigi = script_json(&dom, "script#SIGI_STATE");
        let next_data = script_json(&dom, "script#__NEXT_DATA__");
        let json_ld = ld_blocks(&dom);
        let visible_text = collect_visible_text(&dom);
        let title = first_text_of(&dom, "title").unwrap_or_default();
        Self {
            raw: html.to_string(),
            dom,
            universal,
            sigi,
            next_data,
            json_ld,
            visible_text,
            title,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn visible_text(&self) -> &str {
        &self.visible_text
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn json_ld(&self) -> &[Value] {
        &self.json_ld
    }

    /// The per-video item state, wherever this page build embedded it.
    /// Tries the current hydration script, the legacy SIGI store, then the
    /// old Next.js props, in that order.
    pub fn item_struct(&self) -> Option<&Value> {
        if let Some(item) = self.universal.as_ref().and_then(|v| {
            v.get("__DEFAULT_SCOPE__")?
                .get("webapp.video-detail")?
                .get("itemInfo")?
                .get("itemStruct")
        }) {
            return Some(item);
        }
        if let Some(item) = self
            .sigi
            .as_ref()
            .and_then(|v| v.get("ItemModule")?.as_object()?.values().next())
        {
            return Some(item);
        }
        self.next_data.as_ref().and_then(|v| {
            v.get("props")?
                .get("pageProps")?
                .get("itemInfo")?
                .get("itemStruct")
        })
    }

    /// Trimmed text of the first element matching `selector`.
    pub fn first_text(&self, selector: &str) -> Option<String> {
        first_text_of(&self.dom, selector)
    }

    /// `content` attribute of the first element matching `selector`.
    pub fn meta_content(&self, selector: &str) -> Option<String> {
        let sel = Selector::parse(selector).ok()?;
        let el = self.dom.select(&sel).next()?;
        el.value()
            .attr("content")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Known terminal page states. Retrying these burns pages for nothing.
    pub fn unavailable_marker(&self) -> Option<&'static str> {
        let title = self.title.to_lowercase();
        if title.contains("captcha") || title.contains("verify") {
            return Some("captcha challenge");
        }
        if title.contains("not found") || title.contains("unavailable") {
            return Some("video unavailable");
        }
        UNAVAILABLE_MARKERS
            .iter()
            .find(|marker| self.visible_text.contains(*marker))
            .copied()
    }

    /// Likes, comments, shares. Best effort: embedded state first, then a
    /// raw-markup scan.
    pub fn engagement(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        if let Some(stats) = self.item_struct().and_then(|item| item.get("stats")) {
            let likes = stats.get("diggCount").and_then(json_u64);
            let comments = stats.get("commentCount").and_then(json_u64);
            let shares = stats.get("shareCount").and_then(json_u64);
            if likes.is_some() || comments.is_some() || shares.is_some() {
                return (likes, comments, shares);
            }
        }
        (
            capture_u64(&DIGG_RE, &self.raw),
            capture_u64(&COMMENT_RE, &self.raw),
            capture_u64(&SHARE_RE, &self.raw),
        )
    }
}

/// JSON numbers that some page builds serialize as strings.
pub(crate) fn json_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn capture_u64(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text).and_then(|caps| caps[1].parse().ok())
}

fn script_json(dom: &Html, selector: &str) -> Option<Value> {
    let sel = Selector::parse(selector).ok()?;
    let el = dom.select(&sel).next()?;
    let text: String = el.text().collect();
    serde_json::from_str(&text).ok()
}

fn ld_blocks(dom: &Html) -> Vec<Value> {
    let Ok(sel) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };
    dom.select(&sel)
        .filter_map(|el| {
            let text: String = el.text().collect();
            serde_json::from_str(&text).ok()
        })
        .collect()
}

fn first_text_of(dom: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = dom.select(&sel).next()?;
    let text: String = el.text().collect();
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Text as a viewer would see it: every text node not under a script,
/// style, or noscript element.
fn collect_visible_text(dom: &Html) -> String {
    let mut out = String::new();
    for node in dom.root_element().descendants() {
        if let Some(text) = node.value().as_text() {
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                    .unwrap_or(false)
            });
            if !hidden {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push_str(trimmed);
                    out.push(' ');
                }
            }
        }
    }
    out
}

/// Fetches a video page and runs the extraction cascades over it.
pub struct StatsExtractor {
    fetcher: Arc<dyn PageFetcher>,
    view_strategies: Vec<Box<dyn ViewsStrategy>>,
    date_strategies: Vec<Box<dyn DateStrategy>>,
}

impl StatsExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, abbreviations: AbbreviationTable) -> Self {
        let view_strategies: Vec<Box<dyn ViewsStrategy>> = vec![
            Box::new(EmbeddedJsonViews),
            Box::new(DomSelectorViews::new(abbreviations.clone())),
            Box::new(MarkupRegexViews),
            Box::new(VisibleTextViews::new(abbreviations)),
        ];
        let date_strategies: Vec<Box<dyn DateStrategy>> = vec![
            Box::new(MetaTagDate),
            Box::new(EmbeddedJsonDate),
            Box::new(RelativeTextDate),
            Box::new(MarkupRegexDate),
        ];
        Self {
            fetcher,
            view_strategies,
            date_strategies,
        }
    }

    /// Synchronous so the non-Send DOM tree never crosses an await.
    fn extract_from_html(
        &self,
        html: &str,
        now: DateTime<Utc>,
    ) -> Result<ScrapedStats, ExtractionFailure> {
        let page = PageView::parse(html);

        if let Some(marker) = page.unavailable_marker() {
            return Err(ExtractionFailure::Unavailable(marker.to_string()));
        }

        let mut found = None;
        for strategy in &self.view_strategies {
            if let Some(views) = strategy.extract(&page) {
                debug!(strategy = strategy.name(), views, "View count extracted");
                found = Some((views, strategy.name()));
                break;
            }
        }
        let Some((views, method)) = found else {
            return Err(ExtractionFailure::NoStrategySucceeded);
        };

        let publish_date = self
            .date_strategies
            .iter()
            .find_map(|strategy| strategy.extract(&page, now));
        let (likes, comments, shares) = page.engagement();

        Ok(ScrapedStats {
            views,
            likes,
            comments,
            shares,
            publish_date,
            method,
        })
    }
}

#[async_trait]
impl VideoExtractor for StatsExtractor {
    async fn extract(&self, url: &str) -> Result<ScrapedStats, ExtractionFailure> {
        let html = self.fetcher.fetch(url).await.map_err(|e| match e {
            FetchError::Timeout { timeout_ms } => {
                ExtractionFailure::NavigationTimeout { timeout_ms }
            }
            FetchError::Failed(msg) => ExtractionFailure::Engine(msg),
        })?;

        if html.trim().is_empty() {
            return Err(ExtractionFailure::Engine("empty page".to_string()));
        }

        self.extract_from_html(&html, Utc::now())
    }

    async fn recycle(&self) {
        self.fetcher.recycle().await;
    }
}
