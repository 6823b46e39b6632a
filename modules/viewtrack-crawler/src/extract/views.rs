//! View-count extraction strategies, in cascade order. Each strategy is
//! cheap to try and returns `None` rather than guessing; zero counts are
//! treated as a miss so the cascade keeps going.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{json_u64, PageView, ViewsStrategy};
use crate::extract::counts::AbbreviationTable;

static VIEW_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""playCount"\s*:\s*(\d+)"#,
        r#""playCount"\s*:\s*"(\d+)""#,
        r#""play_count"\s*:\s*(\d+)"#,
        r#""viewCount"\s*:\s*"?(\d+)"?"#,
        r#"playCount&quot;:(\d+)"#,
        r#""stats"\s*:\s*\{[^}]*"playCount"\s*:\s*(\d+)"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static VISIBLE_VIEWS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d[\d.,]*\s*[KMB]?)\s*(?:views|plays)\b").unwrap());

/// Hydration-state JSON: `itemStruct.stats.playCount`, with JSON-LD
/// `interactionStatistic` watch counters as a second read.
pub struct EmbeddedJsonViews;

impl ViewsStrategy for EmbeddedJsonViews {
    fn name(&self) -> &'static str {
        "embedded_json"
    }

    fn extract(&self, page: &PageView) -> Option<u64> {
        if let Some(views) = page
            .item_struct()
            .and_then(|item| item.get("stats"))
            .and_then(|stats| stats.get("playCount"))
            .and_then(json_u64)
            .filter(|v| *v > 0)
        {
            return Some(views);
        }
        page.json_ld()
            .iter()
            .find_map(watch_action_count)
            .filter(|v| *v > 0)
    }
}

/// A JSON-LD `InteractionCounter` whose type mentions `WatchAction`.
fn watch_action_count(block: &Value) -> Option<u64> {
    let stats = block.get("interactionStatistic")?.as_array()?;
    stats.iter().find_map(|stat| {
        let counter = stat.get("@type")?.as_str()? == "InteractionCounter";
        let watch = stat
            .get("interactionType")
            .map(|t| t.to_string().contains("WatchAction"))
            .unwrap_or(false);
        (counter && watch)
            .then(|| stat.get("userInteractionCount").and_then(json_u64))
            .flatten()
    })
}

/// Visible counter elements. Selector list tracks what TikTok has shipped;
/// newest markup first.
pub struct DomSelectorViews {
    abbreviations: AbbreviationTable,
}

const VIEW_SELECTORS: [&str; 6] = [
    r#"strong[data-e2e="video-views"]"#,
    r#"[data-e2e="video-views"]"#,
    r#"[data-e2e="browse-video-count"]"#,
    r#"[data-e2e="browse-video-desc"] strong"#,
    ".video-count",
    ".tiktok-1xiuanb-StrongVideoCount",
];

impl DomSelectorViews {
    pub fn new(abbreviations: AbbreviationTable) -> Self {
        Self { abbreviations }
    }
}

impl ViewsStrategy for DomSelectorViews {
    fn name(&self) -> &'static str {
        "dom_selector"
    }

    fn extract(&self, page: &PageView) -> Option<u64> {
        VIEW_SELECTORS
            .iter()
            .filter_map(|sel| page.first_text(sel))
            .find_map(|text| self.abbreviations.parse(&text).filter(|v| *v > 0))
    }
}

/// Raw-markup scan for serialized counts. Last-resort source for pages
/// where the state scripts fail to parse as JSON.
pub struct MarkupRegexViews;

impl ViewsStrategy for MarkupRegexViews {
    fn name(&self) -> &'static str {
        "markup_regex"
    }

    fn extract(&self, page: &PageView) -> Option<u64> {
        VIEW_PATTERNS
            .iter()
            .filter_map(|re| re.captures(page.raw()))
            .find_map(|caps| caps[1].parse().ok().filter(|v| *v > 0))
    }
}

/// Abbreviated counts in visible text ("1.2M views"). The weakest signal,
/// so it runs last.
pub struct VisibleTextViews {
    abbreviations: AbbreviationTable,
}

impl VisibleTextViews {
    pub fn new(abbreviations: AbbreviationTable) -> Self {
        Self { abbreviations }
    }
}

impl ViewsStrategy for VisibleTextViews {
    fn name(&self) -> &'static str {
        "visible_text"
    }

    fn extract(&self, page: &PageView) -> Option<u64> {
        VISIBLE_VIEWS_RE
            .captures_iter(page.visible_text())
            .find_map(|caps| self.abbreviations.parse(&caps[1]).filter(|v| *v > 0))
    }
}
