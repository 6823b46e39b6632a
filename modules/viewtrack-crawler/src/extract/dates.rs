//! Publish-date extraction. Independent of the view-count cascade: a missing
//! date never fails an extraction, it just leaves the column blank.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;

use super::{DateStrategy, PageView};

static CREATE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""createTime"\s*:\s*"?(\d{10,13})"?"#).unwrap());
static LONG_RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*(second|minute|hour|day|week|month|year)s?\s+ago\b").unwrap()
});
static SHORT_RELATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s*(mo|[smhdwy])\s*ago\b").unwrap());

/// Publish dates outside this range are scraped noise, not real uploads.
fn in_sane_range(date: NaiveDate) -> bool {
    (2016..=2030).contains(&date.year())
}

/// Interpret a numeric timestamp as a publish date.
/// Values above 9_999_999_999 are milliseconds.
pub fn parse_epoch_date(epoch: i64) -> Option<NaiveDate> {
    let secs = if epoch > 9_999_999_999 { epoch / 1000 } else { epoch };
    let date = Utc.timestamp_opt(secs, 0).single()?.date_naive();
    in_sane_range(date).then_some(date)
}

/// Parse an ISO-ish date string: RFC 3339, `YYYY-MM-DD`, `YYYY/MM/DD`,
/// or `YYYY-MM-DD HH:MM:SS` without a zone.
pub fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let date = if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        Some(dt.date_naive())
    } else if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        Some(dt.date())
    } else {
        ["%Y-%m-%d", "%Y/%m/%d"]
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
    }?;
    in_sane_range(date).then_some(date)
}

/// Resolve relative display text ("3 days ago", "2w ago", "yesterday")
/// against `now`. Compact single-letter units are what TikTok renders;
/// the spelled-out forms cover localized mirrors that expand them.
pub fn parse_relative_date(text: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    let today = now.date_naive();

    let (count, unit) = if let Some(caps) = LONG_RELATIVE_RE.captures(text) {
        let count: u32 = caps[1].parse().ok()?;
        (count, caps[2].to_lowercase())
    } else if let Some(caps) = SHORT_RELATIVE_RE.captures(text) {
        let count: u32 = caps[1].parse().ok()?;
        let unit = match &caps[2].to_lowercase()[..] {
            "s" => "second",
            "m" => "minute",
            "h" => "hour",
            "d" => "day",
            "w" => "week",
            "mo" => "month",
            "y" => "year",
            _ => return None,
        };
        (count, unit.to_string())
    } else if text.to_lowercase().contains("yesterday") {
        (1, "day".to_string())
    } else if text.to_lowercase().contains("just now") {
        (0, "second".to_string())
    } else {
        return None;
    };

    let date = match unit.as_str() {
        // Sub-day units all resolve to today; the column only holds dates.
        "second" | "minute" | "hour" => Some(today),
        "day" => today.checked_sub_signed(Duration::days(i64::from(count))),
        "week" => today.checked_sub_signed(Duration::weeks(i64::from(count))),
        "month" => today.checked_sub_months(Months::new(count)),
        "year" => today.checked_sub_months(Months::new(count.checked_mul(12)?)),
        _ => None,
    }?;
    in_sane_range(date).then_some(date)
}

/// Accept a JSON date in any of the shapes TikTok embeds: epoch number,
/// epoch-digits string, or ISO string.
fn date_from_json(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => parse_epoch_date(n.as_i64()?),
        Value::String(s) => {
            let trimmed = s.trim();
            if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
                parse_epoch_date(trimmed.parse().ok()?)
            } else {
                parse_iso_date(trimmed)
            }
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Strategies, in cascade order
// ---------------------------------------------------------------------------

/// `<meta>` tags carrying an upload or publish timestamp.
pub struct MetaTagDate;

const DATE_META_SELECTORS: [&str; 3] = [
    r#"meta[itemprop="uploadDate"]"#,
    r#"meta[property="article:published_time"]"#,
    r#"meta[name="date"]"#,
];

impl DateStrategy for MetaTagDate {
    fn name(&self) -> &'static str {
        "meta_tag"
    }

    fn extract(&self, page: &PageView, _now: DateTime<Utc>) -> Option<NaiveDate> {
        DATE_META_SELECTORS
            .iter()
            .filter_map(|sel| page.meta_content(sel))
            .find_map(|content| date_from_json(&Value::String(content)))
    }
}

/// `createTime` from the embedded item state, or `uploadDate` /
/// `datePublished` from JSON-LD blocks.
pub struct EmbeddedJsonDate;

impl DateStrategy for EmbeddedJsonDate {
    fn name(&self) -> &'static str {
        "embedded_json"
    }

    fn extract(&self, page: &PageView, _now: DateTime<Utc>) -> Option<NaiveDate> {
        if let Some(date) = page
            .item_struct()
            .and_then(|item| item.get("createTime"))
            .and_then(date_from_json)
        {
            return Some(date);
        }
        page.json_ld().iter().find_map(|block| {
            ["uploadDate", "datePublished"]
                .iter()
                .filter_map(|key| block.get(key))
                .find_map(date_from_json)
        })
    }
}

/// Relative display text near the author line ("3d ago", "2 weeks ago").
pub struct RelativeTextDate;

impl DateStrategy for RelativeTextDate {
    fn name(&self) -> &'static str {
        "relative_text"
    }

    fn extract(&self, page: &PageView, now: DateTime<Utc>) -> Option<NaiveDate> {
        parse_relative_date(page.visible_text(), now)
    }
}

/// Raw-markup scan for a `createTime` epoch. Catches pages where the state
/// scripts are mangled but the value survives inline.
pub struct MarkupRegexDate;

impl DateStrategy for MarkupRegexDate {
    fn name(&self) -> &'static str {
        "markup_regex"
    }

    fn extract(&self, page: &PageView, _now: DateTime<Utc>) -> Option<NaiveDate> {
        let caps = CREATE_TIME_RE.captures(page.raw())?;
        parse_epoch_date(caps[1].parse().ok()?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 27, 12, 0, 0).unwrap()
    }

    #[test]
    fn epoch_seconds_and_millis() {
        // 2025-10-24 00:00:00 UTC
        assert_eq!(
            parse_epoch_date(1_761_264_000),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
        assert_eq!(
            parse_epoch_date(1_761_264_000_000),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
    }

    #[test]
    fn epoch_outside_sane_range_rejected() {
        assert_eq!(parse_epoch_date(0), None);
        assert_eq!(parse_epoch_date(4_102_444_800), None); // 2100
    }

    #[test]
    fn relative_days_and_weeks() {
        assert_eq!(
            parse_relative_date("3 days ago", now()),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
        assert_eq!(
            parse_relative_date("2 weeks ago", now()),
            NaiveDate::from_ymd_opt(2025, 10, 13)
        );
    }

    #[test]
    fn relative_compact_units() {
        assert_eq!(
            parse_relative_date("3d ago", now()),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
        assert_eq!(
            parse_relative_date("2w ago", now()),
            NaiveDate::from_ymd_opt(2025, 10, 13)
        );
        assert_eq!(
            parse_relative_date("1mo ago", now()),
            NaiveDate::from_ymd_opt(2025, 9, 27)
        );
        // Hours collapse to today.
        assert_eq!(
            parse_relative_date("5h ago", now()),
            NaiveDate::from_ymd_opt(2025, 10, 27)
        );
    }

    #[test]
    fn relative_spelled_out_units() {
        assert_eq!(
            parse_relative_date("1 month ago", now()),
            NaiveDate::from_ymd_opt(2025, 9, 27)
        );
        assert_eq!(
            parse_relative_date("2 years ago", now()),
            NaiveDate::from_ymd_opt(2023, 10, 27)
        );
        assert_eq!(
            parse_relative_date("uploaded yesterday", now()),
            NaiveDate::from_ymd_opt(2025, 10, 26)
        );
    }

    #[test]
    fn relative_ignores_unrelated_text() {
        assert_eq!(parse_relative_date("150000 views", now()), None);
        assert_eq!(parse_relative_date("", now()), None);
    }

    #[test]
    fn iso_variants() {
        assert_eq!(
            parse_iso_date("2025-10-24"),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
        assert_eq!(
            parse_iso_date("2025/10/24"),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
        assert_eq!(
            parse_iso_date("2025-10-24T08:15:00Z"),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
        assert_eq!(parse_iso_date("last tuesday"), None);
    }

    #[test]
    fn json_date_shapes() {
        assert_eq!(
            date_from_json(&serde_json::json!(1_761_264_000)),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
        assert_eq!(
            date_from_json(&serde_json::json!("1761264000")),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
        assert_eq!(
            date_from_json(&serde_json::json!("2025-10-24T00:00:00Z")),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
        assert_eq!(date_from_json(&serde_json::json!(true)), None);
    }
}
