use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// One row from the Bitable tracking table, before crawling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRecord {
    pub record_id: String,
    /// Raw link cell, unvalidated. May be empty or point at a profile.
    pub link: String,
    /// Most recent view count the table knows about.
    pub previous_views: Option<u64>,
    /// Snapshot from roughly 24h ago. Carried through untouched.
    pub baseline_views: Option<u64>,
    pub publish_date: Option<NaiveDate>,
}

/// A validated TikTok video link paired with the record it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
    pub record_id: String,
    pub url: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("link cell is empty")]
    Empty,
    #[error("not a tiktok.com link: {0}")]
    NotTikTok(String),
    #[error("profile link, not a video: {0}")]
    ProfileOnly(String),
    #[error("malformed link: {0}")]
    Malformed(String),
}

/// Hosts whose links carry the video id in an opaque redirect slug.
const SHORT_HOSTS: [&str; 2] = ["vt.tiktok.com", "vm.tiktok.com"];

impl VideoReference {
    /// Validate a raw link cell into a crawlable reference.
    ///
    /// Accepts canonical `https://www.tiktok.com/@user/video/<id>` links and
    /// short-host redirects. Profile links without a video path are rejected
    /// here so the pool never spends a browser page on them.
    pub fn parse(record_id: &str, raw: &str) -> Result<Self, LinkError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LinkError::Empty);
        }

        // Bitable link cells often drop the scheme.
        let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        let url = url::Url::parse(&candidate)
            .map_err(|_| LinkError::Malformed(trimmed.to_string()))?;
        let host = url.host_str().unwrap_or_default();
        if host != "tiktok.com" && !host.ends_with(".tiktok.com") {
            return Err(LinkError::NotTikTok(trimmed.to_string()));
        }

        let short_host = SHORT_HOSTS.contains(&host);
        let path = url.path();
        if !short_host && path.starts_with("/@") && !path.contains("/video/") {
            return Err(LinkError::ProfileOnly(trimmed.to_string()));
        }

        Ok(Self {
            record_id: record_id.to_string(),
            url: candidate,
        })
    }
}

/// Numbers pulled off a video page by one extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedStats {
    pub views: u64,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub shares: Option<u64>,
    pub publish_date: Option<NaiveDate>,
    /// Which strategy produced the view count. Logged for cascade tuning.
    pub method: &'static str,
}

/// Why a page yielded no stats. Tagged so the pool can tell transient
/// failures (worth retrying) from permanent ones (not worth a second page).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    #[error("navigation timed out after {timeout_ms}ms")]
    NavigationTimeout { timeout_ms: u64 },
    #[error("no extraction strategy produced a view count")]
    NoStrategySucceeded,
    #[error("video unavailable: {0}")]
    Unavailable(String),
    #[error("browser engine failure: {0}")]
    Engine(String),
}

impl ExtractionFailure {
    /// Permanent failures burn no retry budget.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Fresh numbers were scraped this cycle.
    Success,
    /// Scrape failed; the row carries the previous count so it never
    /// regresses to blank.
    Partial,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

/// Final per-record state, ready to be written to the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledRecord {
    pub record_id: String,
    pub link: String,
    pub current_views: u64,
    pub baseline_views: u64,
    pub publish_date: Option<NaiveDate>,
    pub last_checked: DateTime<Utc>,
    pub status: RecordStatus,
}

impl ReconciledRecord {
    /// Sheet row layout, columns A through G:
    /// Record ID | Link | Current Views | 24h Baseline | Published Date | Last Check | Status.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.record_id.clone(),
            self.link.clone(),
            self.current_views.to_string(),
            self.baseline_views.to_string(),
            self.publish_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            self.last_checked.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.status.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parse_accepts_canonical_video_link() {
        let video =
            VideoReference::parse("rec-1", "https://www.tiktok.com/@user/video/7301234567890")
                .unwrap();
        assert_eq!(video.record_id, "rec-1");
        assert_eq!(video.url, "https://www.tiktok.com/@user/video/7301234567890");
    }

    #[test]
    fn parse_adds_missing_scheme() {
        let video = VideoReference::parse("rec-1", "www.tiktok.com/@user/video/123").unwrap();
        assert_eq!(video.url, "https://www.tiktok.com/@user/video/123");
    }

    #[test]
    fn parse_accepts_short_host_redirects() {
        assert!(VideoReference::parse("rec-1", "https://vt.tiktok.com/ZS8abc123/").is_ok());
        assert!(VideoReference::parse("rec-1", "https://vm.tiktok.com/ZS8abc123/").is_ok());
    }

    #[test]
    fn parse_rejects_profile_links() {
        let err = VideoReference::parse("rec-1", "https://www.tiktok.com/@user").unwrap_err();
        assert!(matches!(err, LinkError::ProfileOnly(_)));
    }

    #[test]
    fn parse_rejects_non_tiktok_hosts() {
        let err = VideoReference::parse("rec-1", "https://example.com/video/1").unwrap_err();
        assert!(matches!(err, LinkError::NotTikTok(_)));

        // Lookalike domain must not pass the suffix check.
        let err = VideoReference::parse("rec-1", "https://eviltiktok.com/video/1").unwrap_err();
        assert!(matches!(err, LinkError::NotTikTok(_)));
    }

    #[test]
    fn parse_rejects_empty_and_garbage() {
        assert_eq!(VideoReference::parse("rec-1", "  "), Err(LinkError::Empty));
        assert!(matches!(
            VideoReference::parse("rec-1", "http://"),
            Err(LinkError::Malformed(_))
        ));
    }

    #[test]
    fn row_layout_matches_sheet_columns() {
        let record = ReconciledRecord {
            record_id: "rec-1".into(),
            link: "https://www.tiktok.com/@user/video/1".into(),
            current_views: 150_000,
            baseline_views: 120_000,
            publish_date: NaiveDate::from_ymd_opt(2025, 10, 24),
            last_checked: Utc.with_ymd_and_hms(2025, 10, 27, 8, 30, 0).unwrap(),
            status: RecordStatus::Success,
        };
        assert_eq!(
            record.to_row(),
            vec![
                "rec-1",
                "https://www.tiktok.com/@user/video/1",
                "150000",
                "120000",
                "2025-10-24",
                "2025-10-27 08:30:00",
                "success",
            ]
        );
    }

    #[test]
    fn row_leaves_unknown_publish_date_blank() {
        let record = ReconciledRecord {
            record_id: "rec-2".into(),
            link: "https://www.tiktok.com/@user/video/2".into(),
            current_views: 0,
            baseline_views: 0,
            publish_date: None,
            last_checked: Utc.with_ymd_and_hms(2025, 10, 27, 8, 30, 0).unwrap(),
            status: RecordStatus::Partial,
        };
        let row = record.to_row();
        assert_eq!(row[4], "");
        assert_eq!(row[6], "partial");
    }
}
