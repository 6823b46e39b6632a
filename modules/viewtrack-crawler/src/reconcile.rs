//! Merges crawl outcomes with source-of-truth records.
//!
//! A crawl only counts as a success when it produced a positive view count.
//! Anything else falls back to the last known value so a flaky page never
//! zeroes out a row that held real data yesterday.

use chrono::{DateTime, Utc};

use crate::types::{
    ExtractionFailure, ReconciledRecord, RecordStatus, ScrapedStats, SourceRecord,
};

pub fn reconcile(
    source: &SourceRecord,
    outcome: &Result<ScrapedStats, ExtractionFailure>,
    now: DateTime<Utc>,
) -> ReconciledRecord {
    let baseline_views = source
        .baseline_views
        .or(source.previous_views)
        .unwrap_or(0);

    match outcome {
        Ok(stats) if stats.views > 0 => ReconciledRecord {
            record_id: source.record_id.clone(),
            link: source.link.clone(),
            current_views: stats.views,
            baseline_views,
            publish_date: stats.publish_date.or(source.publish_date),
            last_checked: now,
            status: RecordStatus::Success,
        },
        _ => ReconciledRecord {
            record_id: source.record_id.clone(),
            link: source.link.clone(),
            current_views: source.previous_views.unwrap_or(0),
            baseline_views,
            publish_date: source.publish_date,
            last_checked: now,
            status: RecordStatus::Partial,
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::testing::scraped;

    use super::*;

    fn source(previous: Option<u64>, baseline: Option<u64>) -> SourceRecord {
        SourceRecord {
            record_id: "rec-1".into(),
            link: "https://www.tiktok.com/@user/video/1".into(),
            previous_views: previous,
            baseline_views: baseline,
            publish_date: NaiveDate::from_ymd_opt(2025, 10, 1),
        }
    }

    #[test]
    fn positive_views_become_a_success_row() {
        let now = Utc::now();
        let row = reconcile(&source(Some(120_000), None), &Ok(scraped(150_000)), now);
        assert_eq!(row.status, RecordStatus::Success);
        assert_eq!(row.current_views, 150_000);
        assert_eq!(row.baseline_views, 120_000);
        assert_eq!(row.last_checked, now);
    }

    #[test]
    fn failed_crawl_falls_back_to_previous_views() {
        let row = reconcile(
            &source(Some(89_000), Some(85_000)),
            &Err(ExtractionFailure::NoStrategySucceeded),
            Utc::now(),
        );
        assert_eq!(row.status, RecordStatus::Partial);
        assert_eq!(row.current_views, 89_000);
        assert_eq!(row.baseline_views, 85_000);
    }

    #[test]
    fn zero_scraped_views_is_not_a_success() {
        let row = reconcile(&source(Some(42), None), &Ok(scraped(0)), Utc::now());
        assert_eq!(row.status, RecordStatus::Partial);
        assert_eq!(row.current_views, 42);
    }

    #[test]
    fn failure_with_no_history_writes_zero() {
        let row = reconcile(
            &source(None, None),
            &Err(ExtractionFailure::NavigationTimeout { timeout_ms: 15_000 }),
            Utc::now(),
        );
        assert_eq!(row.current_views, 0);
        assert_eq!(row.baseline_views, 0);
        assert_eq!(row.status, RecordStatus::Partial);
    }

    #[test]
    fn scraped_publish_date_wins_over_source() {
        let mut stats = scraped(1_000);
        stats.publish_date = NaiveDate::from_ymd_opt(2025, 10, 24);
        let row = reconcile(&source(None, None), &Ok(stats), Utc::now());
        assert_eq!(row.publish_date, NaiveDate::from_ymd_opt(2025, 10, 24));
    }

    #[test]
    fn source_publish_date_survives_when_page_had_none() {
        let success = reconcile(&source(None, None), &Ok(scraped(1_000)), Utc::now());
        assert_eq!(success.publish_date, NaiveDate::from_ymd_opt(2025, 10, 1));

        let partial = reconcile(
            &source(None, None),
            &Err(ExtractionFailure::NoStrategySucceeded),
            Utc::now(),
        );
        assert_eq!(partial.publish_date, NaiveDate::from_ymd_opt(2025, 10, 1));
    }
}
