//! Cancellation mid-batch: completed results survive, nothing leaks.
//!
//! The GatedExtractor completes exactly 20 extracts, cancels its own token
//! on the 20th, and parks every later call until the pool drops it.

use std::sync::Arc;

use viewtrack_crawler::cycle::{CrawlCycle, CycleOptions};
use viewtrack_crawler::pool::{crawl_batch, CrawlConfig};
use viewtrack_crawler::testing::{FakeSheet, GatedExtractor, StaticRecordSource};
use viewtrack_crawler::types::{SourceRecord, VideoReference};
use viewtrack_crawler::upsert::SheetUpserter;

fn fast_crawl(permits: usize) -> CrawlConfig {
    CrawlConfig {
        permits,
        attempts: 1,
        delay_min_ms: 0,
        delay_max_ms: 0,
        recycle_every: 0,
        retry_base: std::time::Duration::ZERO,
    }
}

fn videos(count: u64) -> Vec<VideoReference> {
    (1..=count)
        .map(|i| {
            VideoReference::parse(
                &format!("rec-{i}"),
                &format!("https://www.tiktok.com/@creator/video/{i}"),
            )
            .unwrap()
        })
        .collect()
}

#[tokio::test]
async fn cancellation_keeps_exactly_the_completed_results() {
    let extractor = Arc::new(GatedExtractor::new(20));
    let cancel = extractor.cancel_token();

    let outcomes = crawl_batch(extractor.clone(), videos(50), &fast_crawl(8), &cancel).await;

    assert_eq!(outcomes.len(), 20, "only completed crawls may be returned");
    assert!(outcomes.iter().all(|o| o.result.is_ok()));
    assert_eq!(extractor.completed(), 20);
    assert_eq!(extractor.active(), 0, "no extract call may outlive the batch");
}

#[tokio::test]
async fn cancelled_cycle_still_persists_completed_rows() {
    let records: Vec<SourceRecord> = (1..=50)
        .map(|i| SourceRecord {
            record_id: format!("rec-{i}"),
            link: format!("https://www.tiktok.com/@creator/video/{i}"),
            previous_views: None,
            baseline_views: None,
            publish_date: None,
        })
        .collect();

    let extractor = Arc::new(GatedExtractor::new(20));
    let cancel = extractor.cancel_token();
    let sheet = Arc::new(FakeSheet::new());
    let cycle = CrawlCycle::new(
        Arc::new(StaticRecordSource::new(records)),
        extractor.clone(),
        SheetUpserter::new(sheet.clone()),
        fast_crawl(8),
        0.9,
    );

    let summary = cycle
        .run(&CycleOptions::default(), &cancel)
        .await
        .expect("cancelled cycle still reports a summary");

    assert_eq!(summary.crawled, 20);
    assert_eq!(summary.succeeded, 20);
    assert_eq!(summary.appended, 20);
    assert_eq!(sheet.rows().len(), 20);
    assert_eq!(extractor.active(), 0);
}
