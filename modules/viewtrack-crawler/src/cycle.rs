//! One end-to-end crawl cycle: fetch records, crawl pages, reconcile, upsert.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pool::{crawl_batch, CrawlConfig};
use crate::reconcile::reconcile;
use crate::stats::CycleSummary;
use crate::traits::{RecordSource, VideoExtractor};
use crate::types::{ExtractionFailure, VideoReference};
use crate::upsert::SheetUpserter;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("record source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("sheet unreachable: {0}")]
    SheetUnreachable(String),

    #[error("elevated failure rate: {:.0}% of crawled pages failed", .rate * 100.0)]
    ElevatedFailureRate { rate: f64, summary: CycleSummary },
}

/// Narrows a cycle to a subset of the source records.
#[derive(Debug, Default, Clone)]
pub struct CycleOptions {
    /// Only crawl these record ids. `None` crawls everything.
    pub record_ids: Option<HashSet<String>>,
    /// Cap on videos per cycle, applied after filtering.
    pub max_videos: Option<usize>,
}

pub struct CrawlCycle {
    source: Arc<dyn RecordSource>,
    extractor: Arc<dyn VideoExtractor>,
    upserter: SheetUpserter,
    crawl: CrawlConfig,
    /// Fail the cycle when more than this share of crawled pages fell back.
    failure_rate_alert: f64,
}

impl CrawlCycle {
    pub fn new(
        source: Arc<dyn RecordSource>,
        extractor: Arc<dyn VideoExtractor>,
        upserter: SheetUpserter,
        crawl: CrawlConfig,
        failure_rate_alert: f64,
    ) -> Self {
        Self {
            source,
            extractor,
            upserter,
            crawl,
            failure_rate_alert,
        }
    }

    /// Run one cycle. Sheet writes happen before the failure-rate check, so
    /// an elevated-failure error still leaves every completed row persisted.
    pub async fn run(
        &self,
        options: &CycleOptions,
        cancel: &CancellationToken,
    ) -> Result<CycleSummary, CycleError> {
        let started = Instant::now();
        let mut summary = CycleSummary::default();

        let records = self
            .source
            .fetch_records()
            .await
            .map_err(|e| CycleError::SourceUnreachable(format!("{e:#}")))?;
        summary.records_fetched = records.len();

        let mut videos = Vec::new();
        let mut by_id = HashMap::new();
        for record in records {
            if let Some(ids) = &options.record_ids {
                if !ids.contains(&record.record_id) {
                    continue;
                }
            }
            match VideoReference::parse(&record.record_id, &record.link) {
                Ok(video) => {
                    videos.push(video);
                    by_id.insert(record.record_id.clone(), record);
                }
                Err(e) => {
                    warn!(
                        record_id = record.record_id.as_str(),
                        link = record.link.as_str(),
                        error = %e,
                        "Skipping record with unusable link"
                    );
                    summary.invalid_links += 1;
                }
            }
        }
        if let Some(cap) = options.max_videos {
            videos.truncate(cap);
        }

        info!(
            records = summary.records_fetched,
            videos = videos.len(),
            "Starting crawl cycle"
        );

        let outcomes = crawl_batch(self.extractor.clone(), videos, &self.crawl, cancel).await;
        summary.crawled = outcomes.len();
        for outcome in &outcomes {
            match &outcome.result {
                Ok(stats) if stats.views > 0 => summary.succeeded += 1,
                Ok(_) => summary.partial += 1,
                Err(failure) => {
                    summary.partial += 1;
                    if matches!(failure, ExtractionFailure::Unavailable(_)) {
                        summary.unavailable += 1;
                    }
                }
            }
        }

        let now = Utc::now();
        let rows: Vec<_> = outcomes
            .iter()
            .filter_map(|outcome| {
                by_id
                    .get(&outcome.video.record_id)
                    .map(|source| reconcile(source, &outcome.result, now))
            })
            .collect();

        let upserted = self
            .upserter
            .upsert(&rows)
            .await
            .map_err(|e| CycleError::SheetUnreachable(format!("{e:#}")))?;
        summary.updated = upserted.updated;
        summary.appended = upserted.appended;
        summary.duplicates_removed = upserted.duplicates_removed;
        summary.duration = started.elapsed();

        if summary.crawled > 0 {
            let rate = summary.partial as f64 / summary.crawled as f64;
            if rate > self.failure_rate_alert {
                return Err(CycleError::ElevatedFailureRate { rate, summary });
            }
        }
        Ok(summary)
    }
}
