//! Bounded crawl pool.
//!
//! One pool drives every page visit: bounded concurrency, per-video retry
//! with backoff, randomized politeness delays, periodic browser recycling,
//! and cooperative cancellation that keeps whatever already completed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::traits::VideoExtractor;
use crate::types::{ExtractionFailure, ScrapedStats, VideoReference};

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Concurrent page visits. Browsers are heavy; keep this conservative
    /// and raise it only on hosts with memory to spare.
    pub permits: usize,
    /// Attempts per video, including the first.
    pub attempts: u32,
    /// Politeness delay bounds, applied before every page visit.
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    /// Recycle the browser session after this many completed pages.
    /// Zero disables recycling.
    pub recycle_every: usize,
    /// Base retry backoff. Actual delay is base * 3^attempt + jitter (0-1s).
    pub retry_base: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            permits: 2,
            attempts: 3,
            delay_min_ms: 500,
            delay_max_ms: 1_500,
            recycle_every: 50,
            retry_base: Duration::from_secs(1),
        }
    }
}

/// The completed crawl of one video, successful or not.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub video: VideoReference,
    pub attempts: u32,
    pub result: Result<ScrapedStats, ExtractionFailure>,
}

/// Point-in-time view of a running batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlProgress {
    pub completed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub success_rate: f64,
    pub per_minute: f64,
    pub eta: Option<Duration>,
}

struct ProgressState {
    total: usize,
    completed: AtomicUsize,
    succeeded: AtomicUsize,
    started_at: Instant,
}

impl ProgressState {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record one completion; returns the new completed count.
    fn record(&self, success: bool) -> usize {
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn snapshot(&self) -> CrawlProgress {
        let completed = self.completed.load(Ordering::Relaxed);
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let per_second = if elapsed > 0.0 {
            completed as f64 / elapsed
        } else {
            0.0
        };
        let eta = (per_second > 0.0 && completed < self.total).then(|| {
            Duration::from_secs_f64((self.total - completed) as f64 / per_second)
        });
        CrawlProgress {
            completed,
            total: self.total,
            succeeded,
            success_rate: if completed > 0 {
                succeeded as f64 / completed as f64
            } else {
                0.0
            },
            per_minute: per_second * 60.0,
            eta,
        }
    }
}

/// Crawl a batch of videos through the extractor.
///
/// Returns one outcome per video that ran to completion. On cancellation,
/// in-flight visits are abandoned and unstarted ones are skipped, so the
/// returned outcomes are exactly the completed subset.
pub async fn crawl_batch(
    extractor: Arc<dyn VideoExtractor>,
    videos: Vec<VideoReference>,
    config: &CrawlConfig,
    cancel: &CancellationToken,
) -> Vec<CrawlOutcome> {
    let total = videos.len();
    let progress = Arc::new(ProgressState::new(total));

    info!(videos = total, permits = config.permits, "Starting crawl batch");

    let outcomes: Vec<Option<CrawlOutcome>> = stream::iter(videos.into_iter().map(|video| {
        let extractor = extractor.clone();
        let progress = progress.clone();
        let cancel = cancel.clone();
        let config = config.clone();
        async move {
            if cancel.is_cancelled() {
                return None;
            }
            tokio::select! {
                _ = cancel.cancelled() => None,
                outcome = crawl_one(extractor.as_ref(), &video, &config) => {
                    let completed = progress.record(outcome.result.is_ok());
                    if completed % 10 == 0 || completed == progress.total {
                        let snap = progress.snapshot();
                        info!(
                            completed = snap.completed,
                            total = snap.total,
                            success_rate = format!("{:.0}%", snap.success_rate * 100.0),
                            per_minute = format!("{:.1}", snap.per_minute),
                            eta_secs = snap.eta.map(|d| d.as_secs()).unwrap_or(0),
                            "Crawl progress"
                        );
                    }
                    if config.recycle_every > 0
                        && completed % config.recycle_every == 0
                        && completed < progress.total
                    {
                        info!(pages = completed, "Recycling browser session");
                        extractor.recycle().await;
                    }
                    Some(outcome)
                }
            }
        }
    }))
    .buffer_unordered(config.permits.max(1))
    .collect()
    .await;

    let outcomes: Vec<CrawlOutcome> = outcomes.into_iter().flatten().collect();
    if cancel.is_cancelled() {
        info!(
            completed = outcomes.len(),
            total,
            "Crawl batch cancelled, keeping completed results"
        );
    }
    outcomes
}

/// Crawl one video with the configured attempt budget.
async fn crawl_one(
    extractor: &dyn VideoExtractor,
    video: &VideoReference,
    config: &CrawlConfig,
) -> CrawlOutcome {
    let attempts = config.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;

        // Politeness delay before every visit, not just retries.
        let delay = rand::rng().random_range(config.delay_min_ms..=config.delay_max_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        match extractor.extract(&video.url).await {
            Ok(stats) => {
                return CrawlOutcome {
                    video: video.clone(),
                    attempts: attempt,
                    result: Ok(stats),
                };
            }
            Err(failure) if failure.is_permanent() || attempt >= attempts => {
                warn!(
                    url = video.url.as_str(),
                    record_id = video.record_id.as_str(),
                    attempt,
                    error = %failure,
                    "Extraction failed"
                );
                return CrawlOutcome {
                    video: video.clone(),
                    attempts: attempt,
                    result: Err(failure),
                };
            }
            Err(failure) => {
                let backoff = config.retry_base * 3u32.pow(attempt - 1);
                let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
                warn!(
                    url = video.url.as_str(),
                    attempt,
                    backoff_secs = backoff.as_secs(),
                    error = %failure,
                    "Extraction failed, retrying after backoff"
                );
                tokio::time::sleep(backoff + jitter).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{scraped, ScriptedExtractor};

    use super::*;

    fn video(id: u64) -> VideoReference {
        VideoReference::parse(
            &format!("rec-{id}"),
            &format!("https://www.tiktok.com/@user/video/{id}"),
        )
        .unwrap()
    }

    fn fast_config(permits: usize) -> CrawlConfig {
        CrawlConfig {
            permits,
            attempts: 3,
            delay_min_ms: 0,
            delay_max_ms: 0,
            recycle_every: 0,
            retry_base: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn batch_returns_one_outcome_per_video() {
        let extractor = Arc::new(
            ScriptedExtractor::new()
                .script(&video(1).url, vec![Ok(scraped(100))])
                .script(&video(2).url, vec![Err(ExtractionFailure::NoStrategySucceeded); 3])
                .script(&video(3).url, vec![Ok(scraped(300))]),
        );
        let outcomes = crawl_batch(
            extractor,
            vec![video(1), video(2), video(3)],
            &fast_config(2),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcomes.len(), 3);
        let failed: Vec<_> = outcomes.iter().filter(|o| o.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].video.record_id, "rec-2");
        assert_eq!(failed[0].attempts, 3);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_succeeds() {
        let extractor = Arc::new(ScriptedExtractor::new().script(
            &video(1).url,
            vec![
                Err(ExtractionFailure::NavigationTimeout { timeout_ms: 15_000 }),
                Ok(scraped(500)),
            ],
        ));
        let outcomes = crawl_batch(
            extractor,
            vec![video(1)],
            &fast_config(1),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].attempts, 2);
        assert_eq!(outcomes[0].result.as_ref().unwrap().views, 500);
    }

    #[tokio::test]
    async fn permanent_failure_burns_no_retries() {
        let extractor = Arc::new(ScriptedExtractor::new().script(
            &video(1).url,
            vec![Err(ExtractionFailure::Unavailable("video unavailable".into())); 3],
        ));
        let outcomes = crawl_batch(
            extractor.clone(),
            vec![video(1)],
            &fast_config(1),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcomes[0].attempts, 1);
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test]
    async fn recycle_fires_on_schedule_but_not_at_batch_end() {
        let extractor = Arc::new(
            ScriptedExtractor::new()
                .script(&video(1).url, vec![Ok(scraped(1))])
                .script(&video(2).url, vec![Ok(scraped(2))])
                .script(&video(3).url, vec![Ok(scraped(3))])
                .script(&video(4).url, vec![Ok(scraped(4))]),
        );
        let config = CrawlConfig {
            recycle_every: 2,
            // Sequential so completion order is deterministic.
            ..fast_config(1)
        };
        let outcomes = crawl_batch(
            extractor.clone(),
            vec![video(1), video(2), video(3), video(4)],
            &config,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcomes.len(), 4);
        // Fires at 2 completions; 4 is the batch end and is skipped.
        assert_eq!(extractor.recycles(), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_batch_runs_nothing() {
        let extractor = Arc::new(ScriptedExtractor::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcomes = crawl_batch(
            extractor.clone(),
            vec![video(1), video(2)],
            &fast_config(2),
            &cancel,
        )
        .await;
        assert!(outcomes.is_empty());
        assert_eq!(extractor.calls(), 0);
    }

    #[test]
    fn progress_math() {
        let state = ProgressState::new(100);
        for i in 0..40 {
            state.record(i % 2 == 0);
        }
        // Guarantees nonzero elapsed time on coarse clocks.
        std::thread::sleep(Duration::from_millis(5));
        let snap = state.snapshot();
        assert_eq!(snap.completed, 40);
        assert_eq!(snap.succeeded, 20);
        assert!((snap.success_rate - 0.5).abs() < f64::EPSILON);
        assert!(snap.eta.is_some());

        let empty = ProgressState::new(10).snapshot();
        assert_eq!(empty.success_rate, 0.0);
        assert!(empty.eta.is_none());
    }

    #[test]
    fn progress_eta_clears_at_completion() {
        let state = ProgressState::new(2);
        state.record(true);
        state.record(true);
        assert!(state.snapshot().eta.is_none());
    }
}
