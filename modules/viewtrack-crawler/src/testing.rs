// Scripted fakes for the crawl pipeline.
//
// One fake per trait boundary:
// - StaticPageFetcher (PageFetcher) — HashMap-based URL→HTML
// - ScriptedExtractor (VideoExtractor) — per-URL queue of outcomes
// - GatedExtractor (VideoExtractor) — completes N extracts, then hangs and
//   cancels, for exercising mid-batch shutdown
// - StaticRecordSource / FailingRecordSource (RecordSource)
// - FakeSheet (SheetStore) — in-memory grid with the row-2 data origin
//
// Plus `scraped()` for building minimal ScrapedStats values.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::traits::{FetchError, PageFetcher, RecordSource, SheetStore, VideoExtractor};
use crate::types::{ExtractionFailure, ScrapedStats, SourceRecord};

/// A minimal successful scrape carrying only a view count.
pub fn scraped(views: u64) -> ScrapedStats {
    ScrapedStats {
        views,
        likes: None,
        comments: None,
        shares: None,
        publish_date: None,
        method: "scripted",
    }
}

// ---------------------------------------------------------------------------
// StaticPageFetcher
// ---------------------------------------------------------------------------

/// HashMap-based page fetcher. Returns `Err` for unregistered URLs.
#[derive(Default)]
pub struct StaticPageFetcher {
    pages: HashMap<String, String>,
}

impl StaticPageFetcher {
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }
}

#[async_trait]
impl PageFetcher for StaticPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.pages.get(url).cloned().ok_or_else(|| {
            FetchError::Failed(format!("StaticPageFetcher: no page registered for {url}"))
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}

// ---------------------------------------------------------------------------
// ScriptedExtractor
// ---------------------------------------------------------------------------

/// Per-URL queue of extraction outcomes, consumed one per call. Unregistered
/// URLs and exhausted queues yield `NoStrategySucceeded`.
pub struct ScriptedExtractor {
    scripts: Mutex<HashMap<String, VecDeque<Result<ScrapedStats, ExtractionFailure>>>>,
    calls: AtomicUsize,
    recycles: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            recycles: AtomicUsize::new(0),
        }
    }

    pub fn script(
        self,
        url: &str,
        outcomes: Vec<Result<ScrapedStats, ExtractionFailure>>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), outcomes.into());
        self
    }

    /// Total extract calls, across every URL and attempt.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recycles(&self) -> usize {
        self.recycles.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoExtractor for ScriptedExtractor {
    async fn extract(&self, url: &str) -> Result<ScrapedStats, ExtractionFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Err(ExtractionFailure::NoStrategySucceeded))
    }

    async fn recycle(&self) {
        self.recycles.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// GatedExtractor
// ---------------------------------------------------------------------------

/// Completes exactly `limit` extracts, cancels its token on the last one,
/// and leaves every later call parked forever. A batch driven with this
/// extractor must come back with exactly `limit` outcomes; `active()` back
/// at zero proves no in-flight work leaked past the cancellation.
pub struct GatedExtractor {
    gate: Semaphore,
    limit: usize,
    completed: AtomicUsize,
    active: AtomicUsize,
    cancel: CancellationToken,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GatedExtractor {
    pub fn new(limit: usize) -> Self {
        Self {
            gate: Semaphore::new(limit),
            limit,
            completed: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Extract calls currently in flight.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoExtractor for GatedExtractor {
    async fn extract(&self, _url: &str) -> Result<ScrapedStats, ExtractionFailure> {
        self.active.fetch_add(1, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        match self.gate.try_acquire() {
            Ok(permit) => {
                permit.forget();
                let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
                if done == self.limit {
                    self.cancel.cancel();
                }
                Ok(scraped(1_000))
            }
            // Out of permits: park until the caller drops this future.
            Err(_) => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Record sources
// ---------------------------------------------------------------------------

/// Serves a fixed record list.
pub struct StaticRecordSource {
    records: Vec<SourceRecord>,
}

impl StaticRecordSource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl RecordSource for StaticRecordSource {
    async fn fetch_records(&self) -> Result<Vec<SourceRecord>> {
        Ok(self.records.clone())
    }
}

/// Fails every fetch, for source-unreachable paths.
pub struct FailingRecordSource;

#[async_trait]
impl RecordSource for FailingRecordSource {
    async fn fetch_records(&self) -> Result<Vec<SourceRecord>> {
        bail!("document store offline")
    }
}

// ---------------------------------------------------------------------------
// FakeSheet
// ---------------------------------------------------------------------------

/// In-memory sheet. Row numbering matches the real store: the first data row
/// is row 2, below the header.
pub struct FakeSheet {
    rows: Mutex<Vec<Vec<String>>>,
    fail: bool,
}

impl FakeSheet {
    pub fn new() -> Self {
        Self::with_rows(Vec::new())
    }

    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: Mutex::new(rows),
            fail: false,
        }
    }

    /// A sheet whose every call fails, for sheet-unreachable paths.
    pub fn unreachable() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().unwrap().clone()
    }
}

impl Default for FakeSheet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SheetStore for FakeSheet {
    async fn id_column(&self) -> Result<Vec<(u32, String)>> {
        if self.fail {
            bail!("sheet backend offline");
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, row)| (i as u32 + 2, row.first().cloned().unwrap_or_default()))
            .collect())
    }

    async fn update_rows(&self, rows: &[(u32, Vec<String>)]) -> Result<()> {
        if self.fail {
            bail!("sheet backend offline");
        }
        let mut grid = self.rows.lock().unwrap();
        for (row, cells) in rows {
            let idx = (row - 2) as usize;
            match grid.get_mut(idx) {
                Some(slot) => *slot = cells.clone(),
                None => bail!("FakeSheet: update to missing row {row}"),
            }
        }
        Ok(())
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<()> {
        if self.fail {
            bail!("sheet backend offline");
        }
        self.rows.lock().unwrap().extend(rows.iter().cloned());
        Ok(())
    }

    async fn delete_rows(&self, rows: &[u32]) -> Result<()> {
        if self.fail {
            bail!("sheet backend offline");
        }
        // Delete bottom-up so earlier removals never shift later targets.
        let mut doomed = rows.to_vec();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        doomed.dedup();
        let mut grid = self.rows.lock().unwrap();
        for row in doomed {
            let idx = (row - 2) as usize;
            if idx < grid.len() {
                grid.remove(idx);
            }
        }
        Ok(())
    }
}
