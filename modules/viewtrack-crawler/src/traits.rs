// Trait abstractions for the crawl cycle dependencies.
//
// PageFetcher — one browser page render behind one trait. The pool owns all
//   retry policy, so implementations make exactly one attempt per call.
// VideoExtractor — fetch + parse for a single video; the pool only sees this.
// RecordSource / SheetStore — document-store reads and spreadsheet writes.
//
// These enable deterministic testing with the scripted fakes in `testing`:
// no browser, no network. `cargo test` in seconds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::FieldMap;
use crate::types::{ExtractionFailure, ScrapedStats, SourceRecord};

// ---------------------------------------------------------------------------
// PageFetcher — one rendered page per call
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("navigation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Render a URL to HTML. One attempt; no internal retry.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;

    /// Tear down and rebuild long-lived browser state. Called by the pool
    /// every N pages to shed leaked renderer memory.
    async fn recycle(&self) {}

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// VideoExtractor — what the crawl pool drives
// ---------------------------------------------------------------------------

#[async_trait]
pub trait VideoExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ScrapedStats, ExtractionFailure>;

    async fn recycle(&self) {}
}

// ---------------------------------------------------------------------------
// RecordSource — where tracked videos come from
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_records(&self) -> Result<Vec<SourceRecord>>;
}

/// Reads tracked videos out of a Bitable table using configured field names.
pub struct BitableSource {
    client: bitable_client::BitableClient,
    fields: FieldMap,
}

impl BitableSource {
    pub fn new(client: bitable_client::BitableClient, fields: FieldMap) -> Self {
        Self { client, fields }
    }
}

#[async_trait]
impl RecordSource for BitableSource {
    async fn fetch_records(&self) -> Result<Vec<SourceRecord>> {
        let records = self
            .client
            .list_records()
            .await
            .context("Bitable record listing failed")?;

        Ok(records
            .into_iter()
            .map(|record| source_record(record, &self.fields))
            .collect())
    }
}

/// Map one Bitable record onto the crawler's source shape using the
/// configured field names. A record without a usable link keeps an empty
/// link and is rejected later at reference-building time.
fn source_record(record: bitable_client::BitableRecord, fields: &FieldMap) -> SourceRecord {
    let link = match record.text(&fields.link) {
        Some(link) => link,
        None => {
            warn!(record_id = record.record_id.as_str(), "Record has no link field");
            String::new()
        }
    };
    SourceRecord {
        previous_views: record.number(&fields.current_views),
        baseline_views: record.number(&fields.baseline_views),
        publish_date: record.date(&fields.publish_date),
        record_id: record.record_id,
        link,
    }
}

// ---------------------------------------------------------------------------
// SheetStore — spreadsheet reads and writes
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SheetStore: Send + Sync {
    /// The id column (column A) keyed by sheet row number. The first data
    /// row is row 2; blank cells are included so row numbers stay aligned.
    async fn id_column(&self) -> Result<Vec<(u32, String)>>;

    /// Overwrite whole rows in place. Keys are sheet row numbers.
    async fn update_rows(&self, rows: &[(u32, Vec<String>)]) -> Result<()>;

    /// Append rows below the existing data.
    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<()>;

    /// Delete rows by sheet row number, in any order.
    async fn delete_rows(&self, rows: &[u32]) -> Result<()>;
}

#[async_trait]
impl SheetStore for sheets_client::SheetsClient {
    async fn id_column(&self) -> Result<Vec<(u32, String)>> {
        Ok(sheets_client::SheetsClient::id_column(self).await?)
    }

    async fn update_rows(&self, rows: &[(u32, Vec<String>)]) -> Result<()> {
        Ok(sheets_client::SheetsClient::update_rows(self, rows).await?)
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<()> {
        Ok(sheets_client::SheetsClient::append_rows(self, rows).await?)
    }

    async fn delete_rows(&self, rows: &[u32]) -> Result<()> {
        Ok(sheets_client::SheetsClient::delete_rows(self, rows).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitable_client::BitableRecord;
    use chrono::NaiveDate;
    use serde_json::json;

    fn record(value: serde_json::Value) -> BitableRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn source_record_reads_the_configured_fields() {
        let mapped = source_record(
            record(json!({
                "record_id": "rec-1",
                "fields": {
                    "Link air bài": {
                        "text": "https://www.tiktok.com/@creator/video/1",
                        "link": "https://www.tiktok.com/@creator/video/1",
                    },
                    "Lượt xem hiện tại": "89,000",
                    "Số view 24h trước": 80000,
                    // 2025-10-24T00:00:00Z as epoch milliseconds
                    "Ngày đăng": 1_761_264_000_000_i64,
                }
            })),
            &FieldMap::default(),
        );

        assert_eq!(mapped.record_id, "rec-1");
        assert_eq!(mapped.link, "https://www.tiktok.com/@creator/video/1");
        assert_eq!(mapped.previous_views, Some(89_000));
        assert_eq!(mapped.baseline_views, Some(80_000));
        assert_eq!(mapped.publish_date, NaiveDate::from_ymd_opt(2025, 10, 24));
    }

    #[test]
    fn source_record_without_a_link_keeps_an_empty_link() {
        let mapped = source_record(
            record(json!({ "record_id": "rec-2", "fields": {} })),
            &FieldMap::default(),
        );

        assert_eq!(mapped.link, "");
        assert_eq!(mapped.previous_views, None);
        assert_eq!(mapped.baseline_views, None);
        assert_eq!(mapped.publish_date, None);
    }
}
