pub mod error;

pub use error::{Result, SheetsError};

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use serde_json::Value;
use tracing::{debug, info, warn};

const BASE_URL: &str = "https://sheets.googleapis.com";

/// Recovery wait after the API reports quota exhaustion.
const RATE_LIMIT_RECOVERY: Duration = Duration::from_secs(60);

/// Attempts per request before giving up on a persistent 429.
const RATE_LIMIT_ATTEMPTS: u32 = 3;

/// Ranges per values batchUpdate call.
const UPDATE_CHUNK: usize = 20;

/// Client for one worksheet of one spreadsheet. Rows are addressed by their
/// 1-based sheet row number; data rows start at row 2 below the header.
///
/// All writes pass through a per-minute quota limiter sized to the API's
/// documented write quota, and every request retries on 429 after a recovery
/// wait instead of dropping the batch.
pub struct SheetsClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    spreadsheet_id: String,
    tab: String,
    /// Numeric grid id of the tab, needed for row-deletion requests.
    sheet_id: i64,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl SheetsClient {
    pub fn new(
        token: &str,
        spreadsheet_id: &str,
        tab: &str,
        sheet_id: i64,
        writes_per_minute: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        let quota = Quota::per_minute(NonZeroU32::new(writes_per_minute).unwrap_or(NonZeroU32::MIN));

        Self {
            client,
            base_url: BASE_URL.to_string(),
            token: token.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            tab: tab.to_string(),
            sheet_id,
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Point the client at a different API host (testing, regional endpoints).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// The id column in sheet order: (row number, record id) for every data
    /// row, starting at row 2. Blank cells keep their row position but are
    /// returned as empty strings.
    pub async fn id_column(&self) -> Result<Vec<(u32, String)>> {
        let url = self.values_url(&format!("'{}'!A2:A", self.tab));

        let body = self
            .execute("read id column", self.client.get(&url), false)
            .await?;
        Ok(parse_id_values(&body))
    }

    /// Overwrite `A{row}:G{row}` for each (row, cells) pair, batching ranges
    /// into chunked values batchUpdate calls.
    pub async fn update_rows(&self, updates: &[(u32, Vec<String>)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let url = format!(
            "{}/v4/spreadsheets/{}/values:batchUpdate",
            self.base_url, self.spreadsheet_id
        );

        for chunk in updates.chunks(UPDATE_CHUNK) {
            let data: Vec<Value> = chunk
                .iter()
                .map(|(row, cells)| {
                    serde_json::json!({
                        "range": format!("'{}'!A{row}:G{row}", self.tab),
                        "values": [cells],
                    })
                })
                .collect();

            let body = serde_json::json!({
                "valueInputOption": "RAW",
                "data": data,
            });

            self.execute("update rows", self.client.post(&url).json(&body), true)
                .await?;
            debug!(rows = chunk.len(), "Updated row ranges");
        }

        info!(rows = updates.len(), "Sheet rows updated");
        Ok(())
    }

    /// Append rows below the existing data.
    pub async fn append_rows(&self, rows: &[Vec<String>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.values_url(&format!("'{}'!A:G", self.tab))
        );

        let body = serde_json::json!({ "values": rows });
        self.execute("append rows", self.client.post(&url).json(&body), true)
            .await?;

        info!(rows = rows.len(), "Sheet rows appended");
        Ok(())
    }

    /// Delete the given row numbers. Rows are deleted bottom-up in a single
    /// batchUpdate so earlier deletions never shift later indices.
    pub async fn delete_rows(&self, rows: &[u32]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut ordered: Vec<u32> = rows.to_vec();
        ordered.sort_unstable_by(|a, b| b.cmp(a));

        let requests: Vec<Value> = ordered
            .iter()
            .map(|row| {
                serde_json::json!({
                    "deleteDimension": {
                        "range": {
                            "sheetId": self.sheet_id,
                            "dimension": "ROWS",
                            "startIndex": row - 1,
                            "endIndex": row,
                        }
                    }
                })
            })
            .collect();

        let url = format!(
            "{}/v4/spreadsheets/{}:batchUpdate",
            self.base_url, self.spreadsheet_id
        );
        let body = serde_json::json!({ "requests": requests });

        self.execute("delete rows", self.client.post(&url).json(&body), true)
            .await?;

        warn!(rows = ordered.len(), "Deleted sheet rows");
        Ok(())
    }

    /// Values-API URL for an A1 range. The range goes into a path segment
    /// and carries `'`, `!`, and `:`, so it is percent-encoded.
    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url,
            self.spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    /// Send a request with auth, quota throttling (writes), and 429 retry.
    async fn execute(
        &self,
        what: &'static str,
        request: reqwest::RequestBuilder,
        is_write: bool,
    ) -> Result<Value> {
        for attempt in 0..RATE_LIMIT_ATTEMPTS {
            if is_write {
                self.limiter.until_ready().await;
            }

            let req = request
                .try_clone()
                .ok_or_else(|| SheetsError::Request(format!("{what}: request not replayable")))?
                .bearer_auth(&self.token);

            let resp = req.send().await?;
            let status = resp.status();

            if status.as_u16() == 429 {
                if attempt + 1 < RATE_LIMIT_ATTEMPTS {
                    warn!(
                        what,
                        attempt = attempt + 1,
                        wait_secs = RATE_LIMIT_RECOVERY.as_secs(),
                        "Sheets quota exhausted, backing off"
                    );
                    tokio::time::sleep(RATE_LIMIT_RECOVERY).await;
                    continue;
                }
                return Err(SheetsError::RateLimited {
                    what,
                    attempts: RATE_LIMIT_ATTEMPTS,
                });
            }

            if !status.is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(SheetsError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(resp.json::<Value>().await?);
        }

        Err(SheetsError::RateLimited {
            what,
            attempts: RATE_LIMIT_ATTEMPTS,
        })
    }
}

/// Parse a values-range response for the id column into (row, id) pairs.
/// Data rows start at sheet row 2.
fn parse_id_values(body: &Value) -> Vec<(u32, String)> {
    let Some(values) = body.get("values").and_then(Value::as_array) else {
        return Vec::new();
    };

    values
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let id = row
                .as_array()
                .and_then(|cells| cells.first())
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim()
                .to_string();
            (i as u32 + 2, id)
        })
        .collect()
}
