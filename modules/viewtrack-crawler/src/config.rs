use std::env;

use tracing::info;

/// Bitable field names the record source reads. Configurable because the
/// tracking table is operator-owned and column names drift.
#[derive(Debug, Clone)]
pub struct FieldMap {
    pub link: String,
    pub current_views: String,
    pub baseline_views: String,
    pub publish_date: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            link: "Link air bài".to_string(),
            current_views: "Lượt xem hiện tại".to_string(),
            baseline_views: "Số view 24h trước".to_string(),
            publish_date: "Ngày đăng".to_string(),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Bitable (Lark) document store
    pub bitable_base_url: String,
    pub bitable_app_id: String,
    pub bitable_app_secret: String,
    pub bitable_app_token: String,
    pub bitable_table_id: String,
    pub fields: FieldMap,

    // Google Sheets
    pub sheets_api_token: String,
    pub spreadsheet_id: String,
    pub sheet_tab: String,
    pub sheet_gid: i64,
    pub sheet_writes_per_minute: u32,

    // Browser engine
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
    pub chrome_bin: String,
    pub page_timeout_ms: u64,

    // Crawl pool
    pub crawl_permits: usize,
    pub crawl_attempts: u32,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub recycle_every: usize,
    pub failure_rate_alert: f64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        let (delay_min_ms, delay_max_ms) = checked_delay_range(
            parsed_env("DELAY_MIN_MS", 500),
            parsed_env("DELAY_MAX_MS", 1_500),
        );

        Self {
            bitable_base_url: env::var("BITABLE_BASE_URL")
                .unwrap_or_else(|_| "https://open.larksuite.com".to_string()),
            bitable_app_id: required_env("BITABLE_APP_ID"),
            bitable_app_secret: required_env("BITABLE_APP_SECRET"),
            bitable_app_token: required_env("BITABLE_APP_TOKEN"),
            bitable_table_id: required_env("BITABLE_TABLE_ID"),
            fields: FieldMap {
                link: env_or("BITABLE_LINK_FIELD", "Link air bài"),
                current_views: env_or("BITABLE_VIEWS_FIELD", "Lượt xem hiện tại"),
                baseline_views: env_or("BITABLE_BASELINE_FIELD", "Số view 24h trước"),
                publish_date: env_or("BITABLE_PUBLISH_DATE_FIELD", "Ngày đăng"),
            },
            sheets_api_token: required_env("SHEETS_API_TOKEN"),
            spreadsheet_id: required_env("SPREADSHEET_ID"),
            sheet_tab: env_or("SHEET_TAB", "Sheet1"),
            sheet_gid: parsed_env("SHEET_GID", 0),
            sheet_writes_per_minute: parsed_env("SHEET_WRITES_PER_MINUTE", 55),
            browserless_url: env::var("BROWSERLESS_URL").ok().filter(|s| !s.is_empty()),
            browserless_token: env::var("BROWSERLESS_TOKEN").ok().filter(|s| !s.is_empty()),
            chrome_bin: env_or("CHROME_BIN", "chromium"),
            page_timeout_ms: parsed_env("PAGE_TIMEOUT_MS", 15_000),
            crawl_permits: parsed_env("CRAWL_PERMITS", 2),
            crawl_attempts: parsed_env("CRAWL_ATTEMPTS", 3),
            delay_min_ms,
            delay_max_ms,
            recycle_every: parsed_env("RECYCLE_EVERY", 50),
            failure_rate_alert: parsed_env("FAILURE_RATE_ALERT", 0.5),
        }
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            bitable_base_url = self.bitable_base_url.as_str(),
            bitable_app_id = self.bitable_app_id.as_str(),
            bitable_table_id = self.bitable_table_id.as_str(),
            spreadsheet_id = self.spreadsheet_id.as_str(),
            sheet_tab = self.sheet_tab.as_str(),
            sheet_writes_per_minute = self.sheet_writes_per_minute,
            browserless = self.browserless_url.as_deref().unwrap_or("(local chrome)"),
            page_timeout_ms = self.page_timeout_ms,
            crawl_permits = self.crawl_permits,
            crawl_attempts = self.crawl_attempts,
            recycle_every = self.recycle_every,
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got: {raw}")),
        Err(_) => default,
    }
}

/// Workers draw a politeness delay from this range before every page visit,
/// so an inverted range must fail here at startup, not inside the pool.
fn checked_delay_range(min_ms: u64, max_ms: u64) -> (u64, u64) {
    if min_ms > max_ms {
        panic!("DELAY_MIN_MS ({min_ms}) must not exceed DELAY_MAX_MS ({max_ms})");
    }
    (min_ms, max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_range_accepts_ordered_bounds() {
        assert_eq!(checked_delay_range(500, 1_500), (500, 1_500));
        assert_eq!(checked_delay_range(0, 0), (0, 0));
    }

    #[test]
    #[should_panic(expected = "DELAY_MIN_MS")]
    fn delay_range_rejects_inverted_bounds() {
        checked_delay_range(2_000, 500);
    }
}
