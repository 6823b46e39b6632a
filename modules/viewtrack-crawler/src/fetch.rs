//! Browser-backed page fetchers.
//!
//! Both engines render with a hardened context: rotated desktop user agent,
//! automation flags suppressed, fixed viewport and timezone, and heavy
//! resource classes blocked. Neither retries; the pool owns retry policy.

use std::time::Duration;

use async_trait::async_trait;
use browserless_client::{BrowserlessClient, BrowserlessError, ContentOptions, GotoOptions, Viewport};
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::traits::{FetchError, PageFetcher};

/// Desktop agents rotated per fetch. Mobile agents get served a different
/// page build with none of the markup the extractor knows.
const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Resource classes a stats scrape never needs. Skipping them cuts page
/// weight by an order of magnitude and dodges most tracking beacons.
const BLOCKED_RESOURCE_TYPES: [&str; 10] = [
    "image",
    "media",
    "font",
    "stylesheet",
    "beacon",
    "imageset",
    "texttrack",
    "websocket",
    "manifest",
    "other",
];

const BLOCKED_URL_PATTERNS: [&str; 16] = [
    "analytics",
    "tracking",
    "doubleclick",
    "googletagmanager",
    "facebook.com",
    "google-analytics",
    "hotjar",
    "tiktokcdn-us.com/obj/",
    "tiktokcdn.com/obj/",
    ".mp4",
    ".webp",
    ".jpg",
    ".png",
    ".gif",
    ".woff",
    ".woff2",
];

const VIEWPORT_WIDTH: u32 = 1920;
const VIEWPORT_HEIGHT: u32 = 1080;
const TIMEZONE_ID: &str = "Asia/Ho_Chi_Minh";

fn random_user_agent() -> &'static str {
    USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())]
}

// ---------------------------------------------------------------------------
// ChromeFetcher — local headless chromium, one process per page
// ---------------------------------------------------------------------------

/// Renders pages with `chromium --headless --dump-dom`. Each fetch gets a
/// fresh throwaway profile, so there is no session state to recycle. The
/// semaphore caps concurrent processes: each instance is heavy (~100MB+ RSS,
/// multiple child processes) and small containers hit PID limits fast.
pub struct ChromeFetcher {
    chrome_bin: String,
    timeout: Duration,
    semaphore: Semaphore,
}

impl ChromeFetcher {
    pub fn new(chrome_bin: &str, timeout: Duration, max_concurrent: usize) -> Self {
        info!(
            chrome_bin,
            max_concurrent,
            timeout_ms = timeout.as_millis() as u64,
            "Using ChromeFetcher"
        );
        Self {
            chrome_bin: chrome_bin.to_string(),
            timeout,
            semaphore: Semaphore::new(max_concurrent.max(1)),
        }
    }
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| FetchError::Failed(format!("invalid URL {url}: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::Failed(format!(
                "only http/https URLs are allowed, got: {}",
                parsed.scheme()
            )));
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Failed("chrome semaphore closed".to_string()))?;

        debug!(url, fetcher = "chrome", "Fetching page");

        let tmp_dir = tempfile::tempdir()
            .map_err(|e| FetchError::Failed(format!("failed to create temp profile dir: {e}")))?;

        let mut command = tokio::process::Command::new(&self.chrome_bin);
        command
            .args([
                "--headless",
                "--no-sandbox",
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--disable-blink-features=AutomationControlled",
                &format!("--user-data-dir={}", tmp_dir.path().display()),
                &format!("--user-agent={}", random_user_agent()),
                &format!("--window-size={VIEWPORT_WIDTH},{VIEWPORT_HEIGHT}"),
                "--dump-dom",
                url,
            ])
            .env("TZ", TIMEZONE_ID)
            // Timing out drops the output future; the child must die with it.
            .kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, command.output()).await;

        match result {
            Ok(Ok(output)) => {
                if output.status.success() {
                    return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
                }
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(url, fetcher = "chrome", stderr = %stderr, "Chrome exited with error");
                Err(FetchError::Failed(format!(
                    "chrome exited with {}: {}",
                    output.status,
                    stderr.trim()
                )))
            }
            Ok(Err(e)) => Err(FetchError::Failed(format!("failed to run chrome: {e}"))),
            Err(_) => Err(FetchError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn name(&self) -> &str {
        "chrome"
    }
}

// ---------------------------------------------------------------------------
// BrowserlessFetcher — remote rendering over HTTP
// ---------------------------------------------------------------------------

/// Renders pages through a Browserless `/content` endpoint. Waits for
/// `domcontentloaded` only: the counters live in server-rendered markup, and
/// waiting for full load multiplies both latency and fingerprint surface.
pub struct BrowserlessFetcher {
    client: BrowserlessClient,
    timeout_ms: u64,
}

impl BrowserlessFetcher {
    pub fn new(base_url: &str, token: Option<&str>, timeout_ms: u64) -> Self {
        info!(base_url, timeout_ms, "Using BrowserlessFetcher");
        Self {
            client: BrowserlessClient::new(base_url, token)
                .with_request_timeout(Duration::from_millis(timeout_ms + 10_000))
                .with_stealth(true)
                .with_launch_args(["--disable-blink-features=AutomationControlled"]),
            timeout_ms,
        }
    }

    fn content_options(&self) -> ContentOptions {
        ContentOptions {
            goto_options: Some(GotoOptions {
                wait_until: "domcontentloaded".to_string(),
                timeout: self.timeout_ms,
            }),
            reject_resource_types: BLOCKED_RESOURCE_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reject_request_pattern: BLOCKED_URL_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            user_agent: Some(random_user_agent().to_string()),
            viewport: Some(Viewport {
                width: VIEWPORT_WIDTH,
                height: VIEWPORT_HEIGHT,
            }),
            timezone_id: Some(TIMEZONE_ID.to_string()),
        }
    }
}

#[async_trait]
impl PageFetcher for BrowserlessFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, fetcher = "browserless", "Fetching page");

        self.client
            .content_with_options(url, &self.content_options())
            .await
            .map_err(|e| match e {
                BrowserlessError::Timeout(_) => FetchError::Timeout {
                    timeout_ms: self.timeout_ms,
                },
                other => FetchError::Failed(other.to_string()),
            })
    }

    /// Rebuild the HTTP transport so the next page lands on a fresh
    /// browser session server-side.
    async fn recycle(&self) {
        self.client.reset().await;
    }

    fn name(&self) -> &str {
        "browserless"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_options_carry_hardened_context() {
        let fetcher = BrowserlessFetcher::new("http://localhost:3000", None, 15_000);
        let options = fetcher.content_options();

        let goto = options.goto_options.unwrap();
        assert_eq!(goto.wait_until, "domcontentloaded");
        assert_eq!(goto.timeout, 15_000);

        assert!(options.reject_resource_types.contains(&"image".to_string()));
        assert!(options
            .reject_request_pattern
            .contains(&"googletagmanager".to_string()));
        assert!(USER_AGENTS.contains(&options.user_agent.unwrap().as_str()));

        let viewport = options.viewport.unwrap();
        assert_eq!((viewport.width, viewport.height), (1920, 1080));
        assert_eq!(options.timezone_id.as_deref(), Some("Asia/Ho_Chi_Minh"));
    }

    #[tokio::test]
    async fn chrome_fetcher_rejects_non_http_schemes() {
        let fetcher = ChromeFetcher::new("chromium", Duration::from_secs(15), 2);
        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, FetchError::Failed(_)));
    }
}
