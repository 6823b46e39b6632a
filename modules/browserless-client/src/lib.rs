pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Serialize;

/// Puppeteer-style navigation options forwarded to the page's `goto` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoOptions {
    /// Load event to wait for, e.g. "domcontentloaded" or "networkidle2".
    pub wait_until: String,
    /// Navigation timeout in milliseconds.
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Per-request page context for the `/content` endpoint. All fields are
/// optional; the service applies its own defaults for anything omitted.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goto_options: Option<GotoOptions>,
    /// Resource types the page should refuse to load (e.g. "image", "font").
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reject_resource_types: Vec<String>,
    /// URL substrings/globs to block outright (trackers, analytics).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reject_request_pattern: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone_id: Option<String>,
}

/// Browser launch parameters, passed as the `launch` query parameter.
#[derive(Debug, Clone, Default, Serialize)]
struct LaunchOptions {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stealth: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
}

pub struct BrowserlessClient {
    client: tokio::sync::RwLock<reqwest::Client>,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
    launch: LaunchOptions,
}

fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to build HTTP client")
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let request_timeout = Duration::from_secs(30);
        Self {
            client: tokio::sync::RwLock::new(build_http_client(request_timeout)),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            request_timeout,
            launch: LaunchOptions::default(),
        }
    }

    /// Override the HTTP request timeout (covers the whole render round-trip,
    /// so keep it above the page's navigation timeout).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self.client = tokio::sync::RwLock::new(build_http_client(timeout));
        self
    }

    /// Enable the service's stealth mode (patches common automation
    /// fingerprints such as `navigator.webdriver`).
    pub fn with_stealth(mut self, stealth: bool) -> Self {
        self.launch.stealth = stealth;
        self
    }

    /// Extra Chromium launch arguments, e.g. `--disable-blink-features=AutomationControlled`.
    pub fn with_launch_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launch.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn endpoint(&self, path: &str) -> Result<String> {
        let mut endpoint = format!("{}{path}", self.base_url);
        let mut sep = '?';
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("{sep}token={token}"));
            sep = '&';
        }
        if self.launch.stealth || !self.launch.args.is_empty() {
            let launch = serde_json::to_string(&self.launch)
                .map_err(|e| BrowserlessError::Request(e.to_string()))?;
            endpoint.push_str(&format!("{sep}launch={}", urlencoding::encode(&launch)));
        }
        Ok(endpoint)
    }

    /// Fetch fully-rendered HTML for a URL via the `/content` endpoint,
    /// with default page context.
    pub async fn content(&self, url: &str) -> Result<String> {
        self.content_with_options(url, &ContentOptions::default())
            .await
    }

    /// Fetch fully-rendered HTML with explicit page context (wait condition,
    /// blocked resources, user agent, viewport, timezone).
    pub async fn content_with_options(
        &self,
        url: &str,
        options: &ContentOptions,
    ) -> Result<String> {
        let endpoint = self.endpoint("/content")?;

        let mut body = serde_json::to_value(options)
            .map_err(|e| BrowserlessError::Request(e.to_string()))?;
        body.as_object_mut()
            .ok_or_else(|| BrowserlessError::Request("options must serialize to an object".into()))?
            .insert("url".to_string(), serde_json::Value::String(url.to_string()));

        let resp = self
            .client
            .read()
            .await
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }

    /// Drop and rebuild the underlying HTTP transport, closing any keep-alive
    /// sessions held against the service. Long crawls call this periodically
    /// to bound resource growth on both ends.
    pub async fn reset(&self) {
        let mut client = self.client.write().await;
        *client = build_http_client(self.request_timeout);
        tracing::debug!("Browserless transport reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_options_serialize_camel_case_and_skip_empty() {
        let options = ContentOptions {
            goto_options: Some(GotoOptions {
                wait_until: "domcontentloaded".into(),
                timeout: 15000,
            }),
            reject_resource_types: vec!["image".into(), "font".into()],
            reject_request_pattern: Vec::new(),
            user_agent: Some("Mozilla/5.0".into()),
            viewport: Some(Viewport {
                width: 1920,
                height: 1080,
            }),
            timezone_id: None,
        };

        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["gotoOptions"]["waitUntil"], "domcontentloaded");
        assert_eq!(value["gotoOptions"]["timeout"], 15000);
        assert_eq!(value["rejectResourceTypes"][1], "font");
        assert_eq!(value["userAgent"], "Mozilla/5.0");
        assert_eq!(value["viewport"]["width"], 1920);
        assert!(value.get("rejectRequestPattern").is_none());
        assert!(value.get("timezoneId").is_none());
    }

    #[test]
    fn endpoint_carries_token_and_launch_params() {
        let client = BrowserlessClient::new("http://browserless:3000/", Some("secret"))
            .with_stealth(true)
            .with_launch_args(["--disable-blink-features=AutomationControlled"]);

        let endpoint = client.endpoint("/content").unwrap();
        assert!(endpoint.starts_with("http://browserless:3000/content?token=secret&launch="));
        // The launch JSON must arrive percent-encoded, braces and quotes included.
        assert!(endpoint.contains("%7B%22stealth%22%3Atrue"));
        assert!(!endpoint.contains(' '));
        assert!(!endpoint.contains('{'));
    }
}
