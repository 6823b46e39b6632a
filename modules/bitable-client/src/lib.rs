pub mod error;
pub mod types;

pub use error::{BitableError, Result};
pub use types::{field_date, field_text, field_u64, BitableRecord};

use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info};

use types::{ApiResponse, RecordPage, TokenResponse};

/// Records fetched per page; the Bitable list API caps at 100.
const PAGE_SIZE: u32 = 100;

/// Refresh the tenant token this long before its reported expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

struct CachedToken {
    token: String,
    expires_at: Instant,
}

pub struct BitableClient {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    app_token: String,
    table_id: String,
    cached: RwLock<Option<CachedToken>>,
}

impl BitableClient {
    /// `base_url` is the Lark open-platform host, e.g.
    /// `https://open.larksuite.com` (or the Feishu host for CN tenants).
    pub fn new(
        base_url: &str,
        app_id: &str,
        app_secret: &str,
        app_token: &str,
        table_id: &str,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
            app_token: app_token.to_string(),
            table_id: table_id.to_string(),
            cached: RwLock::new(None),
        }
    }

    /// Return a valid tenant access token, fetching or refreshing as needed.
    async fn tenant_token(&self) -> Result<String> {
        {
            let cached = self.cached.read().await;
            if let Some(ref entry) = *cached {
                if entry.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                    return Ok(entry.token.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(ref entry) = *cached {
            if entry.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(entry.token.clone());
            }
        }

        let url = format!(
            "{}/open-apis/auth/v3/tenant_access_token/internal",
            self.base_url
        );
        let body = serde_json::json!({
            "app_id": self.app_id,
            "app_secret": self.app_secret,
        });

        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BitableError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let token_resp: TokenResponse = resp.json().await?;
        if token_resp.code != 0 {
            return Err(BitableError::Api {
                code: token_resp.code,
                message: token_resp.msg,
            });
        }

        let lifetime = Duration::from_secs(token_resp.expire.max(0) as u64);
        info!(expires_in_secs = token_resp.expire, "Obtained tenant access token");

        let token = token_resp.tenant_access_token;
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token)
    }

    /// Fetch every record in the table, following pagination.
    pub async fn list_records(&self) -> Result<Vec<BitableRecord>> {
        let token = self.tenant_token().await?;
        let url = format!(
            "{}/open-apis/bitable/v1/apps/{}/tables/{}/records",
            self.base_url, self.app_token, self.table_id
        );

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .query(&[("page_size", PAGE_SIZE.to_string())]);
            if let Some(ref pt) = page_token {
                request = request.query(&[("page_token", pt)]);
            }

            let resp = request.send().await?;
            let status = resp.status();
            if !status.is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(BitableError::Http {
                    status: status.as_u16(),
                    message,
                });
            }

            let page: ApiResponse<RecordPage> = resp.json().await?;
            if page.code != 0 {
                return Err(BitableError::Api {
                    code: page.code,
                    message: page.msg,
                });
            }

            let data = page.data.unwrap_or(RecordPage {
                has_more: false,
                page_token: None,
                items: Vec::new(),
            });

            debug!(page_records = data.items.len(), "Fetched record page");
            records.extend(data.items);

            if data.has_more {
                page_token = data.page_token;
                if page_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        info!(count = records.len(), "Fetched Bitable records");
        Ok(records)
    }
}
