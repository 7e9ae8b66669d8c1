//! Zotero Web API v3 client.
//!
//! Lists the top-level items of one collection and downloads their PDF
//! attachments. Requests are retried with exponential backoff on 5xx, 429 and
//! transport errors; downloads go through the [`RateLimiter`].

use async_trait::async_trait;
use mirror_core::item::{Creator, RemoteItem};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::rate_limit::RateLimiter;

/// Items per listing page (API maximum)
const PAGE_SIZE: usize = 100;

const API_VERSION: &str = "3";

const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum ZoteroError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Zotero API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse Zotero response: {0}")]
    Parse(String),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ZoteroError>;

/// Source of remote items and their attachments.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    /// Top-level items of `collection` that carry a PDF attachment.
    async fn list_top_items_with_attachment(&self, collection: &str) -> Result<Vec<RemoteItem>>;

    /// Raw bytes of the attachment with the given id.
    async fn download_attachment(&self, item_id: &str) -> Result<Vec<u8>>;
}

/// One entry of an items listing, reduced to the fields we use
#[derive(Debug, Deserialize)]
struct ApiItem {
    key: String,
    #[serde(default)]
    links: ApiLinks,
    #[serde(default)]
    meta: ApiMeta,
    #[serde(default)]
    data: ApiData,
}

#[derive(Debug, Default, Deserialize)]
struct ApiLinks {
    attachment: Option<ApiAttachmentLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAttachmentLink {
    href: String,
    #[serde(default)]
    attachment_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMeta {
    parsed_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    creators: Vec<ApiCreator>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCreator {
    #[serde(default)]
    creator_type: String,
    last_name: Option<String>,
    name: Option<String>,
}

impl ApiItem {
    /// Convert to a [`RemoteItem`]; `None` unless the item has a PDF attachment.
    ///
    /// The item id is the attachment key, i.e. the last segment of its href.
    fn into_remote_item(self) -> Option<RemoteItem> {
        let attachment = self.links.attachment?;
        if attachment.attachment_type.as_deref() != Some(PDF_CONTENT_TYPE) {
            debug!("Item {} has no PDF attachment, skipping", self.key);
            return None;
        }
        let id = attachment
            .href
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())?
            .to_string();

        let creators = self
            .data
            .creators
            .into_iter()
            .map(|c| Creator {
                creator_type: c.creator_type,
                last_name: c.last_name,
                name: c.name,
            })
            .collect();

        Some(RemoteItem {
            id,
            creators,
            date: self.meta.parsed_date,
            title: self.data.title,
            has_pdf: true,
        })
    }
}

/// Parse one listing page into the items that have a PDF attachment
fn parse_items_page(body: &[u8]) -> Result<Vec<RemoteItem>> {
    let items: Vec<ApiItem> = serde_json::from_slice(body)
        .map_err(|e| ZoteroError::Parse(format!("Failed to parse items page: {}", e)))?;
    Ok(items
        .into_iter()
        .filter_map(ApiItem::into_remote_item)
        .collect())
}

fn total_results(headers: &HeaderMap) -> Option<usize> {
    headers
        .get("Total-Results")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(100u64.saturating_mul(2u64.saturating_pow(attempt)))
}

/// Headers sent with every request.
///
/// The key goes in `Authorization`, which reqwest drops when a download
/// redirects to the storage host.
fn default_headers(api_key: &str) -> Result<HeaderMap> {
    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
        .map_err(|_| ZoteroError::Config("API key is not a valid header value".to_string()))?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, bearer);
    headers.insert("Zotero-API-Version", HeaderValue::from_static(API_VERSION));
    Ok(headers)
}

/// Zotero Web API client for one user library
pub struct ZoteroClient {
    http: Client,
    api_base: String,
    user_id: String,
    max_retries: u32,
    limiter: Mutex<RateLimiter>,
}

impl ZoteroClient {
    pub fn new(
        api_base: &str,
        api_key: &str,
        user_id: &str,
        max_retries: u32,
        limiter: RateLimiter,
    ) -> Result<Self> {
        let headers = default_headers(api_key)?;
        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ZoteroError::Config(e.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            max_retries,
            limiter: Mutex::new(limiter),
        })
    }

    fn user_url(&self) -> String {
        format!(
            "{}/users/{}",
            self.api_base,
            urlencoding::encode(&self.user_id)
        )
    }

    /// GET `url`, retrying transient failures
    #[instrument(skip(self), fields(url = %url))]
    async fn execute_with_retry(&self, url: &str) -> Result<Response> {
        let mut attempt = 0;

        loop {
            match self.http.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        debug!("API request succeeded: status={}", status);
                        return Ok(response);
                    } else if is_retryable(status) {
                        attempt += 1;
                        if attempt > self.max_retries {
                            warn!(
                                "API request failed after {} retries: status={}",
                                self.max_retries, status
                            );
                            return Err(ZoteroError::Api {
                                status: status.as_u16(),
                                message: format!(
                                    "Request failed after {} retries",
                                    self.max_retries
                                ),
                            });
                        }

                        let delay = backoff(attempt);
                        warn!(
                            "API request failed (attempt {}/{}): status={}, retrying in {:?}",
                            attempt, self.max_retries, status, delay
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        // Client error - don't retry
                        warn!("API request failed: status={}", status);
                        let message = response.text().await.unwrap_or_default();
                        return Err(ZoteroError::Api {
                            status: status.as_u16(),
                            message,
                        });
                    }
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!("API request failed after {} retries: {}", self.max_retries, e);
                        return Err(ZoteroError::Http(e.to_string()));
                    }

                    let delay = backoff(attempt);
                    warn!(
                        "API request failed (attempt {}/{}): {}, retrying in {:?}",
                        attempt, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl RemoteCollection for ZoteroClient {
    #[instrument(skip(self))]
    async fn list_top_items_with_attachment(&self, collection: &str) -> Result<Vec<RemoteItem>> {
        let mut items = Vec::new();
        let mut start = 0;

        loop {
            let url = format!(
                "{}/collections/{}/items/top?start={}&limit={}",
                self.user_url(),
                urlencoding::encode(collection),
                start,
                PAGE_SIZE
            );
            let response = self.execute_with_retry(&url).await?;
            let total = total_results(response.headers());
            let body = response
                .bytes()
                .await
                .map_err(|e| ZoteroError::Http(e.to_string()))?;

            let raw_count = serde_json::from_slice::<Vec<serde_json::Value>>(&body)
                .map(|page| page.len())
                .map_err(|e| ZoteroError::Parse(format!("Failed to parse items page: {}", e)))?;
            items.extend(parse_items_page(&body)?);
            start += raw_count;

            match total {
                Some(total) => info!("Listed {}/{} items", start.min(total), total),
                None => info!("Listed {} items", start),
            }

            let done = total.map(|t| start >= t).unwrap_or(false);
            if raw_count < PAGE_SIZE || done {
                break;
            }
        }

        info!("Found {} items with a PDF attachment", items.len());
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn download_attachment(&self, item_id: &str) -> Result<Vec<u8>> {
        self.limiter.lock().await.acquire().await;

        let url = format!(
            "{}/items/{}/file",
            self.user_url(),
            urlencoding::encode(item_id)
        );
        let response = self.execute_with_retry(&url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ZoteroError::Http(e.to_string()))?;

        debug!("Downloaded {} bytes for {}", bytes.len(), item_id);
        Ok(bytes.to_vec())
    }
}
