//! SharePoint REST client: request plumbing and digest-gated mutations.

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::Response;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::digest::{ContextWebInformation, FormDigest};
use crate::error::{Result, SharePointError};
use crate::http::HttpClient;

/// Client for one SharePoint site's `_api` surface.
///
/// A single `ApiClient` is shared (via `Arc`) by every node derived from the
/// same site, so cookie state and the form digest are site-wide: renewing the
/// digest before one node's mutation is observed by all of them.
#[derive(Debug)]
pub struct ApiClient {
    http: HttpClient,
    api_url: String,
    digest: Mutex<FormDigest>,
}

impl ApiClient {
    /// Discover the `_api` root for `site_url` and bind a client to it.
    ///
    /// The entry URL may point at any resource inside the site; a trailing
    /// filename component and anything from a `_layouts` segment onwards are
    /// dropped before probing `contextinfo` for the canonical web URL.
    pub async fn connect(site_url: &str, http: HttpClient) -> Result<Self> {
        let trimmed = strip_layouts(&strip_filename(site_url));
        let probe = format!("{}/_api/contextinfo", trimmed);
        let info = Self::fetch_context_info(&http, &probe).await?;
        let web = info.web_full_url.ok_or(SharePointError::InvalidResponse)?;
        Ok(Self::new(http, format!("{}/_api", web)))
    }

    /// Bind to an already-known `_api` root without probing the server.
    pub fn new(http: HttpClient, api_url: String) -> Self {
        Self {
            http,
            api_url,
            digest: Mutex::new(FormDigest::new()),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// GET a JSON endpoint and return the envelope's `d` payload.
    pub async fn get(&self, url: &str, query: Option<&[(String, String)]>) -> Result<Value> {
        debug!(url, "GET");
        let response = self.http.get(url, query).await?;
        Self::into_payload(response, "GET", url).await
    }

    /// GET returning the raw response, for byte-stream endpoints such as
    /// a file's `$value` sub-resource.
    pub async fn get_raw(&self, url: &str) -> Result<Response> {
        debug!(url, "GET raw");
        let response = self.http.get(url, None).await?;
        Self::check(response, "GET", url).await
    }

    /// POST a JSON endpoint and return the envelope's `d` payload.
    ///
    /// The form digest is validated first and renewed when expired, so no
    /// mutating request ever goes out with a known-stale token.
    pub async fn post(&self, url: &str, body: Option<Bytes>) -> Result<Value> {
        let digest = self.ensure_digest().await?;
        debug!(url, "POST");
        let response = self.http.post(url, body, Some(&digest)).await?;
        Self::into_payload(response, "POST", url).await
    }

    /// Check-then-renew, under one lock so a renewal can never race another.
    async fn ensure_digest(&self) -> Result<String> {
        let mut digest = self.digest.lock().await;
        if digest.expired(Instant::now()) {
            let url = format!("{}/contextinfo", self.api_url);
            debug!(url, "form digest expired, renewing");
            let info = Self::fetch_context_info(&self.http, &url)
                .await
                .map_err(|e| SharePointError::DigestRenewal(Box::new(e)))?;
            digest.renew(
                info.form_digest_value,
                Duration::from_secs(info.form_digest_timeout_seconds),
                Instant::now(),
            );
        }
        Ok(digest.value().unwrap_or_default().to_string())
    }

    /// The `contextinfo` POST itself never carries a digest.
    async fn fetch_context_info(http: &HttpClient, url: &str) -> Result<ContextWebInformation> {
        let response = http.post(url, None, None).await?;
        let payload = Self::into_payload(response, "POST", url).await?;
        let info = payload
            .get("GetContextWebInformation")
            .cloned()
            .ok_or(SharePointError::InvalidResponse)?;
        Ok(serde_json::from_value(info)?)
    }

    async fn into_payload(response: Response, method: &str, url: &str) -> Result<Value> {
        let response = Self::check(response, method, url).await?;
        let envelope: Value = response.json().await?;
        // Verbose OData wraps everything in "d"; tolerate its absence.
        match envelope.get("d") {
            Some(payload) => Ok(payload.clone()),
            None => Ok(envelope),
        }
    }

    async fn check(response: Response, method: &str, url: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok())
            .and_then(|body| {
                body.pointer("/error/message/value")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
        Err(SharePointError::Transport {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            message,
            method: method.to_string(),
            url: url.to_string(),
        })
    }
}

/// Drop a trailing filename component, keeping directory-shaped URLs intact.
fn strip_filename(url: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(url) {
        let last_is_file = parsed
            .path_segments()
            .and_then(|segments| segments.last().map(|s| s.contains('.')))
            .unwrap_or(false);
        if last_is_file {
            if let Ok(mut segments) = parsed.path_segments_mut() {
                segments.pop();
            }
        }
        parsed.to_string().trim_end_matches('/').to_string()
    } else {
        url.trim_end_matches('/').to_string()
    }
}

/// Truncate at a `_layouts` path segment; browser URLs often point inside it.
fn strip_layouts(url: &str) -> String {
    let parts: Vec<&str> = url.split('/').collect();
    match parts.iter().position(|part| *part == "_layouts") {
        Some(idx) => parts[..idx].join("/"),
        None => url.to_string(),
    }
}
