//! HTTP transport wrapper shared by every node of a site.

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};

use crate::error::Result;

/// SharePoint answers in Atom/XML unless asked for verbose OData JSON.
const ODATA_VERBOSE: &str = "application/json; odata=verbose";

/// Header name carrying the form digest on mutating calls.
const DIGEST_HEADER: &str = "X-RequestDigest";

/// HTTP transport for a SharePoint site: one cookie-persisting session reused
/// by every request.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a fresh transport with its own cookie store.
    pub fn new() -> Result<Self> {
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self { client })
    }

    /// Adopt an externally-authenticated client. The login flow is out of
    /// scope for this library; callers hand over a `reqwest::Client` whose
    /// cookie store already carries the authentication cookies.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Issue a GET, optionally with OData query parameters.
    pub async fn get(&self, url: &str, query: Option<&[(String, String)]>) -> Result<Response> {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, ODATA_VERBOSE)
            .header(CONTENT_TYPE, ODATA_VERBOSE);
        if let Some(query) = query {
            request = request.query(query);
        }
        Ok(request.send().await?)
    }

    /// Issue a POST, optionally carrying a body and a form digest.
    pub async fn post(&self, url: &str, body: Option<Bytes>, digest: Option<&str>) -> Result<Response> {
        let mut request = self
            .client
            .post(url)
            .header(ACCEPT, ODATA_VERBOSE)
            .header(CONTENT_TYPE, ODATA_VERBOSE);
        if let Some(digest) = digest {
            request = request.header(DIGEST_HEADER, digest);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        Ok(request.send().await?)
    }
}
