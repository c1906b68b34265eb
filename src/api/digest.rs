//! Form-digest lifecycle for mutating calls.
//!
//! Every POST against the API must carry a current form digest. The digest
//! expires server-side after a fixed timeout, so it is checked immediately
//! before each mutating request and renewed when stale.

use std::time::{Duration, Instant};

use serde::Deserialize;

/// Payload of `POST .../contextinfo`.
#[derive(Debug, Deserialize)]
pub(crate) struct ContextWebInformation {
    #[serde(rename = "FormDigestValue")]
    pub form_digest_value: String,
    #[serde(rename = "FormDigestTimeoutSeconds")]
    pub form_digest_timeout_seconds: u64,
    /// Only consulted during initial API-root discovery.
    #[serde(rename = "WebFullUrl", default)]
    pub web_full_url: Option<String>,
}

/// The mutation-authorization token and its expiry instant.
#[derive(Debug)]
pub(crate) struct FormDigest {
    value: Option<String>,
    expires_at: Instant,
}

impl FormDigest {
    /// Starts expired so the first mutating call forces a renewal.
    pub fn new() -> Self {
        Self {
            value: None,
            expires_at: Instant::now(),
        }
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.value.is_none() || now >= self.expires_at
    }

    pub fn renew(&mut self, value: String, timeout: Duration, now: Instant) {
        self.value = Some(value);
        self.expires_at = now + timeout;
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}
