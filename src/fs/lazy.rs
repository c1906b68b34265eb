//! Deferred attribute fetches and deferred mutating calls.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use crate::api::ApiClient;
use crate::error::Result;
use crate::fs::dispatch::dispatch;
use crate::fs::node::{make_call_string, Arg, AttrValue};

/// Deferred, at-most-once fetch of one named attribute.
///
/// The resolved value is cached on this instance; the owning node's
/// `attribute()` is responsible for storing it back into the node map.
pub struct LazyAttribute {
    url: String,
    name: String,
    client: Arc<ApiClient>,
    value: Option<AttrValue>,
}

impl LazyAttribute {
    pub(crate) fn new(url: String, name: &str, client: Arc<ApiClient>) -> Self {
        Self {
            url,
            name: name.to_string(),
            client,
            value: None,
        }
    }

    /// Build an already-resolved attribute from a payload the caller holds;
    /// `value()` never touches the network.
    pub fn with_payload(url: String, name: &str, client: Arc<ApiClient>, payload: &Value) -> Self {
        let value = parse_payload(name, Some(payload), &client);
        Self {
            url,
            name: name.to_string(),
            client,
            value: Some(value),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolve the attribute, fetching at most once.
    pub async fn value(&mut self) -> Result<AttrValue> {
        self.value_with_query(None).await
    }

    /// Resolve with OData query parameters appended to the fetch.
    pub async fn value_with_query(&mut self, query: Option<&[(String, String)]>) -> Result<AttrValue> {
        if let Some(value) = &self.value {
            return Ok(value.clone());
        }
        debug!(url = %self.url, name = %self.name, "resolving attribute");
        let payload = self.client.get(&self.url, query).await?;
        let value = parse_payload(&self.name, Some(&payload), &self.client);
        self.value = Some(value.clone());
        Ok(value)
    }

    /// A deferred POST against a method of this attribute's endpoint, e.g.
    /// `add` on a collection attribute's create endpoint.
    pub fn method_post(
        &self,
        method: &str,
        args: &[Arg],
        kwargs: &[(&str, Arg)],
        body: Option<Bytes>,
    ) -> PendingPost {
        let url = format!("{}{}", self.url, make_call_string(method, args, kwargs));
        PendingPost::new(url, Arc::clone(&self.client), body)
    }
}

/// Classify an attribute payload: absent resolves to `Null`, a collection
/// envelope dispatches each element, an envelope echoing the attribute name
/// yields that raw field, anything else dispatches as a single object.
/// Shapes outside those four degrade to `Null` rather than erroring.
fn parse_payload(name: &str, payload: Option<&Value>, client: &Arc<ApiClient>) -> AttrValue {
    let Some(payload) = payload else {
        return AttrValue::Null;
    };
    if payload.is_null() {
        return AttrValue::Null;
    }
    let Some(fields) = payload.as_object() else {
        return AttrValue::Null;
    };
    if fields.is_empty() {
        return AttrValue::Null;
    }
    if let Some(value) = fields.get(name) {
        return AttrValue::Scalar(value.clone());
    }
    if let Some(results) = fields.get("results").and_then(Value::as_array) {
        let items = results
            .iter()
            .map(|item| dispatch(item, Arc::clone(client)))
            .collect();
        return AttrValue::Collection(items);
    }
    AttrValue::Object(Box::new(dispatch(payload, Arc::clone(client))))
}

/// Deferred POST bound to a constructed call URL.
///
/// `send()` issues a network call every time it is invoked: mutations are not
/// idempotent and are never cached.
pub struct PendingPost {
    url: String,
    client: Arc<ApiClient>,
    body: Option<Bytes>,
}

impl PendingPost {
    pub(crate) fn new(url: String, client: Arc<ApiClient>, body: Option<Bytes>) -> Self {
        Self { url, client, body }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Execute the POST and return the response payload.
    pub async fn send(&self) -> Result<Value> {
        self.client.post(&self.url, self.body.clone()).await
    }
}
