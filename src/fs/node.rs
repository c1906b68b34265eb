//! Base resource node and the OData call-string grammar.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::api::ApiClient;
use crate::error::{Result, SharePointError};
use crate::fs::dispatch::Resource;
use crate::fs::lazy::{LazyAttribute, PendingPost};

/// A resolved attribute value.
///
/// Absence from a node's attribute map means the attribute has not been
/// resolved yet; `Null` means it resolved to nothing. Keeping the two apart
/// lets a resolved-empty attribute still be served from cache.
#[derive(Debug, Clone)]
pub enum AttrValue {
    Null,
    Scalar(Value),
    Object(Box<Resource>),
    Collection(Vec<Resource>),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Scalar(value) => value.as_str(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Scalar(value) => value.as_i64(),
            _ => None,
        }
    }
}

/// An argument to a remote method call.
///
/// Strings are single-quoted with apostrophes doubled so they cannot close
/// the quote early, UUIDs render as `guid'...'`, everything else renders in
/// its natural unquoted form.
#[derive(Debug, Clone)]
pub enum Arg {
    Str(String),
    Uuid(Uuid),
    Int(i64),
    Bool(bool),
}

impl Arg {
    fn render(&self) -> String {
        match self {
            Arg::Str(s) => format!("'{}'", s.replace('\'', "%27%27")),
            Arg::Uuid(id) => format!("guid'{}'", id),
            Arg::Int(n) => n.to_string(),
            Arg::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<Uuid> for Arg {
    fn from(id: Uuid) -> Self {
        Arg::Uuid(id)
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Arg::Int(n)
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

/// Render `/<Method>(<positional>, ..., <named>=<value>, ...)`.
pub(crate) fn make_call_string(method: &str, args: &[Arg], kwargs: &[(&str, Arg)]) -> String {
    let mut rendered: Vec<String> = args.iter().map(Arg::render).collect();
    rendered.extend(kwargs.iter().map(|(key, value)| format!("{}={}", key, value.render())));
    format!("/{}({})", method, rendered.join(", "))
}

/// Local proxy for one remote addressable entity, identified by its endpoint
/// URI. Attribute values are fetched on first read and memoized per node.
#[derive(Debug, Clone)]
pub struct Node {
    url: String,
    client: Arc<ApiClient>,
    attrs: HashMap<String, AttrValue>,
}

impl Node {
    /// A bare node: nothing resolved, everything fetched on demand.
    pub fn new(url: impl Into<String>, client: Arc<ApiClient>) -> Self {
        Self {
            url: url.into(),
            client,
            attrs: HashMap::new(),
        }
    }

    /// Build a node from a response envelope. Non-object fields pre-populate
    /// the attribute map; object-valued fields are left out so they resolve
    /// lazily through their own endpoints.
    pub(crate) fn from_envelope(url: impl Into<String>, client: Arc<ApiClient>, envelope: &Value) -> Self {
        let mut attrs = HashMap::new();
        if let Some(fields) = envelope.as_object() {
            for (name, value) in fields {
                if name == "__metadata" || value.is_object() {
                    continue;
                }
                attrs.insert(name.clone(), AttrValue::Scalar(value.clone()));
            }
        }
        Self {
            url: url.into(),
            client,
            attrs,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    fn attribute_url(&self, name: &str) -> String {
        format!("{}/{}", self.url, name)
    }

    /// Resolve an attribute, fetching it on first access and serving it from
    /// the node's cache afterwards.
    pub async fn attribute(&mut self, name: &str) -> Result<AttrValue> {
        if let Some(value) = self.attrs.get(name) {
            debug!(name, "attribute served from cache");
            return Ok(value.clone());
        }
        let mut lazy = self.lazy_attribute(name);
        let value = lazy.value().await?;
        self.attrs.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Resolve an attribute expected to be a string scalar.
    pub async fn string_attribute(&mut self, name: &str) -> Result<String> {
        self.attribute(name)
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or(SharePointError::InvalidResponse)
    }

    /// The `ServerRelativeUrl` attribute common to webs, folders, and files.
    pub async fn server_relative_url(&mut self) -> Result<String> {
        self.string_attribute("ServerRelativeUrl").await
    }

    /// An unresolved handle on an attribute endpoint; nothing is fetched.
    /// Useful for posting to a collection attribute's create endpoint without
    /// paying for a read of the collection itself.
    pub fn lazy_attribute(&self, name: &str) -> LazyAttribute {
        LazyAttribute::new(self.attribute_url(name), name, Arc::clone(&self.client))
    }

    /// Address a method-call endpoint without issuing a request. Many
    /// `GetXByY` endpoints are addressable without ever being fetched.
    pub fn method_get(&self, method: &str, args: &[Arg], kwargs: &[(&str, Arg)]) -> Node {
        let url = format!("{}{}", self.url, make_call_string(method, args, kwargs));
        Node::new(url, Arc::clone(&self.client))
    }

    /// A deferred POST against a method-call endpoint.
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

    /// Dispatch a child envelope with this node's client.
    pub(crate) fn dispatch(&self, envelope: &Value) -> Resource {
        crate::fs::dispatch::dispatch(envelope, Arc::clone(&self.client))
    }

    #[cfg(test)]
    pub(crate) fn prime(&mut self, name: &str, value: AttrValue) {
        self.attrs.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpClient;
    use serde_json::json;

    fn test_client() -> Arc<ApiClient> {
        // Unroutable address: any fetch attempt errors out immediately, so a
        // successful attribute read proves it came from the cache.
        Arc::new(ApiClient::new(
            HttpClient::new().unwrap(),
            "http://127.0.0.1:9/_api".to_string(),
        ))
    }

    #[test]
    fn test_string_argument_quoting() {
        assert_eq!(make_call_string("m", &[Arg::from("it's")], &[]), "/m('it%27%27s')");
        assert_eq!(
            make_call_string("m", &[Arg::from("O'Brien")], &[]),
            "/m('O%27%27Brien')"
        );
        assert_eq!(make_call_string("m", &[Arg::from("plain")], &[]), "/m('plain')");
    }

    #[test]
    fn test_uuid_argument_quoting() {
        let id = Uuid::parse_str("c5d6e38f-66e7-4abd-bd4e-937ba9d10d17").unwrap();
        assert_eq!(
            make_call_string("m", &[Arg::Uuid(id)], &[]),
            "/m(guid'c5d6e38f-66e7-4abd-bd4e-937ba9d10d17')"
        );
    }

    #[test]
    fn test_mixed_call_string() {
        assert_eq!(
            make_call_string(
                "add",
                &[],
                &[("url", Arg::from("report.pdf")), ("overwrite", Arg::Bool(true))],
            ),
            "/add(url='report.pdf', overwrite=true)"
        );
        assert_eq!(
            make_call_string("CheckIn", &[], &[("comment", Arg::from("")), ("checkInType", Arg::Int(0))]),
            "/CheckIn(comment='', checkInType=0)"
        );
        assert_eq!(
            make_call_string("GetFolderByServerRelativeUrl", &[Arg::from("/sites/a")], &[]),
            "/GetFolderByServerRelativeUrl('/sites/a')"
        );
    }

    #[test]
    fn test_from_envelope_skips_deferred_objects() {
        let envelope = json!({
            "__metadata": {"type": "SP.Folder", "uri": "https://sp/_api/Web/f"},
            "Name": "docs",
            "ItemCount": 3,
            "Files": {"__deferred": {"uri": "https://sp/_api/Web/f/Files"}}
        });
        let node = Node::from_envelope("https://sp/_api/Web/f", test_client(), &envelope);

        assert_eq!(node.attrs.get("Name").and_then(AttrValue::as_str), Some("docs"));
        assert_eq!(node.attrs.get("ItemCount").and_then(AttrValue::as_i64), Some(3));
        // Deferred object fields resolve lazily, metadata is consumed.
        assert!(!node.attrs.contains_key("Files"));
        assert!(!node.attrs.contains_key("__metadata"));
    }

    #[tokio::test]
    async fn test_cached_attribute_is_not_refetched() {
        let envelope = json!({
            "__metadata": {"type": "SP.File", "uri": "http://127.0.0.1:9/_api/Web/f"},
            "Name": "report.pdf"
        });
        let mut node = Node::from_envelope("http://127.0.0.1:9/_api/Web/f", test_client(), &envelope);

        // Two reads, both served from cache; a fetch would hit the
        // unroutable client and error.
        assert_eq!(node.attribute("Name").await.unwrap().as_str(), Some("report.pdf"));
        assert_eq!(node.attribute("Name").await.unwrap().as_str(), Some("report.pdf"));

        // An uncached name does go to the network.
        assert!(node.attribute("Length").await.is_err());
    }

    #[test]
    fn test_method_get_is_addressing_only() {
        let node = Node::new("https://sp/_api/Web", test_client());
        let addressed = node.method_get("GetFileById", &[], &[("uniqueId", Arg::Int(7))]);
        assert_eq!(addressed.url(), "https://sp/_api/Web/GetFileById(uniqueId=7)");
        assert!(addressed.attrs.is_empty());
    }
}
