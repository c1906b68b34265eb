//! Maps response metadata type tags onto concrete node variants.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::api::ApiClient;
use crate::fs::file::File;
use crate::fs::folder::Folder;
use crate::fs::node::Node;

/// A dispatched remote entity: the concrete variant when the metadata type
/// tag is registered, a generic node otherwise. The generic fallback exposes
/// the same attribute-access contract as the specialized variants.
#[derive(Debug, Clone)]
pub enum Resource {
    Folder(Folder),
    File(File),
    Node(Node),
}

impl Resource {
    pub fn node(&self) -> &Node {
        match self {
            Resource::Folder(folder) => &folder.node,
            Resource::File(file) => &file.node,
            Resource::Node(node) => node,
        }
    }

    pub fn node_mut(&mut self) -> &mut Node {
        match self {
            Resource::Folder(folder) => &mut folder.node,
            Resource::File(file) => &mut file.node,
            Resource::Node(node) => node,
        }
    }

    /// View this entity as a folder. Entries of a `Folders` collection are
    /// folders even when their envelope carried an unregistered tag.
    pub fn into_folder(self) -> Folder {
        match self {
            Resource::Folder(folder) => folder,
            Resource::File(file) => Folder::from_node(file.node),
            Resource::Node(node) => Folder::from_node(node),
        }
    }

    /// View this entity as a file, the `Files`-collection counterpart of
    /// [`Resource::into_folder`].
    pub fn into_file(self) -> File {
        match self {
            Resource::File(file) => file,
            Resource::Folder(folder) => File::from_node(folder.node),
            Resource::Node(node) => File::from_node(node),
        }
    }
}

/// Instantiate the concrete variant for a response envelope.
///
/// The registry is closed and explicit: `SP.Folder` and `SP.File` map to
/// their specializations, every other tag falls back to the generic node.
pub(crate) fn dispatch(envelope: &Value, client: Arc<ApiClient>) -> Resource {
    let tag = envelope
        .pointer("/__metadata/type")
        .and_then(Value::as_str)
        .map(normalize_tag)
        .unwrap_or_default();
    let url = envelope
        .pointer("/__metadata/uri")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let node = Node::from_envelope(url, client, envelope);
    match tag.as_str() {
        "SPFolder" => Resource::Folder(Folder::from_node(node)),
        "SPFile" => Resource::File(File::from_node(node)),
        other => {
            if !other.is_empty() {
                debug!(tag = other, "no specialized variant registered, using generic node");
            }
            Resource::Node(node)
        }
    }
}

/// Tags arrive dotted (`SP.Folder`); lookup keys are the dotless form.
fn normalize_tag(tag: &str) -> String {
    tag.replace('.', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpClient;
    use serde_json::json;

    fn test_client() -> Arc<ApiClient> {
        Arc::new(ApiClient::new(
            HttpClient::new().unwrap(),
            "http://127.0.0.1:9/_api".to_string(),
        ))
    }

    #[test]
    fn test_tag_normalization() {
        assert_eq!(normalize_tag("SP.Folder"), "SPFolder");
        assert_eq!(normalize_tag("SP.Data.DocumentsItem"), "SPDataDocumentsItem");
    }

    #[test]
    fn test_registered_tags() {
        let folder = dispatch(
            &json!({"__metadata": {"type": "SP.Folder", "uri": "https://sp/_api/Web/f"}}),
            test_client(),
        );
        assert!(matches!(folder, Resource::Folder(_)));
        assert_eq!(folder.node().url(), "https://sp/_api/Web/f");

        let file = dispatch(
            &json!({"__metadata": {"type": "SP.File", "uri": "https://sp/_api/Web/g"}}),
            test_client(),
        );
        assert!(matches!(file, Resource::File(_)));
    }

    #[tokio::test]
    async fn test_unregistered_tag_falls_back_to_generic_node() {
        let envelope = json!({
            "__metadata": {"type": "SP.ListItem", "uri": "https://sp/_api/Web/item"},
            "Title": "minutes"
        });
        let mut resource = dispatch(&envelope, test_client());
        assert!(matches!(resource, Resource::Node(_)));

        // Same attribute-access contract as the specialized variants.
        let title = resource.node_mut().attribute("Title").await.unwrap();
        assert_eq!(title.as_str(), Some("minutes"));
    }
}
