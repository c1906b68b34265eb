//! File nodes and raw content download.

use std::ops::{Deref, DerefMut};
use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::Result;
use crate::fs::node::Node;

/// A file on the server.
#[derive(Debug, Clone)]
pub struct File {
    pub(crate) node: Node,
}

impl File {
    pub fn from_node(node: Node) -> Self {
        Self { node }
    }

    /// The remote `Name` attribute.
    pub async fn name(&mut self) -> Result<String> {
        self.node.string_attribute("Name").await
    }

    /// Download this file's raw bytes into the `destination` directory,
    /// creating it when missing. The local file is named after the remote
    /// `Name` attribute.
    ///
    /// A transport failure mid-stream propagates to the caller; a truncated
    /// local file may remain behind.
    pub async fn download(&mut self, destination: impl AsRef<Path>) -> Result<()> {
        let name = self.name().await?;
        debug!(name, "starting download");

        // $value serves the raw byte stream instead of a JSON envelope.
        let url = format!("{}/$value", self.node.url());
        let response = self.node.client().get_raw(&url).await?;

        let destination = destination.as_ref();
        tokio::fs::create_dir_all(destination).await?;
        let target = destination.join(&name);
        let mut output = tokio::fs::File::create(&target).await?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            output.write_all(&chunk?).await?;
        }
        output.flush().await?;

        info!(target = %target.display(), "download complete");
        Ok(())
    }
}

impl Deref for File {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}

impl DerefMut for File {
    fn deref_mut(&mut self) -> &mut Node {
        &mut self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::fs::node::AttrValue;
    use crate::http::HttpClient;
    use serde_json::json;
    use std::sync::Arc;

    fn test_node(url: &str) -> Node {
        Node::new(
            url,
            Arc::new(ApiClient::new(
                HttpClient::new().unwrap(),
                "http://127.0.0.1:9/_api".to_string(),
            )),
        )
    }

    #[tokio::test]
    async fn test_name_from_cache() {
        let mut file = File::from_node(test_node("http://127.0.0.1:9/_api/Web/f"));
        file.node.prime("Name", AttrValue::Scalar(json!("report.pdf")));
        assert_eq!(file.name().await.unwrap(), "report.pdf");
    }

    #[tokio::test]
    async fn test_download_failure_leaves_no_file() {
        // Name is cached, but the $value fetch hits an unroutable address and
        // must surface the transport failure before anything is written.
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::from_node(test_node("http://127.0.0.1:9/_api/Web/f"));
        file.node.prime("Name", AttrValue::Scalar(json!("report.pdf")));

        assert!(file.download(dir.path()).await.is_err());
        assert!(!dir.path().join("report.pdf").exists());
    }
}
