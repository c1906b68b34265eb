//! Site entry point: the `Web` endpoint and its lookup helpers.

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;

use url::Url;
use uuid::Uuid;

use crate::api::ApiClient;
use crate::error::{Result, SharePointError};
use crate::fs::file::File;
use crate::fs::folder::Folder;
use crate::fs::node::{Arg, Node};
use crate::http::HttpClient;

/// The `Web` root of a SharePoint site. Every other object is ultimately
/// reached through one of these.
#[derive(Debug, Clone)]
pub struct Site {
    node: Node,
}

impl Site {
    /// Discover the site's API root over `http` and open it.
    pub async fn connect(site_url: &str, http: HttpClient) -> Result<Self> {
        let client = Arc::new(ApiClient::connect(site_url, http).await?);
        Ok(Self::open(client))
    }

    /// Bind to the `Web` endpoint of an already-connected client.
    pub fn open(client: Arc<ApiClient>) -> Self {
        let url = format!("{}/Web", client.api_url());
        Self {
            node: Node::new(url, client),
        }
    }

    /// Resolve a folder by server-relative path. No request is issued until
    /// the folder is first read.
    pub async fn folder(&mut self, path: &str) -> Result<Folder> {
        let path = self.absolute_path(path).await?;
        let node = self
            .node
            .method_get("GetFolderByServerRelativeUrl", &[Arg::from(path)], &[]);
        Ok(Folder::from_node(node))
    }

    /// Resolve a file by server-relative path.
    pub async fn file_by_path(&mut self, path: &str) -> Result<File> {
        let path = self.absolute_path(path).await?;
        let node = self.node.method_get(
            "GetFileByServerRelativeUrl",
            &[],
            &[("ServerRelativeUrl", Arg::from(path))],
        );
        Ok(File::from_node(node))
    }

    /// Resolve a file by its unique id.
    pub fn file_by_id(&self, id: Uuid) -> File {
        let node = self
            .node
            .method_get("GetFileById", &[], &[("uniqueId", Arg::Uuid(id))]);
        File::from_node(node)
    }

    /// Resolve a file from a browser/share URL.
    ///
    /// Viewer URLs carry either a `sourcedoc` query item (a brace-wrapped
    /// unique id) or a `SourceUrl` item (a full document URL); bare URLs are
    /// taken as the document path itself. Prefer [`Site::file_by_path`] or
    /// [`Site::file_by_id`] when the path or id is already known.
    pub async fn file_from_share_url(&mut self, share_url: &str) -> Result<File> {
        let parsed = Url::parse(share_url)
            .map_err(|e| SharePointError::Custom(format!("invalid share URL: {}", e)))?;
        let query: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        if let Some((_, sourcedoc)) = query.iter().find(|(key, _)| key == "sourcedoc") {
            let id = sourcedoc.trim_matches(|c| c == '{' || c == '}');
            let id = Uuid::parse_str(id)
                .map_err(|e| SharePointError::Custom(format!("invalid sourcedoc id: {}", e)))?;
            return Ok(self.file_by_id(id));
        }
        if let Some((_, source)) = query.iter().find(|(key, _)| key == "SourceUrl") {
            let path = path_from_source_url(source);
            return self.file_by_path(&path).await;
        }
        self.file_by_path(parsed.path()).await
    }

    /// Convenience: resolve a file by path and download it into `destination`.
    pub async fn download_file(&mut self, remote_path: &str, destination: impl AsRef<Path>) -> Result<()> {
        let mut file = self.file_by_path(remote_path).await?;
        file.download(destination).await
    }

    /// Prefix the site's server-relative root when `path` lacks it.
    async fn absolute_path(&mut self, path: &str) -> Result<String> {
        let root = self.node.server_relative_url().await?;
        if path.starts_with(&root) {
            Ok(path.to_string())
        } else {
            Ok(format!("{}/{}", root, path.trim_matches('/')))
        }
    }
}

/// Strip scheme and host from a `SourceUrl` query value, and map the `.xlsf`
/// extension the viewer substitutes back to `.xls`.
fn path_from_source_url(source: &str) -> String {
    let parts: Vec<&str> = source.split('/').collect();
    let tail: Vec<&str> = parts.into_iter().skip(3).collect();
    let path = format!("/{}", tail.join("/"));
    match path.strip_suffix(".xlsf") {
        Some(stem) => format!("{}.xls", stem),
        None => path,
    }
}

impl Deref for Site {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}

impl DerefMut for Site {
    fn deref_mut(&mut self) -> &mut Node {
        &mut self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::node::AttrValue;
    use serde_json::json;

    fn test_site() -> Site {
        let client = Arc::new(ApiClient::new(
            HttpClient::new().unwrap(),
            "https://sp.example.com/sites/team/_api".to_string(),
        ));
        let mut site = Site::open(client);
        site.node
            .prime("ServerRelativeUrl", AttrValue::Scalar(json!("/sites/team")));
        site
    }

    #[test]
    fn test_open_binds_web_endpoint() {
        let site = test_site();
        assert_eq!(site.node.url(), "https://sp.example.com/sites/team/_api/Web");
    }

    #[tokio::test]
    async fn test_folder_prefixes_site_path() {
        let mut site = test_site();
        let folder = site.folder("Shared Documents").await.unwrap();
        assert_eq!(
            folder.url(),
            "https://sp.example.com/sites/team/_api/Web/GetFolderByServerRelativeUrl('/sites/team/Shared Documents')"
        );
    }

    #[tokio::test]
    async fn test_absolute_path_is_not_doubled() {
        let mut site = test_site();
        let file = site.file_by_path("/sites/team/docs/a.txt").await.unwrap();
        assert_eq!(
            file.url(),
            "https://sp.example.com/sites/team/_api/Web/GetFileByServerRelativeUrl(ServerRelativeUrl='/sites/team/docs/a.txt')"
        );
    }

    #[test]
    fn test_file_by_id_renders_guid() {
        let site = test_site();
        let id = Uuid::parse_str("c5d6e38f-66e7-4abd-bd4e-937ba9d10d17").unwrap();
        let file = site.file_by_id(id);
        assert_eq!(
            file.url(),
            "https://sp.example.com/sites/team/_api/Web/GetFileById(uniqueId=guid'c5d6e38f-66e7-4abd-bd4e-937ba9d10d17')"
        );
    }

    #[tokio::test]
    async fn test_share_url_with_sourcedoc() {
        let mut site = test_site();
        let file = site
            .file_from_share_url(
                "https://sp.example.com/sites/team/_layouts/15/Doc.aspx?sourcedoc=%7Bc5d6e38f-66e7-4abd-bd4e-937ba9d10d17%7D&file=x.docx",
            )
            .await
            .unwrap();
        assert!(file.url().contains("GetFileById(uniqueId=guid'c5d6e38f-66e7-4abd-bd4e-937ba9d10d17')"));
    }

    #[tokio::test]
    async fn test_share_url_with_source_url() {
        let mut site = test_site();
        let file = site
            .file_from_share_url(
                "https://sp.example.com/sites/team/_layouts/15/xlviewer.aspx?SourceUrl=https://sp.example.com/sites/team/docs/book.xlsf",
            )
            .await
            .unwrap();
        assert!(file
            .url()
            .contains("GetFileByServerRelativeUrl(ServerRelativeUrl='/sites/team/docs/book.xls')"));
    }

    #[test]
    fn test_path_from_source_url() {
        assert_eq!(
            path_from_source_url("https://sp.example.com/sites/team/docs/book.xlsf"),
            "/sites/team/docs/book.xls"
        );
        assert_eq!(
            path_from_source_url("https://sp.example.com/sites/team/docs/plain.docx"),
            "/sites/team/docs/plain.docx"
        );
    }
}
