//! Folder nodes: listing, tree traversal, bulk download, upload.

use std::ops::{Deref, DerefMut};
use std::path::Path;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};

use crate::error::{Result, SharePointError};
use crate::fs::dispatch::Resource;
use crate::fs::file::File;
use crate::fs::node::{Arg, AttrValue, Node};
use crate::fs::upload::{UploadSession, CHUNK_SIZE};

/// Extensions the server refuses to serve raw content for; fetching the
/// `$value` of a page returns 403.
const EXCLUDED_DOWNLOAD_EXTENSIONS: &[&str] = &["aspx"];

/// `CheckOutType` value meaning the file is not checked out.
const NO_CHECKOUT: i64 = 2;

/// One step of a tree walk: a folder together with its direct children.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub folder: Folder,
    pub folders: Vec<Folder>,
    pub files: Vec<File>,
}

/// A folder on the server.
#[derive(Debug, Clone)]
pub struct Folder {
    pub(crate) node: Node,
}

impl Folder {
    pub fn from_node(node: Node) -> Self {
        Self { node }
    }

    /// Child folders, fetched on first call.
    pub async fn folders(&mut self) -> Result<Vec<Folder>> {
        match self.node.attribute("Folders").await? {
            AttrValue::Collection(items) => {
                Ok(items.into_iter().map(Resource::into_folder).collect())
            }
            AttrValue::Null => Ok(Vec::new()),
            _ => Err(SharePointError::InvalidResponse),
        }
    }

    /// Files directly inside this folder, fetched on first call.
    pub async fn files(&mut self) -> Result<Vec<File>> {
        match self.node.attribute("Files").await? {
            AttrValue::Collection(items) => Ok(items.into_iter().map(Resource::into_file).collect()),
            AttrValue::Null => Ok(Vec::new()),
            _ => Err(SharePointError::InvalidResponse),
        }
    }

    /// Every direct child: files first, then sub-folders.
    pub async fn listdir(&mut self) -> Result<Vec<Resource>> {
        let mut entries: Vec<Resource> = self.files().await?.into_iter().map(Resource::File).collect();
        entries.extend(self.folders().await?.into_iter().map(Resource::Folder));
        Ok(entries)
    }

    /// Walk the subtree rooted here, collecting one [`WalkEntry`] per visited
    /// folder. Pre-order when `topdown`, post-order otherwise.
    ///
    /// `maxdepth` bounds the descent: `Some(0)` and `Some(1)` visit only this
    /// folder, `None` and negative values are unbounded. Each call resolves
    /// the tree afresh from this folder's cache state; the returned sequence
    /// is complete, not resumable mid-iteration.
    pub async fn walk(&mut self, topdown: bool, maxdepth: Option<i64>) -> Result<Vec<WalkEntry>> {
        let mut entries = Vec::new();
        self.walk_into(topdown, maxdepth, &mut entries).await?;
        Ok(entries)
    }

    fn walk_into<'a>(
        &'a mut self,
        topdown: bool,
        maxdepth: Option<i64>,
        out: &'a mut Vec<WalkEntry>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut folders = self.folders().await?;
            let files = self.files().await?;

            if topdown {
                out.push(WalkEntry {
                    folder: self.clone(),
                    folders: folders.clone(),
                    files: files.clone(),
                });
            }

            let descend = match maxdepth {
                None => true,
                Some(depth) => depth < 0 || depth > 1,
            };
            if descend {
                let child_depth = match maxdepth {
                    Some(depth) if depth != 0 => Some(depth - 1),
                    _ => None,
                };
                for child in &mut folders {
                    child.walk_into(topdown, child_depth, out).await?;
                }
            }

            if !topdown {
                out.push(WalkEntry {
                    folder: self.clone(),
                    folders,
                    files,
                });
            }
            Ok(())
        }
        .boxed()
    }

    /// Download every file directly inside this folder into `destination`,
    /// skipping server-forbidden page types and ignoring sub-folders.
    pub async fn download_files(&mut self, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();
        for mut file in self.files().await? {
            let name = file.name().await?;
            if is_excluded(&name) {
                debug!(name, "skipping excluded file type");
                continue;
            }
            file.download(destination).await?;
        }
        Ok(())
    }

    /// Mirror the remote subtree below this folder into `destination`,
    /// recreating the folder structure locally and limiting recursion to
    /// `maxdepth` levels.
    pub async fn download(&mut self, destination: impl AsRef<Path>, maxdepth: Option<i64>) -> Result<()> {
        let destination = destination.as_ref();
        let relative_root = self.node.server_relative_url().await?;
        let base = parent_path(&relative_root);
        info!(folder = %relative_root, "starting folder download");

        for mut entry in self.walk(true, maxdepth).await? {
            let folder_path = entry.folder.node.server_relative_url().await?;
            let relative = folder_path
                .strip_prefix(&base)
                .unwrap_or(folder_path.as_str())
                .trim_start_matches('/');
            entry.folder.download_files(destination.join(relative)).await?;
        }
        Ok(())
    }

    /// Upload a local file into this folder.
    ///
    /// Files up to one chunk go up in a single create call carrying the
    /// bytes. Larger files are created empty first (the server requires the
    /// file to exist before streaming) and then streamed through an
    /// [`UploadSession`]. A failure of the create call surfaces as
    /// [`SharePointError::UploadCreate`]. After the content is in place, a
    /// checked-out file is checked back in with an empty minor-version
    /// comment.
    pub async fn upload_file(&mut self, local_path: impl AsRef<Path>, overwrite: bool) -> Result<File> {
        let local_path = local_path.as_ref();
        let file_name = local_path
            .file_name()
            .ok_or_else(|| {
                SharePointError::Custom(format!("invalid upload path: {}", local_path.display()))
            })?
            .to_string_lossy()
            .to_string();
        let size = tokio::fs::metadata(local_path).await?.len();
        let streaming = size > CHUNK_SIZE;

        let body = if streaming {
            None
        } else {
            Some(Bytes::from(tokio::fs::read(local_path).await?))
        };

        let create = self.node.lazy_attribute("Files").method_post(
            "add",
            &[],
            &[("url", Arg::from(file_name.as_str())), ("overwrite", Arg::Bool(overwrite))],
            body,
        );
        let payload = create
            .send()
            .await
            .map_err(|e| SharePointError::UploadCreate(Box::new(e)))?;
        let mut file = self.node.dispatch(&payload).into_file();

        if streaming {
            let mut session = UploadSession::new(file.node.clone(), size);
            session.run(local_path).await?;
        }
        info!(file = %file_name, size, "uploaded file");

        if file.node.attribute("CheckOutType").await?.as_i64() != Some(NO_CHECKOUT) {
            debug!(file = %file_name, "file is checked out, performing minor check-in");
            file.node
                .method_post(
                    "CheckIn",
                    &[],
                    &[("comment", Arg::from("")), ("checkInType", Arg::Int(0))],
                    None,
                )
                .send()
                .await?;
        }
        Ok(file)
    }
}

fn is_excluded(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| {
            EXCLUDED_DOWNLOAD_EXTENSIONS
                .iter()
                .any(|excluded| ext.eq_ignore_ascii_case(excluded))
        })
        .unwrap_or(false)
}

/// Parent of a server-relative path, `os.path.dirname` style.
fn parent_path(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

impl Deref for Folder {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}

impl DerefMut for Folder {
    fn deref_mut(&mut self) -> &mut Node {
        &mut self.node
    }
}
