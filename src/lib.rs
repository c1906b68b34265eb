//! # sharepointlib
//!
//! Rust client library for the SharePoint REST API.
//!
//! Remote objects (webs, folders, files) are mirrored by lazy local proxies:
//! reading an attribute fetches it on first access and caches it on the node,
//! response envelopes dispatch into typed [`Folder`]/[`File`] variants, and
//! every mutating call carries a form digest that is renewed transparently
//! when it expires.
//!
//! ## Features
//!
//! - **Lazy attribute resolution** with per-node memoization: an attribute is
//!   fetched at most once per node, collections dispatch into typed variants.
//! - **Tree operations**: depth-bounded pre/post-order walking and recursive
//!   folder download mirroring the remote structure locally.
//! - **File transfers**: raw-content download via the `$value` sub-resource;
//!   uploads that stream large files in 1 MiB chunks through an explicit
//!   start/continue/finish/cancel session.
//! - **Digest lifecycle**: mutation authorization checked and renewed before
//!   every POST, shared by all nodes of a site.
//!
//! Requests are issued strictly sequentially; the library never runs
//! requests in parallel and never retries on its own.
//!
//! Login is out of scope: authentication is established externally and the
//! resulting `reqwest::Client` (with its cookie store) is handed over through
//! [`HttpClient::from_client`].
//!
//! ## Example
//!
//! ```no_run
//! use sharepointlib::{HttpClient, Site};
//!
//! # async fn example(authenticated: reqwest::Client) -> sharepointlib::Result<()> {
//! let http = HttpClient::from_client(authenticated);
//! let mut site = Site::connect("https://sharepoint.example.com/sites/team", http).await?;
//!
//! // Mirror a document library three levels deep.
//! let mut folder = site.folder("Shared Documents").await?;
//! folder.download("./mirror", Some(3)).await?;
//!
//! // Upload; files beyond one chunk stream through an upload session.
//! folder.upload_file("report.pdf", true).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod error;
pub mod fs;
pub mod http;

// Re-export commonly used types
pub use api::ApiClient;
pub use error::{Result, SharePointError};
pub use fs::{
    Arg, AttrValue, File, Folder, LazyAttribute, Node, PendingPost, Resource, Site, UploadSession,
    UploadState, WalkEntry, CHUNK_SIZE,
};
pub use http::HttpClient;
