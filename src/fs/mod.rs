//! Remote object model: lazy nodes, typed dispatch, tree and transfer
//! operations.

pub mod dispatch;
pub mod file;
pub mod folder;
pub mod lazy;
pub mod node;
pub mod site;
pub mod upload;

pub use dispatch::Resource;
pub use file::File;
pub use folder::{Folder, WalkEntry};
pub use lazy::{LazyAttribute, PendingPost};
pub use node::{Arg, AttrValue, Node};
pub use site::Site;
pub use upload::{UploadSession, UploadState, CHUNK_SIZE};
