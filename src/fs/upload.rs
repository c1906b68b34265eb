//! Chunked upload session state machine.

use std::path::Path;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SharePointError};
use crate::fs::node::{Arg, Node};

/// Bytes transferred per upload call.
pub const CHUNK_SIZE: u64 = 1024 * 1024;

/// Protocol state of a chunked upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Started,
    Continuing,
    Finished,
    Cancelled,
}

/// Which remote operation carries a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkCall {
    Start,
    Continue,
    Finish,
}

impl ChunkCall {
    /// The finishing call fires for the chunk read at
    /// `offset >= size - chunk_size`, so a file sized at an exact multiple of
    /// the chunk size routes its last full chunk through finish instead of a
    /// trailing empty continue.
    pub(crate) fn classify(first: bool, offset: u64, size: u64, chunk_size: u64) -> Self {
        if first {
            ChunkCall::Start
        } else if offset >= size.saturating_sub(chunk_size) {
            ChunkCall::Finish
        } else {
            ChunkCall::Continue
        }
    }
}

/// Drives the start/continue/finish/cancel protocol for one large-file
/// upload against an already-created file node.
///
/// Chunk calls are issued strictly in increasing offset order; the server
/// rejects out-of-order offsets within a session.
pub struct UploadSession {
    id: Uuid,
    file: Node,
    size: u64,
    chunk_size: u64,
    offset: u64,
    state: UploadState,
}

impl UploadSession {
    /// Bind a new session to the target file node. The session id is
    /// generated locally and identifies the transfer on every call.
    pub fn new(file: Node, size: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            size,
            chunk_size: CHUNK_SIZE,
            offset: 0,
            state: UploadState::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Stream `local_path` through the session.
    ///
    /// On any read or transmit failure the server is informed with a cancel
    /// call before the original error is surfaced; a failure of the cancel
    /// call itself is logged and never masks the original cause.
    pub async fn run(&mut self, local_path: &Path) -> Result<()> {
        match self.transfer(local_path).await {
            Ok(()) => Ok(()),
            Err(source) => {
                self.state = UploadState::Cancelled;
                let cancel = self.file.method_post("cancelupload", &[Arg::Uuid(self.id)], &[], None);
                if let Err(cancel_err) = cancel.send().await {
                    warn!(error = %cancel_err, "cancel-upload notification failed");
                }
                Err(SharePointError::UploadAborted(Box::new(source)))
            }
        }
    }

    async fn transfer(&mut self, local_path: &Path) -> Result<()> {
        let mut input = tokio::fs::File::open(local_path).await?;
        let mut first = true;
        loop {
            let remaining = self.size - self.offset;
            let len = remaining.min(self.chunk_size) as usize;
            let mut chunk = vec![0u8; len];
            input.read_exact(&mut chunk).await?;

            let call = ChunkCall::classify(first, self.offset, self.size, self.chunk_size);
            let body = Some(Bytes::from(chunk));
            match call {
                ChunkCall::Start => {
                    debug!(id = %self.id, len, "startupload");
                    self.file
                        .method_post("startupload", &[], &[("uploadId", Arg::Uuid(self.id))], body)
                        .send()
                        .await?;
                    self.state = UploadState::Started;
                }
                ChunkCall::Continue => {
                    debug!(id = %self.id, offset = self.offset, len, "continueupload");
                    self.file
                        .method_post(
                            "continueupload",
                            &[],
                            &[
                                ("uploadId", Arg::Uuid(self.id)),
                                ("fileOffset", Arg::Int(self.offset as i64)),
                            ],
                            body,
                        )
                        .send()
                        .await?;
                    self.state = UploadState::Continuing;
                }
                ChunkCall::Finish => {
                    debug!(id = %self.id, offset = self.offset, len, "finishupload");
                    self.file
                        .method_post(
                            "finishupload",
                            &[],
                            &[
                                ("uploadId", Arg::Uuid(self.id)),
                                ("fileOffset", Arg::Int(self.offset as i64)),
                            ],
                            body,
                        )
                        .send()
                        .await?;
                    self.state = UploadState::Finished;
                }
            }
            self.offset += len as u64;
            first = false;
            if self.state == UploadState::Finished {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::http::HttpClient;
    use std::sync::Arc;

    const MIB: u64 = 1024 * 1024;

    /// Replay the transfer loop's arithmetic without any network, returning
    /// the sequence of (call, offset, chunk length) it would issue.
    fn plan(size: u64, chunk_size: u64) -> Vec<(ChunkCall, u64, u64)> {
        let mut calls = Vec::new();
        let mut offset = 0;
        let mut first = true;
        loop {
            let len = (size - offset).min(chunk_size);
            let call = ChunkCall::classify(first, offset, size, chunk_size);
            calls.push((call, offset, len));
            offset += len;
            first = false;
            if call == ChunkCall::Finish {
                return calls;
            }
        }
    }

    #[test]
    fn test_final_partial_chunk_routes_through_finish() {
        // One byte past two full chunks.
        let calls = plan(2 * MIB + 1, MIB);
        assert_eq!(
            calls,
            vec![
                (ChunkCall::Start, 0, MIB),
                (ChunkCall::Continue, MIB, MIB),
                (ChunkCall::Finish, 2 * MIB, 1),
            ]
        );
        // The finish condition fired exactly once.
        assert_eq!(calls.iter().filter(|(c, _, _)| *c == ChunkCall::Finish).count(), 1);
    }

    #[test]
    fn test_exact_multiple_finishes_on_full_chunk() {
        // No empty trailing continue+finish pair.
        assert_eq!(
            plan(2 * MIB, MIB),
            vec![(ChunkCall::Start, 0, MIB), (ChunkCall::Finish, MIB, MIB)]
        );
    }

    #[test]
    fn test_short_second_chunk() {
        assert_eq!(
            plan(MIB + 512, MIB),
            vec![(ChunkCall::Start, 0, MIB), (ChunkCall::Finish, MIB, 512)]
        );
    }

    #[test]
    fn test_long_transfer_orders_offsets() {
        let calls = plan(10 * MIB + 3, MIB);
        assert_eq!(calls.len(), 11);
        assert!(matches!(calls[0], (ChunkCall::Start, 0, _)));
        assert!(calls[1..10].iter().all(|(c, _, _)| *c == ChunkCall::Continue));
        assert_eq!(calls[10], (ChunkCall::Finish, 10 * MIB, 3));
        // Strictly increasing offsets.
        assert!(calls.windows(2).all(|w| w[0].1 < w[1].1));
    }

    #[test]
    fn test_new_session_is_idle() {
        let node = Node::new(
            "http://127.0.0.1:9/_api/Web/f",
            Arc::new(ApiClient::new(
                HttpClient::new().unwrap(),
                "http://127.0.0.1:9/_api".to_string(),
            )),
        );
        let session = UploadSession::new(node, 5 * MIB);
        assert_eq!(session.state(), UploadState::Idle);
        assert_eq!(session.offset(), 0);
    }
}
