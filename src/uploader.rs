//! Fire-and-forget chunk uploads with per-chunk outcome reporting.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::Result;
use crate::api::ServiceApi;
use crate::types::FrameChunk;

/// Result of one upload, tagged with the session generation it belongs to.
#[derive(Debug)]
pub struct UploadOutcome {
    pub generation: u64,
    /// Submission order within the controller's lifetime
    pub sequence: u64,
    pub bytes: usize,
    pub result: Result<()>,
}

impl UploadOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Dispatches each chunk as its own request.
///
/// Uploads run concurrently and may complete out of order. A failed chunk is
/// never retried; the next captured frame supersedes it.
pub struct ChunkUploader {
    api: Arc<dyn ServiceApi>,
    outcomes: mpsc::UnboundedSender<UploadOutcome>,
    next_sequence: u64,
}

impl ChunkUploader {
    pub fn new(api: Arc<dyn ServiceApi>, outcomes: mpsc::UnboundedSender<UploadOutcome>) -> Self {
        Self { api, outcomes, next_sequence: 0 }
    }

    /// Start uploading `chunk` to `session_id` and return its sequence number.
    ///
    /// Never waits for the transfer; the outcome arrives on the outcome channel.
    pub fn send(&mut self, generation: u64, session_id: &str, chunk: FrameChunk) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let api = Arc::clone(&self.api);
        let outcomes = self.outcomes.clone();
        let session_id = session_id.to_string();
        let bytes = chunk.len();
        trace!("Uploading chunk #{} ({} bytes) to {}", sequence, bytes, session_id);

        tokio::spawn(async move {
            let result = match api.upload_chunk(&session_id, chunk.payload).await {
                Ok(ack) => ack.into_result("upload chunk"),
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                warn!("Chunk #{} ({} bytes) failed: {}", sequence, bytes, e);
            }
            // The controller may already be gone; the outcome is moot then
            let _ = outcomes.send(UploadOutcome { generation, sequence, bytes, result });
        });

        sequence
    }

    /// Number of chunks dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.next_sequence
    }
}
