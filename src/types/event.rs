//! Notifications delivered to the host.

use super::ProcessedChunk;

/// Lifecycle and data notifications, delivered in order on a single channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The service acknowledged the session
    Started { session_id: String },

    /// The session stopped (regardless of the stop response)
    Stopped,

    /// Outcome of one chunk upload
    ChunkResult { success: bool },

    /// A processed frame arrived over the control channel
    ProcessedFrame(ProcessedChunk),

    /// A transport or protocol error
    Error { message: String },
}
