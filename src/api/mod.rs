//! Request/response interface of the processing service.

mod http;
mod wire;

pub use http::HttpServiceApi;
pub use wire::{AckResponse, StartSessionRequest, StartSessionResponse, StreamInfo, StreamList};

use bytes::Bytes;

use crate::Result;

/// Client side of the service's REST interface
///
/// Implementations return the decoded response body even when it reports
/// `success=false`; callers decide how to treat protocol rejections.
/// `Err` is reserved for transport failures and unreadable responses.
#[async_trait::async_trait]
pub trait ServiceApi: Send + Sync + 'static {
    /// Request a new session for `device_id`
    async fn start_session(&self, device_id: &str) -> Result<StartSessionResponse>;

    /// Send one raw frame to the session's chunk endpoint
    async fn upload_chunk(&self, session_id: &str, payload: Bytes) -> Result<AckResponse>;

    /// End the session
    async fn stop_session(&self, session_id: &str) -> Result<AckResponse>;

    /// List the sessions the service currently knows about
    async fn list_streams(&self) -> Result<StreamList>;
}
