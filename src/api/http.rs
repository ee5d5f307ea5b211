//! HTTP implementation of [`ServiceApi`].

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use super::ServiceApi;
use super::wire::{AckResponse, StartSessionRequest, StartSessionResponse, StreamList};
use crate::config::StreamConfig;
use crate::{Result, StreamError};

/// REST client for the processing service.
///
/// Construct one per process and share it through an `Arc`.
#[derive(Debug, Clone)]
pub struct HttpServiceApi {
    client: reqwest::Client,
    base: Url,
    write_timeout: Duration,
}

impl HttpServiceApi {
    pub fn new(config: &StreamConfig) -> Result<Self> {
        let base_url = config.server.base_url();
        let base = Url::parse(&base_url)
            .map_err(|e| StreamError::config(format!("invalid base URL {}: {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.network.connect_timeout())
            .timeout(config.network.read_timeout())
            .build()
            .map_err(|e| StreamError::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { client, base, write_timeout: config.network.write_timeout() })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `{base}/stream/{session_id}[/{action}]`, with the id percent-encoded.
    pub(crate) fn stream_endpoint(&self, session_id: &str, action: Option<&str>) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StreamError::config("base URL cannot carry a path"))?;
            segments.pop_if_empty().push("stream").push(session_id);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| StreamError::config(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Decode a JSON body regardless of status; the service reports failures
    /// as `{success: false, message}` with a 4xx/5xx status.
    async fn read_json<T: DeserializeOwned>(response: reqwest::Response, operation: &str) -> Result<T> {
        let status = response.status();
        let body = response.bytes().await?;
        trace!("{} -> HTTP {} ({} bytes)", operation, status, body.len());
        serde_json::from_slice(&body)
            .map_err(|e| StreamError::malformed(operation, format!("HTTP {}: {}", status, e)))
    }
}

#[async_trait::async_trait]
impl ServiceApi for HttpServiceApi {
    async fn start_session(&self, device_id: &str) -> Result<StartSessionResponse> {
        let url = self.endpoint("stream/start")?;
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(&StartSessionRequest { device_id: device_id.to_string() })
            .send()
            .await?;
        Self::read_json(response, "start session").await
    }

    async fn upload_chunk(&self, session_id: &str, payload: Bytes) -> Result<AckResponse> {
        let url = self.stream_endpoint(session_id, Some("chunk"))?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(self.write_timeout)
            .body(payload)
            .send()
            .await?;
        Self::read_json(response, "upload chunk").await
    }

    async fn stop_session(&self, session_id: &str) -> Result<AckResponse> {
        let url = self.stream_endpoint(session_id, Some("stop"))?;
        debug!("POST {}", url);
        let response = self.client.post(url).send().await?;
        Self::read_json(response, "stop session").await
    }

    async fn list_streams(&self) -> Result<StreamList> {
        let url = self.endpoint("streams")?;
        let response = self.client.get(url).send().await?;
        Self::read_json(response, "list streams").await
    }
}
