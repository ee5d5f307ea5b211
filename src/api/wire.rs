//! JSON bodies exchanged with the processing service.

use serde::{Deserialize, Serialize};

use crate::{Result, StreamError};

/// Body of `POST stream/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub device_id: String,
}

/// Response to `POST stream/start`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub success: bool,
    #[serde(rename = "streamId", default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub websocket_url: Option<String>,
}

impl StartSessionResponse {
    /// The issued session id, or the reason the start was not accepted.
    pub fn into_session_id(self) -> Result<String> {
        match self.session_id {
            Some(id) if self.success && !id.is_empty() => Ok(id),
            _ if self.success => Err(StreamError::malformed("start session", "missing streamId")),
            _ => Err(StreamError::rejected("start session", self.message)),
        }
    }
}

/// Response to chunk upload and stop requests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl AckResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }

    /// Convert `success=false` into a protocol rejection for `operation`.
    pub fn into_result(self, operation: &str) -> Result<()> {
        if self.success { Ok(()) } else { Err(StreamError::rejected(operation, self.message)) }
    }
}

/// One entry of `GET streams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream_id: String,
    pub device_id: String,
    pub is_active: bool,
    pub created_at: String,
    pub clients_count: u32,
    pub buffer_size: u32,
}

/// Response to `GET streams`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamList {
    pub success: bool,
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_response_uses_service_field_names() {
        let body = r#"{"success":true,"streamId":"s-42","message":"ok","websocket_url":"/stream/s-42"}"#;
        let response: StartSessionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.session_id.as_deref(), Some("s-42"));
        assert_eq!(response.into_session_id().unwrap(), "s-42");
    }

    #[test]
    fn failed_start_carries_message() {
        let body = r#"{"success":false,"message":"no capacity"}"#;
        let response: StartSessionResponse = serde_json::from_str(body).unwrap();
        let err = response.into_session_id().unwrap_err();
        assert!(matches!(err, StreamError::Rejected { ref message, .. } if message == "no capacity"));
    }

    #[test]
    fn successful_start_without_id_is_malformed() {
        let response = StartSessionResponse { success: true, ..Default::default() };
        assert!(matches!(
            response.into_session_id(),
            Err(StreamError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn start_request_serialises_device_id() {
        let body = serde_json::to_string(&StartSessionRequest { device_id: "dev-1".into() }).unwrap();
        assert_eq!(body, r#"{"device_id":"dev-1"}"#);
    }

    #[test]
    fn stream_list_parses() {
        let body = r#"{"success":true,"total":1,"streams":[{"stream_id":"s-1","device_id":"dev-1",
            "is_active":true,"created_at":"2024-01-01T00:00:00","clients_count":2,"buffer_size":5}]}"#;
        let list: StreamList = serde_json::from_str(body).unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.streams[0].clients_count, 2);
    }

    #[test]
    fn ack_converts_to_result() {
        assert!(AckResponse::ok("fine").into_result("upload chunk").is_ok());
        let err = AckResponse::rejected("buffer full").into_result("upload chunk").unwrap_err();
        assert_eq!(err.to_string(), "Service rejected upload chunk: buffer full");
    }
}
