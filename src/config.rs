//! Client configuration, loaded once at startup.
//!
//! Configuration lives in a YAML document. Every section and key is optional and
//! falls back to the defaults below:
//!
//! ```yaml
//! server:
//!   host: 192.168.2.19
//!   port: 5000
//!   use_https: false
//!   api_path: api/
//! capture:
//!   interval_ms: 200
//!   max_width: 640
//!   max_height: 480
//! network:
//!   connect_timeout_secs: 30
//!   read_timeout_secs: 60
//!   write_timeout_secs: 60
//! control:
//!   reconnection: true
//!   reconnection_attempts: ~
//!   reconnection_delay_ms: 1000
//!   reconnection_delay_max_ms: 5000
//! decode:
//!   timestamp_prefix: true
//!   width: 640
//!   height: 480
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::VideoGeometry;
use crate::{Result, StreamError};

/// Complete client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub network: NetworkConfig,
    pub control: ControlConfig,
    pub decode: DecodeConfig,
}

/// Location of the processing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub use_https: bool,
    /// Path prefix of the REST endpoints, relative to the server root.
    pub api_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.2.19".to_string(),
            port: 5000,
            use_https: false,
            api_path: "api/".to_string(),
        }
    }
}

impl ServerConfig {
    /// Base URL of the REST endpoints, always ending in `/`.
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        let path = self.api_path.trim_matches('/');
        if path.is_empty() {
            format!("{}://{}:{}/", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}/", scheme, self.host, self.port, path)
        }
    }

    /// WebSocket URL of the push channel (Engine.IO v4 endpoint).
    pub fn control_url(&self) -> String {
        let scheme = if self.use_https { "wss" } else { "ws" };
        format!("{}://{}:{}/socket.io/?EIO=4&transport=websocket", scheme, self.host, self.port)
    }
}

/// Frame-capture pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interval between capture ticks (200ms = 5 frames/second).
    pub interval_ms: u64,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { interval_ms: 200, max_width: 640, max_height: 480 }
    }
}

impl CaptureConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Largest geometry the capture source may negotiate.
    pub fn max_geometry(&self) -> VideoGeometry {
        VideoGeometry::new(self.max_width, self.max_height)
    }
}

/// HTTP client timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { connect_timeout_secs: 30, read_timeout_secs: 60, write_timeout_secs: 60 }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Reconnection policy of the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub reconnection: bool,
    /// Maximum consecutive reconnection attempts; `None` retries forever.
    pub reconnection_attempts: Option<u32>,
    pub reconnection_delay_ms: u64,
    pub reconnection_delay_max_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            reconnection: true,
            reconnection_attempts: None,
            reconnection_delay_ms: 1000,
            reconnection_delay_max_ms: 5000,
        }
    }
}

/// Processed-frame decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Strip the 8-byte timestamp the service prepends to processed frames.
    pub timestamp_prefix: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self { timestamp_prefix: true, width: 640, height: 480 }
    }
}

impl DecodeConfig {
    /// Geometry assumed until the capture source negotiates one.
    pub fn initial_geometry(&self) -> VideoGeometry {
        VideoGeometry::new(self.width, self.height)
    }
}

impl StreamConfig {
    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StreamError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: StreamConfig = if yaml.trim().is_empty() {
            StreamConfig::default()
        } else {
            serde_yaml_ng::from_str(yaml).map_err(|e| StreamError::config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the values a running client depends on.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(StreamError::config("server.host must not be empty"));
        }
        if self.server.port == 0 {
            return Err(StreamError::config("server.port must be between 1 and 65535"));
        }
        if self.capture.interval_ms == 0 {
            return Err(StreamError::config("capture.interval_ms must be positive"));
        }
        if self.capture.max_width == 0 || self.capture.max_height == 0 {
            return Err(StreamError::config("capture.max_width/max_height must be positive"));
        }
        if self.decode.width == 0 || self.decode.height == 0 {
            return Err(StreamError::config("decode.width/height must be positive"));
        }
        if self.control.reconnection_delay_ms > self.control.reconnection_delay_max_ms {
            return Err(StreamError::config(
                "control.reconnection_delay_ms exceeds control.reconnection_delay_max_ms",
            ));
        }
        Ok(())
    }
}
