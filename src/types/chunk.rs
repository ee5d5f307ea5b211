//! Frame payloads travelling to and from the processing service.

use bytes::Bytes;
use std::time::SystemTime;

/// Length of the big-endian millisecond timestamp the service prepends to
/// processed frames.
pub const TIMESTAMP_PREFIX_LEN: usize = 8;

/// One raw captured frame on its way to the service.
///
/// Chunks carry no sequence number; submission order is the only ordering.
#[derive(Debug, Clone)]
pub struct FrameChunk {
    /// Wall-clock capture time
    pub captured_at: SystemTime,

    /// Raw frame bytes (cheaply clonable)
    pub payload: Bytes,
}

impl FrameChunk {
    /// Wrap a freshly captured buffer, stamping it with the current time.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self { captured_at: SystemTime::now(), payload: payload.into() }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A processed frame pushed back over the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedChunk {
    data: Bytes,
}

impl ProcessedChunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// The payload exactly as received.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Service-side processing time in milliseconds since the Unix epoch.
    ///
    /// Only meaningful when the service prefixes its output with a timestamp.
    pub fn timestamp_ms(&self) -> Option<i64> {
        let prefix: [u8; TIMESTAMP_PREFIX_LEN] =
            self.data.get(..TIMESTAMP_PREFIX_LEN)?.try_into().ok()?;
        Some(i64::from_be_bytes(prefix))
    }

    /// Frame bytes with the timestamp prefix removed.
    ///
    /// Payloads of eight bytes or fewer are returned whole, since they cannot
    /// hold both a prefix and a frame.
    pub fn frame_data(&self, timestamp_prefix: bool) -> Bytes {
        if timestamp_prefix && self.data.len() > TIMESTAMP_PREFIX_LEN {
            self.data.slice(TIMESTAMP_PREFIX_LEN..)
        } else {
            self.data.clone()
        }
    }
}
