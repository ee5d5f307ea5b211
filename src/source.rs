//! Frame source trait implemented by the host's camera layer

use bytes::Bytes;

use crate::Result;
use crate::types::VideoGeometry;

/// Trait for raw frame sources
///
/// The capture pacer pulls exactly one frame per tick. Sources never buffer
/// on the engine's behalf: a frame that is not ready when the tick fires is
/// simply skipped.
#[async_trait::async_trait]
pub trait FrameSource: Send + 'static {
    /// Whether the source can deliver a frame right now (preview running,
    /// permissions granted, ...)
    fn is_ready(&self) -> bool;

    /// Currently negotiated frame size, if known
    ///
    /// The pacer reports changes so the decoder can resize its buffers.
    fn geometry(&self) -> Option<VideoGeometry> {
        None
    }

    /// Capture one frame
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - A frame was captured
    /// - `Ok(None)` - No frame this time (the tick is skipped)
    /// - `Err(e)` - Capture failed (logged, the tick is skipped)
    async fn capture_frame(&mut self) -> Result<Option<Bytes>>;
}
