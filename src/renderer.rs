//! Presentation trait implemented by the host's display layer.

use crate::decode::{Raster, Waveform};

/// Receives displayable data from the session controller.
///
/// All calls happen on the controller task, in the order processed frames
/// arrive. Implementations should hand the data to their display surface and
/// return quickly.
pub trait FrameRenderer: Send + 'static {
    /// Present a decoded frame. The raster is reused for the next frame, so
    /// copy out whatever must outlive the call.
    fn present_raster(&mut self, raster: &Raster);

    /// Present the waveform of a payload that could not be decoded.
    fn present_fallback(&mut self, waveform: &Waveform);

    /// Reset the display after the session stops.
    fn clear(&mut self) {}
}
