//! Processed-frame decoding into a reusable raster.

use tracing::{debug, trace};

use super::fallback::Waveform;
use super::pixel::{self, Rgb};
use crate::types::{ProcessedChunk, VideoGeometry};

/// Decoded RGB image sized to a [`VideoGeometry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    geometry: VideoGeometry,
    pixels: Vec<Rgb>,
}

impl Raster {
    /// Allocate a black raster.
    pub fn new(geometry: VideoGeometry) -> Self {
        Self { geometry, pixels: vec![Rgb::BLACK; geometry.pixel_count()] }
    }

    pub fn geometry(&self) -> VideoGeometry {
        self.geometry
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    /// Row-major pixels.
    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if x >= self.geometry.width || y >= self.geometry.height {
            return None;
        }
        self.pixels.get(y as usize * self.geometry.width as usize + x as usize).copied()
    }

    /// Packed `RGBRGB...` bytes, for hosts that upload textures.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|p| [p.r, p.g, p.b]).collect()
    }
}

/// What the decoder produced for one processed chunk.
#[derive(Debug)]
pub enum Decoded<'a> {
    Raster(&'a Raster),
    Fallback(Waveform),
}

/// Turns processed chunks into displayable data.
///
/// The raster is allocated lazily and reallocated only when the geometry
/// changes, so decoding under a stable geometry never allocates.
#[derive(Debug)]
pub struct FrameDecoder {
    geometry: VideoGeometry,
    raster: Option<Raster>,
    timestamp_prefix: bool,
    last_frame: Option<ProcessedChunk>,
}

impl FrameDecoder {
    pub fn new(geometry: VideoGeometry, timestamp_prefix: bool) -> Self {
        Self { geometry, raster: None, timestamp_prefix, last_frame: None }
    }

    pub fn geometry(&self) -> VideoGeometry {
        self.geometry
    }

    /// Update the expected frame size. Returns `true` when the geometry
    /// changed and the raster was reallocated.
    pub fn set_geometry(&mut self, geometry: VideoGeometry) -> bool {
        if geometry == self.geometry {
            return false;
        }
        debug!("Decode geometry changed: {} -> {}", self.geometry, geometry);
        self.geometry = geometry;
        self.raster = Some(Raster::new(geometry));
        true
    }

    /// Most recently received processed chunk, kept for redisplay.
    pub fn last_frame(&self) -> Option<&ProcessedChunk> {
        self.last_frame.as_ref()
    }

    /// Convert raw frame bytes at the current geometry.
    ///
    /// Returns `None` when the buffer is too short for the geometry.
    pub fn decode_frame(&mut self, data: &[u8]) -> Option<&Raster> {
        let geometry = self.geometry;
        let raster = self.raster.get_or_insert_with(|| Raster::new(geometry));
        if pixel::transform(data, geometry, &mut raster.pixels) {
            Some(raster)
        } else {
            debug!(
                "Frame of {} bytes does not fit {} ({} bytes expected)",
                data.len(),
                geometry,
                geometry.frame_len()
            );
            None
        }
    }

    /// Decode a processed chunk, falling back to a waveform when it is not
    /// frame-shaped. The chunk is retained as the last frame.
    pub fn decode(&mut self, chunk: &ProcessedChunk) -> Decoded<'_> {
        self.last_frame = Some(chunk.clone());
        self.decode_last()
    }

    /// Decode the retained last frame again.
    pub fn redecode(&mut self) -> Option<Decoded<'_>> {
        self.last_frame.as_ref()?;
        Some(self.decode_last())
    }

    fn decode_last(&mut self) -> Decoded<'_> {
        let Some(chunk) = self.last_frame.as_ref() else {
            return Decoded::Fallback(Waveform::from_payload(&[], None));
        };
        let frame = chunk.frame_data(self.timestamp_prefix);
        let timestamp = if self.timestamp_prefix { chunk.timestamp_ms() } else { None };
        trace!("Decoding processed chunk ({} frame bytes)", frame.len());

        let geometry = self.geometry;
        let raster = self.raster.get_or_insert_with(|| Raster::new(geometry));
        if pixel::transform(&frame, geometry, &mut raster.pixels) {
            Decoded::Raster(raster)
        } else {
            debug!("Processed chunk not frame-shaped, using waveform fallback");
            Decoded::Fallback(Waveform::from_payload(&frame, timestamp))
        }
    }
}
