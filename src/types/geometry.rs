//! Frame dimensions shared by capture and decode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and height of a raw frame and of the decode target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoGeometry {
    pub width: u32,
    pub height: u32,
}

impl VideoGeometry {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of luma samples (and output pixels).
    ///
    /// Saturates at `usize::MAX` rather than overflowing.
    pub fn pixel_count(&self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }

    /// Byte length of a 4:2:0 semi-planar frame: a full luma plane followed by
    /// an interleaved chroma plane at quarter resolution.
    ///
    /// Saturates at `usize::MAX`, which no buffer can satisfy.
    pub fn frame_len(&self) -> usize {
        self.checked_frame_len().unwrap_or(usize::MAX)
    }

    /// Exact frame length, or `None` when it does not fit in `usize`.
    pub fn checked_frame_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(3)
            .map(|len| len / 2)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether both dimensions stay within `max`.
    pub fn fits_within(&self, max: VideoGeometry) -> bool {
        self.width <= max.width && self.height <= max.height
    }

    /// Pick the supported size closest to `max` without exceeding it.
    ///
    /// Distance is the sum of the per-axis differences. When every candidate
    /// is too large the first one is returned, matching how camera drivers
    /// report their preferred size first.
    pub fn best_fit(candidates: &[VideoGeometry], max: VideoGeometry) -> Option<VideoGeometry> {
        let fallback = candidates.first().copied()?;
        let best = candidates
            .iter()
            .filter(|size| size.fits_within(max))
            .min_by_key(|size| {
                u64::from(max.width - size.width) + u64::from(max.height - size.height)
            })
            .copied();
        Some(best.unwrap_or(fallback))
    }
}

impl fmt::Display for VideoGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_len_is_one_and_a_half_bytes_per_pixel() {
        assert_eq!(VideoGeometry::new(4, 2).frame_len(), 12);
        assert_eq!(VideoGeometry::new(640, 480).frame_len(), 460_800);
        assert_eq!(VideoGeometry::new(0, 480).frame_len(), 0);
    }

    #[test]
    fn oversized_geometry_never_overflows() {
        let huge = VideoGeometry::new(u32::MAX, u32::MAX);
        if usize::BITS <= 64 {
            assert_eq!(huge.checked_frame_len(), None);
            assert_eq!(huge.frame_len(), usize::MAX);
        }
        assert_eq!(VideoGeometry::new(4, 2).checked_frame_len(), Some(12));
        assert!(!huge.fits_within(VideoGeometry::new(640, 480)));
    }

    #[test]
    fn best_fit_prefers_largest_size_under_the_limit() {
        let sizes = [
            VideoGeometry::new(1920, 1080),
            VideoGeometry::new(320, 240),
            VideoGeometry::new(640, 480),
            VideoGeometry::new(800, 600),
        ];
        let chosen = VideoGeometry::best_fit(&sizes, VideoGeometry::new(640, 480));
        assert_eq!(chosen, Some(VideoGeometry::new(640, 480)));
    }

    #[test]
    fn best_fit_falls_back_to_first_candidate() {
        let sizes = [VideoGeometry::new(1920, 1080), VideoGeometry::new(1280, 720)];
        let chosen = VideoGeometry::best_fit(&sizes, VideoGeometry::new(640, 480));
        assert_eq!(chosen, Some(VideoGeometry::new(1920, 1080)));
        assert_eq!(VideoGeometry::best_fit(&[], VideoGeometry::new(640, 480)), None);
    }
}
