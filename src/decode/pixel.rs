//! 4:2:0 semi-planar to RGB conversion.
//!
//! Input layout: `width * height` luma bytes, followed by one interleaved
//! chroma pair (Cb, Cr) per 2x2 luma block, `width` bytes per chroma row.

use crate::types::VideoGeometry;

/// One output pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Convert one sample triple with the BT.601 linear combination.
///
/// Each channel is truncated toward zero, then clamped to `[0, 255]`.
#[inline]
pub fn yuv_to_rgb(y: u8, cb: u8, cr: u8) -> Rgb {
    let y = f64::from(y);
    let cb = f64::from(cb) - 128.0;
    let cr = f64::from(cr) - 128.0;

    let r = (y + cr * 1.402) as i32;
    let g = (y - cb * 0.344 - cr * 0.714) as i32;
    let b = (y + cb * 1.772) as i32;

    Rgb { r: clamp_channel(r), g: clamp_channel(g), b: clamp_channel(b) }
}

#[inline]
fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Convert a whole frame into `out`.
///
/// Returns `false` without touching `out` when `data` is shorter than
/// [`VideoGeometry::frame_len`] or `out` does not hold exactly one pixel per
/// luma sample. Any individual sample index outside `data` yields a black pixel.
pub fn transform(data: &[u8], geometry: VideoGeometry, out: &mut [Rgb]) -> bool {
    if geometry.is_empty() || data.len() < geometry.frame_len() || out.len() != geometry.pixel_count()
    {
        return false;
    }

    let width = geometry.width as usize;
    let frame_size = geometry.pixel_count();

    for (y, row) in out.chunks_exact_mut(width).enumerate() {
        let chroma_row = frame_size + (y / 2) * width;
        for (x, pixel) in row.iter_mut().enumerate() {
            let luma_index = y * width + x;
            let chroma_index = chroma_row + (x & !1);

            *pixel = match (
                data.get(luma_index),
                data.get(chroma_index),
                data.get(chroma_index + 1),
            ) {
                (Some(&luma), Some(&cb), Some(&cr)) => yuv_to_rgb(luma, cb, cr),
                _ => Rgb::BLACK,
            };
        }
    }

    true
}
