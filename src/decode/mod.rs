//! Processed-frame decoding and fallback visualisation.

mod decoder;
mod fallback;
mod pixel;

pub use decoder::{Decoded, FrameDecoder, Raster};
pub use fallback::{MAX_WAVEFORM_SAMPLES, Waveform, WaveformLayout};
pub use pixel::{Rgb, transform, yuv_to_rgb};
