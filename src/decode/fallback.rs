//! Waveform visualisation for payloads that cannot be decoded as frames.

/// Upper bound on the number of bytes sampled from a payload.
pub const MAX_WAVEFORM_SAMPLES: usize = 200;

const SIDE_MARGIN: f32 = 50.0;
const BASELINE_RATIO: f32 = 0.6;
const MAX_AMPLITUDE: f32 = 80.0;

/// Deterministic summary of an undecodable payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Total payload size in bytes
    pub byte_len: usize,

    /// Service timestamp, when the payload carried one
    pub timestamp_ms: Option<i64>,

    /// Signed amplitudes in `[-1.0, 1.0)`, one per sampled byte
    pub samples: Vec<f32>,
}

/// Drawing coordinates for a [`Waveform`] on a surface of a given size.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformLayout {
    pub baseline_y: f32,
    pub start_x: f32,
    pub end_x: f32,
    pub points: Vec<(f32, f32)>,
}

impl Waveform {
    /// Sample up to [`MAX_WAVEFORM_SAMPLES`] evenly spaced bytes of `data`.
    pub fn from_payload(data: &[u8], timestamp_ms: Option<i64>) -> Self {
        let count = data.len().min(MAX_WAVEFORM_SAMPLES);
        let samples = (0..count)
            .map(|i| {
                let index = (i * data.len() / count).min(data.len() - 1);
                (f32::from(data[index]) - 128.0) / 128.0
            })
            .collect();

        Self { byte_len: data.len(), timestamp_ms, samples }
    }

    /// Lay the samples out around a centre line at 60% of the surface height,
    /// with 50px side margins and an 80px peak amplitude.
    pub fn layout(&self, width: f32, height: f32) -> WaveformLayout {
        let baseline_y = height * BASELINE_RATIO;
        let start_x = SIDE_MARGIN;
        let end_x = width - SIDE_MARGIN;

        let points = if self.samples.is_empty() {
            Vec::new()
        } else {
            let step = (end_x - start_x) / self.samples.len() as f32;
            self.samples
                .iter()
                .enumerate()
                .map(|(i, amplitude)| {
                    (start_x + i as f32 * step, baseline_y + amplitude * MAX_AMPLITUDE)
                })
                .collect()
        };

        WaveformLayout { baseline_y, start_x, end_x, points }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_payload_samples_every_byte() {
        let waveform = Waveform::from_payload(&[0, 128, 255], None);
        assert_eq!(waveform.byte_len, 3);
        assert_eq!(waveform.samples, vec![-1.0, 0.0, 127.0 / 128.0]);
    }

    #[test]
    fn long_payload_is_capped_and_evenly_spaced() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        let waveform = Waveform::from_payload(&data, Some(42));

        assert_eq!(waveform.samples.len(), MAX_WAVEFORM_SAMPLES);
        assert_eq!(waveform.timestamp_ms, Some(42));
        // sample i reads byte i*5
        assert_eq!(waveform.samples[1], (5.0 - 128.0) / 128.0);
        assert_eq!(waveform.samples[199], (f32::from((995 % 256) as u8) - 128.0) / 128.0);
    }

    #[test]
    fn empty_payload_has_no_samples() {
        let waveform = Waveform::from_payload(&[], None);
        assert!(waveform.samples.is_empty());
        assert!(waveform.layout(800.0, 600.0).points.is_empty());
    }

    #[test]
    fn sampling_is_deterministic() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
        assert_eq!(Waveform::from_payload(&data, None), Waveform::from_payload(&data, None));
    }

    #[test]
    fn layout_maps_amplitude_around_baseline() {
        let waveform = Waveform::from_payload(&[128, 0], None);
        let layout = waveform.layout(500.0, 1000.0);

        assert_eq!(layout.baseline_y, 600.0);
        assert_eq!(layout.points[0], (50.0, 600.0));
        assert_eq!(layout.points[1], (250.0, 520.0));
    }
}
