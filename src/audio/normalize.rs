// Per-source format normalization: channel downmix followed by sample-rate
// conversion. Both steps pass the buffer through untouched when no work is
// needed, so an already-mono source at the target rate costs nothing.

use serde::Deserialize;

/// How a multi-channel source is reduced to mono.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownmixMode {
    /// Each output sample is the arithmetic mean of all channels in the frame.
    Average,
    /// Each output sample is taken from the given channel; the index is
    /// clamped to the valid channel range.
    FirstChannel(usize),
}

impl Default for DownmixMode {
    fn default() -> Self {
        DownmixMode::Average
    }
}

/// Downmix interleaved samples to mono. Mono input is returned as-is.
pub fn downmix(samples: Vec<f32>, channels: u16, mode: DownmixMode) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }

    let channels = channels as usize;
    let frames = samples.len() / channels;
    let mut mono = Vec::with_capacity(frames);

    match mode {
        DownmixMode::Average => {
            for frame in samples.chunks_exact(channels) {
                let sum: f32 = frame.iter().sum();
                mono.push(sum / channels as f32);
            }
        }
        DownmixMode::FirstChannel(index) => {
            let index = index.min(channels - 1);
            for frame in samples.chunks_exact(channels) {
                mono.push(frame[index]);
            }
        }
    }

    mono
}

/// Linear-interpolation resampler for mono audio. Equal rates pass through
/// without copying.
pub fn resample(input: Vec<f32>, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || input.is_empty() {
        return input;
    }

    let ratio = to_rate as f32 / from_rate as f32;
    let output_len = (input.len() as f32 * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f32 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = src_idx - idx as f32;

        if idx + 1 < input.len() {
            output.push(input[idx] * (1.0 - frac) + input[idx + 1] * frac);
        } else {
            output.push(input.last().copied().unwrap_or(0.0));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_downmix_is_arithmetic_mean_per_frame() {
        // 2-channel input where frame k holds (k, k+1).
        let samples = vec![0.0, 1.0, 1.0, 2.0, 2.0, 3.0];
        let mono = downmix(samples, 2, DownmixMode::Average);
        assert_eq!(mono, vec![0.5, 1.5, 2.5]);
    }

    #[test]
    fn average_downmix_handles_more_than_two_channels() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mono = downmix(samples, 3, DownmixMode::Average);
        assert_eq!(mono, vec![2.0, 5.0]);
    }

    #[test]
    fn first_channel_downmix_ignores_other_channels() {
        let samples = vec![0.1, 9.0, 0.2, -9.0, 0.3, 9.0];
        let mono = downmix(samples, 2, DownmixMode::FirstChannel(0));
        assert_eq!(mono, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn first_channel_index_is_clamped() {
        let samples = vec![0.1, 0.9, 0.2, 0.8];
        let mono = downmix(samples, 2, DownmixMode::FirstChannel(7));
        assert_eq!(mono, vec![0.9, 0.8]);
    }

    #[test]
    fn mono_input_passes_through_unchanged() {
        let samples = vec![0.25, -0.5, 0.75];
        let mono = downmix(samples.clone(), 1, DownmixMode::Average);
        assert_eq!(mono, samples);
    }

    #[test]
    fn resample_preserves_duration_within_tolerance() {
        // 1 second at 48 kHz resampled to 16 kHz.
        let input = vec![0.0f32; 48_000];
        let output = resample(input, 48_000, 16_000);
        let diff = (output.len() as i64 - 16_000).abs();
        assert!(diff <= 1, "expected ~16000 samples, got {}", output.len());
    }

    #[test]
    fn resample_upsamples_too() {
        let input = vec![0.0f32; 16_000];
        let output = resample(input, 16_000, 48_000);
        let diff = (output.len() as i64 - 48_000).abs();
        assert!(diff <= 3, "expected ~48000 samples, got {}", output.len());
    }

    #[test]
    fn equal_rates_pass_through() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(input.clone(), 48_000, 48_000), input);
    }

    #[test]
    fn interpolation_is_linear_between_neighbors() {
        let input = vec![0.0, 1.0];
        let output = resample(input, 1, 2);
        assert_eq!(output.len(), 4);
        assert!((output[1] - 0.5).abs() < 1e-6);
    }
}
