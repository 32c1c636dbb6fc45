use std::fmt;
use std::time::Duration;

/// Sample rate of the mixed stream and of every chunk file on disk.
pub const MIXER_SAMPLE_RATE: u32 = 48_000;

/// Sample rate the transcription collaborator expects.
pub const TRANSCRIPTION_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    Int,
    Float,
}

/// A concrete audio format. Compared structurally to decide whether a
/// source needs normalization before it can be mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub encoding: SampleEncoding,
}

impl AudioFormat {
    /// Working format of the mixed stream: stereo float at the mixer rate.
    pub fn mixer(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 2,
            bits_per_sample: 32,
            encoding: SampleEncoding::Float,
        }
    }

    /// Format submitted to the transcription collaborator: mono 16-bit PCM
    /// at 16 kHz.
    pub fn transcription() -> Self {
        Self {
            sample_rate: TRANSCRIPTION_SAMPLE_RATE,
            channels: 1,
            bits_per_sample: 16,
            encoding: SampleEncoding::Int,
        }
    }

    /// Number of frames covering `duration` of wall-clock time.
    pub fn frames_in(&self, duration: Duration) -> usize {
        (self.sample_rate as u128 * duration.as_millis() / 1000) as usize
    }

    pub fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: match self.encoding {
                SampleEncoding::Int => hound::SampleFormat::Int,
                SampleEncoding::Float => hound::SampleFormat::Float,
            },
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {}ch {}-bit {}",
            self.sample_rate,
            self.channels,
            self.bits_per_sample,
            match self.encoding {
                SampleEncoding::Int => "int",
                SampleEncoding::Float => "float",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_in_converts_latency_to_frame_count() {
        let format = AudioFormat::mixer(48_000);
        assert_eq!(format.frames_in(Duration::from_millis(100)), 4_800);
        assert_eq!(format.frames_in(Duration::from_secs(1)), 48_000);
    }

    #[test]
    fn structural_equality_detects_mismatch() {
        let a = AudioFormat::mixer(48_000);
        let b = AudioFormat::mixer(44_100);
        assert_ne!(a, b);
        assert_eq!(a, AudioFormat::mixer(48_000));
    }

    #[test]
    fn transcription_format_is_mono_16bit_16khz() {
        let spec = AudioFormat::transcription().wav_spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    }
}
