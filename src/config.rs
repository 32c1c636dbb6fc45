use crate::audio::normalize::DownmixMode;
use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Chunk-duration bounds enforced when a session starts. The effective
/// bound is this tighter start-time range; see DESIGN.md for the
/// config-bounds history.
pub const MIN_CHUNK_SECS: u64 = 5;
pub const MAX_CHUNK_SECS: u64 = 25;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioSettings {
    /// Working sample rate of the mixed stream.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// How multi-channel sources are reduced to mono before mixing.
    #[serde(default)]
    pub downmix_mode: DownmixMode,
    /// Where chunk files are written while a session runs.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Requested chunk duration in seconds; clamped to
    /// [`MIN_CHUNK_SECS`, `MAX_CHUNK_SECS`] at session start.
    #[serde(default = "default_chunk_seconds")]
    pub chunk_seconds: u64,
}

impl SessionSettings {
    pub fn clamped_chunk_duration(&self) -> Duration {
        Duration::from_secs(self.chunk_seconds.clamp(MIN_CHUNK_SECS, MAX_CHUNK_SECS))
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            downmix_mode: DownmixMode::default(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            chunk_seconds: default_chunk_seconds(),
        }
    }
}

fn default_sample_rate() -> u32 {
    crate::audio::format::MIXER_SAMPLE_RATE
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_chunk_seconds() -> u64 {
    10
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_duration_is_clamped_to_start_time_bounds() {
        let short = SessionSettings { chunk_seconds: 1 };
        assert_eq!(short.clamped_chunk_duration(), Duration::from_secs(5));

        let long = SessionSettings { chunk_seconds: 60 };
        assert_eq!(long.clamped_chunk_duration(), Duration::from_secs(25));

        let in_range = SessionSettings { chunk_seconds: 12 };
        assert_eq!(in_range.clamped_chunk_duration(), Duration::from_secs(12));
    }

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.audio.downmix_mode, DownmixMode::Average);
        assert_eq!(config.session.chunk_seconds, 10);
    }
}
