// Smoothed peak level per source, updated from capture callbacks.
//
// The level is stored as f32 bits in an AtomicU32 so the callback never
// takes a lock; readers see the latest value opportunistically.

use std::sync::atomic::{AtomicU32, Ordering};

const SMOOTHING_FACTOR: f32 = 0.2;
const GAIN: f32 = 2.0;

/// Lock-free smoothed peak meter. One instance per capture source.
#[derive(Debug)]
pub struct LevelMeter {
    level_bits: AtomicU32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            level_bits: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    /// Current smoothed level in [0, 1].
    pub fn level(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.level_bits.store(0.0f32.to_bits(), Ordering::Relaxed);
    }

    /// Update from a raw float buffer (already normalized to [-1, 1]).
    /// Returns the new smoothed level.
    pub fn update_f32(&self, samples: &[f32]) -> f32 {
        let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
        self.apply(peak)
    }

    /// Update from a raw 16-bit integer buffer. Returns the new smoothed level.
    pub fn update_i16(&self, samples: &[i16]) -> f32 {
        let peak = samples
            .iter()
            .fold(0i32, |max, &s| max.max((s as i32).abs()));
        self.apply(peak as f32 / 32_768.0)
    }

    fn apply(&self, peak: f32) -> f32 {
        let boosted = (peak * GAIN).min(1.0);
        let prev = self.level();
        let next = SMOOTHING_FACTOR * boosted + (1.0 - SMOOTHING_FACTOR) * prev;
        self.level_bits.store(next.to_bits(), Ordering::Relaxed);
        next
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let meter = LevelMeter::new();
        assert_eq!(meter.level(), 0.0);
    }

    #[test]
    fn smoothing_blends_peak_with_previous_level() {
        let meter = LevelMeter::new();
        // Peak 0.25 boosted to 0.5; first update from 0 gives 0.2 * 0.5 = 0.1.
        let level = meter.update_f32(&[0.25, -0.1, 0.0]);
        assert!((level - 0.1).abs() < 1e-6);
        // Second identical buffer: 0.2 * 0.5 + 0.8 * 0.1 = 0.18.
        let level = meter.update_f32(&[0.25]);
        assert!((level - 0.18).abs() < 1e-6);
    }

    #[test]
    fn gain_is_capped_at_one() {
        let meter = LevelMeter::new();
        let level = meter.update_f32(&[1.0]);
        // Boosted peak caps at 1.0, smoothed from 0 gives 0.2.
        assert!((level - 0.2).abs() < 1e-6);
    }

    #[test]
    fn i16_peak_is_normalized() {
        let meter = LevelMeter::new();
        // 16384/32768 = 0.5, boosted to 1.0, smoothed to 0.2.
        let level = meter.update_i16(&[16_384, -100, 23]);
        assert!((level - 0.2).abs() < 1e-6);
    }

    #[test]
    fn reset_returns_to_zero() {
        let meter = LevelMeter::new();
        meter.update_f32(&[0.9]);
        assert!(meter.level() > 0.0);
        meter.reset();
        assert_eq!(meter.level(), 0.0);
    }
}
