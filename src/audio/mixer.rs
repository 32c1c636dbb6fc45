// Two-source stereo mixer.
//
// Each capture callback pushes normalized mono samples into its source's
// FIFO; the writer loop pulls fixed-size stereo blocks. The mixer always
// produces the requested number of frames, padding either side's deficit
// with silence, so a stalled source never shortens the mixed output
// (read-fully semantics). Microphone goes to the left channel, system
// audio to the right; there is no blending within a channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Upper bound on buffered audio per source, in seconds. Frames beyond the
/// cap are dropped oldest-first so a stalled consumer cannot grow memory
/// without bound.
const MAX_BUFFERED_SECS: usize = 10;

/// FIFO of normalized mono samples for one capture source.
///
/// Pushed from the capture callback thread, drained by the writer loop.
/// Samples arrive and leave in order.
pub struct SourceBuffer {
    queue: Mutex<VecDeque<f32>>,
    max_samples: usize,
}

impl SourceBuffer {
    pub fn new(max_samples: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            max_samples,
        }
    }

    pub fn push(&self, samples: &[f32]) {
        let mut queue = self.queue.lock().unwrap();
        queue.extend(samples.iter().copied());
        if queue.len() > self.max_samples {
            let excess = queue.len() - self.max_samples;
            queue.drain(..excess);
            debug!(dropped = excess, "source buffer overflow, dropped oldest samples");
        }
    }

    /// Fill `out` from the front of the queue. Returns the number of samples
    /// written; the remainder of `out` is left untouched.
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut queue = self.queue.lock().unwrap();
        let count = out.len().min(queue.len());
        for slot in out.iter_mut().take(count) {
            *slot = queue.pop_front().unwrap_or(0.0);
        }
        count
    }

    pub fn buffered(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.queue.lock().unwrap().clear();
    }
}

/// Combines the microphone and system-audio FIFOs into one interleaved
/// stereo stream at the mixer sample rate.
pub struct Mixer {
    sample_rate: u32,
    microphone: Arc<SourceBuffer>,
    system: Arc<SourceBuffer>,
    microphone_muted: Arc<AtomicBool>,
    system_muted: Arc<AtomicBool>,
}

impl Mixer {
    pub fn new(
        sample_rate: u32,
        microphone_muted: Arc<AtomicBool>,
        system_muted: Arc<AtomicBool>,
    ) -> Self {
        let max_samples = sample_rate as usize * MAX_BUFFERED_SECS;
        info!(sample_rate, "mixer initialized (mic -> left, system -> right)");
        Self {
            sample_rate,
            microphone: Arc::new(SourceBuffer::new(max_samples)),
            system: Arc::new(SourceBuffer::new(max_samples)),
            microphone_muted,
            system_muted,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn microphone_buffer(&self) -> Arc<SourceBuffer> {
        Arc::clone(&self.microphone)
    }

    pub fn system_buffer(&self) -> Arc<SourceBuffer> {
        Arc::clone(&self.system)
    }

    pub fn has_buffered(&self) -> bool {
        self.microphone.buffered() > 0 || self.system.buffered() > 0
    }

    pub fn clear(&self) {
        self.microphone.clear();
        self.system.clear();
    }

    /// Produce exactly `frames` interleaved stereo frames.
    ///
    /// Both FIFOs are drained even while muted; a muted source contributes
    /// silence, so unmuting never replays stale audio. Mute flags are read
    /// once per block; a stale read for one block cycle is acceptable.
    pub fn read_block(&self, frames: usize) -> Vec<f32> {
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];

        self.microphone.pop_into(&mut left);
        self.system.pop_into(&mut right);

        if self.microphone_muted.load(Ordering::Relaxed) {
            left.fill(0.0);
        }
        if self.system_muted.load(Ordering::Relaxed) {
            right.fill(0.0);
        }

        let mut stereo = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            stereo.push(left[i]);
            stereo.push(right[i]);
        }
        stereo
    }
}
