// Event fan-out for the capture core.
//
// Everything the outer shell needs to observe (levels, transcripts, status,
// errors, elapsed time) flows through a single broadcast channel. A lagging
// receiver loses the oldest events rather than back-pressuring the audio
// path; level and elapsed updates are periodic, so losses self-heal.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;

/// Events emitted by the capture core.
#[derive(Debug, Clone, Serialize)]
pub enum CaptureEvent {
    /// Smoothed system-audio level in [0, 1].
    SystemLevel(f32),
    /// Smoothed microphone level in [0, 1].
    MicrophoneLevel(f32),
    /// A transcript fragment for one completed chunk.
    Transcript(String),
    /// Human-readable status change.
    Status(String),
    /// A reported error; the session may or may not continue, see `Status`.
    Error(String),
    /// Wall-clock time since the session started.
    Elapsed(Duration),
}

/// Cloneable sender half of the event stream.
#[derive(Clone)]
pub struct EventSender {
    tx: broadcast::Sender<CaptureEvent>,
}

impl EventSender {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event. Having no subscribers is not an error.
    pub fn emit(&self, event: CaptureEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.tx.subscribe()
    }
}
