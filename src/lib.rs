//! Dual-source audio capture: system loopback and microphone, mixed into
//! one stereo stream, recorded as rotating WAV chunks, each chunk handed
//! off to a transcription pipeline exactly once.

pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod recorder;
pub mod transcribe;

pub use config::Config;
pub use controller::{CaptureController, ControllerState};
pub use error::CaptureError;
pub use events::CaptureEvent;
