use thiserror::Error;

/// Errors surfaced by the capture core.
///
/// The variants map to how the controller reacts:
/// - `Configuration` is rejected synchronously at `start()`.
/// - `Device` leaves the controller in its pre-recording state.
/// - `Pipeline` and `Storage` are isolated to a single chunk.
/// - `Fatal` halts the session the same way an explicit `stop()` does.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("chunk pipeline error: {0}")]
    Pipeline(String),

    #[error("fatal capture error: {0}")]
    Fatal(String),
}
